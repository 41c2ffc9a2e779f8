mod common;

use std::time::Duration;

use common::{ed25519_router, params, session_pair, unused_addr};
use i2p_crypto::Role;
use i2p_ntcp2::handshake::respond;
use i2p_ntcp2::session::STREAM_CHANNEL_CAPACITY;
use i2p_ntcp2::{
    Ntcp2Error, OverflowPolicy, PaddingPolicy, QueueConfig, Session, SessionState, SessionTarget,
    TransportConfig,
};
use tokio::time::{sleep, timeout, Instant};

async fn read_len(session: &Session, len: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(len);
    let mut buf = [0u8; 4096];
    while out.len() < len {
        let n = session.read(&mut buf).await.unwrap();
        assert!(n > 0, "stream ended after {} bytes", out.len());
        out.extend_from_slice(&buf[..n]);
    }
    out
}

#[tokio::test]
async fn messages_flow_both_ways() {
    i2p_common::init_test_tracing();
    let config = TransportConfig::default();
    let (alice, bob) = session_pair(&config, &config).await;

    assert_eq!(alice.role(), Role::Initiator);
    assert_eq!(bob.role(), Role::Responder);
    assert_eq!(alice.state(), SessionState::Established);

    alice.enqueue_send(b"hello bob".to_vec()).await.unwrap();
    bob.enqueue_send(b"hello alice".to_vec()).await.unwrap();
    assert_eq!(bob.next_received().await.unwrap(), b"hello bob");
    assert_eq!(alice.next_received().await.unwrap(), b"hello alice");

    for i in 0..20u8 {
        alice.enqueue_send(vec![i; usize::from(i) * 100]).await.unwrap();
    }
    for i in 0..20u8 {
        assert_eq!(bob.next_received().await.unwrap(), vec![i; usize::from(i) * 100]);
    }
}

#[tokio::test]
async fn stream_bytes_arrive_in_order() {
    let config = TransportConfig::default();
    let (alice, bob) = session_pair(&config, &config).await;

    let data: Vec<u8> = (0..150_000u32).map(|i| (i % 251) as u8).collect();
    let (written, received) = tokio::join!(alice.write(&data), read_len(&bob, data.len()));
    assert_eq!(written.unwrap(), data.len());
    assert_eq!(received, data);
}

#[tokio::test]
async fn close_terminates_peer() {
    let config = TransportConfig::default();
    let (alice, bob) = session_pair(&config, &config).await;

    alice.enqueue_send(b"last".to_vec()).await.unwrap();
    assert_eq!(bob.next_received().await.unwrap(), b"last");

    alice.close().await.unwrap();
    assert_eq!(alice.state(), SessionState::Closed);
    assert!(matches!(
        alice.enqueue_send(b"late".to_vec()).await,
        Err(Ntcp2Error::Closed)
    ));
    assert!(matches!(alice.write(b"late").await, Err(Ntcp2Error::Closed)));

    assert_eq!(bob.next_received().await, None);
    let mut buf = [0u8; 16];
    assert_eq!(bob.read(&mut buf).await.unwrap(), 0);
    assert_eq!(bob.state(), SessionState::Closed);

    // A second close is a no-op.
    alice.close().await.unwrap();
}

#[tokio::test]
async fn oversize_message_rejected() {
    let config = TransportConfig::default();
    let (alice, _bob) = session_pair(&config, &config).await;
    let err = alice.enqueue_send(vec![0; 70_000]).await.unwrap_err();
    assert!(matches!(err, Ntcp2Error::TooLarge { .. }));
}

/// An initiator session whose peer completes the handshake and then stops
/// reading, so the drain task stalls on a full pipe.
async fn stalled_session(config: &TransportConfig) -> (Session, tokio::io::DuplexStream) {
    let alice = ed25519_router(unused_addr());
    let bob = ed25519_router(unused_addr());
    let target = SessionTarget::from_router_info(bob.router_info().clone(), &params()).unwrap();
    let (a, mut b) = tokio::io::duplex(2048);

    let deadline = Instant::now() + Duration::from_secs(5);
    let (session, responded) = tokio::join!(
        Session::outbound(a, &alice, &target, config, params()),
        respond(&mut b, &bob, config, params(), deadline),
    );
    responded.unwrap();
    (session.unwrap(), b)
}

#[tokio::test]
async fn send_queue_error_policy() {
    let config = TransportConfig {
        padding: PaddingPolicy::NONE,
        send_queue: QueueConfig {
            capacity: 1,
            overflow: OverflowPolicy::Error,
        },
        ..TransportConfig::default()
    };
    let (alice, _peer) = stalled_session(&config).await;

    alice.enqueue_send(vec![1; 8192]).await.unwrap();
    sleep(Duration::from_millis(50)).await;
    alice.enqueue_send(vec![2; 8192]).await.unwrap();
    let err = alice.enqueue_send(vec![3; 8192]).await.unwrap_err();
    assert!(matches!(err, Ntcp2Error::QueueFull("send")));
    assert!(alice.is_open());
}

#[tokio::test]
async fn send_queue_drop_newest_policy() {
    let config = TransportConfig {
        padding: PaddingPolicy::NONE,
        send_queue: QueueConfig {
            capacity: 1,
            overflow: OverflowPolicy::DropNewest,
        },
        ..TransportConfig::default()
    };
    let (alice, _peer) = stalled_session(&config).await;

    alice.enqueue_send(vec![1; 8192]).await.unwrap();
    sleep(Duration::from_millis(50)).await;
    alice.enqueue_send(vec![2; 8192]).await.unwrap();
    alice.enqueue_send(vec![3; 8192]).await.unwrap();
    assert!(alice.is_open());
}

#[tokio::test]
async fn send_queue_block_policy_waits() {
    let config = TransportConfig {
        padding: PaddingPolicy::NONE,
        send_queue: QueueConfig {
            capacity: 1,
            overflow: OverflowPolicy::Block,
        },
        ..TransportConfig::default()
    };
    let (alice, _peer) = stalled_session(&config).await;

    alice.enqueue_send(vec![1; 8192]).await.unwrap();
    sleep(Duration::from_millis(50)).await;
    alice.enqueue_send(vec![2; 8192]).await.unwrap();
    let blocked = timeout(Duration::from_millis(100), alice.enqueue_send(vec![3; 8192])).await;
    assert!(blocked.is_err(), "third message should wait for room");
}

#[tokio::test]
async fn receive_queue_drop_newest_policy() {
    let sender = TransportConfig::default();
    let receiver = TransportConfig {
        recv_queue: QueueConfig {
            capacity: 2,
            overflow: OverflowPolicy::DropNewest,
        },
        ..TransportConfig::default()
    };
    let (alice, bob) = session_pair(&sender, &receiver).await;

    for i in 0..5u8 {
        alice.enqueue_send(vec![i]).await.unwrap();
    }
    sleep(Duration::from_millis(200)).await;

    assert_eq!(bob.next_received().await.unwrap(), vec![0]);
    assert_eq!(bob.next_received().await.unwrap(), vec![1]);
    assert!(timeout(Duration::from_millis(100), bob.next_received())
        .await
        .is_err());
    assert!(bob.is_open());
}

#[tokio::test]
async fn receive_queue_error_policy_closes_session() {
    let sender = TransportConfig::default();
    let receiver = TransportConfig {
        recv_queue: QueueConfig {
            capacity: 1,
            overflow: OverflowPolicy::Error,
        },
        ..TransportConfig::default()
    };
    let (alice, bob) = session_pair(&sender, &receiver).await;

    for i in 0..3u8 {
        alice.enqueue_send(vec![i]).await.unwrap();
    }
    sleep(Duration::from_millis(200)).await;

    assert_eq!(bob.next_received().await.unwrap(), vec![0]);
    assert_eq!(bob.next_received().await, None);
    assert_eq!(bob.state(), SessionState::Closed);

    // The sender sees the termination.
    assert_eq!(alice.next_received().await, None);
    assert_eq!(alice.state(), SessionState::Closed);
}

#[tokio::test]
async fn unread_stream_does_not_block_messages() {
    let config = TransportConfig {
        padding: PaddingPolicy::NONE,
        ..TransportConfig::default()
    };
    let (alice, bob) = session_pair(&config, &config).await;

    // One stream block per write, more than the reader buffers.
    let blocks = STREAM_CHANNEL_CAPACITY + 16;
    for i in 0..blocks {
        alice.write(&[i as u8; 10]).await.unwrap();
    }
    alice.enqueue_send(b"still here".to_vec()).await.unwrap();

    let message = timeout(Duration::from_secs(5), bob.next_received())
        .await
        .expect("message stuck behind unread stream data");
    assert_eq!(message.unwrap(), b"still here");
    assert!(bob.is_open());

    // Buffered stream bytes are intact, then the gap is reported.
    let buffered = read_len(&bob, STREAM_CHANNEL_CAPACITY * 10).await;
    assert!(buffered.chunks(10).enumerate().all(|(i, c)| c == [i as u8; 10]));
    let mut buf = [0u8; 16];
    assert!(matches!(
        bob.read(&mut buf).await,
        Err(Ntcp2Error::QueueFull("stream"))
    ));
}
