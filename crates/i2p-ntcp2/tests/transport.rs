mod common;

use std::sync::Arc;

use common::{dsa_router, ed25519_router, forged, params, unused_addr};
use i2p_common::{Classify, ErrorKind};
use i2p_crypto::Ed25519Signer;
use i2p_data::{
    Certificate, CryptoKeyType, Date, KeyCertificate, KeysAndCert, Mapping, RouterAddress,
    RouterInfo, SigningKeyType,
};
use i2p_ntcp2::{LocalRouter, Ntcp2Error, Ntcp2Transport, SessionState, TransportConfig};
use tokio::net::TcpListener;

/// A transport listening on an ephemeral loopback port, with a descriptor
/// that advertises it.
async fn listening(
    make: fn(std::net::SocketAddr) -> LocalRouter,
    config: TransportConfig,
) -> Ntcp2Transport {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let transport = Ntcp2Transport::new(make(addr), config).unwrap();
    assert_eq!(transport.listen_on(listener).unwrap(), addr);
    transport
}

fn dialer(config: TransportConfig) -> Ntcp2Transport {
    Ntcp2Transport::new(ed25519_router(unused_addr()), config).unwrap()
}

#[tokio::test]
async fn dial_and_accept_over_tcp() {
    i2p_common::init_test_tracing();
    let bob = listening(ed25519_router, TransportConfig::default()).await;
    let alice = dialer(TransportConfig::default());
    let bob_info = bob.local().router_info().clone();

    let (outbound, inbound) = tokio::join!(alice.get_session(bob_info.clone()), bob.accept());
    let outbound = outbound.unwrap();
    let inbound = inbound.unwrap();
    assert_eq!(outbound.peer_hash(), bob.local().hash());
    assert_eq!(inbound.peer_hash(), alice.local().hash());

    outbound.enqueue_send(b"over tcp".to_vec()).await.unwrap();
    assert_eq!(inbound.next_received().await.unwrap(), b"over tcp");
    inbound.enqueue_send(b"and back".to_vec()).await.unwrap();
    assert_eq!(outbound.next_received().await.unwrap(), b"and back");

    // A live session is reused.
    let again = alice.get_session(bob_info).await.unwrap();
    assert!(Arc::ptr_eq(&again, &outbound));
    assert_eq!(alice.session_count().await, 1);
    assert_eq!(bob.session_count().await, 1);
    assert_eq!(
        alice.session_state(&bob.local().hash()).await,
        Some(SessionState::Established)
    );

    assert!(alice.close_session(&bob.local().hash()).await.unwrap());
    assert_eq!(inbound.next_received().await, None);
    assert_eq!(alice.session_count().await, 0);
    assert_eq!(bob.session_count().await, 0);

    alice.close().await.unwrap();
    bob.close().await.unwrap();
}

#[tokio::test]
async fn legacy_dsa_router_is_verified() {
    let bob = listening(ed25519_router, TransportConfig::default()).await;
    let alice = Ntcp2Transport::new(dsa_router(unused_addr()), TransportConfig::default())
        .unwrap()
        .with_domain_parameters(params());

    let (outbound, inbound) = tokio::join!(
        alice.get_session(bob.local().router_info().clone()),
        bob.accept()
    );
    outbound.unwrap();
    let inbound = inbound.unwrap();
    assert_eq!(inbound.peer().signature().len(), 40);
    assert_eq!(inbound.peer_hash(), alice.local().hash());
}

#[tokio::test]
async fn incompatible_descriptor() {
    let alice = dialer(TransportConfig::default());

    let signer = Ed25519Signer::generate();
    let key_cert = KeyCertificate::new(SigningKeyType::Ed25519, CryptoKeyType::ElGamal);
    let identity = KeysAndCert::new(
        &[7u8; 256],
        &signer.public_key_bytes(),
        Certificate::key(&key_cert),
    )
    .unwrap();
    let ssu = RouterAddress::new(2, Date::NEVER, "SSU2", Mapping::from_pairs([("port", "1")]));
    let peer = RouterInfo::sign(identity, Date::now(), vec![ssu], Mapping::new(), &signer).unwrap();

    assert!(!alice.compatible(&peer));
    let err = alice.get_session(Arc::new(peer)).await.unwrap_err();
    assert!(matches!(err, Ntcp2Error::Incompatible(_)));
    assert_eq!(err.kind(), ErrorKind::ProtocolViolation);
    assert_eq!(alice.session_count().await, 0);
}

#[tokio::test]
async fn forged_descriptor_is_never_dialed() {
    let bob = listening(ed25519_router, TransportConfig::default()).await;
    let alice = dialer(TransportConfig::default());
    let forged = forged(bob.local());
    assert!(!alice.compatible(&forged));

    let err = alice.get_session(forged).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::CryptoFailure);
    assert_eq!(alice.session_count().await, 0);

    // Nothing connected, so the genuine descriptor still gets the only session.
    let (outbound, inbound) = tokio::join!(
        alice.get_session(bob.local().router_info().clone()),
        bob.accept()
    );
    outbound.unwrap();
    inbound.unwrap();
    assert_eq!(bob.session_count().await, 1);
}

#[tokio::test]
async fn session_limit_rejects_inbound() {
    let config = TransportConfig {
        max_sessions: 1,
        ..TransportConfig::default()
    };
    let bob = listening(ed25519_router, config).await;
    let first = dialer(TransportConfig::default());
    let second = dialer(TransportConfig::default());
    let bob_info = bob.local().router_info().clone();

    let (a, b) = tokio::join!(first.get_session(bob_info.clone()), bob.accept());
    let _held = (a.unwrap(), b.unwrap());

    let (a, b) = tokio::join!(second.get_session(bob_info), bob.accept());
    assert!(matches!(b, Err(Ntcp2Error::SessionLimit(1))));
    assert_eq!(a.unwrap_err().kind(), ErrorKind::TransientIo);
    assert_eq!(bob.session_count().await, 1);
}

#[tokio::test]
async fn dial_to_closed_port_fails() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let peer = ed25519_router(addr);
    let alice = dialer(TransportConfig::default());
    let err = alice
        .get_session(peer.router_info().clone())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TransientIo);
    assert_eq!(alice.session_state(&peer.hash()).await, None);
}
