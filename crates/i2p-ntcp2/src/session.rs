//! Established NTCP2 sessions.
//!
//! After the handshake the stream is split in two:
//!
//! ```text
//!   Session::write ─┐
//!   drain task ─────┴─> Mutex<FrameWriter> ──> write half   (send nonce)
//!
//!   read half ──> pump task ─┬─> stream channel ──> Session::read
//!                            └─> receive queue ───> Session::next_received
//! ```
//!
//! The writer mutex serializes frames so the send nonce advances in wire
//! order. Only the pump task touches the read half.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use bytes::{Buf, Bytes};
use i2p_common::helpers::short_hex;
use i2p_common::{Classify, ErrorKind};
use i2p_crypto::{DomainParameters, Role};
use i2p_data::{RouterHash, RouterInfo};
use tokio::io::{AsyncRead, AsyncWrite, ReadHalf};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use crate::config::{OverflowPolicy, PaddingPolicy, QueueConfig, TransportConfig};
use crate::error::Ntcp2Error;
use crate::frame::{
    reason, Block, FrameReader, FrameWriter, BLOCK_HEADER_SIZE, MAX_BLOCK_DATA, MAX_FRAME_PAYLOAD,
};
use crate::handshake::{self, Handshake, LocalRouter, SessionTarget};

/// Stream blocks buffered between the pump and `Session::read`. Once full,
/// further stream data is discarded and the stream reports an overrun.
pub const STREAM_CHANNEL_CAPACITY: usize = 64;

const PUMP_TASK: usize = 0;
const DRAIN_TASK: usize = 1;

/// Session lifecycle. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Handshake messages in flight
    Handshaking,
    /// Transport keys derived, data phase running
    Established,
    /// Terminated by either side or by an error
    Closed,
}

type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// State shared between the session handle and its tasks.
struct Shared {
    state: Mutex<SessionState>,
    frames_received: AtomicU64,
    /// Set when stream data was discarded because nobody was reading.
    stream_overrun: AtomicBool,
    peer: String,
}

impl Shared {
    fn state(&self) -> SessionState {
        match self.state.lock() {
            Ok(state) => *state,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    /// Move to `Closed`. Returns false if already closed.
    fn close(&self) -> bool {
        let mut state = match self.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };
        if *state == SessionState::Closed {
            return false;
        }
        *state = SessionState::Closed;
        info!(peer = %self.peer, "session closed");
        true
    }
}

/// Buffered stream bytes not yet handed to `Session::read`.
struct StreamInput {
    rx: mpsc::Receiver<Vec<u8>>,
    pending: Bytes,
}

/// An authenticated, encrypted session with one peer.
pub struct Session {
    peer: Arc<RouterInfo>,
    peer_hash: RouterHash,
    role: Role,
    shared: Arc<Shared>,
    writer: Arc<tokio::sync::Mutex<FrameWriter<BoxedWriter>>>,
    padding: PaddingPolicy,
    send_queue: QueueConfig,
    send_tx: mpsc::Sender<Vec<u8>>,
    received: tokio::sync::Mutex<mpsc::Receiver<Vec<u8>>>,
    stream_in: tokio::sync::Mutex<StreamInput>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("peer", &self.peer_hash)
            .field("role", &self.role)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Dial side: handshake as initiator, then start the data phase.
    ///
    /// The stream is dropped, and so closed, if the handshake fails.
    pub async fn outbound<S>(
        mut stream: S,
        local: &LocalRouter,
        target: &SessionTarget,
        config: &TransportConfig,
        params: Arc<DomainParameters>,
    ) -> Result<Self, Ntcp2Error>
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let deadline = Instant::now() + config.handshake_timeout();
        debug!(
            peer = %short_hex(target.hash().as_bytes()),
            state = ?SessionState::Handshaking,
            "outbound session"
        );
        let handshake =
            handshake::initiate(&mut stream, local, target, config, params, deadline).await?;
        Ok(Self::establish(stream, handshake, config))
    }

    /// Accept side: handshake as responder, then start the data phase.
    pub async fn inbound<S>(
        mut stream: S,
        local: &LocalRouter,
        config: &TransportConfig,
        params: Arc<DomainParameters>,
    ) -> Result<Self, Ntcp2Error>
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let deadline = Instant::now() + config.handshake_timeout();
        debug!(state = ?SessionState::Handshaking, "inbound session");
        let handshake = handshake::respond(&mut stream, local, config, params, deadline).await?;
        Ok(Self::establish(stream, handshake, config))
    }

    /// Start the data phase on a stream that completed `handshake`.
    ///
    /// Spawns the pump and drain tasks, so it must run inside a runtime.
    pub fn establish<S>(stream: S, handshake: Handshake, config: &TransportConfig) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let Handshake {
            role,
            transport,
            peer,
        } = handshake;
        let peer_hash = peer.hash();
        let (read_half, write_half) = tokio::io::split(stream);
        let (sending, receiving) = transport.into_directions();

        let writer: BoxedWriter = Box::new(write_half);
        let writer = Arc::new(tokio::sync::Mutex::new(FrameWriter::new(writer, sending)));
        let reader = FrameReader::new(read_half, receiving);

        let shared = Arc::new(Shared {
            state: Mutex::new(SessionState::Established),
            frames_received: AtomicU64::new(0),
            stream_overrun: AtomicBool::new(false),
            peer: short_hex(peer_hash.as_bytes()),
        });

        let (send_tx, send_rx) = mpsc::channel(config.send_queue.capacity);
        let (recv_tx, recv_rx) = mpsc::channel(config.recv_queue.capacity);
        let (stream_tx, stream_rx) = mpsc::channel(STREAM_CHANNEL_CAPACITY);

        let pump = tokio::spawn(pump_frames(
            reader,
            recv_tx,
            config.recv_queue.overflow,
            stream_tx,
            shared.clone(),
            writer.clone(),
        ));
        let drain = tokio::spawn(drain_send_queue(
            send_rx,
            writer.clone(),
            shared.clone(),
            config.padding,
        ));

        info!(peer = %shared.peer, ?role, "session established");

        Self {
            peer,
            peer_hash,
            role,
            shared,
            writer,
            padding: config.padding,
            send_queue: config.send_queue,
            send_tx,
            received: tokio::sync::Mutex::new(recv_rx),
            stream_in: tokio::sync::Mutex::new(StreamInput {
                rx: stream_rx,
                pending: Bytes::new(),
            }),
            tasks: Mutex::new(vec![pump, drain]),
        }
    }

    pub fn peer(&self) -> &Arc<RouterInfo> {
        &self.peer
    }

    pub fn peer_hash(&self) -> RouterHash {
        self.peer_hash
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn state(&self) -> SessionState {
        self.shared.state()
    }

    pub fn is_open(&self) -> bool {
        self.state() == SessionState::Established
    }

    /// Send stream bytes. Returns once every byte is framed and written.
    pub async fn write(&self, data: &[u8]) -> Result<usize, Ntcp2Error> {
        self.ensure_open()?;
        let mut writer = self.writer.lock().await;
        for chunk in data.chunks(MAX_BLOCK_DATA) {
            let blocks = padded(vec![Block::Stream(chunk.to_vec())], self.padding);
            if let Err(e) = writer.write_blocks(&blocks).await {
                warn!(peer = %self.shared.peer, error = %e, "stream write failed");
                self.shared.close();
                return Err(e);
            }
        }
        Ok(data.len())
    }

    /// Read stream bytes in order. `Ok(0)` means the session ended.
    ///
    /// Stream data that arrived while the buffer was full is lost; once the
    /// bytes before the gap are read this returns `QueueFull`.
    pub async fn read(&self, buf: &mut [u8]) -> Result<usize, Ntcp2Error> {
        if buf.is_empty() {
            return Ok(0);
        }
        let mut input = self.stream_in.lock().await;
        while input.pending.is_empty() {
            match input.rx.recv().await {
                Some(data) => input.pending = Bytes::from(data),
                None if self.shared.stream_overrun.load(Ordering::Acquire) => {
                    return Err(Ntcp2Error::QueueFull("stream"));
                }
                None => return Ok(0),
            }
        }
        let n = buf.len().min(input.pending.len());
        buf[..n].copy_from_slice(&input.pending[..n]);
        input.pending.advance(n);
        Ok(n)
    }

    /// Queue an application message for the drain task.
    ///
    /// A full queue is handled by the configured overflow policy.
    pub async fn enqueue_send(&self, message: Vec<u8>) -> Result<(), Ntcp2Error> {
        self.ensure_open()?;
        if message.len() > MAX_BLOCK_DATA {
            return Err(Ntcp2Error::TooLarge {
                context: "message",
                declared: message.len(),
                max: MAX_BLOCK_DATA,
            });
        }
        offer(&self.send_tx, message, self.send_queue.overflow, "send").await
    }

    /// Next application message from the peer, or `None` once the session
    /// ended and the queue is empty.
    pub async fn next_received(&self) -> Option<Vec<u8>> {
        self.received.lock().await.recv().await
    }

    /// Send a termination block and shut the stream down. Messages still
    /// queued for sending are discarded.
    pub async fn close(&self) -> Result<(), Ntcp2Error> {
        let was_open = self.shared.close();

        // Holding the writer means the drain task is not mid-frame.
        let mut writer = self.writer.lock().await;
        self.abort_task(DRAIN_TASK);
        let mut result = Ok(());
        if was_open {
            let termination = Block::Termination {
                valid_frames: self.shared.frames_received.load(Ordering::Relaxed),
                reason: reason::NORMAL_CLOSE,
            };
            result = writer.write_blocks(&[termination]).await;
        }
        if let Err(e) = writer.shutdown().await {
            trace!(error = %e, "shutdown after close");
        }
        drop(writer);
        self.abort_task(PUMP_TASK);
        result
    }

    fn ensure_open(&self) -> Result<(), Ntcp2Error> {
        if self.is_open() {
            Ok(())
        } else {
            Err(Ntcp2Error::Closed)
        }
    }

    fn abort_task(&self, index: usize) {
        let tasks = match self.tasks.lock() {
            Ok(tasks) => tasks,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(task) = tasks.get(index) {
            task.abort();
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        let tasks = match self.tasks.get_mut() {
            Ok(tasks) => tasks,
            Err(poisoned) => poisoned.into_inner(),
        };
        for task in tasks.iter() {
            task.abort();
        }
    }
}

/// Append a padding block sized by `policy` if the frame has room.
fn padded(mut blocks: Vec<Block>, policy: PaddingPolicy) -> Vec<Block> {
    let used: usize = blocks.iter().map(Block::encoded_len).sum();
    let room = MAX_FRAME_PAYLOAD.saturating_sub(used);
    if room > BLOCK_HEADER_SIZE {
        let len = policy.pick(room - BLOCK_HEADER_SIZE);
        if len > 0 {
            blocks.push(Block::Padding(len));
        }
    }
    blocks
}

/// Put `item` on a bounded queue according to `policy`.
async fn offer(
    tx: &mpsc::Sender<Vec<u8>>,
    item: Vec<u8>,
    policy: OverflowPolicy,
    queue: &'static str,
) -> Result<(), Ntcp2Error> {
    match policy {
        OverflowPolicy::Block => tx.send(item).await.map_err(|_| Ntcp2Error::Closed),
        OverflowPolicy::DropNewest => match tx.try_send(item) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                debug!(queue, "queue full, dropping message");
                Ok(())
            }
            Err(TrySendError::Closed(_)) => Err(Ntcp2Error::Closed),
        },
        OverflowPolicy::Error => match tx.try_send(item) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(Ntcp2Error::QueueFull(queue)),
            Err(TrySendError::Closed(_)) => Err(Ntcp2Error::Closed),
        },
    }
}

async fn pump_frames<R>(
    mut reader: FrameReader<ReadHalf<R>>,
    recv_tx: mpsc::Sender<Vec<u8>>,
    overflow: OverflowPolicy,
    stream_tx: mpsc::Sender<Vec<u8>>,
    shared: Arc<Shared>,
    writer: Arc<tokio::sync::Mutex<FrameWriter<BoxedWriter>>>,
) where
    R: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    let mut stream_tx = Some(stream_tx);
    let mut terminate = None;
    'frames: loop {
        let blocks = match reader.read_frame().await {
            Ok(Some(blocks)) => blocks,
            Ok(None) => {
                debug!(peer = %shared.peer, "peer closed the stream");
                break;
            }
            Err(e) => {
                warn!(peer = %shared.peer, error = %e, "data phase read failed");
                if e.kind() == ErrorKind::CryptoFailure {
                    terminate = Some(reason::AEAD_FAILURE);
                } else if e.kind() == ErrorKind::ProtocolViolation {
                    terminate = Some(reason::PAYLOAD_FORMAT_ERROR);
                }
                break;
            }
        };
        shared
            .frames_received
            .store(reader.frames_received(), Ordering::Relaxed);

        for block in blocks {
            match block {
                Block::Stream(data) => match stream_tx.as_ref().map(|tx| tx.try_send(data)) {
                    Some(Ok(())) => {}
                    Some(Err(TrySendError::Full(_))) => {
                        warn!(peer = %shared.peer, "stream buffer full, discarding stream data");
                        shared.stream_overrun.store(true, Ordering::Release);
                        stream_tx = None;
                    }
                    Some(Err(TrySendError::Closed(_))) => stream_tx = None,
                    None => trace!(peer = %shared.peer, "stream overrun, block dropped"),
                },
                Block::Message(data) => {
                    if let Err(e) = offer(&recv_tx, data, overflow, "receive").await {
                        warn!(peer = %shared.peer, error = %e, "dropping session");
                        if matches!(e, Ntcp2Error::QueueFull(_)) {
                            terminate = Some(reason::QUEUE_OVERFLOW);
                        }
                        break 'frames;
                    }
                }
                Block::Termination {
                    valid_frames,
                    reason,
                } => {
                    info!(peer = %shared.peer, reason, valid_frames, "peer terminated session");
                    break 'frames;
                }
                Block::DateTime(secs) => trace!(secs, "peer time"),
                Block::RouterInfo { .. } | Block::Options(_) => {
                    trace!(kind = block.kind(), "ignored block")
                }
                Block::Padding(_) => {}
                Block::Unknown { kind, .. } => trace!(kind, "skipped unknown block"),
            }
        }
    }

    if shared.close() {
        if let Some(reason) = terminate {
            let termination = Block::Termination {
                valid_frames: reader.frames_received(),
                reason,
            };
            let mut writer = writer.lock().await;
            if let Err(e) = writer.write_blocks(&[termination]).await {
                debug!(peer = %shared.peer, error = %e, "termination write failed");
            }
            if let Err(e) = writer.shutdown().await {
                debug!(peer = %shared.peer, error = %e, "shutdown after termination");
            }
        }
    }
}

async fn drain_send_queue(
    mut rx: mpsc::Receiver<Vec<u8>>,
    writer: Arc<tokio::sync::Mutex<FrameWriter<BoxedWriter>>>,
    shared: Arc<Shared>,
    padding: PaddingPolicy,
) {
    while let Some(message) = rx.recv().await {
        let blocks = padded(vec![Block::Message(message)], padding);
        let mut writer = writer.lock().await;
        if let Err(e) = writer.write_blocks(&blocks).await {
            warn!(peer = %shared.peer, error = %e, "send queue write failed");
            shared.close();
            break;
        }
    }
}
