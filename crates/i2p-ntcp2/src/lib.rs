//! NTCP2: authenticated, encrypted and obfuscated sessions between I2P routers.
//!
//! This crate provides:
//! - The handshake overlay: options blocks, per-message processors and the
//!   driver that runs them over any async stream
//! - Data-phase framing with typed blocks
//! - Sessions with bounded send and receive queues
//! - [`Ntcp2Transport`], which dials peers from their descriptors and
//!   accepts inbound connections
//!
//! # Architecture
//!
//! ```text
//! Ntcp2Transport ── get_session / accept ──> Session
//!       │                                      │
//! handshake::initiate / respond        FrameWriter / FrameReader
//!       │                                      │
//! MessageType ── create / apply_crypto / read ──> Noise engine
//! ```

#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod frame;
pub mod handshake;
pub mod messages;
pub mod options;
pub mod session;
pub mod transport;

pub use config::{OverflowPolicy, PaddingPolicy, QueueConfig, TransportConfig};
pub use error::Ntcp2Error;
pub use frame::Block;
pub use handshake::{Handshake, LocalRouter, SessionTarget};
pub use messages::{Deadline, HandshakeContext, HandshakeMessage, MessageType};
pub use session::{Session, SessionState};
pub use transport::Ntcp2Transport;
