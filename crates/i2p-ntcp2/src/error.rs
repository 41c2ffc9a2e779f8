//! NTCP2 errors and their classification.

use i2p_common::{Classify, ErrorKind};
use i2p_crypto::{NoiseError, ObfuscationError};
use i2p_data::DataError;
use thiserror::Error;

/// Errors raised by the overlay, the data phase and the transport.
#[derive(Debug, Error)]
pub enum Ntcp2Error {
    /// The descriptor offers nothing this transport can dial.
    #[error("incompatible router: {0}")]
    Incompatible(String),

    /// The peer broke a handshake or framing rule.
    #[error("protocol violation in {context}: {reason}")]
    Protocol { context: &'static str, reason: String },

    /// A declared length exceeds what the frame may carry.
    #[error("{context}: declared length {declared} exceeds limit {max}")]
    TooLarge {
        context: &'static str,
        declared: usize,
        max: usize,
    },

    #[error("clock skew of {skew_secs}s exceeds {max_secs}s")]
    ClockSkew { skew_secs: i64, max_secs: u64 },

    /// The static key in the peer's descriptor differs from the one Noise
    /// authenticated.
    #[error("static key mismatch for {0}")]
    StaticKeyMismatch(String),

    #[error("noise: {0}")]
    Noise(#[from] NoiseError),

    #[error("obfuscation: {0}")]
    Obfuscation(#[from] ObfuscationError),

    #[error("descriptor: {0}")]
    Data(#[from] DataError),

    #[error("timed out during {0}")]
    Timeout(&'static str),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("session closed")]
    Closed,

    #[error("{0} queue full")]
    QueueFull(&'static str),

    #[error("session limit of {0} reached")]
    SessionLimit(usize),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl Ntcp2Error {
    pub(crate) fn protocol(context: &'static str, reason: impl std::fmt::Display) -> Self {
        Self::Protocol {
            context,
            reason: reason.to_string(),
        }
    }
}

impl Classify for Ntcp2Error {
    fn kind(&self) -> ErrorKind {
        match self {
            Ntcp2Error::Incompatible(_)
            | Ntcp2Error::Protocol { .. }
            | Ntcp2Error::TooLarge { .. }
            | Ntcp2Error::ClockSkew { .. }
            | Ntcp2Error::Config(_) => ErrorKind::ProtocolViolation,
            Ntcp2Error::StaticKeyMismatch(_) | Ntcp2Error::Obfuscation(_) => {
                ErrorKind::CryptoFailure
            }
            Ntcp2Error::Noise(e) => e.kind(),
            Ntcp2Error::Data(e) => e.kind(),
            Ntcp2Error::Timeout(_)
            | Ntcp2Error::Io(_)
            | Ntcp2Error::Closed
            | Ntcp2Error::QueueFull(_)
            | Ntcp2Error::SessionLimit(_) => ErrorKind::TransientIo,
        }
    }
}

impl From<Ntcp2Error> for i2p_common::Error {
    fn from(err: Ntcp2Error) -> Self {
        match err {
            Ntcp2Error::Io(e) => i2p_common::Error::Io(e),
            Ntcp2Error::Config(msg) => i2p_common::Error::Config(msg),
            other => i2p_common::Error::from_classified(other),
        }
    }
}
