//! Common error taxonomy for the NTCP2 stack.
//!
//! Every crate keeps its own `thiserror` enum with precise variants and maps
//! each variant onto one [`ErrorKind`]. The kind decides what the caller may do
//! next: nothing in this stack retries on its own.

use thiserror::Error;

/// Result type alias using the common error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Coarse classification shared by every crate in the workspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Insufficient bytes, declared length exceeds the buffer, unknown type tag.
    /// Fatal to the current parse.
    MalformedInput,
    /// Wrong message order or type, oversize frame, incompatible transport.
    /// Aborts the handshake.
    ProtocolViolation,
    /// AEAD authentication, signature verification or key format failure.
    /// The same session and keys must never be used again.
    CryptoFailure,
    /// Deadline exceeded, connection reset, peer went away.
    TransientIo,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::MalformedInput => "malformed input",
            ErrorKind::ProtocolViolation => "protocol violation",
            ErrorKind::CryptoFailure => "crypto failure",
            ErrorKind::TransientIo => "transient i/o",
        };
        f.write_str(name)
    }
}

/// Implemented by every crate-level error so callers can branch on the kind
/// without matching on foreign enums.
pub trait Classify {
    fn kind(&self) -> ErrorKind;
}

/// Top-level error type.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error (socket, stream)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed bytes from the network or a descriptor store
    #[error("malformed input: {0}")]
    Malformed(String),

    /// Protocol rules were broken by the peer or the caller
    #[error("protocol violation: {0}")]
    Protocol(String),

    /// Cryptographic operation failed
    #[error("crypto failure: {0}")]
    Crypto(String),

    /// Operation timed out
    #[error("timeout: {0}")]
    Timeout(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Wrap any classified error, keeping its message and kind.
    pub fn from_classified<E: Classify + std::fmt::Display>(err: E) -> Self {
        let msg = err.to_string();
        match err.kind() {
            ErrorKind::MalformedInput => Self::Malformed(msg),
            ErrorKind::ProtocolViolation => Self::Protocol(msg),
            ErrorKind::CryptoFailure => Self::Crypto(msg),
            ErrorKind::TransientIo => Self::Timeout(msg),
        }
    }
}

impl Classify for Error {
    fn kind(&self) -> ErrorKind {
        match self {
            Error::Io(_) | Error::Timeout(_) => ErrorKind::TransientIo,
            Error::Malformed(_) => ErrorKind::MalformedInput,
            Error::Protocol(_) | Error::Config(_) => ErrorKind::ProtocolViolation,
            Error::Crypto(_) => ErrorKind::CryptoFailure,
        }
    }
}
