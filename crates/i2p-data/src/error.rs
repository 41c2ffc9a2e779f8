//! Descriptor parse errors and the partial-result wrapper.

use i2p_common::{Classify, ErrorKind};
use i2p_crypto::SignatureError;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DataError {
    #[error("{structure}: need {needed} bytes, only {available} available")]
    InsufficientData {
        structure: &'static str,
        needed: usize,
        available: usize,
    },

    #[error("{structure}: declared length {declared} exceeds the {available} bytes available")]
    InvalidLength {
        structure: &'static str,
        declared: usize,
        available: usize,
    },

    #[error("unknown certificate type {0}")]
    UnknownCertificateType(u8),

    #[error("unknown {kind} key type {code}")]
    UnknownKeyType { kind: &'static str, code: u16 },

    #[error("invalid {structure}: more than {max} entries")]
    TooManyEntries {
        structure: &'static str,
        count: usize,
        max: usize,
    },

    #[error("malformed {structure}: {reason}")]
    Malformed {
        structure: &'static str,
        reason: String,
    },

    #[error("signature: {0}")]
    Signature(#[from] SignatureError),
}

impl DataError {
    pub(crate) fn insufficient(structure: &'static str, needed: usize, available: usize) -> Self {
        Self::InsufficientData {
            structure,
            needed,
            available,
        }
    }

    pub(crate) fn malformed(structure: &'static str, reason: impl std::fmt::Display) -> Self {
        Self::Malformed {
            structure,
            reason: reason.to_string(),
        }
    }
}

impl Classify for DataError {
    fn kind(&self) -> ErrorKind {
        match self {
            DataError::Signature(e) => e.kind(),
            _ => ErrorKind::MalformedInput,
        }
    }
}

/// A parsed value together with the bytes that follow it.
///
/// `error` carries a non-fatal problem found while parsing (a length that
/// overruns the buffer, too many entries, an unknown certificate type). The
/// value is still returned so callers can inspect it, but must check `error`
/// before trusting it. [`Parsed::strict`] does that check.
#[derive(Debug)]
pub struct Parsed<'a, T> {
    pub value: T,
    pub remainder: &'a [u8],
    pub error: Option<DataError>,
}

impl<'a, T> Parsed<'a, T> {
    pub fn ok(value: T, remainder: &'a [u8]) -> Self {
        Self {
            value,
            remainder,
            error: None,
        }
    }

    /// Keep the first non-fatal error only.
    pub fn note(&mut self, error: Option<DataError>) {
        if self.error.is_none() {
            self.error = error;
        }
    }

    /// Reject partially valid values.
    pub fn strict(self) -> Result<(T, &'a [u8]), DataError> {
        match self.error {
            Some(err) => Err(err),
            None => Ok((self.value, self.remainder)),
        }
    }

    pub fn is_clean(&self) -> bool {
        self.error.is_none()
    }
}

/// Split `len` bytes off the front of `data`, or report how short it is.
pub(crate) fn take<'a>(
    structure: &'static str,
    data: &'a [u8],
    len: usize,
) -> Result<(&'a [u8], &'a [u8]), DataError> {
    if data.len() < len {
        return Err(DataError::insufficient(structure, len, data.len()));
    }
    Ok(data.split_at(len))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn too_many_entries_message() {
        let err = DataError::TooManyEntries {
            structure: "lease set",
            count: 17,
            max: 16,
        };
        assert_eq!(err.to_string(), "invalid lease set: more than 16 entries");
        assert_eq!(err.kind(), ErrorKind::MalformedInput);
    }

    #[test]
    fn signature_errors_are_crypto_failures() {
        let err = DataError::from(SignatureError::InvalidSignature);
        assert_eq!(err.kind(), ErrorKind::CryptoFailure);
    }

    #[test]
    fn strict_rejects_partial_values() {
        let mut parsed = Parsed::ok(5u8, &[1, 2][..]);
        assert!(parsed.is_clean());
        parsed.note(Some(DataError::UnknownCertificateType(9)));
        parsed.note(Some(DataError::UnknownCertificateType(10)));
        assert_eq!(parsed.value, 5);
        assert_eq!(
            parsed.strict().unwrap_err(),
            DataError::UnknownCertificateType(9)
        );
    }

    #[test]
    fn take_reports_shortfall() {
        assert_eq!(
            take("date", &[0u8; 3], 8).unwrap_err(),
            DataError::InsufficientData {
                structure: "date",
                needed: 8,
                available: 3
            }
        );
        let (head, tail) = take("date", &[1, 2, 3], 2).unwrap();
        assert_eq!(head, &[1, 2]);
        assert_eq!(tail, &[3]);
    }
}
