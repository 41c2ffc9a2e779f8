//! Opaque signature capabilities.
//!
//! Descriptor code only sees [`Signer`] and [`Verifier`]. Each adapter is bound
//! to exactly one scheme: the legacy DSA-SHA1 adapter lives in [`crate::dsa`],
//! the Ed25519 adapter is below.
//!
//! # Example
//!
//! ```
//! use i2p_crypto::signature::{Ed25519Signer, Signer, Verifier};
//!
//! let signer = Ed25519Signer::generate();
//! let verifier = signer.verifier();
//!
//! let data = b"router info bytes";
//! let sig = signer.sign(data).unwrap();
//! assert!(verifier.verify(data, &sig).is_ok());
//! ```

use ed25519_dalek::{Signature, Signer as _, SigningKey, Verifier as _, VerifyingKey};
use i2p_common::{Classify, ErrorKind};
use rand::rngs::OsRng;
use thiserror::Error;

/// Ed25519 signature length in bytes.
pub const ED25519_SIGNATURE_SIZE: usize = 64;

/// Ed25519 public key length in bytes.
pub const ED25519_PUBLIC_KEY_SIZE: usize = 32;

/// Signature capability errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("invalid signature")]
    InvalidSignature,

    #[error("bad signature size: expected {expected} bytes, got {actual}")]
    BadSignatureSize { expected: usize, actual: usize },

    #[error("invalid key format")]
    InvalidKeyFormat,

    #[error("invalid domain parameters: {0}")]
    InvalidDomainParameters(&'static str),

    #[error("operation not supported by {0}")]
    Unsupported(&'static str),
}

impl Classify for SignatureError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::CryptoFailure
    }
}

/// Produces signatures under one scheme.
pub trait Signer: Send + Sync {
    /// Sign `data`, hashing it with the scheme's digest first where applicable.
    fn sign(&self, data: &[u8]) -> Result<Vec<u8>, SignatureError>;

    /// Sign an already computed digest.
    fn sign_hash(&self, hash: &[u8]) -> Result<Vec<u8>, SignatureError>;

    /// Length of every signature this signer produces.
    fn signature_len(&self) -> usize;
}

/// Checks signatures under one scheme.
pub trait Verifier: Send + Sync {
    fn verify(&self, data: &[u8], sig: &[u8]) -> Result<(), SignatureError>;

    fn verify_hash(&self, hash: &[u8], sig: &[u8]) -> Result<(), SignatureError>;
}

/// Ed25519 signing key.
///
/// The signing key is zeroized on drop by `ed25519-dalek`.
pub struct Ed25519Signer {
    signing_key: SigningKey,
}

impl Ed25519Signer {
    /// Generate a new random keypair using the OS CSPRNG.
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::generate(&mut OsRng),
        }
    }

    /// Create from raw signing key bytes.
    pub fn from_bytes(bytes: &[u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(bytes),
        }
    }

    /// Get the public key bytes.
    pub fn public_key_bytes(&self) -> [u8; ED25519_PUBLIC_KEY_SIZE] {
        *self.signing_key.verifying_key().as_bytes()
    }

    /// Verifier for this signer's public key.
    pub fn verifier(&self) -> Ed25519Verifier {
        Ed25519Verifier {
            verifying_key: self.signing_key.verifying_key(),
        }
    }
}

impl Signer for Ed25519Signer {
    fn sign(&self, data: &[u8]) -> Result<Vec<u8>, SignatureError> {
        Ok(self.signing_key.sign(data).to_bytes().to_vec())
    }

    fn sign_hash(&self, _hash: &[u8]) -> Result<Vec<u8>, SignatureError> {
        Err(SignatureError::Unsupported("Ed25519"))
    }

    fn signature_len(&self) -> usize {
        ED25519_SIGNATURE_SIZE
    }
}

/// Ed25519 public key.
pub struct Ed25519Verifier {
    verifying_key: VerifyingKey,
}

impl Ed25519Verifier {
    /// Create from raw public key bytes.
    pub fn from_bytes(bytes: &[u8; ED25519_PUBLIC_KEY_SIZE]) -> Result<Self, SignatureError> {
        let verifying_key =
            VerifyingKey::from_bytes(bytes).map_err(|_| SignatureError::InvalidKeyFormat)?;
        Ok(Self { verifying_key })
    }
}

impl Verifier for Ed25519Verifier {
    fn verify(&self, data: &[u8], sig: &[u8]) -> Result<(), SignatureError> {
        if sig.len() != ED25519_SIGNATURE_SIZE {
            return Err(SignatureError::BadSignatureSize {
                expected: ED25519_SIGNATURE_SIZE,
                actual: sig.len(),
            });
        }
        let sig = Signature::from_slice(sig).map_err(|_| SignatureError::InvalidSignature)?;
        self.verifying_key
            .verify(data, &sig)
            .map_err(|_| SignatureError::InvalidSignature)
    }

    fn verify_hash(&self, _hash: &[u8], _sig: &[u8]) -> Result<(), SignatureError> {
        Err(SignatureError::Unsupported("Ed25519"))
    }
}
