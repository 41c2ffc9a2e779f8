//! Ephemeral-key obfuscation.
//!
//! The 32-byte ephemeral keys of handshake messages 1 and 2 are encrypted with
//! AES-256-CBC (no padding) under the receiver's static public key, so they
//! are indistinguishable from random bytes on the wire. Each message starts
//! from a zero IV.

use aes::cipher::block_padding::NoPadding;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use i2p_common::{Classify, ErrorKind};
use thiserror::Error;

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

/// Obfuscated key length in bytes (two AES blocks).
pub const OBFUSCATED_KEY_SIZE: usize = 32;

/// AES block / IV length in bytes.
pub const IV_SIZE: usize = 16;

/// IV used for both handshake messages.
pub const ZERO_IV: [u8; IV_SIZE] = [0u8; IV_SIZE];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ObfuscationError {
    #[error("invalid obfuscation key or IV length")]
    InvalidLength,

    #[error("obfuscation block operation failed")]
    Block,
}

impl Classify for ObfuscationError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::CryptoFailure
    }
}

/// Encrypt an ephemeral public key.
pub fn obfuscate(
    ephemeral: &[u8; OBFUSCATED_KEY_SIZE],
    key: &[u8; 32],
    iv: &[u8; IV_SIZE],
) -> Result<[u8; OBFUSCATED_KEY_SIZE], ObfuscationError> {
    let mut buf = *ephemeral;
    Aes256CbcEnc::new_from_slices(key, iv)
        .map_err(|_| ObfuscationError::InvalidLength)?
        .encrypt_padded_mut::<NoPadding>(&mut buf, OBFUSCATED_KEY_SIZE)
        .map_err(|_| ObfuscationError::Block)?;
    Ok(buf)
}

/// Decrypt an obfuscated ephemeral public key.
pub fn deobfuscate(
    obfuscated: &[u8; OBFUSCATED_KEY_SIZE],
    key: &[u8; 32],
    iv: &[u8; IV_SIZE],
) -> Result<[u8; OBFUSCATED_KEY_SIZE], ObfuscationError> {
    let mut buf = *obfuscated;
    Aes256CbcDec::new_from_slices(key, iv)
        .map_err(|_| ObfuscationError::InvalidLength)?
        .decrypt_padded_mut::<NoPadding>(&mut buf)
        .map_err(|_| ObfuscationError::Block)?;
    Ok(buf)
}
