//! I2P base64: standard base64 with `-` and `~` in place of `+` and `/`.

use ::base64::alphabet::Alphabet;
use ::base64::engine::general_purpose::{GeneralPurpose, PAD};
use ::base64::Engine;

use crate::error::DataError;

const ALPHABET: Alphabet =
    match Alphabet::new("ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-~") {
        Ok(alphabet) => alphabet,
        Err(_) => panic!("invalid I2P base64 alphabet"),
    };

/// Engine for the I2P alphabet, with padding.
pub const I2P_BASE64: GeneralPurpose = GeneralPurpose::new(&ALPHABET, PAD);

pub fn encode(data: impl AsRef<[u8]>) -> String {
    I2P_BASE64.encode(data)
}

pub fn decode(data: impl AsRef<[u8]>) -> Result<Vec<u8>, DataError> {
    I2P_BASE64
        .decode(data)
        .map_err(|e| DataError::malformed("base64", e))
}
