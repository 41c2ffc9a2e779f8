//! Options blocks carried encrypted in handshake messages 1 and 2.
//!
//! ```text
//! SessionRequest options (11 bytes):
//! +----------+----------+--------+-------------+-----------+
//! | NetID[2] | Ver[2]   | Pad[1] | M3P2Len[2]  | Time[4]   |
//! +----------+----------+--------+-------------+-----------+
//!
//! SessionCreated options (8 bytes):
//! +----------+-------------+-----------+
//! | Pad[2]   | Reserved[2] | Time[4]   |
//! +----------+-------------+-----------+
//! ```
//!
//! Integers are big-endian. `M3P2Len` is the length of message 3's AEAD
//! payload part, tag included. Timestamps are seconds since the epoch.

use crate::error::Ntcp2Error;

pub const SESSION_REQUEST_OPTIONS_SIZE: usize = 11;
pub const SESSION_CREATED_OPTIONS_SIZE: usize = 8;

/// NTCP2 protocol version.
pub const PROTOCOL_VERSION: u16 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionRequestOptions {
    pub network_id: u16,
    pub version: u16,
    pub padding_len: u8,
    pub message3_part2_len: u16,
    pub timestamp: u32,
}

impl SessionRequestOptions {
    pub fn encode(&self) -> [u8; SESSION_REQUEST_OPTIONS_SIZE] {
        let mut out = [0u8; SESSION_REQUEST_OPTIONS_SIZE];
        out[0..2].copy_from_slice(&self.network_id.to_be_bytes());
        out[2..4].copy_from_slice(&self.version.to_be_bytes());
        out[4] = self.padding_len;
        out[5..7].copy_from_slice(&self.message3_part2_len.to_be_bytes());
        out[7..11].copy_from_slice(&self.timestamp.to_be_bytes());
        out
    }

    pub fn decode(data: &[u8]) -> Result<Self, Ntcp2Error> {
        if data.len() != SESSION_REQUEST_OPTIONS_SIZE {
            return Err(Ntcp2Error::protocol(
                "session request options",
                format!("{} bytes, expected {}", data.len(), SESSION_REQUEST_OPTIONS_SIZE),
            ));
        }
        Ok(Self {
            network_id: u16::from_be_bytes([data[0], data[1]]),
            version: u16::from_be_bytes([data[2], data[3]]),
            padding_len: data[4],
            message3_part2_len: u16::from_be_bytes([data[5], data[6]]),
            timestamp: u32::from_be_bytes([data[7], data[8], data[9], data[10]]),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionCreatedOptions {
    pub padding_len: u16,
    pub timestamp: u32,
}

impl SessionCreatedOptions {
    pub fn encode(&self) -> [u8; SESSION_CREATED_OPTIONS_SIZE] {
        let mut out = [0u8; SESSION_CREATED_OPTIONS_SIZE];
        out[0..2].copy_from_slice(&self.padding_len.to_be_bytes());
        out[4..8].copy_from_slice(&self.timestamp.to_be_bytes());
        out
    }

    /// Reserved bytes are ignored.
    pub fn decode(data: &[u8]) -> Result<Self, Ntcp2Error> {
        if data.len() != SESSION_CREATED_OPTIONS_SIZE {
            return Err(Ntcp2Error::protocol(
                "session created options",
                format!("{} bytes, expected {}", data.len(), SESSION_CREATED_OPTIONS_SIZE),
            ));
        }
        Ok(Self {
            padding_len: u16::from_be_bytes([data[0], data[1]]),
            timestamp: u32::from_be_bytes([data[4], data[5], data[6], data[7]]),
        })
    }
}
