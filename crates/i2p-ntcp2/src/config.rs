//! Transport configuration.
//!
//! Supplied by the embedding process, typically deserialized from its own
//! configuration source. Every field has a default so partial documents work.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Ntcp2Error;

/// Network identifier of the main I2P network.
pub const DEFAULT_NETWORK_ID: u16 = 2;
pub const DEFAULT_HANDSHAKE_TIMEOUT_MS: u64 = 15_000;
pub const DEFAULT_MAX_CLOCK_SKEW_SECS: u64 = 60;
pub const DEFAULT_MAX_SESSIONS: usize = 100;
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    pub network_id: u16,
    pub handshake_timeout_ms: u64,
    /// Largest tolerated difference between the peer's timestamp and ours.
    pub max_clock_skew_secs: u64,
    pub padding: PaddingPolicy,
    pub send_queue: QueueConfig,
    pub recv_queue: QueueConfig,
    pub max_sessions: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            network_id: DEFAULT_NETWORK_ID,
            handshake_timeout_ms: DEFAULT_HANDSHAKE_TIMEOUT_MS,
            max_clock_skew_secs: DEFAULT_MAX_CLOCK_SKEW_SECS,
            padding: PaddingPolicy::default(),
            send_queue: QueueConfig::default(),
            recv_queue: QueueConfig::default(),
            max_sessions: DEFAULT_MAX_SESSIONS,
        }
    }
}

impl TransportConfig {
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    pub fn validate(&self) -> Result<(), Ntcp2Error> {
        if self.handshake_timeout_ms == 0 {
            return Err(Ntcp2Error::Config("handshake_timeout_ms must be positive".into()));
        }
        if self.padding.min > self.padding.max {
            return Err(Ntcp2Error::Config(format!(
                "padding min {} exceeds max {}",
                self.padding.min, self.padding.max
            )));
        }
        if self.send_queue.capacity == 0 || self.recv_queue.capacity == 0 {
            return Err(Ntcp2Error::Config("queue capacity must be positive".into()));
        }
        if self.max_sessions == 0 {
            return Err(Ntcp2Error::Config("max_sessions must be positive".into()));
        }
        Ok(())
    }
}

/// Random padding length range, in bytes, inclusive.
///
/// Each message clamps the range to what its length field and the frame
/// ceiling allow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PaddingPolicy {
    pub min: usize,
    pub max: usize,
}

impl Default for PaddingPolicy {
    fn default() -> Self {
        Self { min: 0, max: 64 }
    }
}

impl PaddingPolicy {
    pub const NONE: PaddingPolicy = PaddingPolicy { min: 0, max: 0 };

    /// Pick a length uniformly in `[min, max]`, clamped to `limit`.
    pub fn pick(&self, limit: usize) -> usize {
        use rand::Rng;

        let max = self.max.min(limit);
        let min = self.min.min(max);
        if min == max {
            return min;
        }
        rand::thread_rng().gen_range(min..=max)
    }
}

/// What to do when a bounded queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Wait for room.
    Block,
    /// Discard the message being added.
    DropNewest,
    /// Fail the operation with `QueueFull`.
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub capacity: usize,
    pub overflow: OverflowPolicy,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_QUEUE_CAPACITY,
            overflow: OverflowPolicy::Block,
        }
    }
}
