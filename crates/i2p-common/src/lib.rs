//! Shared utilities for the NTCP2 stack: error taxonomy, logging, helpers.
//!
//! This crate provides common infrastructure used across all workspace crates.

#![forbid(unsafe_code)]

pub mod error;
pub mod helpers;

pub use error::{Classify, Error, ErrorKind, Result};

/// Initialize tracing for tests. Safe to call from every test; only the
/// first call installs a subscriber.
pub fn init_test_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}
