//! Cryptographic capabilities for the NTCP2 stack.
//!
//! This crate provides:
//! - Opaque [`Signer`]/[`Verifier`] capabilities with Ed25519 and legacy
//!   DSA-SHA1 adapters
//! - X25519 static keys
//! - A token-driven Noise handshake engine (pattern `XK`)
//! - AES-256-CBC ephemeral-key obfuscation
//!
//! # Design
//!
//! Descriptor and transport code never see key types directly: they hold a
//! `Box<dyn Verifier>` chosen from the signing-key type, and drive the Noise
//! engine only through its narrow surface (`stage`, `write_message`,
//! `read_message`, `mix_hash`, `split`).

#![forbid(unsafe_code)]

pub mod dsa;
pub mod keys;
pub mod noise;
pub mod obfuscation;
pub mod signature;

pub use dsa::{DomainParameters, DsaPrivateKey, DsaPublicKey, DsaSigner, DsaVerifier};
pub use keys::StaticKeypair;
pub use noise::{
    HandshakeState, NoiseError, ReceivingCipher, Role, SendingCipher, Stage, TransportState,
};
pub use obfuscation::ObfuscationError;
pub use signature::{Ed25519Signer, Ed25519Verifier, SignatureError, Signer, Verifier};
