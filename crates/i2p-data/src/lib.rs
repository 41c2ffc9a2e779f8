//! I2P descriptor model: the binary structures NTCP2 reads to find a peer's
//! identity, static key and transport options.
//!
//! This crate provides:
//! - Primitive encodings (Integer, Date, String, Mapping) and I2P base64
//! - Certificates and key certificates
//! - KeysAndCert identities and their SHA-256 router hash
//! - RouterAddress, RouterInfo and LeaseSet
//!
//! # Parsing
//!
//! Every structure offers `read(bytes)` returning the value and the remaining
//! bytes, so reads compose left to right. Fatal problems are an `Err`.
//! Problems that still leave a usable value (a declared length that overruns
//! the input, an unknown certificate type, too many leases) come back in
//! [`Parsed::error`]; call [`Parsed::strict`] to treat them as fatal.

#![forbid(unsafe_code)]

pub mod base64;
pub mod certificate;
pub mod error;
pub mod keys_and_cert;
pub mod lease_set;
pub mod mapping;
pub mod primitives;
pub mod router_address;
pub mod router_info;

pub use certificate::{Certificate, CertificateType, CryptoKeyType, KeyCertificate, SigningKeyType};
pub use error::{DataError, Parsed};
pub use keys_and_cert::{KeysAndCert, RouterHash};
pub use lease_set::{Lease, LeaseSet};
pub use mapping::Mapping;
pub use primitives::Date;
pub use router_address::{RouterAddress, NTCP2_STYLE};
pub use router_info::RouterInfo;
