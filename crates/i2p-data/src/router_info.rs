//! RouterInfo: a router's signed, published descriptor.
//!
//! ```text
//! RouterInfo = Identity[KeysAndCert] ‖ Published[Date]
//!            ‖ AddressCount[1] ‖ RouterAddress*
//!            ‖ PeerCount[1] ‖ PeerHash[32]*
//!            ‖ Options[Mapping]
//!            ‖ Signature[signing key type]
//! ```
//!
//! The signature covers every byte before it. Nothing in a RouterInfo should
//! be trusted until [`RouterInfo::verify`] succeeds.

use std::sync::Arc;

use bytes::{BufMut, BytesMut};
use i2p_common::helpers::short_hex;
use i2p_crypto::{DomainParameters, Signer};
use tracing::debug;

use crate::error::{take, DataError, Parsed};
use crate::keys_and_cert::{KeysAndCert, RouterHash};
use crate::mapping::Mapping;
use crate::primitives::Date;
use crate::router_address::RouterAddress;

/// Option key for router capabilities.
pub const CAPS_OPTION: &str = "caps";

const STRUCTURE: &str = "router info";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouterInfo {
    identity: KeysAndCert,
    published: Date,
    addresses: Vec<RouterAddress>,
    peers: Vec<RouterHash>,
    options: Mapping,
    signature: Vec<u8>,
}

impl RouterInfo {
    /// Build and sign a descriptor.
    pub fn sign(
        identity: KeysAndCert,
        published: Date,
        addresses: Vec<RouterAddress>,
        options: Mapping,
        signer: &dyn Signer,
    ) -> Result<Self, DataError> {
        let expected = identity.signature_len()?;
        if signer.signature_len() != expected {
            return Err(DataError::malformed(
                STRUCTURE,
                format!(
                    "signer produces {} byte signatures, identity needs {}",
                    signer.signature_len(),
                    expected
                ),
            ));
        }
        if addresses.len() > usize::from(u8::MAX) {
            return Err(DataError::TooManyEntries {
                structure: STRUCTURE,
                count: addresses.len(),
                max: usize::from(u8::MAX),
            });
        }

        let mut info = Self {
            identity,
            published,
            addresses,
            peers: Vec::new(),
            options,
            signature: Vec::new(),
        };
        let body = info.signed_bytes()?;
        info.signature = signer.sign(&body)?;
        debug!(router = %short_hex(info.hash().as_bytes()), "signed router info");
        Ok(info)
    }

    pub fn read(data: &[u8]) -> Result<Parsed<'_, Self>, DataError> {
        let identity = KeysAndCert::read(data)?;
        let mut error = identity.error;
        let rest = identity.remainder;
        let identity = identity.value;

        let (published, rest) = Date::read(rest)?;

        let (count, mut rest) = take(STRUCTURE, rest, 1)?;
        let mut addresses = Vec::with_capacity(usize::from(count[0]));
        for _ in 0..count[0] {
            let address = RouterAddress::read(rest)?;
            if error.is_none() {
                error = address.error;
            }
            rest = address.remainder;
            addresses.push(address.value);
        }

        let (peer_count, rest) = take(STRUCTURE, rest, 1)?;
        let (peer_bytes, rest) = take(STRUCTURE, rest, usize::from(peer_count[0]) * 32)?;
        let peers = peer_bytes
            .chunks_exact(32)
            .map(|chunk| {
                let mut hash = [0u8; 32];
                hash.copy_from_slice(chunk);
                RouterHash(hash)
            })
            .collect();

        let options = Mapping::read(rest)?;
        if error.is_none() {
            error = options.error;
        }
        let rest = options.remainder;

        let (signature, rest) = take(STRUCTURE, rest, identity.signature_len()?)?;

        let mut parsed = Parsed::ok(
            Self {
                identity,
                published,
                addresses,
                peers,
                options: options.value,
                signature: signature.to_vec(),
            },
            rest,
        );
        parsed.note(error);
        Ok(parsed)
    }

    /// Every byte the signature covers.
    pub fn signed_bytes(&self) -> Result<Vec<u8>, DataError> {
        let mut buf = BytesMut::with_capacity(1024);
        self.write_body(&mut buf)?;
        Ok(buf.to_vec())
    }

    fn write_body(&self, buf: &mut BytesMut) -> Result<(), DataError> {
        self.identity.write(buf)?;
        self.published.write(buf);
        buf.put_u8(self.addresses.len() as u8);
        for address in &self.addresses {
            address.write(buf)?;
        }
        buf.put_u8(self.peers.len() as u8);
        for peer in &self.peers {
            buf.put_slice(peer.as_bytes());
        }
        self.options.write(buf)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, DataError> {
        let mut buf = BytesMut::with_capacity(1024);
        self.write_body(&mut buf)?;
        buf.put_slice(&self.signature);
        Ok(buf.to_vec())
    }

    /// Check the signature against the identity's signing key.
    pub fn verify(&self, params: &Arc<DomainParameters>) -> Result<(), DataError> {
        let verifier = self.identity.verifier(params)?;
        let body = self.signed_bytes()?;
        verifier.verify(&body, &self.signature)?;
        Ok(())
    }

    /// Identity hash of the router.
    pub fn hash(&self) -> RouterHash {
        self.identity.hash()
    }

    pub fn identity(&self) -> &KeysAndCert {
        &self.identity
    }

    pub fn published(&self) -> Date {
        self.published
    }

    pub fn addresses(&self) -> &[RouterAddress] {
        &self.addresses
    }

    pub fn options(&self) -> &Mapping {
        &self.options
    }

    pub fn signature(&self) -> &[u8] {
        &self.signature
    }

    /// The `caps` option.
    pub fn capabilities(&self) -> Option<&str> {
        self.options.get(CAPS_OPTION)
    }

    /// First address with the given transport style.
    pub fn address_for(&self, style: &str) -> Option<&RouterAddress> {
        self.addresses.iter().find(|a| a.transport_style == style)
    }
}
