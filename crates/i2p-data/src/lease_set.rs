//! LeaseSet: the tunnels through which a destination can be reached.
//!
//! ```text
//! LeaseSet = Destination[KeysAndCert] ‖ EncryptionKey[256]
//!          ‖ SigningKey[signing key type] ‖ LeaseCount[1] ‖ Lease*
//!          ‖ Signature[signing key type]
//! Lease    = Gateway[32] ‖ TunnelId[4] ‖ EndDate[8]
//! ```

use std::sync::Arc;

use bytes::{BufMut, BytesMut};
use i2p_crypto::{DomainParameters, Signer};

use crate::certificate::SigningKeyType;
use crate::error::{take, DataError, Parsed};
use crate::keys_and_cert::{KeysAndCert, RouterHash};
use crate::primitives::Date;

pub const LEASE_SIZE: usize = 44;
pub const MAX_LEASES: usize = 16;
pub const LEASE_SET_ENCRYPTION_KEY_SIZE: usize = 256;

const STRUCTURE: &str = "lease set";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lease {
    pub gateway: RouterHash,
    pub tunnel_id: u32,
    pub end_date: Date,
}

impl Lease {
    pub fn read(data: &[u8]) -> Result<(Self, &[u8]), DataError> {
        let (lease, rest) = take("lease", data, LEASE_SIZE)?;
        let mut gateway = [0u8; 32];
        gateway.copy_from_slice(&lease[..32]);
        let tunnel_id = u32::from_be_bytes([lease[32], lease[33], lease[34], lease[35]]);
        let (end_date, _) = Date::read(&lease[36..])?;
        Ok((
            Self {
                gateway: RouterHash(gateway),
                tunnel_id,
                end_date,
            },
            rest,
        ))
    }

    pub fn write(&self, buf: &mut BytesMut) {
        buf.put_slice(self.gateway.as_bytes());
        buf.put_u32(self.tunnel_id);
        self.end_date.write(buf);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaseSet {
    destination: KeysAndCert,
    encryption_key: Vec<u8>,
    signing_key: Vec<u8>,
    leases: Vec<Lease>,
    signature: Vec<u8>,
}

impl LeaseSet {
    pub fn sign(
        destination: KeysAndCert,
        encryption_key: &[u8; LEASE_SET_ENCRYPTION_KEY_SIZE],
        signing_key: Vec<u8>,
        leases: Vec<Lease>,
        signer: &dyn Signer,
    ) -> Result<Self, DataError> {
        if leases.len() > MAX_LEASES {
            return Err(DataError::TooManyEntries {
                structure: STRUCTURE,
                count: leases.len(),
                max: MAX_LEASES,
            });
        }
        let expected = signing_key_len(destination.signing_type())?;
        if signing_key.len() != expected {
            return Err(DataError::malformed(
                STRUCTURE,
                format!("signing key is {} bytes, expected {}", signing_key.len(), expected),
            ));
        }

        let mut set = Self {
            destination,
            encryption_key: encryption_key.to_vec(),
            signing_key,
            leases,
            signature: Vec::new(),
        };
        let body = set.signed_bytes()?;
        set.signature = signer.sign(&body)?;
        Ok(set)
    }

    /// Parse a lease set.
    ///
    /// More than [`MAX_LEASES`] leases is reported as `TooManyEntries`, with
    /// every lease present still parsed so the count is visible.
    pub fn read(data: &[u8]) -> Result<Parsed<'_, Self>, DataError> {
        let destination = KeysAndCert::read(data)?;
        let mut error = destination.error;
        let rest = destination.remainder;
        let destination = destination.value;

        let (encryption_key, rest) = take(STRUCTURE, rest, LEASE_SET_ENCRYPTION_KEY_SIZE)?;
        let signing_len = signing_key_len(destination.signing_type())?;
        let (signing_key, rest) = take(STRUCTURE, rest, signing_len)?;

        let (count, mut rest) = take(STRUCTURE, rest, 1)?;
        let count = usize::from(count[0]);
        if count > MAX_LEASES && error.is_none() {
            error = Some(DataError::TooManyEntries {
                structure: STRUCTURE,
                count,
                max: MAX_LEASES,
            });
        }

        let mut leases = Vec::with_capacity(count);
        for _ in 0..count {
            let (lease, next) = Lease::read(rest)?;
            leases.push(lease);
            rest = next;
        }

        let (signature, rest) = take(STRUCTURE, rest, destination.signature_len()?)?;

        let mut parsed = Parsed::ok(
            Self {
                destination,
                encryption_key: encryption_key.to_vec(),
                signing_key: signing_key.to_vec(),
                leases,
                signature: signature.to_vec(),
            },
            rest,
        );
        parsed.note(error);
        Ok(parsed)
    }

    pub fn signed_bytes(&self) -> Result<Vec<u8>, DataError> {
        let mut buf = BytesMut::new();
        self.destination.write(&mut buf)?;
        buf.put_slice(&self.encryption_key);
        buf.put_slice(&self.signing_key);
        buf.put_u8(self.leases.len() as u8);
        for lease in &self.leases {
            lease.write(&mut buf);
        }
        Ok(buf.to_vec())
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, DataError> {
        let mut bytes = self.signed_bytes()?;
        bytes.extend_from_slice(&self.signature);
        Ok(bytes)
    }

    pub fn verify(&self, params: &Arc<DomainParameters>) -> Result<(), DataError> {
        let verifier = self.destination.verifier(params)?;
        verifier.verify(&self.signed_bytes()?, &self.signature)?;
        Ok(())
    }

    pub fn destination(&self) -> &KeysAndCert {
        &self.destination
    }

    pub fn encryption_key(&self) -> &[u8] {
        &self.encryption_key
    }

    pub fn signing_key(&self) -> &[u8] {
        &self.signing_key
    }

    pub fn lease_count(&self) -> usize {
        self.leases.len()
    }

    pub fn leases(&self) -> &[Lease] {
        &self.leases
    }

    /// Earliest lease end date, or `None` without leases.
    pub fn oldest_expiration(&self) -> Option<Date> {
        self.leases.iter().map(|l| l.end_date).min()
    }

    pub fn newest_expiration(&self) -> Option<Date> {
        self.leases.iter().map(|l| l.end_date).max()
    }
}

fn signing_key_len(signing_type: SigningKeyType) -> Result<usize, DataError> {
    signing_type.public_key_len().ok_or(DataError::UnknownKeyType {
        kind: "signing",
        code: signing_type.code(),
    })
}
