//! KeysAndCert: the identity block shared by router identities and
//! destinations.
//!
//! ```text
//! +----------------------------------+
//! | public key slot         256 bytes |  key at the start, padding after
//! +----------------------------------+
//! | signing key slot        128 bytes |  padding before, key at the end
//! +----------------------------------+
//! | certificate           >= 3 bytes  |
//! +----------------------------------+
//! ```
//!
//! Without a KEY certificate the slots hold an ElGamal-2048 public key and a
//! DSA-SHA1 signing key. Padding bytes are kept verbatim so the structure
//! re-serializes to exactly the bytes it was parsed from.

use std::sync::Arc;

use bytes::{BufMut, BytesMut};
use i2p_common::helpers::short_hex;
use i2p_crypto::dsa::{DomainParameters, DsaPublicKey, DSA_PUBLIC_KEY_SIZE};
use i2p_crypto::signature::ED25519_PUBLIC_KEY_SIZE;
use i2p_crypto::{Ed25519Verifier, SignatureError, Verifier};
use sha2::{Digest, Sha256};
use tracing::warn;

use crate::certificate::{Certificate, CertificateType, CryptoKeyType, SigningKeyType};
use crate::error::{DataError, Parsed};

pub const PUBLIC_KEY_SLOT_SIZE: usize = 256;
pub const SIGNING_KEY_SLOT_SIZE: usize = 128;
pub const KEYS_AND_CERT_DATA_SIZE: usize = PUBLIC_KEY_SLOT_SIZE + SIGNING_KEY_SLOT_SIZE;
pub const KEYS_AND_CERT_MIN_SIZE: usize = 387;

/// SHA-256 of a serialized identity.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RouterHash(pub [u8; 32]);

impl RouterHash {
    pub fn digest(data: &[u8]) -> Self {
        Self(Sha256::digest(data).into())
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_base64(&self) -> String {
        crate::base64::encode(self.0)
    }
}

impl std::fmt::Debug for RouterHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "RouterHash({})", short_hex(&self.0))
    }
}

impl std::fmt::Display for RouterHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_base64())
    }
}

/// Key types in effect for a certificate, plus a non-fatal warning.
fn resolve_key_types(
    cert: &Certificate,
) -> Result<(SigningKeyType, CryptoKeyType, Option<DataError>), DataError> {
    match cert.cert_type {
        CertificateType::Key => {
            let key_cert = cert
                .key_certificate()
                .unwrap_or_else(|| Err(DataError::malformed("key certificate", "missing")))?;
            if key_cert.signing_type.public_key_len().is_none() {
                return Err(DataError::UnknownKeyType {
                    kind: "signing",
                    code: key_cert.signing_type.code(),
                });
            }
            if key_cert.crypto_type.public_key_len().is_none() {
                return Err(DataError::UnknownKeyType {
                    kind: "crypto",
                    code: key_cert.crypto_type.code(),
                });
            }
            Ok((key_cert.signing_type, key_cert.crypto_type, None))
        }
        CertificateType::Unknown(tag) => {
            warn!(cert_type = tag, "unknown certificate type, assuming legacy key types");
            Ok((
                SigningKeyType::DsaSha1,
                CryptoKeyType::ElGamal,
                Some(DataError::UnknownCertificateType(tag)),
            ))
        }
        _ => Ok((SigningKeyType::DsaSha1, CryptoKeyType::ElGamal, None)),
    }
}

fn key_len(signing: SigningKeyType) -> usize {
    // resolve_key_types only admits known types
    signing.public_key_len().unwrap_or(SIGNING_KEY_SLOT_SIZE)
}

#[derive(Clone, PartialEq, Eq)]
pub struct KeysAndCert {
    public_key_slot: Vec<u8>,
    signing_key_slot: Vec<u8>,
    certificate: Certificate,
    signing_type: SigningKeyType,
    crypto_type: CryptoKeyType,
    hash: RouterHash,
}

impl KeysAndCert {
    /// Build an identity from raw keys. Padding is zero-filled.
    ///
    /// For signing keys longer than the slot, the excess replaces the KEY
    /// certificate's excess data.
    pub fn new(
        public_key: &[u8],
        signing_key: &[u8],
        mut certificate: Certificate,
    ) -> Result<Self, DataError> {
        let (signing_type, crypto_type, _) = resolve_key_types(&certificate)?;
        let crypto_len = crypto_type.public_key_len().unwrap_or(PUBLIC_KEY_SLOT_SIZE);
        let signing_len = key_len(signing_type);

        if public_key.len() != crypto_len {
            return Err(DataError::malformed(
                "keys and cert",
                format!("public key is {} bytes, expected {}", public_key.len(), crypto_len),
            ));
        }
        if signing_key.len() != signing_len {
            return Err(DataError::malformed(
                "keys and cert",
                format!(
                    "signing key is {} bytes, expected {}",
                    signing_key.len(),
                    signing_len
                ),
            ));
        }

        let mut public_key_slot = vec![0u8; PUBLIC_KEY_SLOT_SIZE];
        public_key_slot[..crypto_len].copy_from_slice(public_key);

        let mut signing_key_slot = vec![0u8; SIGNING_KEY_SLOT_SIZE];
        if signing_len > SIGNING_KEY_SLOT_SIZE {
            signing_key_slot.copy_from_slice(&signing_key[..SIGNING_KEY_SLOT_SIZE]);
            if let Some(key_cert) = certificate.key_certificate() {
                let mut key_cert = key_cert?;
                key_cert.excess = signing_key[SIGNING_KEY_SLOT_SIZE..].to_vec();
                certificate = Certificate::key(&key_cert);
            }
        } else {
            signing_key_slot[SIGNING_KEY_SLOT_SIZE - signing_len..].copy_from_slice(signing_key);
        }

        let mut value = Self {
            public_key_slot,
            signing_key_slot,
            certificate,
            signing_type,
            crypto_type,
            hash: RouterHash([0u8; 32]),
        };
        value.hash = RouterHash::digest(&value.to_bytes()?);
        Ok(value)
    }

    pub fn read(data: &[u8]) -> Result<Parsed<'_, Self>, DataError> {
        if data.len() < KEYS_AND_CERT_MIN_SIZE {
            return Err(DataError::insufficient(
                "keys and cert",
                KEYS_AND_CERT_MIN_SIZE,
                data.len(),
            ));
        }

        let cert = Certificate::read(&data[KEYS_AND_CERT_DATA_SIZE..])?;
        let remainder = cert.remainder;
        let cert_error = cert.error;
        let certificate = cert.value;

        let (signing_type, crypto_type, warning) = resolve_key_types(&certificate)?;
        let signing_len = key_len(signing_type);
        if signing_len > SIGNING_KEY_SLOT_SIZE {
            let excess = certificate
                .key_certificate()
                .transpose()?
                .map(|k| k.excess.len())
                .unwrap_or(0);
            if excess < signing_len - SIGNING_KEY_SLOT_SIZE {
                return Err(DataError::malformed(
                    "keys and cert",
                    format!(
                        "signing key needs {} excess bytes, certificate has {}",
                        signing_len - SIGNING_KEY_SLOT_SIZE,
                        excess
                    ),
                ));
            }
        }

        let consumed = data.len() - remainder.len();
        let value = Self {
            public_key_slot: data[..PUBLIC_KEY_SLOT_SIZE].to_vec(),
            signing_key_slot: data[PUBLIC_KEY_SLOT_SIZE..KEYS_AND_CERT_DATA_SIZE].to_vec(),
            certificate,
            signing_type,
            crypto_type,
            hash: RouterHash::digest(&data[..consumed]),
        };

        let mut parsed = Parsed::ok(value, remainder);
        parsed.note(cert_error);
        parsed.note(warning);
        Ok(parsed)
    }

    pub fn write(&self, buf: &mut BytesMut) -> Result<(), DataError> {
        buf.put_slice(&self.public_key_slot);
        buf.put_slice(&self.signing_key_slot);
        self.certificate.write(buf)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, DataError> {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        self.write(&mut buf)?;
        Ok(buf.to_vec())
    }

    pub fn encoded_len(&self) -> usize {
        KEYS_AND_CERT_DATA_SIZE + self.certificate.encoded_len()
    }

    /// SHA-256 of the serialized identity.
    pub fn hash(&self) -> RouterHash {
        self.hash
    }

    pub fn certificate(&self) -> &Certificate {
        &self.certificate
    }

    pub fn signing_type(&self) -> SigningKeyType {
        self.signing_type
    }

    pub fn crypto_type(&self) -> CryptoKeyType {
        self.crypto_type
    }

    /// Encryption public key, without padding.
    pub fn public_key(&self) -> &[u8] {
        let len = self
            .crypto_type
            .public_key_len()
            .unwrap_or(PUBLIC_KEY_SLOT_SIZE)
            .min(PUBLIC_KEY_SLOT_SIZE);
        &self.public_key_slot[..len]
    }

    /// Signing public key, without padding, including any certificate excess.
    pub fn signing_public_key(&self) -> Vec<u8> {
        let len = key_len(self.signing_type);
        if len <= SIGNING_KEY_SLOT_SIZE {
            return self.signing_key_slot[SIGNING_KEY_SLOT_SIZE - len..].to_vec();
        }
        let mut key = self.signing_key_slot.clone();
        if let Some(Ok(key_cert)) = self.certificate.key_certificate() {
            let extra = len - SIGNING_KEY_SLOT_SIZE;
            key.extend_from_slice(&key_cert.excess[..extra.min(key_cert.excess.len())]);
        }
        key
    }

    /// Signature length for this identity's signing key type.
    pub fn signature_len(&self) -> Result<usize, DataError> {
        self.signing_type
            .signature_len()
            .ok_or(DataError::UnknownKeyType {
                kind: "signing",
                code: self.signing_type.code(),
            })
    }

    /// A verifier for this identity's signing key.
    pub fn verifier(&self, params: &Arc<DomainParameters>) -> Result<Box<dyn Verifier>, DataError> {
        let key = self.signing_public_key();
        match self.signing_type {
            SigningKeyType::DsaSha1 => {
                let bytes: [u8; DSA_PUBLIC_KEY_SIZE] = key
                    .as_slice()
                    .try_into()
                    .map_err(|_| SignatureError::InvalidKeyFormat)?;
                Ok(Box::new(DsaPublicKey(bytes).verifier(params.clone())))
            }
            SigningKeyType::Ed25519 => {
                let bytes: [u8; ED25519_PUBLIC_KEY_SIZE] = key
                    .as_slice()
                    .try_into()
                    .map_err(|_| SignatureError::InvalidKeyFormat)?;
                Ok(Box::new(Ed25519Verifier::from_bytes(&bytes)?))
            }
            _ => Err(SignatureError::Unsupported("signing key type").into()),
        }
    }
}

impl std::fmt::Debug for KeysAndCert {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeysAndCert")
            .field("hash", &self.hash)
            .field("signing_type", &self.signing_type)
            .field("crypto_type", &self.crypto_type)
            .finish_non_exhaustive()
    }
}
