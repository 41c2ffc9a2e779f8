//! Certificates and key certificates.
//!
//! ```text
//! Certificate    = Type[1] ‖ Length[2] ‖ Payload[Length]
//! KeyCertificate = SigningKeyType[2] ‖ CryptoKeyType[2] ‖ Excess[..]
//! ```
//!
//! A KEY certificate overrides the legacy key types (ElGamal-2048 and
//! DSA-SHA1) assumed by KeysAndCert, and carries the excess bytes of signing
//! keys longer than 128 bytes.

use bytes::{BufMut, BytesMut};

use crate::error::{take, DataError, Parsed};

/// Minimum encoded certificate size (type + length).
pub const CERTIFICATE_MIN_SIZE: usize = 3;

/// Certificate type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CertificateType {
    Null,
    HashCash,
    Hidden,
    Signed,
    Multiple,
    Key,
    Unknown(u8),
}

impl From<u8> for CertificateType {
    fn from(value: u8) -> Self {
        match value {
            0 => Self::Null,
            1 => Self::HashCash,
            2 => Self::Hidden,
            3 => Self::Signed,
            4 => Self::Multiple,
            5 => Self::Key,
            other => Self::Unknown(other),
        }
    }
}

impl From<CertificateType> for u8 {
    fn from(value: CertificateType) -> Self {
        match value {
            CertificateType::Null => 0,
            CertificateType::HashCash => 1,
            CertificateType::Hidden => 2,
            CertificateType::Signed => 3,
            CertificateType::Multiple => 4,
            CertificateType::Key => 5,
            CertificateType::Unknown(other) => other,
        }
    }
}

/// Signing public key types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SigningKeyType {
    DsaSha1,
    EcdsaSha256P256,
    EcdsaSha384P384,
    EcdsaSha512P521,
    RsaSha2562048,
    RsaSha3843072,
    RsaSha5124096,
    Ed25519,
    Ed25519ph,
    RedDsaEd25519,
    Unknown(u16),
}

impl SigningKeyType {
    pub fn from_code(code: u16) -> Self {
        match code {
            0 => Self::DsaSha1,
            1 => Self::EcdsaSha256P256,
            2 => Self::EcdsaSha384P384,
            3 => Self::EcdsaSha512P521,
            4 => Self::RsaSha2562048,
            5 => Self::RsaSha3843072,
            6 => Self::RsaSha5124096,
            7 => Self::Ed25519,
            8 => Self::Ed25519ph,
            11 => Self::RedDsaEd25519,
            other => Self::Unknown(other),
        }
    }

    pub fn code(&self) -> u16 {
        match self {
            Self::DsaSha1 => 0,
            Self::EcdsaSha256P256 => 1,
            Self::EcdsaSha384P384 => 2,
            Self::EcdsaSha512P521 => 3,
            Self::RsaSha2562048 => 4,
            Self::RsaSha3843072 => 5,
            Self::RsaSha5124096 => 6,
            Self::Ed25519 => 7,
            Self::Ed25519ph => 8,
            Self::RedDsaEd25519 => 11,
            Self::Unknown(code) => *code,
        }
    }

    /// Public key length, if the type is known.
    pub fn public_key_len(&self) -> Option<usize> {
        Some(match self {
            Self::DsaSha1 => 128,
            Self::EcdsaSha256P256 => 64,
            Self::EcdsaSha384P384 => 96,
            Self::EcdsaSha512P521 => 132,
            Self::RsaSha2562048 => 256,
            Self::RsaSha3843072 => 384,
            Self::RsaSha5124096 => 512,
            Self::Ed25519 | Self::Ed25519ph | Self::RedDsaEd25519 => 32,
            Self::Unknown(_) => return None,
        })
    }

    /// Signature length, if the type is known.
    pub fn signature_len(&self) -> Option<usize> {
        Some(match self {
            Self::DsaSha1 => 40,
            Self::EcdsaSha256P256 => 64,
            Self::EcdsaSha384P384 => 96,
            Self::EcdsaSha512P521 => 132,
            Self::RsaSha2562048 => 256,
            Self::RsaSha3843072 => 384,
            Self::RsaSha5124096 => 512,
            Self::Ed25519 | Self::Ed25519ph | Self::RedDsaEd25519 => 64,
            Self::Unknown(_) => return None,
        })
    }
}

/// Encryption public key types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CryptoKeyType {
    ElGamal,
    EcP256,
    EcP384,
    EcP521,
    X25519,
    Unknown(u16),
}

impl CryptoKeyType {
    pub fn from_code(code: u16) -> Self {
        match code {
            0 => Self::ElGamal,
            1 => Self::EcP256,
            2 => Self::EcP384,
            3 => Self::EcP521,
            4 => Self::X25519,
            other => Self::Unknown(other),
        }
    }

    pub fn code(&self) -> u16 {
        match self {
            Self::ElGamal => 0,
            Self::EcP256 => 1,
            Self::EcP384 => 2,
            Self::EcP521 => 3,
            Self::X25519 => 4,
            Self::Unknown(code) => *code,
        }
    }

    pub fn public_key_len(&self) -> Option<usize> {
        match self {
            Self::ElGamal => Some(256),
            Self::EcP256 => Some(64),
            Self::EcP384 => Some(96),
            Self::EcP521 => Some(132),
            Self::X25519 => Some(32),
            Self::Unknown(_) => None,
        }
    }
}

/// Payload of a KEY certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyCertificate {
    pub signing_type: SigningKeyType,
    pub crypto_type: CryptoKeyType,
    pub excess: Vec<u8>,
}

impl KeyCertificate {
    pub fn new(signing_type: SigningKeyType, crypto_type: CryptoKeyType) -> Self {
        Self {
            signing_type,
            crypto_type,
            excess: Vec::new(),
        }
    }

    pub fn parse(payload: &[u8]) -> Result<Self, DataError> {
        let (types, excess) = take("key certificate", payload, 4)?;
        Ok(Self {
            signing_type: SigningKeyType::from_code(u16::from_be_bytes([types[0], types[1]])),
            crypto_type: CryptoKeyType::from_code(u16::from_be_bytes([types[2], types[3]])),
            excess: excess.to_vec(),
        })
    }

    pub fn to_payload(&self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(4 + self.excess.len());
        buf.put_u16(self.signing_type.code());
        buf.put_u16(self.crypto_type.code());
        buf.put_slice(&self.excess);
        buf.to_vec()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Certificate {
    pub cert_type: CertificateType,
    pub payload: Vec<u8>,
}

impl Certificate {
    pub fn null() -> Self {
        Self {
            cert_type: CertificateType::Null,
            payload: Vec::new(),
        }
    }

    pub fn key(key_cert: &KeyCertificate) -> Self {
        Self {
            cert_type: CertificateType::Key,
            payload: key_cert.to_payload(),
        }
    }

    /// Parse a certificate.
    ///
    /// A declared length larger than the input keeps the available payload
    /// and reports `InvalidLength`.
    pub fn read(data: &[u8]) -> Result<Parsed<'_, Self>, DataError> {
        let (header, rest) = take("certificate", data, CERTIFICATE_MIN_SIZE)?;
        let cert_type = CertificateType::from(header[0]);
        let declared = usize::from(u16::from_be_bytes([header[1], header[2]]));

        if declared > rest.len() {
            let mut parsed = Parsed::ok(
                Self {
                    cert_type,
                    payload: rest.to_vec(),
                },
                &rest[rest.len()..],
            );
            parsed.note(Some(DataError::InvalidLength {
                structure: "certificate",
                declared,
                available: rest.len(),
            }));
            return Ok(parsed);
        }

        let (payload, remainder) = rest.split_at(declared);
        Ok(Parsed::ok(
            Self {
                cert_type,
                payload: payload.to_vec(),
            },
            remainder,
        ))
    }

    pub fn write(&self, buf: &mut BytesMut) -> Result<(), DataError> {
        let len = u16::try_from(self.payload.len())
            .map_err(|_| DataError::malformed("certificate", "payload exceeds 65535 bytes"))?;
        buf.put_u8(self.cert_type.into());
        buf.put_u16(len);
        buf.put_slice(&self.payload);
        Ok(())
    }

    pub fn encoded_len(&self) -> usize {
        CERTIFICATE_MIN_SIZE + self.payload.len()
    }

    /// Key certificate payload, for KEY certificates.
    pub fn key_certificate(&self) -> Option<Result<KeyCertificate, DataError>> {
        match self.cert_type {
            CertificateType::Key => Some(KeyCertificate::parse(&self.payload)),
            _ => None,
        }
    }
}
