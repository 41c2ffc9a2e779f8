//! Legacy DSA-SHA1 signature adapter.
//!
//! The network uses one fixed set of 1024-bit domain parameters for every key.
//! They are held in a [`DomainParameters`] value created once by the caller and
//! shared through an `Arc`; nothing here reads them from global state.
//!
//! Wire formats:
//! - private key: 20-byte big-endian exponent `X`
//! - public key: `Y = g^X mod p`, 128 bytes big-endian, left-zero-padded
//! - signature: `r ‖ s`, each 20 bytes big-endian, left-zero-padded

use std::sync::Arc;

use num_bigint::BigUint;
use rand::RngCore;
use sha1::{Digest, Sha1};
use tracing::{debug, warn};
use zeroize::Zeroizing;

use crate::signature::{SignatureError, Signer, Verifier};

/// Private exponent length in bytes.
pub const DSA_PRIVATE_KEY_SIZE: usize = 20;

/// Public key length in bytes.
pub const DSA_PUBLIC_KEY_SIZE: usize = 128;

/// Signature length in bytes (`r ‖ s`).
pub const DSA_SIGNATURE_SIZE: usize = 40;

const DSA_FIELD_SIZE: usize = 20;

const DSA_P: [u8; 128] = [
    0x9c, 0x05, 0xb2, 0xaa, 0x96, 0x0d, 0x9b, 0x97, 0xb8, 0x93, 0x19, 0x63, 0xc9, 0xcc, 0x9e, 0x8c,
    0x30, 0x26, 0xe9, 0xb8, 0xed, 0x92, 0xfa, 0xd0, 0xa6, 0x9c, 0xc8, 0x86, 0xd5, 0xbf, 0x80, 0x15,
    0xfc, 0xad, 0xae, 0x31, 0xa0, 0xad, 0x18, 0xfa, 0xb3, 0xf0, 0x1b, 0x00, 0xa3, 0x58, 0xde, 0x23,
    0x76, 0x55, 0xc4, 0x96, 0x4a, 0xfa, 0xa2, 0xb3, 0x37, 0xe9, 0x6a, 0xd3, 0x16, 0xb9, 0xfb, 0x1c,
    0xc5, 0x64, 0xb5, 0xae, 0xc5, 0xb6, 0x9a, 0x9f, 0xf6, 0xc3, 0xe4, 0x54, 0x87, 0x07, 0xfe, 0xf8,
    0x50, 0x3d, 0x91, 0xdd, 0x86, 0x02, 0xe8, 0x67, 0xe6, 0xd3, 0x5d, 0x22, 0x35, 0xc1, 0x86, 0x9c,
    0xe2, 0x47, 0x9c, 0x3b, 0x9d, 0x54, 0x01, 0xde, 0x04, 0xe0, 0x72, 0x7f, 0xb3, 0x3d, 0x65, 0x11,
    0x28, 0x5d, 0x4c, 0xf2, 0x95, 0x38, 0xd9, 0xe3, 0xb6, 0x05, 0x1f, 0x5b, 0x22, 0xcc, 0x1c, 0x93,
];

const DSA_Q: [u8; 20] = [
    0xa5, 0xdf, 0xc2, 0x8f, 0xef, 0x4c, 0xa1, 0xe2, 0x86, 0x74, 0x4c, 0xd8, 0xee, 0xd9, 0xd2, 0x9d,
    0x68, 0x40, 0x46, 0xb7,
];

const DSA_G: [u8; 128] = [
    0x0c, 0x1f, 0x4d, 0x27, 0xd4, 0x00, 0x93, 0xb4, 0x29, 0xe9, 0x62, 0xd7, 0x22, 0x38, 0x24, 0xe0,
    0xbb, 0xc4, 0x7e, 0x7c, 0x83, 0x2a, 0x39, 0x23, 0x6f, 0xc6, 0x83, 0xaf, 0x84, 0x88, 0x95, 0x81,
    0x07, 0x5f, 0xf9, 0x08, 0x2e, 0xd3, 0x23, 0x53, 0xd4, 0x37, 0x4d, 0x73, 0x01, 0xcd, 0xa1, 0xd2,
    0x3c, 0x43, 0x1f, 0x46, 0x98, 0x59, 0x9d, 0xda, 0x02, 0x45, 0x18, 0x24, 0xff, 0x36, 0x97, 0x52,
    0x59, 0x36, 0x47, 0xcc, 0x3d, 0xdc, 0x19, 0x7d, 0xe9, 0x85, 0xe4, 0x3d, 0x13, 0x6c, 0xdc, 0xfc,
    0x6b, 0xd5, 0x40, 0x9c, 0xd2, 0xf4, 0x50, 0x82, 0x11, 0x42, 0xa5, 0xe6, 0xf8, 0xeb, 0x1c, 0x3a,
    0xb5, 0xd0, 0x48, 0x4b, 0x81, 0x29, 0xfc, 0xf1, 0x7b, 0xce, 0x4f, 0x7f, 0x33, 0x32, 0x1c, 0x3c,
    0xb3, 0xdb, 0xb1, 0x4a, 0x90, 0x5e, 0x7b, 0x2b, 0x3e, 0x93, 0xbe, 0x47, 0x08, 0xcb, 0xcc, 0x82,
];

/// DSA domain parameters `(p, q, g)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainParameters {
    p: BigUint,
    q: BigUint,
    g: BigUint,
}

impl DomainParameters {
    /// The network-wide parameters every legacy identity is bound to.
    pub fn network() -> Self {
        Self {
            p: BigUint::from_bytes_be(&DSA_P),
            q: BigUint::from_bytes_be(&DSA_Q),
            g: BigUint::from_bytes_be(&DSA_G),
        }
    }

    /// Custom parameters, big-endian.
    ///
    /// Requires `q > 1` and `2 <= g < p`.
    pub fn from_be_bytes(p: &[u8], q: &[u8], g: &[u8]) -> Result<Self, SignatureError> {
        let two = BigUint::from(2u8);
        let p = BigUint::from_bytes_be(p);
        let q = BigUint::from_bytes_be(q);
        let g = BigUint::from_bytes_be(g);
        if q < two {
            return Err(SignatureError::InvalidDomainParameters("q must exceed 1"));
        }
        if g < two || g >= p {
            return Err(SignatureError::InvalidDomainParameters("g outside [2, p)"));
        }
        Ok(Self { p, q, g })
    }

    /// Shared handle, ready to inject into signers and verifiers.
    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// Uniform random value in `[1, q)`.
    fn random_scalar(&self) -> BigUint {
        // 64 extra bits keep the modular bias negligible.
        let mut buf = Zeroizing::new([0u8; DSA_FIELD_SIZE + 8]);
        rand::thread_rng().fill_bytes(&mut buf[..]);
        let one = BigUint::from(1u8);
        BigUint::from_bytes_be(&buf[..]) % (&self.q - &one) + one
    }

    /// Modular inverse in the prime-order subgroup (Fermat).
    fn inverse_mod_q(&self, value: &BigUint) -> BigUint {
        let exp = &self.q - BigUint::from(2u8);
        value.modpow(&exp, &self.q)
    }

    /// Leftmost `|q|` bits of a digest, as an integer.
    fn digest_to_int(&self, hash: &[u8]) -> BigUint {
        let take = hash.len().min(DSA_FIELD_SIZE);
        BigUint::from_bytes_be(&hash[..take])
    }
}

/// Left-pad a big-endian integer into a fixed-width field.
fn write_fixed(out: &mut [u8], value: &BigUint) -> Result<(), SignatureError> {
    let bytes = value.to_bytes_be();
    if bytes.len() > out.len() {
        return Err(SignatureError::InvalidKeyFormat);
    }
    let offset = out.len() - bytes.len();
    out[..offset].fill(0);
    out[offset..].copy_from_slice(&bytes);
    Ok(())
}

/// 20-byte DSA private exponent.
pub struct DsaPrivateKey(Zeroizing<[u8; DSA_PRIVATE_KEY_SIZE]>);

impl DsaPrivateKey {
    /// Generate a fresh exponent in `[1, q)`.
    pub fn generate(params: &DomainParameters) -> Self {
        let x = params.random_scalar();
        let mut bytes = Zeroizing::new([0u8; DSA_PRIVATE_KEY_SIZE]);
        // x < q fits in 20 bytes
        let raw = x.to_bytes_be();
        bytes[DSA_PRIVATE_KEY_SIZE - raw.len()..].copy_from_slice(&raw);
        debug!("generated DSA private key");
        Self(bytes)
    }

    pub fn from_bytes(bytes: [u8; DSA_PRIVATE_KEY_SIZE]) -> Self {
        Self(Zeroizing::new(bytes))
    }

    /// Derive the public key `Y = g^X mod p`.
    pub fn public_key(&self, params: &DomainParameters) -> Result<DsaPublicKey, SignatureError> {
        let x = exponent_checked(params, &self.0[..])?;
        let y = params.g.modpow(&x, &params.p);
        let mut out = [0u8; DSA_PUBLIC_KEY_SIZE];
        write_fixed(&mut out, &y)?;
        Ok(DsaPublicKey(out))
    }

    /// Signer bound to this key and the given parameters.
    pub fn signer(&self, params: Arc<DomainParameters>) -> Result<DsaSigner, SignatureError> {
        DsaSigner::from_exponent(params, &self.0[..])
    }
}

/// Interpret an exponent, rejecting values that are not below `p`.
fn exponent_checked(params: &DomainParameters, bytes: &[u8]) -> Result<BigUint, SignatureError> {
    let x = BigUint::from_bytes_be(bytes);
    if x >= params.p {
        warn!("rejecting DSA private key: exponent is not less than p");
        return Err(SignatureError::InvalidKeyFormat);
    }
    Ok(x)
}

/// 128-byte DSA public key.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct DsaPublicKey(pub [u8; DSA_PUBLIC_KEY_SIZE]);

impl DsaPublicKey {
    pub fn as_bytes(&self) -> &[u8; DSA_PUBLIC_KEY_SIZE] {
        &self.0
    }

    pub fn verifier(&self, params: Arc<DomainParameters>) -> DsaVerifier {
        DsaVerifier {
            params,
            y: BigUint::from_bytes_be(&self.0),
        }
    }
}

impl std::fmt::Debug for DsaPublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "DsaPublicKey({}..)", hex::encode(&self.0[..8]))
    }
}

/// DSA-SHA1 signer.
pub struct DsaSigner {
    params: Arc<DomainParameters>,
    x: BigUint,
}

impl DsaSigner {
    /// Build a signer from a raw big-endian exponent of any width.
    ///
    /// Only `X < p` is enforced.
    pub fn from_exponent(
        params: Arc<DomainParameters>,
        exponent: &[u8],
    ) -> Result<Self, SignatureError> {
        let x = exponent_checked(&params, exponent)?;
        Ok(Self { params, x })
    }
}

impl Signer for DsaSigner {
    fn sign(&self, data: &[u8]) -> Result<Vec<u8>, SignatureError> {
        let hash = Sha1::digest(data);
        self.sign_hash(&hash)
    }

    fn sign_hash(&self, hash: &[u8]) -> Result<Vec<u8>, SignatureError> {
        let params = &self.params;
        let z = params.digest_to_int(hash);
        let zero = BigUint::default();

        loop {
            let k = params.random_scalar();
            let r = params.g.modpow(&k, &params.p) % &params.q;
            if r == zero {
                continue;
            }
            let k_inv = params.inverse_mod_q(&k);
            let s = (k_inv * ((&z + &self.x * &r) % &params.q)) % &params.q;
            if s == zero {
                continue;
            }

            let mut sig = vec![0u8; DSA_SIGNATURE_SIZE];
            write_fixed(&mut sig[..DSA_FIELD_SIZE], &r)?;
            write_fixed(&mut sig[DSA_FIELD_SIZE..], &s)?;
            return Ok(sig);
        }
    }

    fn signature_len(&self) -> usize {
        DSA_SIGNATURE_SIZE
    }
}

/// DSA-SHA1 verifier.
pub struct DsaVerifier {
    params: Arc<DomainParameters>,
    y: BigUint,
}

impl Verifier for DsaVerifier {
    fn verify(&self, data: &[u8], sig: &[u8]) -> Result<(), SignatureError> {
        let hash = Sha1::digest(data);
        self.verify_hash(&hash, sig)
    }

    fn verify_hash(&self, hash: &[u8], sig: &[u8]) -> Result<(), SignatureError> {
        if sig.len() != DSA_SIGNATURE_SIZE {
            debug!(sig_len = sig.len(), "bad DSA signature size");
            return Err(SignatureError::BadSignatureSize {
                expected: DSA_SIGNATURE_SIZE,
                actual: sig.len(),
            });
        }

        let params = &self.params;
        let zero = BigUint::default();
        let r = BigUint::from_bytes_be(&sig[..DSA_FIELD_SIZE]);
        let s = BigUint::from_bytes_be(&sig[DSA_FIELD_SIZE..]);
        if r == zero || r >= params.q || s == zero || s >= params.q {
            return Err(SignatureError::InvalidSignature);
        }

        let w = params.inverse_mod_q(&s);
        let u1 = (params.digest_to_int(hash) * &w) % &params.q;
        let u2 = (&r * &w) % &params.q;
        let v = ((params.g.modpow(&u1, &params.p) * self.y.modpow(&u2, &params.p)) % &params.p)
            % &params.q;

        if v == r {
            Ok(())
        } else {
            debug!("invalid DSA signature");
            Err(SignatureError::InvalidSignature)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keypair() -> (DsaSigner, DsaVerifier) {
        let params = DomainParameters::network().shared();
        let private = DsaPrivateKey::generate(&params);
        let public = private.public_key(&params).unwrap();
        (
            private.signer(params.clone()).unwrap(),
            public.verifier(params),
        )
    }

    #[test]
    fn sign_verify_roundtrip() {
        let (signer, verifier) = keypair();
        for data in [&b""[..], b"a", b"router info", &[0xffu8; 1000][..]] {
            let sig = signer.sign(data).unwrap();
            assert_eq!(sig.len(), DSA_SIGNATURE_SIZE);
            assert_eq!(verifier.verify(data, &sig), Ok(()));
        }
    }

    #[test]
    fn sign_hash_matches_verify() {
        let (signer, verifier) = keypair();
        let hash = Sha1::digest(b"prehashed");
        let sig = signer.sign_hash(&hash).unwrap();
        assert_eq!(verifier.verify_hash(&hash, &sig), Ok(()));
        assert_eq!(verifier.verify(b"prehashed", &sig), Ok(()));
    }

    #[test]
    fn every_bit_flip_is_rejected() {
        let (signer, verifier) = keypair();
        let data = b"flip me";
        let sig = signer.sign(data).unwrap();

        for bit in 0..DSA_SIGNATURE_SIZE * 8 {
            let mut tampered = sig.clone();
            tampered[bit / 8] ^= 1 << (bit % 8);
            assert_eq!(
                verifier.verify(data, &tampered),
                Err(SignatureError::InvalidSignature),
                "bit {} flip accepted",
                bit
            );
        }
    }

    #[test]
    fn wrong_length_is_bad_size() {
        let (signer, verifier) = keypair();
        let sig = signer.sign(b"data").unwrap();

        for len in [0usize, 39, 41, 64] {
            let mut wrong = sig.clone();
            wrong.resize(len, 0);
            assert_eq!(
                verifier.verify(b"data", &wrong),
                Err(SignatureError::BadSignatureSize {
                    expected: DSA_SIGNATURE_SIZE,
                    actual: len
                })
            );
        }
    }

    #[test]
    fn exponent_not_below_p_is_invalid_key() {
        let params = DomainParameters::network().shared();
        let result = DsaSigner::from_exponent(params.clone(), &DSA_P);
        assert!(matches!(result, Err(SignatureError::InvalidKeyFormat)));

        let result = DsaSigner::from_exponent(params, &[0xff; 128]);
        assert!(matches!(result, Err(SignatureError::InvalidKeyFormat)));
    }

    #[test]
    fn degenerate_parameters_are_rejected() {
        let cases: [(&[u8], &[u8], &[u8]); 5] = [
            (&DSA_P, &[], &DSA_G),
            (&DSA_P, &[1], &DSA_G),
            (&DSA_P, &DSA_Q, &[1]),
            (&DSA_P, &DSA_Q, &DSA_P),
            (&[], &DSA_Q, &DSA_G),
        ];
        for (p, q, g) in cases {
            assert!(matches!(
                DomainParameters::from_be_bytes(p, q, g),
                Err(SignatureError::InvalidDomainParameters(_))
            ));
        }
    }

    #[test]
    fn custom_parameters_match_network() {
        let custom = DomainParameters::from_be_bytes(&DSA_P, &DSA_Q, &DSA_G).unwrap();
        assert_eq!(custom, DomainParameters::network());

        let params = custom.shared();
        let private = DsaPrivateKey::generate(&params);
        let verifier = private.public_key(&params).unwrap().verifier(params.clone());
        let sig = private.signer(params).unwrap().sign(b"custom").unwrap();
        assert_eq!(verifier.verify(b"custom", &sig), Ok(()));
    }

    #[test]
    fn public_key_is_left_padded() {
        let params = DomainParameters::network();
        let mut x = [0u8; DSA_PRIVATE_KEY_SIZE];
        x[19] = 1;
        let public = DsaPrivateKey::from_bytes(x).public_key(&params).unwrap();
        // g^1 mod p == g
        assert_eq!(public.as_bytes(), &DSA_G);
    }

    #[test]
    fn signatures_do_not_cross_keys() {
        let (signer, _) = keypair();
        let (_, other_verifier) = keypair();
        let sig = signer.sign(b"data").unwrap();
        assert_eq!(
            other_verifier.verify(b"data", &sig),
            Err(SignatureError::InvalidSignature)
        );
    }
}
