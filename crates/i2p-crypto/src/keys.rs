//! X25519 static keys for the transport layer.

use rand::rngs::OsRng;
use x25519_dalek::{PublicKey, StaticSecret};

/// X25519 key length in bytes.
pub const X25519_KEY_SIZE: usize = 32;

/// Long-lived X25519 keypair advertised as the `s` option of a router address.
///
/// The secret is zeroized on drop by `x25519-dalek`.
#[derive(Clone)]
pub struct StaticKeypair {
    secret: StaticSecret,
    public: PublicKey,
}

impl StaticKeypair {
    /// Generate a new random keypair using the OS CSPRNG.
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(OsRng);
        let public = PublicKey::from(&secret);
        Self { secret, public }
    }

    /// Restore from raw private key bytes.
    pub fn from_private_bytes(bytes: [u8; X25519_KEY_SIZE]) -> Self {
        let secret = StaticSecret::from(bytes);
        let public = PublicKey::from(&secret);
        Self { secret, public }
    }

    pub fn public_key(&self) -> [u8; X25519_KEY_SIZE] {
        *self.public.as_bytes()
    }

    /// Raw private key bytes, for persistence.
    pub fn private_bytes(&self) -> [u8; X25519_KEY_SIZE] {
        self.secret.to_bytes()
    }

    /// Diffie-Hellman with a peer public key.
    ///
    /// Returns `None` when the result is all zeros (low-order peer point).
    pub fn dh(&self, peer: &[u8; X25519_KEY_SIZE]) -> Option<[u8; X25519_KEY_SIZE]> {
        let shared = self.secret.diffie_hellman(&PublicKey::from(*peer));
        if !shared.was_contributory() {
            return None;
        }
        Some(*shared.as_bytes())
    }
}

impl std::fmt::Debug for StaticKeypair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticKeypair")
            .field("public", &hex::encode(self.public.as_bytes()))
            .finish_non_exhaustive()
    }
}
