//! Noise Protocol handshake engine.
//!
//! A small, token-driven implementation of the Noise framework fixed to
//! X25519, ChaCha20-Poly1305 and SHA-256. Patterns are data ([`HandshakePattern`]),
//! the protocol name is a parameter so overlays can bind their own name into
//! the transcript.
//!
//! # Handshake Flow (XK)
//!
//! ```text
//! Initiator                              Responder
//!     |                                       |
//!     |  <- s                                 |  responder static known in advance
//!     |  ...                                  |
//!     |  -> e, es                             |  message 1
//!     |-------------------------------------->|
//!     |                                       |
//!     |  <- e, ee                             |  message 2
//!     |<--------------------------------------|
//!     |                                       |
//!     |  -> s, se                             |  message 3
//!     |-------------------------------------->|
//!     |                                       |
//!     [          split() -> TransportState      ]
//! ```
//!
//! The engine exposes only what an overlay needs: [`HandshakeState::stage`],
//! [`HandshakeState::write_message`], [`HandshakeState::read_message`],
//! [`HandshakeState::mix_hash`] and [`HandshakeState::split`]. Any error moves
//! the state to [`Stage::Failed`] and wipes its secrets.

use chacha20poly1305::aead::{Aead, KeyInit, Payload};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use hkdf::Hkdf;
use i2p_common::{Classify, ErrorKind};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, trace};
use zeroize::{Zeroize, Zeroizing};

use crate::keys::{StaticKeypair, X25519_KEY_SIZE};

/// Protocol name bound into the NTCP2 transcript.
pub const NTCP2_PROTOCOL_NAME: &str = "Noise_XKaesobfse+hs2+hs3_25519_ChaChaPoly_SHA256";

/// Plain XK protocol name, as understood by other Noise implementations.
pub const XK_PROTOCOL_NAME: &str = "Noise_XK_25519_ChaChaPoly_SHA256";

/// Hash output length.
pub const HASH_LEN: usize = 32;

/// AEAD tag length.
pub const TAG_LEN: usize = 16;

/// Largest Noise message.
pub const MAX_MESSAGE_LEN: usize = 65535;

/// Noise handshake errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum NoiseError {
    #[error("{op} not allowed in stage {stage:?}")]
    WrongStage { op: &'static str, stage: Stage },

    #[error("missing key: {0}")]
    MissingKey(&'static str),

    #[error("message too short: need {needed} bytes, got {actual}")]
    MessageTooShort { needed: usize, actual: usize },

    #[error("message too long: {0} bytes")]
    MessageTooLong(usize),

    #[error("non-contributory Diffie-Hellman result")]
    NonContributory,

    #[error("encryption failed")]
    EncryptionFailed,

    #[error("decryption failed")]
    DecryptionFailed,

    #[error("nonce exhausted")]
    NonceExhausted,

    #[error("cipher state poisoned by an earlier failure")]
    Poisoned,

    #[error("key derivation failed")]
    KeyDerivation,
}

impl Classify for NoiseError {
    fn kind(&self) -> ErrorKind {
        match self {
            NoiseError::WrongStage { .. }
            | NoiseError::MissingKey(_)
            | NoiseError::MessageTooLong(_) => ErrorKind::ProtocolViolation,
            NoiseError::MessageTooShort { .. } => ErrorKind::MalformedInput,
            NoiseError::NonContributory
            | NoiseError::EncryptionFailed
            | NoiseError::DecryptionFailed
            | NoiseError::NonceExhausted
            | NoiseError::Poisoned
            | NoiseError::KeyDerivation => ErrorKind::CryptoFailure,
        }
    }
}

/// Pattern token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Token {
    E,
    S,
    EE,
    ES,
    SE,
    SS,
}

/// A handshake pattern: pre-messages and message token lists.
///
/// Messages alternate direction, starting with the initiator.
#[derive(Debug)]
pub struct HandshakePattern {
    pub name: &'static str,
    /// `-> s` pre-message.
    pub initiator_static_known: bool,
    /// `<- s` pre-message.
    pub responder_static_known: bool,
    pub messages: &'static [&'static [Token]],
}

/// `XK`: responder static known, initiator static sent encrypted in message 3.
pub const XK: HandshakePattern = HandshakePattern {
    name: "XK",
    initiator_static_known: false,
    responder_static_known: true,
    messages: &[&[Token::E, Token::ES], &[Token::E, Token::EE], &[Token::S, Token::SE]],
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Initiator,
    Responder,
}

/// Handshake progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Uninitialized,
    Msg1Sent,
    Msg1Received,
    Msg2Sent,
    Msg2Received,
    Msg3Sent,
    Msg3Received,
    Transport,
    Failed,
}

impl Stage {
    fn after(index: usize, sent: bool) -> Stage {
        match (index, sent) {
            (0, true) => Stage::Msg1Sent,
            (0, false) => Stage::Msg1Received,
            (1, true) => Stage::Msg2Sent,
            (1, false) => Stage::Msg2Received,
            (_, true) => Stage::Msg3Sent,
            (_, false) => Stage::Msg3Received,
        }
    }
}

/// One direction of ChaCha20-Poly1305 with a 64-bit counter nonce.
struct CipherState {
    key: Option<Zeroizing<[u8; 32]>>,
    nonce: u64,
    poisoned: bool,
}

impl CipherState {
    fn empty() -> Self {
        Self {
            key: None,
            nonce: 0,
            poisoned: false,
        }
    }

    fn with_key(key: [u8; 32]) -> Self {
        Self {
            key: Some(Zeroizing::new(key)),
            nonce: 0,
            poisoned: false,
        }
    }

    fn has_key(&self) -> bool {
        self.key.is_some()
    }

    /// 4 zero bytes followed by the little-endian counter.
    fn nonce_bytes(&self) -> [u8; 12] {
        let mut nonce = [0u8; 12];
        nonce[4..].copy_from_slice(&self.nonce.to_le_bytes());
        nonce
    }

    fn next_nonce(&mut self) -> Result<Nonce, NoiseError> {
        // 2^64-1 is reserved
        if self.nonce == u64::MAX {
            return Err(NoiseError::NonceExhausted);
        }
        let nonce = *Nonce::from_slice(&self.nonce_bytes());
        self.nonce += 1;
        Ok(nonce)
    }

    fn encrypt_with_ad(&mut self, ad: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, NoiseError> {
        if self.poisoned {
            return Err(NoiseError::Poisoned);
        }
        let Some(key) = &self.key else {
            return Ok(plaintext.to_vec());
        };
        let cipher = ChaCha20Poly1305::new(Key::from_slice(&key[..]));
        let nonce = self.next_nonce()?;
        cipher
            .encrypt(&nonce, Payload { msg: plaintext, aad: ad })
            .map_err(|_| NoiseError::EncryptionFailed)
    }

    fn decrypt_with_ad(&mut self, ad: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, NoiseError> {
        if self.poisoned {
            return Err(NoiseError::Poisoned);
        }
        let Some(key) = &self.key else {
            return Ok(ciphertext.to_vec());
        };
        if ciphertext.len() < TAG_LEN {
            return Err(NoiseError::MessageTooShort {
                needed: TAG_LEN,
                actual: ciphertext.len(),
            });
        }
        if self.nonce == u64::MAX {
            return Err(NoiseError::NonceExhausted);
        }
        let cipher = ChaCha20Poly1305::new(Key::from_slice(&key[..]));
        let nonce = *Nonce::from_slice(&self.nonce_bytes());
        match cipher.decrypt(&nonce, Payload { msg: ciphertext, aad: ad }) {
            Ok(plaintext) => {
                self.nonce += 1;
                Ok(plaintext)
            }
            Err(_) => {
                self.poisoned = true;
                self.key = None;
                Err(NoiseError::DecryptionFailed)
            }
        }
    }

    fn wipe(&mut self) {
        self.key = None;
    }
}

/// Noise HKDF with two outputs: `(ck, temp_k)`.
fn hkdf2(
    chaining_key: &[u8; 32],
    ikm: &[u8],
) -> Result<(Zeroizing<[u8; 32]>, Zeroizing<[u8; 32]>), NoiseError> {
    let hk = Hkdf::<Sha256>::new(Some(chaining_key), ikm);
    let mut okm = Zeroizing::new([0u8; 64]);
    hk.expand(&[], &mut okm[..])
        .map_err(|_| NoiseError::KeyDerivation)?;

    let mut first = Zeroizing::new([0u8; 32]);
    let mut second = Zeroizing::new([0u8; 32]);
    first.copy_from_slice(&okm[..32]);
    second.copy_from_slice(&okm[32..]);
    Ok((first, second))
}

struct SymmetricState {
    cipher: CipherState,
    chaining_key: Zeroizing<[u8; 32]>,
    hash: [u8; HASH_LEN],
}

impl SymmetricState {
    fn initialize(protocol_name: &str) -> Self {
        let name = protocol_name.as_bytes();
        let mut hash = [0u8; HASH_LEN];
        if name.len() <= HASH_LEN {
            hash[..name.len()].copy_from_slice(name);
        } else {
            hash.copy_from_slice(&Sha256::digest(name));
        }
        Self {
            cipher: CipherState::empty(),
            chaining_key: Zeroizing::new(hash),
            hash,
        }
    }

    fn mix_key(&mut self, ikm: &[u8]) -> Result<(), NoiseError> {
        let (ck, temp_k) = hkdf2(&self.chaining_key, ikm)?;
        self.chaining_key = ck;
        self.cipher = CipherState::with_key(*temp_k);
        Ok(())
    }

    fn mix_hash(&mut self, data: &[u8]) {
        let mut hasher = Sha256::new();
        hasher.update(self.hash);
        hasher.update(data);
        self.hash.copy_from_slice(&hasher.finalize());
    }

    fn encrypt_and_hash(&mut self, plaintext: &[u8]) -> Result<Vec<u8>, NoiseError> {
        let ciphertext = self.cipher.encrypt_with_ad(&self.hash, plaintext)?;
        self.mix_hash(&ciphertext);
        Ok(ciphertext)
    }

    fn decrypt_and_hash(&mut self, ciphertext: &[u8]) -> Result<Vec<u8>, NoiseError> {
        let plaintext = self.cipher.decrypt_with_ad(&self.hash, ciphertext)?;
        self.mix_hash(ciphertext);
        Ok(plaintext)
    }

    fn split(&mut self) -> Result<(CipherState, CipherState), NoiseError> {
        let (k1, k2) = hkdf2(&self.chaining_key, &[])?;
        Ok((CipherState::with_key(*k1), CipherState::with_key(*k2)))
    }

    fn wipe(&mut self) {
        self.chaining_key.zeroize();
        self.cipher.wipe();
    }
}

/// An in-progress Noise handshake.
pub struct HandshakeState {
    role: Role,
    pattern: &'static HandshakePattern,
    symmetric: SymmetricState,
    s: Option<StaticKeypair>,
    e: Option<StaticKeypair>,
    rs: Option<[u8; X25519_KEY_SIZE]>,
    re: Option<[u8; X25519_KEY_SIZE]>,
    message_index: usize,
    stage: Stage,
}

impl HandshakeState {
    /// Start a handshake as initiator.
    ///
    /// `remote_static` is required by patterns with a `<- s` pre-message.
    pub fn initiator(
        pattern: &'static HandshakePattern,
        protocol_name: &str,
        prologue: &[u8],
        local_static: StaticKeypair,
        remote_static: Option<[u8; X25519_KEY_SIZE]>,
    ) -> Result<Self, NoiseError> {
        Self::new(
            Role::Initiator,
            pattern,
            protocol_name,
            prologue,
            local_static,
            remote_static,
        )
    }

    /// Start a handshake as responder.
    pub fn responder(
        pattern: &'static HandshakePattern,
        protocol_name: &str,
        prologue: &[u8],
        local_static: StaticKeypair,
        remote_static: Option<[u8; X25519_KEY_SIZE]>,
    ) -> Result<Self, NoiseError> {
        Self::new(
            Role::Responder,
            pattern,
            protocol_name,
            prologue,
            local_static,
            remote_static,
        )
    }

    fn new(
        role: Role,
        pattern: &'static HandshakePattern,
        protocol_name: &str,
        prologue: &[u8],
        local_static: StaticKeypair,
        remote_static: Option<[u8; X25519_KEY_SIZE]>,
    ) -> Result<Self, NoiseError> {
        let mut symmetric = SymmetricState::initialize(protocol_name);
        symmetric.mix_hash(prologue);

        let local_pub = local_static.public_key();
        let (initiator_static, responder_static) = match role {
            Role::Initiator => (Some(local_pub), remote_static),
            Role::Responder => (remote_static, Some(local_pub)),
        };

        if pattern.initiator_static_known {
            let key = initiator_static.ok_or(NoiseError::MissingKey("initiator static"))?;
            symmetric.mix_hash(&key);
        }
        if pattern.responder_static_known {
            let key = responder_static.ok_or(NoiseError::MissingKey("responder static"))?;
            symmetric.mix_hash(&key);
        }

        trace!(?role, pattern = pattern.name, "noise handshake initialized");

        Ok(Self {
            role,
            pattern,
            symmetric,
            s: Some(local_static),
            e: None,
            rs: remote_static,
            re: None,
            message_index: 0,
            stage: Stage::Uninitialized,
        })
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Current transcript hash `h`.
    pub fn handshake_hash(&self) -> [u8; HASH_LEN] {
        self.symmetric.hash
    }

    /// The peer's static key, once known.
    pub fn remote_static(&self) -> Option<[u8; X25519_KEY_SIZE]> {
        self.rs
    }

    /// True when every pattern message has been processed.
    pub fn is_handshake_finished(&self) -> bool {
        self.message_index >= self.pattern.messages.len()
            && !matches!(self.stage, Stage::Failed | Stage::Transport)
    }

    /// Mix overlay data (e.g. padding) into the transcript hash.
    pub fn mix_hash(&mut self, data: &[u8]) -> Result<(), NoiseError> {
        self.ensure_active("mix_hash")?;
        self.symmetric.mix_hash(data);
        Ok(())
    }

    /// Produce the next handshake message, encrypting `payload` when a key is
    /// available.
    pub fn write_message(&mut self, payload: &[u8]) -> Result<Vec<u8>, NoiseError> {
        self.ensure_turn("write_message", true)?;
        let result = self.write_tokens(payload);
        self.finish_step(result, true)
    }

    /// Consume the next handshake message and return its payload.
    pub fn read_message(&mut self, message: &[u8]) -> Result<Vec<u8>, NoiseError> {
        self.ensure_turn("read_message", false)?;
        let result = self.read_tokens(message);
        self.finish_step(result, false)
    }

    /// Derive the transport keys. Wipes the handshake secrets.
    pub fn split(&mut self) -> Result<TransportState, NoiseError> {
        if !self.is_handshake_finished() {
            return Err(NoiseError::WrongStage {
                op: "split",
                stage: self.stage,
            });
        }
        let (c1, c2) = match self.symmetric.split() {
            Ok(keys) => keys,
            Err(e) => {
                self.fail();
                return Err(e);
            }
        };
        let (send, recv) = match self.role {
            Role::Initiator => (c1, c2),
            Role::Responder => (c2, c1),
        };
        let transport = TransportState {
            send,
            recv,
            handshake_hash: self.symmetric.hash,
            remote_static: self.rs,
        };
        self.wipe();
        self.stage = Stage::Transport;
        debug!(role = ?self.role, "noise handshake split into transport keys");
        Ok(transport)
    }

    fn ensure_active(&self, op: &'static str) -> Result<(), NoiseError> {
        match self.stage {
            Stage::Failed | Stage::Transport => Err(NoiseError::WrongStage {
                op,
                stage: self.stage,
            }),
            _ => Ok(()),
        }
    }

    fn ensure_turn(&mut self, op: &'static str, writing: bool) -> Result<(), NoiseError> {
        self.ensure_active(op)?;
        let initiator_turn = self.message_index % 2 == 0;
        let our_turn = match self.role {
            Role::Initiator => initiator_turn,
            Role::Responder => !initiator_turn,
        };
        if self.message_index >= self.pattern.messages.len() || our_turn != writing {
            let err = NoiseError::WrongStage {
                op,
                stage: self.stage,
            };
            self.fail();
            return Err(err);
        }
        Ok(())
    }

    fn finish_step<T>(
        &mut self,
        result: Result<T, NoiseError>,
        sent: bool,
    ) -> Result<T, NoiseError> {
        match result {
            Ok(value) => {
                self.stage = Stage::after(self.message_index, sent);
                self.message_index += 1;
                trace!(stage = ?self.stage, "noise handshake step");
                Ok(value)
            }
            Err(err) => {
                debug!(error = %err, stage = ?self.stage, "noise handshake failed");
                self.fail();
                Err(err)
            }
        }
    }

    fn write_tokens(&mut self, payload: &[u8]) -> Result<Vec<u8>, NoiseError> {
        let mut out = Vec::with_capacity(X25519_KEY_SIZE * 2 + payload.len() + TAG_LEN * 2);

        let tokens = self.pattern.messages[self.message_index];
        for token in tokens {
            match token {
                Token::E => {
                    let e = StaticKeypair::generate();
                    let public = e.public_key();
                    out.extend_from_slice(&public);
                    self.symmetric.mix_hash(&public);
                    self.e = Some(e);
                }
                Token::S => {
                    let s = self.s.as_ref().ok_or(NoiseError::MissingKey("local static"))?;
                    let public = s.public_key();
                    let ciphertext = self.symmetric.encrypt_and_hash(&public)?;
                    out.extend_from_slice(&ciphertext);
                }
                dh => self.mix_dh(*dh)?,
            }
        }

        let ciphertext = self.symmetric.encrypt_and_hash(payload)?;
        out.extend_from_slice(&ciphertext);
        if out.len() > MAX_MESSAGE_LEN {
            return Err(NoiseError::MessageTooLong(out.len()));
        }
        Ok(out)
    }

    fn read_tokens(&mut self, message: &[u8]) -> Result<Vec<u8>, NoiseError> {
        if message.len() > MAX_MESSAGE_LEN {
            return Err(NoiseError::MessageTooLong(message.len()));
        }
        let mut rest = message;
        let tokens = self.pattern.messages[self.message_index];

        for token in tokens {
            match token {
                Token::E => {
                    let re = take_key(&mut rest, X25519_KEY_SIZE)?;
                    let mut key = [0u8; X25519_KEY_SIZE];
                    key.copy_from_slice(re);
                    self.symmetric.mix_hash(&key);
                    self.re = Some(key);
                }
                Token::S => {
                    let len = if self.symmetric.cipher.has_key() {
                        X25519_KEY_SIZE + TAG_LEN
                    } else {
                        X25519_KEY_SIZE
                    };
                    let ciphertext = take_key(&mut rest, len)?;
                    let plaintext = self.symmetric.decrypt_and_hash(ciphertext)?;
                    let mut key = [0u8; X25519_KEY_SIZE];
                    key.copy_from_slice(&plaintext);
                    self.rs = Some(key);
                }
                dh => self.mix_dh(*dh)?,
            }
        }

        self.symmetric.decrypt_and_hash(rest)
    }

    fn mix_dh(&mut self, token: Token) -> Result<(), NoiseError> {
        let initiator = self.role == Role::Initiator;
        let (local, remote) = match token {
            Token::EE => (&self.e, self.re),
            Token::SS => (&self.s, self.rs),
            Token::ES if initiator => (&self.e, self.rs),
            Token::ES => (&self.s, self.re),
            Token::SE if initiator => (&self.s, self.re),
            Token::SE => (&self.e, self.rs),
            Token::E | Token::S => return Ok(()),
        };
        let local = local.as_ref().ok_or(NoiseError::MissingKey("local keypair"))?;
        let remote = remote.ok_or(NoiseError::MissingKey("remote public key"))?;
        let shared = Zeroizing::new(local.dh(&remote).ok_or(NoiseError::NonContributory)?);
        self.symmetric.mix_key(&shared[..])
    }

    fn fail(&mut self) {
        self.wipe();
        self.stage = Stage::Failed;
    }

    fn wipe(&mut self) {
        self.symmetric.wipe();
        self.e = None;
        self.s = None;
    }
}

fn take_key<'a>(rest: &mut &'a [u8], len: usize) -> Result<&'a [u8], NoiseError> {
    if rest.len() < len {
        return Err(NoiseError::MessageTooShort {
            needed: len,
            actual: rest.len(),
        });
    }
    let (head, tail) = rest.split_at(len);
    *rest = tail;
    Ok(head)
}

/// Two one-way cipher states derived by [`HandshakeState::split`].
pub struct TransportState {
    send: CipherState,
    recv: CipherState,
    handshake_hash: [u8; HASH_LEN],
    remote_static: Option<[u8; X25519_KEY_SIZE]>,
}

impl TransportState {
    /// Encrypt one message. Returns ciphertext (plaintext + 16-byte tag).
    pub fn encrypt(&mut self, plaintext: &[u8]) -> Result<Vec<u8>, NoiseError> {
        if plaintext.len() + TAG_LEN > MAX_MESSAGE_LEN {
            return Err(NoiseError::MessageTooLong(plaintext.len() + TAG_LEN));
        }
        self.send.encrypt_with_ad(&[], plaintext)
    }

    /// Decrypt one message. A failure poisons the receive direction.
    pub fn decrypt(&mut self, ciphertext: &[u8]) -> Result<Vec<u8>, NoiseError> {
        self.recv.decrypt_with_ad(&[], ciphertext)
    }

    pub fn handshake_hash(&self) -> &[u8; HASH_LEN] {
        &self.handshake_hash
    }

    pub fn remote_static(&self) -> Option<[u8; X25519_KEY_SIZE]> {
        self.remote_static
    }

    pub fn sending_nonce(&self) -> u64 {
        self.send.nonce
    }

    pub fn receiving_nonce(&self) -> u64 {
        self.recv.nonce
    }

    /// Separate the two directions so a writer and a reader can each own one.
    pub fn into_directions(self) -> (SendingCipher, ReceivingCipher) {
        (SendingCipher(self.send), ReceivingCipher(self.recv))
    }

    #[cfg(test)]
    pub(crate) fn set_sending_nonce(&mut self, nonce: u64) {
        self.send.nonce = nonce;
    }
}

/// Outbound half of a [`TransportState`].
pub struct SendingCipher(CipherState);

impl SendingCipher {
    pub fn encrypt(&mut self, plaintext: &[u8]) -> Result<Vec<u8>, NoiseError> {
        if plaintext.len() + TAG_LEN > MAX_MESSAGE_LEN {
            return Err(NoiseError::MessageTooLong(plaintext.len() + TAG_LEN));
        }
        self.0.encrypt_with_ad(&[], plaintext)
    }

    pub fn nonce(&self) -> u64 {
        self.0.nonce
    }
}

/// Inbound half of a [`TransportState`].
pub struct ReceivingCipher(CipherState);

impl ReceivingCipher {
    /// A failure poisons this direction for good.
    pub fn decrypt(&mut self, ciphertext: &[u8]) -> Result<Vec<u8>, NoiseError> {
        self.0.decrypt_with_ad(&[], ciphertext)
    }

    pub fn nonce(&self) -> u64 {
        self.0.nonce
    }
}

impl std::fmt::Debug for TransportState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportState")
            .field("send_nonce", &self.send.nonce)
            .field("recv_nonce", &self.recv.nonce)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hkdf2_halves_one_expansion() {
        let ck = [7u8; 32];
        let (first, second) = hkdf2(&ck, b"input key material").unwrap();
        let mut okm = [0u8; 64];
        Hkdf::<Sha256>::new(Some(&ck), b"input key material")
            .expand(&[], &mut okm)
            .unwrap();
        assert_eq!(&first[..], &okm[..32]);
        assert_eq!(&second[..], &okm[32..]);
        assert_eq!(NoiseError::KeyDerivation.kind(), ErrorKind::CryptoFailure);
    }

    fn pair() -> (HandshakeState, HandshakeState, StaticKeypair, StaticKeypair) {
        let alice = StaticKeypair::generate();
        let bob = StaticKeypair::generate();
        let initiator = HandshakeState::initiator(
            &XK,
            NTCP2_PROTOCOL_NAME,
            b"",
            alice.clone(),
            Some(bob.public_key()),
        )
        .unwrap();
        let responder =
            HandshakeState::responder(&XK, NTCP2_PROTOCOL_NAME, b"", bob.clone(), None).unwrap();
        (initiator, responder, alice, bob)
    }

    fn run(
        initiator: &mut HandshakeState,
        responder: &mut HandshakeState,
    ) -> (TransportState, TransportState) {
        let msg1 = initiator.write_message(b"opt").unwrap();
        assert_eq!(initiator.stage(), Stage::Msg1Sent);
        assert_eq!(msg1.len(), 32 + 3 + TAG_LEN);
        assert_eq!(responder.read_message(&msg1).unwrap(), b"opt");
        assert_eq!(responder.stage(), Stage::Msg1Received);

        let msg2 = responder.write_message(b"created").unwrap();
        assert_eq!(responder.stage(), Stage::Msg2Sent);
        assert_eq!(initiator.read_message(&msg2).unwrap(), b"created");
        assert_eq!(initiator.stage(), Stage::Msg2Received);

        let msg3 = initiator.write_message(b"confirmed").unwrap();
        assert_eq!(msg3.len(), 48 + 9 + TAG_LEN);
        assert_eq!(initiator.stage(), Stage::Msg3Sent);
        assert_eq!(responder.read_message(&msg3).unwrap(), b"confirmed");
        assert_eq!(responder.stage(), Stage::Msg3Received);

        (initiator.split().unwrap(), responder.split().unwrap())
    }

    #[test]
    fn test_full_handshake() {
        let (mut initiator, mut responder, alice, bob) = pair();
        let (mut i, mut r) = run(&mut initiator, &mut responder);

        assert_eq!(initiator.stage(), Stage::Transport);
        assert_eq!(responder.stage(), Stage::Transport);
        assert_eq!(i.handshake_hash(), r.handshake_hash());
        assert_eq!(i.remote_static(), Some(bob.public_key()));
        assert_eq!(r.remote_static(), Some(alice.public_key()));

        let ct = i.encrypt(b"hello responder").unwrap();
        assert_eq!(r.decrypt(&ct).unwrap(), b"hello responder");
        let ct = r.encrypt(b"hello initiator").unwrap();
        assert_eq!(i.decrypt(&ct).unwrap(), b"hello initiator");
    }

    #[test]
    fn test_transport_keys_are_complementary() {
        let (mut initiator, mut responder, _, _) = pair();
        let (i, r) = run(&mut initiator, &mut responder);

        assert_eq!(i.send.key, r.recv.key);
        assert_eq!(i.recv.key, r.send.key);
        assert_ne!(i.send.key, i.recv.key);
    }

    #[test]
    fn test_mix_hash_must_match() {
        let (mut initiator, mut responder, _, _) = pair();

        let msg1 = initiator.write_message(&[]).unwrap();
        responder.read_message(&msg1).unwrap();
        initiator.mix_hash(b"padding").unwrap();
        responder.mix_hash(b"other padding").unwrap();

        let msg2 = responder.write_message(&[]).unwrap();
        assert_eq!(
            initiator.read_message(&msg2),
            Err(NoiseError::DecryptionFailed)
        );
        assert_eq!(initiator.stage(), Stage::Failed);
    }

    #[test]
    fn test_tampered_message_fails_and_wipes() {
        let (mut initiator, mut responder, _, _) = pair();

        let mut msg1 = initiator.write_message(b"options").unwrap();
        let last = msg1.len() - 1;
        msg1[last] ^= 0x01;
        let err = responder.read_message(&msg1).unwrap_err();
        assert_eq!(err, NoiseError::DecryptionFailed);
        assert_eq!(err.kind(), ErrorKind::CryptoFailure);
        assert_eq!(responder.stage(), Stage::Failed);
        assert!(responder.symmetric.chaining_key.iter().all(|b| *b == 0));

        // terminal
        assert!(matches!(
            responder.write_message(&[]),
            Err(NoiseError::WrongStage { .. })
        ));
    }

    #[test]
    fn test_out_of_turn_rejected() {
        let (mut initiator, mut responder, _, _) = pair();
        assert!(matches!(
            responder.write_message(&[]),
            Err(NoiseError::WrongStage { .. })
        ));
        assert!(matches!(
            initiator.read_message(&[0u8; 48]),
            Err(NoiseError::WrongStage { .. })
        ));
        assert_eq!(initiator.stage(), Stage::Failed);
    }

    #[test]
    fn test_split_before_finish_rejected() {
        let (mut initiator, _, _, _) = pair();
        initiator.write_message(&[]).unwrap();
        assert!(matches!(
            initiator.split(),
            Err(NoiseError::WrongStage { .. })
        ));
    }

    #[test]
    fn test_truncated_message() {
        let (_, mut responder, _, _) = pair();
        let err = responder.read_message(&[0u8; 20]).unwrap_err();
        assert_eq!(
            err,
            NoiseError::MessageTooShort {
                needed: 32,
                actual: 20
            }
        );
        assert_eq!(err.kind(), ErrorKind::MalformedInput);
    }

    #[test]
    fn test_initiator_requires_remote_static() {
        let result = HandshakeState::initiator(
            &XK,
            XK_PROTOCOL_NAME,
            b"",
            StaticKeypair::generate(),
            None,
        );
        assert!(matches!(
            result,
            Err(NoiseError::MissingKey("responder static"))
        ));
    }

    #[test]
    fn test_wrong_responder_key_fails() {
        let alice = StaticKeypair::generate();
        let bob = StaticKeypair::generate();
        let mallory = StaticKeypair::generate();
        let mut initiator = HandshakeState::initiator(
            &XK,
            NTCP2_PROTOCOL_NAME,
            b"",
            alice,
            Some(mallory.public_key()),
        )
        .unwrap();
        let mut responder =
            HandshakeState::responder(&XK, NTCP2_PROTOCOL_NAME, b"", bob, None).unwrap();

        let msg1 = initiator.write_message(b"x").unwrap();
        assert_eq!(
            responder.read_message(&msg1),
            Err(NoiseError::DecryptionFailed)
        );
    }

    #[test]
    fn test_decrypt_failure_poisons_direction() {
        let (mut initiator, mut responder, _, _) = pair();
        let (mut i, mut r) = run(&mut initiator, &mut responder);

        let mut ct = i.encrypt(b"frame").unwrap();
        ct[0] ^= 0xff;
        assert_eq!(r.decrypt(&ct), Err(NoiseError::DecryptionFailed));

        let good = i.encrypt(b"frame").unwrap();
        assert_eq!(r.decrypt(&good), Err(NoiseError::Poisoned));

        // other direction unaffected
        let ct = r.encrypt(b"back").unwrap();
        assert_eq!(i.decrypt(&ct).unwrap(), b"back");
    }

    #[test]
    fn test_directions_stay_paired() {
        let (mut initiator, mut responder, _, _) = pair();
        let (i, r) = run(&mut initiator, &mut responder);
        let (mut i_send, mut i_recv) = i.into_directions();
        let (mut r_send, mut r_recv) = r.into_directions();

        for n in 0..3u64 {
            let ct = i_send.encrypt(b"up").unwrap();
            assert_eq!(r_recv.decrypt(&ct).unwrap(), b"up");
            assert_eq!(r_recv.nonce(), n + 1);
        }
        let ct = r_send.encrypt(b"down").unwrap();
        assert_eq!(i_recv.decrypt(&ct).unwrap(), b"down");
        assert_eq!(i_send.nonce(), 3);
    }

    #[test]
    fn test_replay_rejected() {
        let (mut initiator, mut responder, _, _) = pair();
        let (mut i, mut r) = run(&mut initiator, &mut responder);

        let ct = i.encrypt(b"once").unwrap();
        assert_eq!(r.decrypt(&ct).unwrap(), b"once");
        assert_eq!(r.decrypt(&ct), Err(NoiseError::DecryptionFailed));
    }

    #[test]
    fn test_nonce_exhaustion() {
        let (mut initiator, mut responder, _, _) = pair();
        let (mut i, _) = run(&mut initiator, &mut responder);

        i.set_sending_nonce(u64::MAX - 1);
        assert!(i.encrypt(b"last").is_ok());
        assert_eq!(i.encrypt(b"one more"), Err(NoiseError::NonceExhausted));
    }

    #[test]
    fn test_short_protocol_name_is_padded() {
        let state = SymmetricState::initialize("Noise_NN");
        assert_eq!(&state.hash[..8], b"Noise_NN");
        assert!(state.hash[8..].iter().all(|b| *b == 0));

        let long = SymmetricState::initialize(NTCP2_PROTOCOL_NAME);
        let digest = Sha256::digest(NTCP2_PROTOCOL_NAME.as_bytes());
        assert_eq!(&long.hash[..], &digest[..]);
    }
}
