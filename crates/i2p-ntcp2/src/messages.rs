//! Handshake message processors.
//!
//! ```text
//! SessionRequest   (initiator -> responder)
//! +-------------+-------------------------+-----------+
//! | obf(X) [32] | AEAD(options)[11 + 16]  | padding   |
//! +-------------+-------------------------+-----------+
//!
//! SessionCreated   (responder -> initiator)
//! +-------------+-------------------------+-----------+
//! | obf(Y) [32] | AEAD(options)[8 + 16]   | padding   |
//! +-------------+-------------------------+-----------+
//!
//! SessionConfirmed (initiator -> responder)
//! +-------------+-------------------------------------+
//! | AEAD(s)[48] | AEAD(blocks)[M3P2Len from request]  |
//! +-------------+-------------------------------------+
//! ```
//!
//! Ephemeral keys are AES-256-CBC encrypted under the responder's static key.
//! Both messages use a zero IV.
//! Padding is mixed into the transcript hash after the message it trails.

use std::sync::Arc;

use i2p_common::helpers::{constant_time_eq, short_hex};
use i2p_crypto::noise::{MAX_MESSAGE_LEN, NTCP2_PROTOCOL_NAME, TAG_LEN, XK};
use i2p_crypto::obfuscation::{deobfuscate, obfuscate, ZERO_IV};
use i2p_crypto::{DomainParameters, HandshakeState, Role, TransportState};
use i2p_data::{Date, RouterInfo, NTCP2_STYLE};
use rand::RngCore;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::time::{timeout_at, Instant};
use tracing::debug;

use crate::config::{PaddingPolicy, TransportConfig};
use crate::error::Ntcp2Error;
use crate::frame::{decode_blocks, encode_blocks, Block};
use crate::handshake::{LocalRouter, SessionTarget};
use crate::options::{
    SessionCreatedOptions, SessionRequestOptions, PROTOCOL_VERSION, SESSION_CREATED_OPTIONS_SIZE,
    SESSION_REQUEST_OPTIONS_SIZE,
};

/// Ceiling for any handshake message, checked before allocating for a
/// declared length.
pub const MAX_HANDSHAKE_MESSAGE: usize = 65537;

pub const EPHEMERAL_KEY_SIZE: usize = 32;
pub const SESSION_REQUEST_SIZE: usize = EPHEMERAL_KEY_SIZE + SESSION_REQUEST_OPTIONS_SIZE + TAG_LEN;
pub const SESSION_CREATED_SIZE: usize = EPHEMERAL_KEY_SIZE + SESSION_CREATED_OPTIONS_SIZE + TAG_LEN;
/// Encrypted initiator static key.
pub const SESSION_CONFIRMED_PART1_SIZE: usize = 32 + TAG_LEN;

/// Point in time after which a handshake step is abandoned.
pub type Deadline = Instant;

/// State shared by the processors of one handshake.
pub struct HandshakeContext {
    noise: HandshakeState,
    /// The responder's static public key, used for obfuscation by both sides.
    obfuscation_key: [u8; 32],
    network_id: u16,
    max_clock_skew_secs: u64,
    padding: PaddingPolicy,
    local_router_info: Arc<RouterInfo>,
    params: Arc<DomainParameters>,
    /// Initiator: blocks for message 3, fixed when message 1 declares their length.
    confirmed_blocks: Option<Vec<Block>>,
    /// Declared length of message 3's payload part.
    confirmed_part2_len: Option<usize>,
    peer: Option<Arc<RouterInfo>>,
}

impl HandshakeContext {
    pub fn initiator(
        local: &LocalRouter,
        target: &SessionTarget,
        config: &TransportConfig,
        params: Arc<DomainParameters>,
    ) -> Result<Self, Ntcp2Error> {
        let noise = HandshakeState::initiator(
            &XK,
            NTCP2_PROTOCOL_NAME,
            &[],
            local.static_keypair().clone(),
            Some(*target.static_key()),
        )?;
        Ok(Self::new(
            noise,
            *target.static_key(),
            local,
            config,
            params,
            Some(target.router_info().clone()),
        ))
    }

    pub fn responder(
        local: &LocalRouter,
        config: &TransportConfig,
        params: Arc<DomainParameters>,
    ) -> Result<Self, Ntcp2Error> {
        let noise = HandshakeState::responder(
            &XK,
            NTCP2_PROTOCOL_NAME,
            &[],
            local.static_keypair().clone(),
            None,
        )?;
        Ok(Self::new(
            noise,
            local.static_public_key(),
            local,
            config,
            params,
            None,
        ))
    }

    fn new(
        noise: HandshakeState,
        obfuscation_key: [u8; 32],
        local: &LocalRouter,
        config: &TransportConfig,
        params: Arc<DomainParameters>,
        peer: Option<Arc<RouterInfo>>,
    ) -> Self {
        Self {
            noise,
            obfuscation_key,
            network_id: config.network_id,
            max_clock_skew_secs: config.max_clock_skew_secs,
            padding: config.padding,
            local_router_info: local.router_info().clone(),
            params,
            confirmed_blocks: None,
            confirmed_part2_len: None,
            peer,
        }
    }

    pub fn role(&self) -> Role {
        self.noise.role()
    }

    /// The engine, for inspection.
    pub fn noise(&self) -> &HandshakeState {
        &self.noise
    }

    /// The authenticated peer descriptor, once known.
    pub fn peer(&self) -> Option<&Arc<RouterInfo>> {
        self.peer.as_ref()
    }

    /// Derive transport keys after the last message.
    pub fn finish(mut self) -> Result<(TransportState, Arc<RouterInfo>), Ntcp2Error> {
        let peer = self
            .peer
            .take()
            .ok_or_else(|| Ntcp2Error::protocol("handshake", "peer router info missing"))?;
        let transport = self.noise.split()?;
        Ok((transport, peer))
    }

    fn check_skew(&self, context: &'static str, peer_secs: u32) -> Result<(), Ntcp2Error> {
        let now = i64::from(Date::now().seconds());
        let skew = i64::from(peer_secs) - now;
        if skew.unsigned_abs() > self.max_clock_skew_secs {
            debug!(context, skew, "peer clock out of range");
            return Err(Ntcp2Error::ClockSkew {
                skew_secs: skew,
                max_secs: self.max_clock_skew_secs,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRequest {
    pub options: SessionRequestOptions,
    pub padding: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionCreated {
    pub options: SessionCreatedOptions,
    pub padding: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfirmed {
    pub blocks: Vec<Block>,
}

impl SessionConfirmed {
    /// The router info block's payload.
    pub fn router_info(&self) -> Option<&[u8]> {
        self.blocks.iter().find_map(|b| match b {
            Block::RouterInfo { data, .. } => Some(data.as_slice()),
            _ => None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeMessage {
    SessionRequest(SessionRequest),
    SessionCreated(SessionCreated),
    SessionConfirmed(SessionConfirmed),
}

impl HandshakeMessage {
    pub fn message_type(&self) -> MessageType {
        match self {
            HandshakeMessage::SessionRequest(_) => MessageType::SessionRequest,
            HandshakeMessage::SessionCreated(_) => MessageType::SessionCreated,
            HandshakeMessage::SessionConfirmed(_) => MessageType::SessionConfirmed,
        }
    }
}

/// The three handshake messages, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    SessionRequest = 1,
    SessionCreated = 2,
    SessionConfirmed = 3,
}

impl TryFrom<u8> for MessageType {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(MessageType::SessionRequest),
            2 => Ok(MessageType::SessionCreated),
            3 => Ok(MessageType::SessionConfirmed),
            _ => Err(()),
        }
    }
}

impl MessageType {
    pub const ALL: [MessageType; 3] = [
        MessageType::SessionRequest,
        MessageType::SessionCreated,
        MessageType::SessionConfirmed,
    ];

    pub fn name(self) -> &'static str {
        match self {
            MessageType::SessionRequest => "session request",
            MessageType::SessionCreated => "session created",
            MessageType::SessionConfirmed => "session confirmed",
        }
    }

    pub fn sender(self) -> Role {
        match self {
            MessageType::SessionRequest | MessageType::SessionConfirmed => Role::Initiator,
            MessageType::SessionCreated => Role::Responder,
        }
    }

    /// Whether the message starts with an AES-obfuscated ephemeral key.
    pub fn obfuscates_ephemeral(self) -> bool {
        match self {
            MessageType::SessionRequest => true,
            MessageType::SessionCreated => true,
            MessageType::SessionConfirmed => false,
        }
    }

    /// Build this message's cleartext for the local side.
    pub fn create(self, ctx: &mut HandshakeContext) -> Result<HandshakeMessage, Ntcp2Error> {
        self.ensure_sender(ctx)?;
        let timestamp = Date::now().seconds();
        match self {
            MessageType::SessionRequest => {
                let blocks = confirmed_blocks(ctx)?;
                let part2_len = blocks.iter().map(Block::encoded_len).sum::<usize>() + TAG_LEN;
                let padding = random_padding(ctx.padding.pick(usize::from(u8::MAX)));
                let options = SessionRequestOptions {
                    network_id: ctx.network_id,
                    version: PROTOCOL_VERSION,
                    padding_len: padding.len() as u8,
                    message3_part2_len: part2_len as u16,
                    timestamp,
                };
                ctx.confirmed_blocks = Some(blocks);
                ctx.confirmed_part2_len = Some(part2_len);
                Ok(HandshakeMessage::SessionRequest(SessionRequest { options, padding }))
            }
            MessageType::SessionCreated => {
                let limit =
                    (MAX_HANDSHAKE_MESSAGE - SESSION_CREATED_SIZE).min(usize::from(u16::MAX));
                let padding = random_padding(ctx.padding.pick(limit));
                let options = SessionCreatedOptions {
                    padding_len: padding.len() as u16,
                    timestamp,
                };
                Ok(HandshakeMessage::SessionCreated(SessionCreated { options, padding }))
            }
            MessageType::SessionConfirmed => {
                let blocks = ctx.confirmed_blocks.take().ok_or_else(|| {
                    Ntcp2Error::protocol(self.name(), "created before the session request")
                })?;
                Ok(HandshakeMessage::SessionConfirmed(SessionConfirmed { blocks }))
            }
        }
    }

    /// Run the engine over `message` and produce its wire bytes.
    pub fn apply_crypto(
        self,
        message: HandshakeMessage,
        ctx: &mut HandshakeContext,
    ) -> Result<Vec<u8>, Ntcp2Error> {
        self.ensure_sender(ctx)?;
        if message.message_type() != self {
            return Err(Ntcp2Error::protocol(
                self.name(),
                format!("given a {} message", message.message_type().name()),
            ));
        }

        let (payload, padding) = match message {
            HandshakeMessage::SessionRequest(m) => (m.options.encode().to_vec(), m.padding),
            HandshakeMessage::SessionCreated(m) => (m.options.encode().to_vec(), m.padding),
            HandshakeMessage::SessionConfirmed(m) => {
                let payload = encode_blocks(&m.blocks)?;
                if Some(payload.len() + TAG_LEN) != ctx.confirmed_part2_len {
                    return Err(Ntcp2Error::protocol(
                        self.name(),
                        "payload length differs from the length declared in message 1",
                    ));
                }
                (payload, Vec::new())
            }
        };

        let mut wire = ctx.noise.write_message(&payload)?;
        if self.obfuscates_ephemeral() {
            let key = ephemeral_key(&wire);
            let obfuscated = obfuscate(&key, &ctx.obfuscation_key, &ZERO_IV)?;
            wire[..EPHEMERAL_KEY_SIZE].copy_from_slice(&obfuscated);
        }
        if !padding.is_empty() {
            ctx.noise.mix_hash(&padding)?;
            wire.extend_from_slice(&padding);
        }
        debug!(message = self.name(), len = wire.len(), "handshake message ready");
        Ok(wire)
    }

    /// Read, decrypt and validate this message from the peer.
    pub async fn read<S>(
        self,
        stream: &mut S,
        ctx: &mut HandshakeContext,
        deadline: Deadline,
    ) -> Result<HandshakeMessage, Ntcp2Error>
    where
        S: AsyncRead + Unpin,
    {
        if self.sender() == ctx.role() {
            return Err(Ntcp2Error::protocol(self.name(), "read by its own sender"));
        }

        let fixed = match self {
            MessageType::SessionRequest => SESSION_REQUEST_SIZE,
            MessageType::SessionCreated => SESSION_CREATED_SIZE,
            MessageType::SessionConfirmed => {
                let part2 = ctx.confirmed_part2_len.ok_or_else(|| {
                    Ntcp2Error::protocol(self.name(), "read before the session request")
                })?;
                SESSION_CONFIRMED_PART1_SIZE + part2
            }
        };
        check_ceiling(self, fixed)?;

        let mut wire = vec![0u8; fixed];
        read_exact_by(stream, &mut wire, deadline, self.name()).await?;
        if self.obfuscates_ephemeral() {
            let obfuscated = ephemeral_key(&wire);
            let key = deobfuscate(&obfuscated, &ctx.obfuscation_key, &ZERO_IV)?;
            wire[..EPHEMERAL_KEY_SIZE].copy_from_slice(&key);
        }
        let payload = ctx.noise.read_message(&wire)?;

        let message = match self {
            MessageType::SessionRequest => {
                let options = SessionRequestOptions::decode(&payload)?;
                validate_request(ctx, &options)?;
                let padding_len = usize::from(options.padding_len);
                check_ceiling(self, fixed + padding_len)?;
                let padding = read_padding(stream, ctx, padding_len, deadline, self).await?;
                ctx.confirmed_part2_len = Some(usize::from(options.message3_part2_len));
                HandshakeMessage::SessionRequest(SessionRequest { options, padding })
            }
            MessageType::SessionCreated => {
                let options = SessionCreatedOptions::decode(&payload)?;
                ctx.check_skew(self.name(), options.timestamp)?;
                let padding_len = usize::from(options.padding_len);
                check_ceiling(self, fixed + padding_len)?;
                let padding = read_padding(stream, ctx, padding_len, deadline, self).await?;
                HandshakeMessage::SessionCreated(SessionCreated { options, padding })
            }
            MessageType::SessionConfirmed => {
                let blocks = decode_blocks(&payload)?;
                let confirmed = SessionConfirmed { blocks };
                let peer = authenticate_peer(ctx, &confirmed)?;
                ctx.peer = Some(Arc::new(peer));
                HandshakeMessage::SessionConfirmed(confirmed)
            }
        };
        debug!(message = self.name(), "handshake message accepted");
        Ok(message)
    }

    /// Padding bytes declared by `message`.
    pub fn padding_len(message: &HandshakeMessage) -> usize {
        match message {
            HandshakeMessage::SessionRequest(m) => usize::from(m.options.padding_len),
            HandshakeMessage::SessionCreated(m) => usize::from(m.options.padding_len),
            HandshakeMessage::SessionConfirmed(m) => m
                .blocks
                .iter()
                .map(|b| match b {
                    Block::Padding(len) => *len,
                    _ => 0,
                })
                .sum(),
        }
    }

    fn ensure_sender(self, ctx: &HandshakeContext) -> Result<(), Ntcp2Error> {
        if self.sender() != ctx.role() {
            return Err(Ntcp2Error::protocol(
                self.name(),
                format!("not sent by the {:?}", ctx.role()),
            ));
        }
        Ok(())
    }
}

/// Message 3's blocks: our router info plus optional padding, sized so the
/// whole message fits one Noise message.
fn confirmed_blocks(ctx: &HandshakeContext) -> Result<Vec<Block>, Ntcp2Error> {
    let limit = MAX_MESSAGE_LEN - SESSION_CONFIRMED_PART1_SIZE;
    let router_info = Block::RouterInfo {
        flags: 0,
        data: ctx.local_router_info.to_bytes()?,
    };
    let used = router_info.encoded_len() + TAG_LEN;
    if used > limit {
        return Err(Ntcp2Error::TooLarge {
            context: MessageType::SessionConfirmed.name(),
            declared: used,
            max: limit,
        });
    }

    let mut blocks = vec![router_info];
    let room = limit - used;
    if room > crate::frame::BLOCK_HEADER_SIZE {
        let padding = ctx.padding.pick(room - crate::frame::BLOCK_HEADER_SIZE);
        if padding > 0 {
            blocks.push(Block::Padding(padding));
        }
    }
    Ok(blocks)
}

fn validate_request(
    ctx: &HandshakeContext,
    options: &SessionRequestOptions,
) -> Result<(), Ntcp2Error> {
    let name = MessageType::SessionRequest.name();
    if options.network_id != ctx.network_id {
        return Err(Ntcp2Error::protocol(
            name,
            format!("network id {} (expected {})", options.network_id, ctx.network_id),
        ));
    }
    if options.version != PROTOCOL_VERSION {
        return Err(Ntcp2Error::protocol(
            name,
            format!("unsupported version {}", options.version),
        ));
    }
    ctx.check_skew(name, options.timestamp)?;

    let part2 = usize::from(options.message3_part2_len);
    check_ceiling(MessageType::SessionConfirmed, SESSION_CONFIRMED_PART1_SIZE + part2)?;
    if part2 < TAG_LEN {
        return Err(Ntcp2Error::protocol(
            name,
            format!("message 3 length {} shorter than the tag", part2),
        ));
    }
    Ok(())
}

/// Check the router info carried in message 3 against the static key Noise
/// authenticated.
fn authenticate_peer(
    ctx: &HandshakeContext,
    message: &SessionConfirmed,
) -> Result<RouterInfo, Ntcp2Error> {
    let name = MessageType::SessionConfirmed.name();
    let data = message
        .router_info()
        .ok_or_else(|| Ntcp2Error::protocol(name, "no router info block"))?;
    let (peer, _) = RouterInfo::read(data)?.strict()?;
    peer.verify(&ctx.params)?;

    let hash = peer.hash();
    let address = peer
        .address_for(NTCP2_STYLE)
        .ok_or_else(|| Ntcp2Error::protocol(name, "router info has no NTCP2 address"))?;
    let published = address.static_key()?;
    let authenticated = ctx
        .noise
        .remote_static()
        .ok_or_else(|| Ntcp2Error::protocol(name, "initiator static key not received"))?;
    if !constant_time_eq(&published, &authenticated) {
        return Err(Ntcp2Error::StaticKeyMismatch(short_hex(hash.as_bytes())));
    }
    debug!(peer = %short_hex(hash.as_bytes()), "peer router info verified");
    Ok(peer)
}

/// Message 3 carries no padding outside Noise, so its whole length must fit
/// one Noise message.
fn check_ceiling(message: MessageType, declared: usize) -> Result<(), Ntcp2Error> {
    let max = match message {
        MessageType::SessionConfirmed => MAX_MESSAGE_LEN,
        _ => MAX_HANDSHAKE_MESSAGE,
    };
    if declared > max {
        return Err(Ntcp2Error::TooLarge {
            context: message.name(),
            declared,
            max,
        });
    }
    Ok(())
}

fn ephemeral_key(wire: &[u8]) -> [u8; EPHEMERAL_KEY_SIZE] {
    let mut key = [0u8; EPHEMERAL_KEY_SIZE];
    key.copy_from_slice(&wire[..EPHEMERAL_KEY_SIZE]);
    key
}

fn random_padding(len: usize) -> Vec<u8> {
    let mut padding = vec![0u8; len];
    rand::thread_rng().fill_bytes(&mut padding);
    padding
}

async fn read_padding<S>(
    stream: &mut S,
    ctx: &mut HandshakeContext,
    len: usize,
    deadline: Deadline,
    message: MessageType,
) -> Result<Vec<u8>, Ntcp2Error>
where
    S: AsyncRead + Unpin,
{
    let mut padding = vec![0u8; len];
    if len > 0 {
        read_exact_by(stream, &mut padding, deadline, message.name()).await?;
        ctx.noise.mix_hash(&padding)?;
    }
    Ok(padding)
}

pub(crate) async fn read_exact_by<S>(
    stream: &mut S,
    buf: &mut [u8],
    deadline: Deadline,
    context: &'static str,
) -> Result<(), Ntcp2Error>
where
    S: AsyncRead + Unpin,
{
    match timeout_at(deadline, stream.read_exact(buf)).await {
        Ok(result) => {
            result?;
            Ok(())
        }
        Err(_) => Err(Ntcp2Error::Timeout(context)),
    }
}
