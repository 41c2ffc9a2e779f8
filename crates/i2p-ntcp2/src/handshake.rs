//! Handshake driver.
//!
//! Runs the three handshake messages in order over a stream it borrows
//! exclusively, so nothing else can interleave reads or writes until the
//! transport keys exist. Every read and write is bounded by one deadline.
//!
//! ```text
//! initiator                              responder
//!   SessionRequest   ------------------>
//!                    <------------------   SessionCreated
//!   SessionConfirmed ------------------>
//!   split()                                split()
//! ```

use std::net::SocketAddr;
use std::sync::Arc;

use i2p_common::helpers::{constant_time_eq, short_hex};
use i2p_crypto::{DomainParameters, Role, StaticKeypair, TransportState};
use i2p_data::{RouterAddress, RouterHash, RouterInfo, NTCP2_STYLE};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout_at;
use tracing::{info, trace, warn};

use crate::config::TransportConfig;
use crate::error::Ntcp2Error;
use crate::messages::{Deadline, HandshakeContext, MessageType};

/// This router's published descriptor and the static key behind its NTCP2
/// address.
#[derive(Debug, Clone)]
pub struct LocalRouter {
    router_info: Arc<RouterInfo>,
    static_keypair: StaticKeypair,
}

impl LocalRouter {
    /// The descriptor must carry an NTCP2 address whose `s` option is the
    /// public half of `static_keypair`; peers check exactly that.
    pub fn new(router_info: RouterInfo, static_keypair: StaticKeypair) -> Result<Self, Ntcp2Error> {
        let address = router_info
            .address_for(NTCP2_STYLE)
            .ok_or_else(|| Ntcp2Error::Config("router info has no NTCP2 address".into()))?;
        let published = address.static_key()?;
        if !constant_time_eq(&published, &static_keypair.public_key()) {
            return Err(Ntcp2Error::Config(
                "NTCP2 address static key does not match the keypair".into(),
            ));
        }
        Ok(Self {
            router_info: Arc::new(router_info),
            static_keypair,
        })
    }

    pub fn router_info(&self) -> &Arc<RouterInfo> {
        &self.router_info
    }

    pub fn hash(&self) -> RouterHash {
        self.router_info.hash()
    }

    pub fn static_keypair(&self) -> &StaticKeypair {
        &self.static_keypair
    }

    pub fn static_public_key(&self) -> [u8; 32] {
        self.static_keypair.public_key()
    }
}

/// Where and to whom an outbound session connects: the first NTCP2 address
/// of a peer descriptor whose signature checks out.
#[derive(Debug, Clone)]
pub struct SessionTarget {
    router_info: Arc<RouterInfo>,
    hash: RouterHash,
    address: RouterAddress,
    static_key: [u8; 32],
}

impl SessionTarget {
    pub fn from_router_info(
        router_info: Arc<RouterInfo>,
        params: &Arc<DomainParameters>,
    ) -> Result<Self, Ntcp2Error> {
        let hash = router_info.hash();
        if let Err(e) = router_info.verify(params) {
            warn!(
                peer = %short_hex(hash.as_bytes()),
                error = %e,
                "rejecting unverified router info"
            );
            return Err(e.into());
        }
        let address = router_info
            .address_for(NTCP2_STYLE)
            .ok_or_else(|| {
                Ntcp2Error::Incompatible(format!(
                    "{} has no NTCP2 address",
                    short_hex(hash.as_bytes())
                ))
            })?
            .clone();
        let static_key = address.static_key().map_err(|e| {
            Ntcp2Error::Incompatible(format!("{}: {}", short_hex(hash.as_bytes()), e))
        })?;
        Ok(Self {
            router_info,
            hash,
            address,
            static_key,
        })
    }

    pub fn router_info(&self) -> &Arc<RouterInfo> {
        &self.router_info
    }

    pub fn hash(&self) -> RouterHash {
        self.hash
    }

    pub fn address(&self) -> &RouterAddress {
        &self.address
    }

    /// The peer's static key from the address's `s` option.
    pub fn static_key(&self) -> &[u8; 32] {
        &self.static_key
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, Ntcp2Error> {
        self.address
            .socket_addr()
            .map_err(|e| Ntcp2Error::Incompatible(e.to_string()))
    }
}

/// Outcome of a completed handshake.
pub struct Handshake {
    pub role: Role,
    pub transport: TransportState,
    /// Dialed descriptor for the initiator, verified descriptor from message 3
    /// for the responder.
    pub peer: Arc<RouterInfo>,
}

impl std::fmt::Debug for Handshake {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handshake")
            .field("role", &self.role)
            .field("peer", &self.peer.hash())
            .finish_non_exhaustive()
    }
}

/// Run the initiator side over `stream`.
pub async fn initiate<S>(
    stream: &mut S,
    local: &LocalRouter,
    target: &SessionTarget,
    config: &TransportConfig,
    params: Arc<DomainParameters>,
    deadline: Deadline,
) -> Result<Handshake, Ntcp2Error>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let ctx = HandshakeContext::initiator(local, target, config, params)?;
    drive(stream, ctx, deadline).await
}

/// Run the responder side over `stream`.
pub async fn respond<S>(
    stream: &mut S,
    local: &LocalRouter,
    config: &TransportConfig,
    params: Arc<DomainParameters>,
    deadline: Deadline,
) -> Result<Handshake, Ntcp2Error>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let ctx = HandshakeContext::responder(local, config, params)?;
    drive(stream, ctx, deadline).await
}

async fn drive<S>(
    stream: &mut S,
    mut ctx: HandshakeContext,
    deadline: Deadline,
) -> Result<Handshake, Ntcp2Error>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let role = ctx.role();
    for message in MessageType::ALL {
        if message.sender() == role {
            let cleartext = message.create(&mut ctx)?;
            let wire = message.apply_crypto(cleartext, &mut ctx)?;
            write_all_by(stream, &wire, deadline, message.name()).await?;
        } else {
            message.read(stream, &mut ctx, deadline).await?;
        }
        trace!(?role, message = message.name(), stage = ?ctx.noise().stage(), "handshake step");
    }

    let (transport, peer) = ctx.finish()?;
    info!(?role, peer = %short_hex(peer.hash().as_bytes()), "NTCP2 handshake complete");
    Ok(Handshake {
        role,
        transport,
        peer,
    })
}

async fn write_all_by<S>(
    stream: &mut S,
    data: &[u8],
    deadline: Deadline,
    context: &'static str,
) -> Result<(), Ntcp2Error>
where
    S: AsyncWrite + Unpin,
{
    let write = async {
        stream.write_all(data).await?;
        stream.flush().await
    };
    match timeout_at(deadline, write).await {
        Ok(result) => Ok(result?),
        Err(_) => Err(Ntcp2Error::Timeout(context)),
    }
}
