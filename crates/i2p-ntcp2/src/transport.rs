//! NTCP2 transport: dials and accepts sessions, keyed by peer router hash.
//!
//! Handshakes run outside the table lock. When two sessions to the same peer
//! complete at once (for example a dial racing the peer's own dial), the one
//! already in the table wins if it is still open and the newcomer is closed.

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use i2p_common::helpers::short_hex;
use i2p_crypto::DomainParameters;
use i2p_data::{RouterHash, RouterInfo, NTCP2_STYLE};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, warn};

use crate::config::TransportConfig;
use crate::error::Ntcp2Error;
use crate::handshake::{LocalRouter, SessionTarget};
use crate::session::{Session, SessionState};

pub const TRANSPORT_NAME: &str = "NTCP2";

pub struct Ntcp2Transport {
    local: LocalRouter,
    config: TransportConfig,
    params: Arc<DomainParameters>,
    listener: Mutex<Option<Arc<TcpListener>>>,
    sessions: tokio::sync::Mutex<HashMap<RouterHash, Arc<Session>>>,
    /// Peers with an outbound handshake in flight.
    dialing: Arc<Mutex<HashSet<RouterHash>>>,
}

impl std::fmt::Debug for Ntcp2Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ntcp2Transport")
            .field("local", &self.local.hash())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Ntcp2Transport {
    pub fn new(local: LocalRouter, config: TransportConfig) -> Result<Self, Ntcp2Error> {
        config.validate()?;
        Ok(Self {
            local,
            config,
            params: DomainParameters::network().shared(),
            listener: Mutex::new(None),
            sessions: tokio::sync::Mutex::new(HashMap::new()),
            dialing: Arc::new(Mutex::new(HashSet::new())),
        })
    }

    /// Use `params` to verify legacy DSA descriptors.
    pub fn with_domain_parameters(mut self, params: Arc<DomainParameters>) -> Self {
        self.params = params;
        self
    }

    pub fn name(&self) -> &'static str {
        TRANSPORT_NAME
    }

    pub fn local(&self) -> &LocalRouter {
        &self.local
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    /// True when `router_info` is validly signed and has an NTCP2 address with
    /// a usable static key and socket address.
    pub fn compatible(&self, router_info: &RouterInfo) -> bool {
        if router_info.verify(&self.params).is_err() {
            return false;
        }
        router_info
            .address_for(NTCP2_STYLE)
            .map(|a| a.static_key().is_ok() && a.socket_addr().is_ok())
            .unwrap_or(false)
    }

    /// Bind `addr` and accept sessions on it. Returns the bound address.
    pub async fn listen(&self, addr: SocketAddr) -> Result<SocketAddr, Ntcp2Error> {
        let listener = TcpListener::bind(addr).await?;
        self.listen_on(listener)
    }

    /// Accept sessions on an already bound listener.
    pub fn listen_on(&self, listener: TcpListener) -> Result<SocketAddr, Ntcp2Error> {
        let addr = listener.local_addr()?;
        *lock(&self.listener) = Some(Arc::new(listener));
        info!(%addr, "NTCP2 listening");
        Ok(addr)
    }

    /// A live session to the peer, dialing one if needed.
    pub async fn get_session(
        &self,
        router_info: Arc<RouterInfo>,
    ) -> Result<Arc<Session>, Ntcp2Error> {
        let target = SessionTarget::from_router_info(router_info, &self.params)?;
        let hash = target.hash();
        if let Some(session) = self.live_session(&hash).await {
            return Ok(session);
        }
        self.ensure_capacity().await?;
        let addr = target.socket_addr()?;

        let _dialing = DialGuard::new(self.dialing.clone(), hash);
        let deadline = Instant::now() + self.config.handshake_timeout();
        let stream = match timeout_at(deadline, TcpStream::connect(addr)).await {
            Ok(stream) => stream?,
            Err(_) => return Err(Ntcp2Error::Timeout("connect")),
        };
        stream.set_nodelay(true)?;
        debug!(peer = %short_hex(hash.as_bytes()), %addr, "connected");

        let session = Session::outbound(
            stream,
            &self.local,
            &target,
            &self.config,
            self.params.clone(),
        )
        .await
        .map_err(|e| {
            warn!(peer = %short_hex(hash.as_bytes()), error = %e, "outbound handshake failed");
            e
        })?;
        self.insert(session).await
    }

    /// Wait for the next inbound connection and complete its handshake.
    pub async fn accept(&self) -> Result<Arc<Session>, Ntcp2Error> {
        let listener = lock(&self.listener)
            .clone()
            .ok_or_else(|| Ntcp2Error::Config("transport is not listening".into()))?;
        let (stream, remote) = listener.accept().await?;
        stream.set_nodelay(true)?;
        debug!(%remote, "inbound connection");

        if let Err(e) = self.ensure_capacity().await {
            warn!(%remote, "rejecting inbound connection: {}", e);
            return Err(e);
        }

        let session = Session::inbound(stream, &self.local, &self.config, self.params.clone())
            .await
            .map_err(|e| {
                warn!(%remote, error = %e, "inbound handshake failed");
                e
            })?;
        self.insert(session).await
    }

    /// Close and forget the session with `hash`. Returns false if there was none.
    pub async fn close_session(&self, hash: &RouterHash) -> Result<bool, Ntcp2Error> {
        let session = self.sessions.lock().await.remove(hash);
        match session {
            Some(session) => {
                session.close().await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Stop listening and close every session.
    pub async fn close(&self) -> Result<(), Ntcp2Error> {
        lock(&self.listener).take();
        let sessions: Vec<_> = self.sessions.lock().await.drain().map(|(_, s)| s).collect();
        for session in sessions {
            if let Err(e) = session.close().await {
                debug!(peer = %short_hex(session.peer_hash().as_bytes()), error = %e, "close failed");
            }
        }
        info!("NTCP2 transport closed");
        Ok(())
    }

    /// Number of open sessions.
    pub async fn session_count(&self) -> usize {
        let mut sessions = self.sessions.lock().await;
        sessions.retain(|_, s| s.is_open());
        sessions.len()
    }

    /// Lifecycle state of the session with `hash`, if any. Inbound sessions
    /// are only known once their handshake completes.
    pub async fn session_state(&self, hash: &RouterHash) -> Option<SessionState> {
        if let Some(session) = self.sessions.lock().await.get(hash) {
            if session.is_open() {
                return Some(SessionState::Established);
            }
        }
        if lock(&self.dialing).contains(hash) {
            return Some(SessionState::Handshaking);
        }
        self.sessions.lock().await.get(hash).map(|s| s.state())
    }

    async fn live_session(&self, hash: &RouterHash) -> Option<Arc<Session>> {
        let sessions = self.sessions.lock().await;
        sessions.get(hash).filter(|s| s.is_open()).cloned()
    }

    async fn ensure_capacity(&self) -> Result<(), Ntcp2Error> {
        if self.session_count().await >= self.config.max_sessions {
            return Err(Ntcp2Error::SessionLimit(self.config.max_sessions));
        }
        Ok(())
    }

    async fn insert(&self, session: Session) -> Result<Arc<Session>, Ntcp2Error> {
        let session = Arc::new(session);
        let hash = session.peer_hash();

        let mut sessions = self.sessions.lock().await;
        sessions.retain(|_, s| s.is_open());
        let outcome = match sessions.get(&hash).cloned() {
            Some(existing) => {
                debug!(peer = %short_hex(hash.as_bytes()), "duplicate session, keeping the live one");
                Ok(existing)
            }
            None if sessions.len() >= self.config.max_sessions => {
                Err(Ntcp2Error::SessionLimit(self.config.max_sessions))
            }
            None => {
                sessions.insert(hash, session.clone());
                return Ok(session);
            }
        };
        drop(sessions);

        if let Err(e) = session.close().await {
            debug!(error = %e, "closing surplus session");
        }
        outcome
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Marks a peer as dialing for as long as it lives.
struct DialGuard {
    set: Arc<Mutex<HashSet<RouterHash>>>,
    hash: RouterHash,
}

impl DialGuard {
    fn new(set: Arc<Mutex<HashSet<RouterHash>>>, hash: RouterHash) -> Self {
        lock(&set).insert(hash);
        Self { set, hash }
    }
}

impl Drop for DialGuard {
    fn drop(&mut self) {
        lock(&self.set).remove(&self.hash);
    }
}
