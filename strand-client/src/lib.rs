//! # strand-client
//!
//! Async MTProto session engine.
//!
//! ## Features
//! - Auth key handshake over the intermediate transport, or resume from a
//!   persisted session
//! - Many requests in flight on one connection, each answered on its own
//!   channel
//! - Transparent resend on salt rotation and clock skew
//! - `*_MIGRATE_X` handling: reconnect to the named DC and retry
//! - Redial with the same key when the socket drops
//! - Periodic keepalive pings
//! - Handlers for unsolicited objects and a warnings channel for everything
//!   nobody asked for
//!
//! ```no_run
//! # async fn f() -> Result<(), strand_client::InvocationError> {
//! use strand_client::{Client, Config};
//!
//! let client = Client::connect(Config::default()).await?;
//! let _pong = client.ping(0xCADACADA).await?;
//! client.disconnect().await;
//! # Ok(()) }
//! ```

#![deny(unsafe_code)]

mod connection;
mod dispatch;
mod errors;

pub mod dc;
pub mod session;
pub mod session_backend;
pub mod transport;

pub use connection::Reply;
pub use dc::DcDirectory;
pub use errors::{InvocationError, RpcError, Warning};
pub use session::PersistedSession;
pub use session_backend::{BinaryFileBackend, InMemoryBackend, SessionBackend};
pub use strand_tl_types::Value;
pub use transport::{Dialer, TcpDialer};

use std::sync::{Arc, Mutex as StdMutex, PoisonError, RwLock as StdRwLock, Weak};
use std::time::Duration;

use strand_crypto::Scheme;
use strand_crypto::rsa::PublicKey;
use strand_tl_types::{Deserializable, ElementType, Object, Registry, RemoteCall, Serializable, enums, functions};
use tokio::sync::{RwLock, mpsc, watch};

use connection::{Connection, DecodeHint, Payload, Shared, Signal};

/// How many times one request is sent again after the server asked for it
/// (new salt, clock skew) before giving up.
pub const MAX_RESENDS: u32 = 5;

// ─── Config ───────────────────────────────────────────────────────────────────

/// Configuration for [`Client::connect`].
#[derive(Clone)]
pub struct Config {
    /// Where to connect when no session is persisted.
    pub server_addr:        String,
    /// The DC `server_addr` belongs to.
    pub dc_id:              i32,
    /// Server keys trusted during the handshake.
    pub public_keys:        Vec<PublicKey>,
    pub scheme:             Scheme,
    /// Types that can be decoded from results and unsolicited messages.
    pub registry:           Arc<Registry>,
    /// Session persistence backend (default: binary file `"strand.session"`).
    pub session_backend:    Arc<dyn SessionBackend>,
    /// Addresses for `*_MIGRATE_X` errors.
    pub dc_directory:       DcDirectory,
    pub dialer:             Arc<dyn Dialer>,
    /// Zero disables keepalive.
    pub ping_interval:      Duration,
    pub handshake_timeout:  Duration,
    /// Reconnects one request may trigger before the migrate error is
    /// returned as is.
    pub max_migrations:     u32,
    /// Dials tried after the socket drops, before giving up.
    pub reconnect_attempts: u32,
    /// Wait before the second dial; doubled after each failure.
    pub reconnect_delay:    Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_addr:        "149.154.167.51:443".into(),
            dc_id:              2,
            public_keys:        vec![PublicKey::production(), PublicKey::test()],
            scheme:             Scheme::V2,
            registry:           Arc::new(Registry::with_service_schema()),
            session_backend:    Arc::new(BinaryFileBackend::new("strand.session")),
            dc_directory:       DcDirectory::default(),
            dialer:             Arc::new(TcpDialer),
            ping_interval:      Duration::from_secs(60),
            handshake_timeout:  Duration::from_secs(15),
            max_migrations:     3,
            reconnect_attempts: 3,
            reconnect_delay:    Duration::from_secs(1),
        }
    }
}

/// Where the engine is in its lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum State {
    Disconnected,
    Connecting,
    Handshaking,
    Ready,
}

// ─── Client ───────────────────────────────────────────────────────────────────

struct ClientInner {
    conn:               RwLock<Arc<Connection>>,
    shared:             Arc<Shared>,
    dc_directory:       DcDirectory,
    max_migrations:     u32,
    reconnect_attempts: u32,
    reconnect_delay:    Duration,
}

impl ClientInner {
    /// Replace `lost` with a new connection to the same DC that resumes its
    /// key and salt. No-op when `lost` was already replaced or torn down.
    async fn reconnect(&self, lost: &Arc<Connection>) -> Result<(), InvocationError> {
        let mut conn = self.conn.write().await;
        if !Arc::ptr_eq(&*conn, lost) || !lost.is_lost().await {
            return Ok(());
        }
        lost.stop_tasks().await;
        let saved = lost.saved_key().await;

        let mut delay = self.reconnect_delay;
        let mut attempt = 1;
        loop {
            tracing::info!(
                "[strand] reconnecting to DC{} (attempt {attempt}/{})",
                lost.dc_id,
                self.reconnect_attempts
            );
            let error = match Connection::open(Arc::clone(&self.shared), lost.dc_id, lost.addr.clone(), saved.clone()).await {
                Ok(fresh) => {
                    *conn = fresh;
                    return Ok(());
                }
                Err(e) => e,
            };
            if attempt >= self.reconnect_attempts || !matches!(error, InvocationError::Io(_)) {
                tracing::warn!("[strand] giving up on DC{} after {attempt} attempt(s): {error}", lost.dc_id);
                return Err(error);
            }
            tracing::debug!("[strand] reconnect failed: {error}; retrying in {delay:?}");
            tokio::time::sleep(delay).await;
            delay *= 2;
            attempt += 1;
        }
    }
}

/// Redials every connection the read loop reports as lost, until the
/// client is dropped.
async fn supervise(inner: Weak<ClientInner>, mut lost: mpsc::UnboundedReceiver<Arc<Connection>>) {
    while let Some(conn) = lost.recv().await {
        let Some(inner) = inner.upgrade() else { break };
        if let Err(e) = inner.reconnect(&conn).await {
            inner.shared.warn(Warning::Connection(e));
        }
    }
}

impl Drop for ClientInner {
    fn drop(&mut self) {
        // The background tasks hold the connection alive; stop them.
        self.conn.get_mut().cancel.cancel();
    }
}

/// A connected MTProto session. Cheap to clone; every clone shares the same
/// connection.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

impl Client {
    // ── Connect ────────────────────────────────────────────────────────────

    /// Resume the persisted session if there is one, otherwise run the
    /// handshake against `config.server_addr`.
    ///
    /// A backend that fails to load (anything but "not found") is an error;
    /// it is never silently replaced by a fresh key.
    pub async fn connect(config: Config) -> Result<Self, InvocationError> {
        let saved = config.session_backend.load().map_err(InvocationError::Session)?;

        let (warnings_tx, warnings_rx) = mpsc::unbounded_channel();
        let (lost_tx, lost_rx) = mpsc::unbounded_channel();
        let (state, _) = watch::channel(State::Disconnected);
        let shared = Arc::new(Shared {
            registry:          config.registry,
            backend:           config.session_backend,
            dialer:            config.dialer,
            public_keys:       config.public_keys,
            scheme:            config.scheme,
            ping_interval:     config.ping_interval,
            handshake_timeout: config.handshake_timeout,
            handlers:          StdRwLock::new(Vec::new()),
            warnings_tx,
            warnings_rx:       StdMutex::new(Some(warnings_rx)),
            state,
            lost_tx,
        });

        let conn = match saved {
            Some(s) => {
                tracing::info!(
                    "[strand] loading session from {} (DC{})",
                    shared.backend.name(),
                    s.dc_id
                );
                Connection::open(Arc::clone(&shared), s.dc_id, s.server_addr, Some((s.auth_key, s.salt))).await?
            }
            None => {
                tracing::info!("[strand] no saved session, fresh handshake with DC{}", config.dc_id);
                Connection::open(Arc::clone(&shared), config.dc_id, config.server_addr, None).await?
            }
        };

        let inner = Arc::new(ClientInner {
            conn:               RwLock::new(conn),
            shared,
            dc_directory:       config.dc_directory,
            max_migrations:     config.max_migrations,
            reconnect_attempts: config.reconnect_attempts.max(1),
            reconnect_delay:    config.reconnect_delay,
        });
        tokio::spawn(supervise(Arc::downgrade(&inner), lost_rx));
        Ok(Self { inner })
    }

    // ── Requests ───────────────────────────────────────────────────────────

    /// Send `request` and decode the result through the registry.
    pub async fn send_request<S: Serializable + ?Sized>(&self, request: &S) -> Result<Reply, InvocationError> {
        match self.call(&request.to_bytes(), None).await? {
            Payload::Reply(reply) => Ok(reply),
            Payload::Raw(_) => Err(InvocationError::Protocol("unexpected raw payload".into())),
        }
    }

    /// Send `request` whose result is a bare `Vector` of `element`.
    pub async fn send_vector_request<S: Serializable + ?Sized>(
        &self,
        request: &S,
        element: ElementType,
    ) -> Result<Vec<Value>, InvocationError> {
        match self.call(&request.to_bytes(), Some(DecodeHint::Vector(element))).await? {
            Payload::Reply(Reply::Vector(values)) => Ok(values),
            _ => Err(InvocationError::Protocol("expected a vector result".into())),
        }
    }

    /// Send a typed function and decode its declared return type.
    pub async fn invoke<R: RemoteCall>(&self, request: &R) -> Result<R::Return, InvocationError> {
        match self.call(&request.to_bytes(), Some(DecodeHint::Raw)).await? {
            Payload::Raw(bytes) => Ok(R::Return::from_bytes(&bytes)?),
            Payload::Reply(_) => Err(InvocationError::Protocol("expected a raw payload".into())),
        }
    }

    /// `ping#7abe77ec`, answered by the matching `pong`.
    pub async fn ping(&self, ping_id: i64) -> Result<enums::Pong, InvocationError> {
        self.invoke(&functions::Ping { ping_id }).await
    }

    async fn call(&self, body: &[u8], hint: Option<DecodeHint>) -> Result<Payload, InvocationError> {
        let mut resends = 0;
        let mut migrations = 0;
        let mut redialed = false;
        loop {
            let conn = Arc::clone(&*self.inner.conn.read().await);
            let rx = match conn.send(body, hint).await {
                Ok(rx) => rx,
                Err(InvocationError::Dropped) if !redialed => {
                    if !conn.is_lost().await {
                        return Err(InvocationError::Dropped);
                    }
                    redialed = true;
                    self.inner.reconnect(&conn).await?;
                    continue;
                }
                Err(e) => return Err(e),
            };
            let error = match rx.await {
                Ok(Signal::Done(Err(InvocationError::Rpc(e)))) => e,
                Ok(Signal::Done(result)) => return result,
                Ok(Signal::Resend) => {
                    resends += 1;
                    if resends > MAX_RESENDS {
                        return Err(InvocationError::Protocol(format!(
                            "request resent {MAX_RESENDS} times without an answer"
                        )));
                    }
                    tracing::debug!("[strand] resending request ({resends}/{MAX_RESENDS})");
                    continue;
                }
                Err(_) => return Err(InvocationError::Dropped),
            };

            let Some(dc_id) = error.migrate_dc() else {
                return Err(InvocationError::Rpc(error));
            };
            if migrations >= self.inner.max_migrations {
                tracing::warn!("[strand] giving up after {migrations} migration(s)");
                return Err(InvocationError::Rpc(error));
            }
            let Some(addr) = self.inner.dc_directory.get(dc_id) else {
                tracing::warn!("[strand] {error} names DC{dc_id}, which is not in the directory");
                return Err(InvocationError::Rpc(error));
            };
            migrations += 1;
            self.migrate(dc_id, addr.to_owned()).await?;
        }
    }

    async fn migrate(&self, dc_id: i32, addr: String) -> Result<(), InvocationError> {
        let mut conn = self.inner.conn.write().await;
        if conn.dc_id == dc_id {
            // Another request migrated first.
            return Ok(());
        }
        tracing::info!("[strand] migrating DC{} → DC{dc_id} ({addr})", conn.dc_id);
        conn.teardown().await;
        *conn = Connection::open(Arc::clone(&self.inner.shared), dc_id, addr, None).await?;
        Ok(())
    }

    // ── Events ─────────────────────────────────────────────────────────────

    /// Register a handler for unsolicited objects.
    ///
    /// Handlers run on the read loop in registration order; the first to
    /// return `true` consumes the object. Keep them short.
    pub fn add_handler<F>(&self, handler: F)
    where
        F: Fn(&(dyn Object + 'static)) -> bool + Send + Sync + 'static,
    {
        self.inner
            .shared
            .handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Box::new(handler));
    }

    /// The warnings receiver. Only the first call gets it.
    pub fn take_warnings(&self) -> Option<mpsc::UnboundedReceiver<Warning>> {
        self.inner.shared.warnings_rx.lock().unwrap_or_else(PoisonError::into_inner).take()
    }

    // ── Lifecycle ──────────────────────────────────────────────────────────

    pub fn state(&self) -> State {
        *self.inner.shared.state.borrow()
    }

    /// Follow state changes.
    pub fn watch_state(&self) -> watch::Receiver<State> {
        self.inner.shared.state.subscribe()
    }

    /// The DC the client is currently connected to.
    pub async fn dc_id(&self) -> i32 {
        self.inner.conn.read().await.dc_id
    }

    /// Persist the current key, salt, address and DC.
    pub async fn save_session(&self) -> Result<(), InvocationError> {
        let conn = Arc::clone(&*self.inner.conn.read().await);
        conn.persist().await.map_err(InvocationError::Session)?;
        tracing::info!("[strand] session saved to {}", self.inner.shared.backend.name());
        Ok(())
    }

    /// Stop the background tasks, close the socket and fail every pending
    /// request with [`InvocationError::Dropped`]. Later requests fail the
    /// same way; unlike a dropped socket, this is never redialed.
    pub async fn disconnect(&self) {
        let conn = Arc::clone(&*self.inner.conn.read().await);
        conn.teardown().await;
    }
}
