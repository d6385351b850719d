//! One live connection to one datacenter.
//!
//! A [`Connection`] owns the socket's write half, the session state behind a
//! lock, and two background tasks: the read loop (see [`crate::dispatch`])
//! and the keepalive pinger. Migrating to another DC tears the connection
//! down and opens a new one; the [`Shared`] configuration survives.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex as StdMutex, PoisonError, RwLock};
use std::time::Duration;
use std::{io, mem};

use strand_crypto::rsa::PublicKey;
use strand_crypto::{AuthKey, Scheme, random_bytes};
use strand_mtproto::authentication::{self as auth, Finished};
use strand_mtproto::{EncryptedSession, PlainSession, Side};
use strand_tl_types::{Deserializable, ElementType, Object, Registry, Serializable, Value, enums, functions, types};
use tokio::io::{AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::{Mutex, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::session::PersistedSession;
use crate::session_backend::SessionBackend;
use crate::transport::{self, BoxedStream, Dialer};
use crate::{InvocationError, State, Warning};

pub(crate) type Handler = Box<dyn Fn(&(dyn Object + 'static)) -> bool + Send + Sync>;

// ─── Reply ────────────────────────────────────────────────────────────────────

/// A decoded RPC result.
#[derive(Clone, Debug, PartialEq)]
pub enum Reply {
    /// A boxed object, decoded through the registry.
    Object(Box<dyn Object>),
    /// A vector decoded with the element type given at send time.
    Vector(Vec<Value>),
}

impl Reply {
    /// The object, if this is not a vector.
    pub fn object(&self) -> Option<&(dyn Object + 'static)> {
        match self {
            Self::Object(obj) => Some(&**obj),
            Self::Vector(_) => None,
        }
    }

    /// Take the object out and downcast it.
    pub fn downcast<T: Object>(self) -> Option<T> {
        match self {
            Self::Object(obj) => obj.downcast::<T>().ok().map(|b| *b),
            Self::Vector(_) => None,
        }
    }

    pub fn into_vector(self) -> Option<Vec<Value>> {
        match self {
            Self::Vector(v) => Some(v),
            Self::Object(_) => None,
        }
    }
}

// ─── Correlation ─────────────────────────────────────────────────────────────

/// How to turn a result body into a value.
#[derive(Clone, Copy, Debug)]
pub(crate) enum DecodeHint {
    Vector(ElementType),
    /// Hand the caller the undecoded bytes.
    Raw,
}

pub(crate) enum Payload {
    Reply(Reply),
    Raw(Vec<u8>),
}

/// What the read loop tells a waiting caller.
pub(crate) enum Signal {
    Done(Result<Payload, InvocationError>),
    /// The request was rejected in a way that sending it again fixes.
    Resend,
}

/// Everything the read loop and the senders share, behind one lock.
///
/// A request's pending entry, hint and ack marker are inserted in the same
/// critical section that assigns its msg id, before the frame is written.
#[derive(Default)]
pub(crate) struct SessionState {
    pub(crate) session: Option<EncryptedSession>,
    pub(crate) pending: HashMap<i64, oneshot::Sender<Signal>>,
    pub(crate) hints: HashMap<i64, DecodeHint>,
    /// Sent content messages the server has not acknowledged yet.
    pub(crate) unacked: HashSet<i64>,
    pub(crate) handshaking: bool,
    pub(crate) closed: bool,
    /// Closed by a transport failure; the key is still good.
    pub(crate) lost: bool,
}

impl SessionState {
    pub(crate) fn forget(&mut self, msg_id: i64) -> Option<oneshot::Sender<Signal>> {
        self.hints.remove(&msg_id);
        self.unacked.remove(&msg_id);
        self.pending.remove(&msg_id)
    }

    /// Close the state and fail every waiting caller with `error`.
    pub(crate) fn fail_all(&mut self, error: &InvocationError) {
        self.closed = true;
        self.hints.clear();
        self.unacked.clear();
        for (_, tx) in self.pending.drain() {
            let _ = tx.send(Signal::Done(Err(error.duplicate())));
        }
    }
}

// ─── Shared ───────────────────────────────────────────────────────────────────

/// Configuration and channels that outlive any one connection.
pub(crate) struct Shared {
    pub(crate) registry: Arc<Registry>,
    pub(crate) backend: Arc<dyn SessionBackend>,
    pub(crate) dialer: Arc<dyn Dialer>,
    pub(crate) public_keys: Vec<PublicKey>,
    pub(crate) scheme: Scheme,
    pub(crate) ping_interval: Duration,
    pub(crate) handshake_timeout: Duration,
    pub(crate) handlers: RwLock<Vec<Handler>>,
    pub(crate) warnings_tx: mpsc::UnboundedSender<Warning>,
    pub(crate) warnings_rx: StdMutex<Option<mpsc::UnboundedReceiver<Warning>>>,
    pub(crate) state: watch::Sender<State>,
    /// Connections whose read loop died on a recoverable error.
    pub(crate) lost_tx: mpsc::UnboundedSender<Arc<Connection>>,
}

impl Shared {
    pub(crate) fn warn(&self, warning: Warning) {
        tracing::warn!("[strand] {warning}");
        let _ = self.warnings_tx.send(warning);
    }

    pub(crate) fn set_state(&self, state: State) {
        tracing::debug!("[strand] state → {state:?}");
        self.state.send_replace(state);
    }

    /// Offer an unsolicited object to each handler in order.
    pub(crate) fn handle(&self, obj: &(dyn Object + 'static)) -> bool {
        let handlers = self.handlers.read().unwrap_or_else(PoisonError::into_inner);
        handlers.iter().any(|h| h(obj))
    }
}

// ─── Connection ───────────────────────────────────────────────────────────────

pub(crate) struct Connection {
    pub(crate) dc_id: i32,
    pub(crate) addr: String,
    pub(crate) shared: Arc<Shared>,
    writer: Mutex<WriteHalf<BoxedStream>>,
    pub(crate) state: Mutex<SessionState>,
    /// Plaintext handshake replies, one at a time.
    service_rx: Mutex<mpsc::Receiver<Vec<u8>>>,
    pub(crate) cancel: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Connection {
    /// Dial `addr`, run the handshake unless `saved` already holds a key and
    /// salt, persist, and start the background tasks.
    pub(crate) async fn open(
        shared: Arc<Shared>,
        dc_id: i32,
        addr: String,
        saved: Option<(AuthKey, i64)>,
    ) -> Result<Arc<Self>, InvocationError> {
        shared.set_state(State::Connecting);
        tracing::info!("[strand] connecting to DC{dc_id} ({addr})");

        let stream = match shared.dialer.dial(&addr).await {
            Ok(s) => s,
            Err(e) => {
                shared.set_state(State::Disconnected);
                return Err(e.into());
            }
        };
        let (reader, mut writer) = tokio::io::split(stream);
        if let Err(e) = transport::send_init(&mut writer).await {
            shared.set_state(State::Disconnected);
            return Err(e);
        }

        let (service_tx, service_rx) = mpsc::channel(1);
        let needs_handshake = saved.is_none();
        let session = saved.map(|(key, salt)| EncryptedSession::new(key, salt, 0, shared.scheme));

        let conn = Arc::new(Self {
            dc_id,
            addr,
            shared,
            writer: Mutex::new(writer),
            state: Mutex::new(SessionState {
                session,
                handshaking: needs_handshake,
                ..SessionState::default()
            }),
            service_rx: Mutex::new(service_rx),
            cancel: CancellationToken::new(),
            tasks: Mutex::new(Vec::new()),
        });

        let read_loop = tokio::spawn(Arc::clone(&conn).read_loop(reader, service_tx));
        conn.tasks.lock().await.push(read_loop);

        if let Err(e) = conn.establish(needs_handshake).await {
            conn.teardown().await;
            return Err(e);
        }

        if !conn.shared.ping_interval.is_zero() {
            let keepalive = tokio::spawn(Arc::clone(&conn).keepalive());
            conn.tasks.lock().await.push(keepalive);
        }
        conn.shared.set_state(State::Ready);
        tracing::info!("[strand] DC{} ready", conn.dc_id);
        Ok(conn)
    }

    async fn establish(&self, needs_handshake: bool) -> Result<(), InvocationError> {
        if needs_handshake {
            self.shared.set_state(State::Handshaking);
            let done = tokio::time::timeout(self.shared.handshake_timeout, self.handshake())
                .await
                .map_err(|_| {
                    io::Error::new(io::ErrorKind::TimedOut, format!("handshake with {} timed out", self.addr))
                })??;
            tracing::info!("[strand] auth key ready (time offset {}s)", done.time_offset);

            let mut state = self.state.lock().await;
            state.handshaking = false;
            state.session = Some(EncryptedSession::new(
                done.auth_key,
                done.first_salt,
                done.time_offset,
                self.shared.scheme,
            ));
        }
        self.persist().await.map_err(InvocationError::Session)
    }

    async fn handshake(&self) -> Result<Finished, InvocationError> {
        let mut plain = PlainSession::new(Side::Client);

        let (req1, s1) = auth::step1();
        let res_pq: enums::ResPq = self.plain_call(&mut plain, &req1).await?;

        let (req2, s2) = auth::step2(s1, res_pq, &self.shared.public_keys, self.shared.scheme, self.dc_id)?;
        let dh: enums::ServerDhParams = self.plain_call(&mut plain, &req2).await?;

        let (req3, s3) = auth::step3(s2, dh)?;
        let answer: enums::SetClientDhParamsAnswer = self.plain_call(&mut plain, &req3).await?;

        Ok(auth::finish(s3, answer)?)
    }

    async fn plain_call<T: Deserializable>(
        &self,
        plain: &mut PlainSession,
        request: &impl Serializable,
    ) -> Result<T, InvocationError> {
        let (frame, _) = plain.pack(&request.to_bytes());
        {
            let mut writer = self.writer.lock().await;
            transport::send_frame(&mut *writer, &frame).await?;
        }
        let body = self.service_rx.lock().await.recv().await.ok_or(InvocationError::Dropped)?;
        Ok(T::from_bytes(&body)?)
    }

    /// Whether the read loop died on an error a new socket can fix.
    pub(crate) async fn is_lost(&self) -> bool {
        self.state.lock().await.lost
    }

    /// The key and salt a replacement connection resumes with.
    pub(crate) async fn saved_key(&self) -> Option<(AuthKey, i64)> {
        let state = self.state.lock().await;
        state.session.as_ref().map(|s| (s.auth_key().clone(), s.salt))
    }

    /// The key and salt as they would be saved right now.
    pub(crate) fn snapshot(&self, state: &SessionState) -> Option<PersistedSession> {
        let session = state.session.as_ref()?;
        Some(PersistedSession {
            dc_id: self.dc_id,
            server_addr: self.addr.clone(),
            auth_key: session.auth_key().clone(),
            salt: session.salt,
        })
    }

    /// Write `snapshot` through the backend on the blocking pool. Never
    /// called with the state lock held.
    pub(crate) async fn save(&self, snapshot: PersistedSession) -> io::Result<()> {
        let backend = Arc::clone(&self.shared.backend);
        tokio::task::spawn_blocking(move || backend.save(&snapshot))
            .await
            .unwrap_or_else(|e| Err(io::Error::other(e)))
    }

    /// Save the current key and salt.
    pub(crate) async fn persist(&self) -> io::Result<()> {
        let snapshot = self.snapshot(&*self.state.lock().await);
        match snapshot {
            Some(snapshot) => self.save(snapshot).await,
            None => Ok(()),
        }
    }

    // ── Sending ──────────────────────────────────────────────────────────

    /// Encrypt and send a content-related message, returning the channel its
    /// outcome will arrive on.
    pub(crate) async fn send(
        &self,
        body: &[u8],
        hint: Option<DecodeHint>,
    ) -> Result<oneshot::Receiver<Signal>, InvocationError> {
        let mut writer = self.writer.lock().await;
        let (frame, msg_id, rx) = {
            let mut guard = self.state.lock().await;
            let state = &mut *guard;
            if state.closed {
                return Err(InvocationError::Dropped);
            }
            let Some(session) = state.session.as_mut() else {
                return Err(InvocationError::Protocol("no auth key yet".into()));
            };
            let (frame, msg_id) = session.pack(body, true);
            let (tx, rx) = oneshot::channel();
            state.pending.insert(msg_id, tx);
            if let Some(hint) = hint {
                state.hints.insert(msg_id, hint);
            }
            state.unacked.insert(msg_id);
            (frame, msg_id, rx)
        };

        if let Err(e) = transport::send_frame(&mut *writer, &frame).await {
            self.state.lock().await.forget(msg_id);
            return Err(e);
        }
        Ok(rx)
    }

    /// Send a message nobody waits on, such as `msgs_ack`.
    pub(crate) async fn send_service(&self, body: &[u8]) -> Result<(), InvocationError> {
        let mut writer = self.writer.lock().await;
        let frame = {
            let mut state = self.state.lock().await;
            if state.closed {
                return Err(InvocationError::Dropped);
            }
            match state.session.as_mut() {
                Some(session) => session.pack(body, false).0,
                None => return Err(InvocationError::Protocol("no auth key yet".into())),
            }
        };
        transport::send_frame(&mut *writer, &frame).await
    }

    pub(crate) fn ack(self: &Arc<Self>, msg_ids: Vec<i64>) {
        let conn = Arc::clone(self);
        tokio::spawn(async move {
            let ack = enums::MsgsAck::from(types::MsgsAck { msg_ids });
            if let Err(e) = conn.send_service(&ack.to_bytes()).await {
                tracing::debug!("[strand] ack not sent: {e}");
            }
        });
    }

    // ── Background tasks ─────────────────────────────────────────────────

    async fn keepalive(self: Arc<Self>) {
        let period = self.shared.ping_interval;
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }
            let ping = functions::Ping { ping_id: i64::from_le_bytes(random_bytes()) };
            let ping_bytes = ping.to_bytes();
            let outcome = tokio::select! {
                _ = self.cancel.cancelled() => break,
                r = self.round_trip(&ping_bytes) => r,
            };
            match outcome {
                Ok(()) => tracing::debug!("[strand] keepalive pong"),
                Err(e) => self.shared.warn(Warning::Keepalive(e)),
            }
        }
    }

    async fn round_trip(&self, body: &[u8]) -> Result<(), InvocationError> {
        let rx = self.send(body, None).await?;
        match rx.await {
            Ok(Signal::Done(result)) => result.map(drop),
            Ok(Signal::Resend) => Ok(()),
            Err(_) => Err(InvocationError::Dropped),
        }
    }

    /// Stop the read loop and the pinger.
    pub(crate) async fn stop_tasks(&self) {
        self.cancel.cancel();
        let tasks = mem::take(&mut *self.tasks.lock().await);
        for task in tasks {
            let _ = task.await;
        }
    }

    /// Stop both tasks, close the socket and fail whatever is still pending.
    /// A torn down connection is never reopened.
    pub(crate) async fn teardown(&self) {
        self.stop_tasks().await;
        {
            let mut writer = self.writer.lock().await;
            let _ = writer.shutdown().await;
        }
        {
            let mut state = self.state.lock().await;
            state.fail_all(&InvocationError::Dropped);
            state.lost = false;
        }
        self.shared.set_state(State::Disconnected);
        tracing::info!("[strand] DC{} disconnected", self.dc_id);
    }

    pub(crate) async fn read_loop(self: Arc<Self>, mut reader: ReadHalf<BoxedStream>, service_tx: mpsc::Sender<Vec<u8>>) {
        let error = loop {
            let frame = tokio::select! {
                _ = self.cancel.cancelled() => return,
                frame = transport::recv_frame(&mut reader) => frame,
            };
            let outcome = match frame {
                Ok(frame) if frame.len() >= 8 && frame[..8] == [0; 8] => {
                    self.on_plain_frame(&frame, &service_tx).await;
                    Ok(())
                }
                Ok(frame) => self.on_encrypted_frame(&frame).await,
                Err(e) => Err(e),
            };
            if let Err(e) = outcome {
                break e;
            }
        };

        // A dead socket is worth redialing. Anything else means the peer
        // or the key can no longer be trusted.
        let recoverable = matches!(error, InvocationError::Io(_));
        {
            let mut state = self.state.lock().await;
            state.fail_all(&error);
            state.lost = recoverable;
        }
        self.shared.set_state(State::Disconnected);
        self.shared.warn(Warning::Connection(error));
        if recoverable {
            let _ = self.shared.lost_tx.send(Arc::clone(&self));
        }
    }
}
