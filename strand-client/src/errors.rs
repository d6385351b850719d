//! Error types for strand-client.

use std::{fmt, io};

use strand_mtproto::encrypted::DecryptError;
use strand_mtproto::{authentication, plain};
use strand_tl_types::deserialize;

// ─── RpcError ─────────────────────────────────────────────────────────────────

/// An error returned by the server in response to an RPC call.
///
/// Numeric values are stripped from the name and placed in [`RpcError::value`].
///
/// # Example
/// `PHONE_MIGRATE_4` → `RpcError { code: 303, name: "PHONE_MIGRATE", value: Some(4) }`
#[derive(Clone, Debug, PartialEq)]
pub struct RpcError {
    /// HTTP-like status code.
    pub code: i32,
    /// Error name in SCREAMING_SNAKE_CASE with digits removed.
    pub name: String,
    /// Numeric suffix extracted from the name, if any.
    pub value: Option<u32>,
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RPC {}: {}", self.code, self.name)?;
        if let Some(v) = self.value {
            write!(f, " (value: {v})")?;
        }
        Ok(())
    }
}

impl std::error::Error for RpcError {}

impl RpcError {
    /// Parse a raw error message like `"FLOOD_WAIT_30"` into an `RpcError`.
    pub fn from_telegram(code: i32, message: &str) -> Self {
        if let Some(idx) = message.rfind('_') {
            let suffix = &message[idx + 1..];
            if !suffix.is_empty() && suffix.chars().all(|c| c.is_ascii_digit()) {
                if let Ok(v) = suffix.parse::<u32>() {
                    let name = message[..idx].to_string();
                    return Self { code, name, value: Some(v) };
                }
            }
        }
        Self { code, name: message.to_string(), value: None }
    }

    /// Match on the error name, with optional wildcard prefix/suffix `'*'`.
    ///
    /// # Examples
    /// - `err.is("FLOOD_WAIT")`: exact match
    /// - `err.is("PHONE_CODE_*")`: starts-with match
    /// - `err.is("*_MIGRATE")`: ends-with match
    pub fn is(&self, pattern: &str) -> bool {
        if let Some(prefix) = pattern.strip_suffix('*') {
            self.name.starts_with(prefix)
        } else if let Some(suffix) = pattern.strip_prefix('*') {
            self.name.ends_with(suffix)
        } else {
            self.name == pattern
        }
    }

    /// The datacenter to move to, if this is a `*_MIGRATE_X` error.
    pub fn migrate_dc(&self) -> Option<i32> {
        if self.code == 303 && self.is("*_MIGRATE") {
            self.value.map(|v| v as i32)
        } else {
            None
        }
    }
}

// ─── InvocationError ──────────────────────────────────────────────────────────

/// The error type returned from any `Client` method that talks to the server.
#[derive(Debug)]
pub enum InvocationError {
    /// The server rejected the request.
    Rpc(RpcError),
    /// Network / I/O failure.
    Io(io::Error),
    /// The transport reported a negative error code (e.g. -404).
    Transport(i32),
    /// The server broke the protocol (unexpected or malformed message).
    Protocol(String),
    /// A frame failed authentication; the connection was dropped.
    Authentication,
    /// `bad_msg_notification` with a code that cannot be fixed by resending.
    BadMessage { code: i32 },
    /// Response deserialization failed.
    Deserialize(deserialize::Error),
    /// The request was dropped (e.g. the connection shut down).
    Dropped,
    /// The auth key handshake failed.
    Handshake(authentication::Error),
    /// Loading or saving the session failed.
    Session(io::Error),
}

impl fmt::Display for InvocationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rpc(e) => write!(f, "{e}"),
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::Transport(code) => write!(f, "transport error {code}"),
            Self::Protocol(s) => write!(f, "protocol violation: {s}"),
            Self::Authentication => write!(f, "message authentication failed"),
            Self::BadMessage { code } => write!(f, "bad message notification (code {code})"),
            Self::Deserialize(e) => write!(f, "deserialize error: {e}"),
            Self::Dropped => write!(f, "request dropped"),
            Self::Handshake(e) => write!(f, "handshake failed: {e}"),
            Self::Session(e) => write!(f, "session storage: {e}"),
        }
    }
}

impl std::error::Error for InvocationError {}

impl From<io::Error> for InvocationError {
    fn from(e: io::Error) -> Self { Self::Io(e) }
}

impl From<deserialize::Error> for InvocationError {
    fn from(e: deserialize::Error) -> Self { Self::Deserialize(e) }
}

impl From<authentication::Error> for InvocationError {
    fn from(e: authentication::Error) -> Self { Self::Handshake(e) }
}

impl InvocationError {
    /// Returns `true` if this is the named RPC error (supports `'*'` wildcards).
    pub fn is(&self, pattern: &str) -> bool {
        match self {
            Self::Rpc(e) => e.is(pattern),
            _ => false,
        }
    }

    /// A fresh error of the same kind, for fanning one failure out to every
    /// pending request. `io::Error` is not `Clone`, so only its kind survives.
    pub(crate) fn duplicate(&self) -> Self {
        match self {
            Self::Rpc(e) => Self::Rpc(e.clone()),
            Self::Io(e) => Self::Io(io::Error::new(e.kind(), e.to_string())),
            Self::Transport(code) => Self::Transport(*code),
            Self::Protocol(s) => Self::Protocol(s.clone()),
            Self::Authentication => Self::Authentication,
            Self::BadMessage { code } => Self::BadMessage { code: *code },
            Self::Deserialize(e) => Self::Deserialize(e.clone()),
            Self::Dropped => Self::Dropped,
            Self::Handshake(e) => Self::Handshake(e.clone()),
            Self::Session(e) => Self::Session(io::Error::new(e.kind(), e.to_string())),
        }
    }
}

// ─── Warning ──────────────────────────────────────────────────────────────────

/// Something went wrong that no caller was waiting for.
///
/// Delivered through [`crate::Client::take_warnings`].
#[derive(Debug)]
pub enum Warning {
    /// The read loop stopped.
    Connection(InvocationError),
    /// An encrypted frame was malformed and skipped.
    Malformed(DecryptError),
    /// A plaintext frame was malformed and skipped.
    MalformedPlain(plain::Error),
    /// A frame arrived in the wrong phase: plaintext outside the handshake,
    /// or encrypted before a key exists.
    UnexpectedFrame { encrypted: bool },
    /// The server objected to a message nobody is waiting on.
    BadMessage { msg_id: i64, code: i32 },
    /// An unsolicited object no handler accepted.
    Unhandled { constructor_id: u32, name: Option<&'static str> },
    /// An incoming message could not be decoded.
    Decode(deserialize::Error),
    /// A `gzip_packed` message could not be inflated.
    Inflate(InvocationError),
    /// An RPC result arrived for an unknown request.
    UnknownRequest { msg_id: i64 },
    /// A keepalive ping failed.
    Keepalive(InvocationError),
    /// Persisting the session failed.
    Persist(io::Error),
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connection(e) => write!(f, "connection closed: {e}"),
            Self::Malformed(e) => write!(f, "malformed frame skipped: {e}"),
            Self::MalformedPlain(e) => write!(f, "malformed plaintext frame skipped: {e}"),
            Self::UnexpectedFrame { encrypted: false } => {
                write!(f, "plaintext frame outside the handshake")
            }
            Self::UnexpectedFrame { encrypted: true } => {
                write!(f, "encrypted frame before the handshake finished")
            }
            Self::BadMessage { msg_id, code } => {
                write!(f, "bad_msg_notification code {code} for unknown msg_id {msg_id}")
            }
            Self::Unhandled { constructor_id, name } => match name {
                Some(name) => write!(f, "unhandled {name} ({constructor_id:#010x})"),
                None => write!(f, "unhandled object {constructor_id:#010x}"),
            },
            Self::Decode(e) => write!(f, "undecodable message: {e}"),
            Self::Inflate(e) => write!(f, "gzip_packed message: {e}"),
            Self::UnknownRequest { msg_id } => write!(f, "rpc_result for unknown msg_id {msg_id}"),
            Self::Keepalive(e) => write!(f, "ping unsuccessful: {e}"),
            Self::Persist(e) => write!(f, "saving session: {e}"),
        }
    }
}

impl std::error::Error for Warning {}
