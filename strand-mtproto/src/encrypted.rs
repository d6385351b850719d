//! The encrypted envelope and the per-connection session state.
//!
//! Once [`crate::authentication::finish`] produced an auth key, construct an
//! [`EncryptedSession`] and use it to frame every subsequent message.

use std::fmt;

use strand_crypto::{AuthKey, Scheme, Side, decrypt_message, encrypt_message, random_bytes};

use crate::message::{EncryptedMessage, MsgIdGenerator, msg_id_parity_ok};

/// `salt + session_id + msg_id + seq_no + length`
const HEADER_LEN: usize = 8 + 8 + 8 + 4 + 4;

/// Errors that can occur when unpacking an encrypted frame.
#[derive(Debug)]
pub enum DecryptError {
    /// The frame failed authentication: wrong key id or a message key that
    /// does not match the contents. The connection can no longer be
    /// trusted.
    Authentication(strand_crypto::DecryptError),
    /// The decrypted plaintext is shorter than its header.
    FrameTooShort,
    /// The declared payload length does not fit the plaintext.
    BadLength { declared: u32, available: usize },
    /// Low bits of the message id are illegal for the sender.
    BadMsgId { msg_id: i64 },
    /// The message belongs to another session.
    SessionMismatch { got: i64 },
}

impl DecryptError {
    /// Authentication failures are fatal; everything else is a malformed
    /// message that can be reported and skipped.
    pub fn is_authentication(&self) -> bool {
        matches!(self, Self::Authentication(_))
    }
}

impl fmt::Display for DecryptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Authentication(e) => write!(f, "authentication failed: {e}"),
            Self::FrameTooShort => write!(f, "inner plaintext too short"),
            Self::BadLength { declared, available } => {
                write!(f, "declared length {declared} exceeds {available} available bytes")
            }
            Self::BadMsgId { msg_id } => write!(f, "invalid msg_id parity: {msg_id:#x}"),
            Self::SessionMismatch { got } => write!(f, "session_id mismatch: {got}"),
        }
    }
}

impl std::error::Error for DecryptError {}

/// Encrypted session state: key, session id, salt, sequence counter and
/// message ids.
///
/// Use [`EncryptedSession::pack`] to frame outgoing messages and
/// [`EncryptedSession::unpack`] to read incoming ones.
pub struct EncryptedSession {
    auth_key: AuthKey,
    scheme: Scheme,
    local: Side,
    session_id: i64,
    sequence: i32,
    ids: MsgIdGenerator,
    /// Current server salt to include in outgoing messages.
    pub salt: i64,
}

impl EncryptedSession {
    /// A client-side session with a random session id.
    pub fn new(auth_key: AuthKey, first_salt: i64, time_offset: i32, scheme: Scheme) -> Self {
        let session_id = i64::from_le_bytes(random_bytes());
        Self::with_session_id(auth_key, first_salt, time_offset, scheme, Side::Client, session_id)
    }

    /// A session for either side with a fixed session id. A server uses the
    /// id chosen by its client.
    pub fn with_session_id(
        auth_key: AuthKey,
        salt: i64,
        time_offset: i32,
        scheme: Scheme,
        local: Side,
        session_id: i64,
    ) -> Self {
        Self {
            auth_key,
            scheme,
            local,
            session_id,
            sequence: 0,
            ids: MsgIdGenerator::new(local, time_offset),
            salt,
        }
    }

    fn peer(&self) -> Side {
        match self.local {
            Side::Client => Side::Server,
            Side::Server => Side::Client,
        }
    }

    /// Allocate a fresh message id.
    pub fn next_msg_id(&mut self) -> i64 {
        self.ids.next()
    }

    /// Content-related messages get `2n + 1` and advance the counter;
    /// service messages get `2n`.
    pub fn next_seq_no(&mut self, content_related: bool) -> i32 {
        if content_related {
            let n = self.sequence * 2 + 1;
            self.sequence += 1;
            n
        } else {
            self.sequence * 2
        }
    }

    /// Frame `body` under a new message id. Returns the wire bytes and the id.
    pub fn pack(&mut self, body: &[u8], content_related: bool) -> (Vec<u8>, i64) {
        let msg_id = self.next_msg_id();
        let seq_no = self.next_seq_no(content_related);
        (self.pack_with(msg_id, seq_no, body), msg_id)
    }

    /// Frame `body` with an explicit id and sequence number.
    pub fn pack_with(&self, msg_id: i64, seq_no: i32, body: &[u8]) -> Vec<u8> {
        let mut plain = Vec::with_capacity(HEADER_LEN + body.len());
        plain.extend(self.salt.to_le_bytes());
        plain.extend(self.session_id.to_le_bytes());
        plain.extend(msg_id.to_le_bytes());
        plain.extend(seq_no.to_le_bytes());
        plain.extend((body.len() as u32).to_le_bytes());
        plain.extend_from_slice(body);

        encrypt_message(&plain, &self.auth_key, self.local, self.scheme)
    }

    /// Decrypt and validate a frame sent by the peer.
    ///
    /// Authentication is checked first; length, message id parity and
    /// session id are only looked at once the frame is known to be genuine.
    pub fn unpack(&self, frame: &[u8]) -> Result<EncryptedMessage, DecryptError> {
        let plaintext = decrypt_message(frame, &self.auth_key, self.peer(), self.scheme)
            .map_err(DecryptError::Authentication)?;

        if plaintext.len() < HEADER_LEN {
            return Err(DecryptError::FrameTooShort);
        }
        let read_i64 = |at: usize| {
            let mut b = [0u8; 8];
            b.copy_from_slice(&plaintext[at..at + 8]);
            i64::from_le_bytes(b)
        };
        let read_u32 = |at: usize| {
            let mut b = [0u8; 4];
            b.copy_from_slice(&plaintext[at..at + 4]);
            u32::from_le_bytes(b)
        };

        let salt = read_i64(0);
        let session_id = read_i64(8);
        let msg_id = read_i64(16);
        let seq_no = read_u32(24) as i32;
        let declared = read_u32(28);

        let available = plaintext.len() - HEADER_LEN;
        if declared as usize > available || declared % 4 != 0 {
            return Err(DecryptError::BadLength { declared, available });
        }
        if !msg_id_parity_ok(msg_id, self.peer()) {
            return Err(DecryptError::BadMsgId { msg_id });
        }
        if self.local == Side::Client && session_id != self.session_id {
            return Err(DecryptError::SessionMismatch { got: session_id });
        }

        let body = plaintext[HEADER_LEN..HEADER_LEN + declared as usize].to_vec();
        Ok(EncryptedMessage { salt, session_id, msg_id, seq_no, body })
    }

    /// Resynchronize the clock from a server message id (bad_msg codes 16/17).
    pub fn correct_time(&mut self, server_msg_id: i64) {
        self.ids.correct_time(server_msg_id);
    }

    /// Clock skew in seconds vs. the server.
    pub fn time_offset(&self) -> i32 { self.ids.time_offset }

    /// The auth key (for persistence).
    pub fn auth_key(&self) -> &AuthKey { &self.auth_key }

    /// The key-derivation scheme in use.
    pub fn scheme(&self) -> Scheme { self.scheme }

    /// The current session id.
    pub fn session_id(&self) -> i64 { self.session_id }
}
