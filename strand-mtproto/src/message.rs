//! Message ids and the two decoded envelope kinds.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use strand_crypto::Side;

/// `true` if the low two bits of `msg_id` are legal for a message sent by
/// `sender`: `00` for clients, `01` or `11` for servers.
pub fn msg_id_parity_ok(msg_id: i64, sender: Side) -> bool {
    match sender {
        Side::Client => msg_id & 3 == 0,
        Side::Server => matches!(msg_id & 3, 1 | 3),
    }
}

/// Generates strictly increasing message ids from the corrected clock.
///
/// An id is `(unix_seconds + offset) << 32 | nanoseconds << 2`, with the low
/// two bits set according to the sending side.
#[derive(Clone, Debug)]
pub struct MsgIdGenerator {
    last: i64,
    side: Side,
    /// Clock skew in seconds relative to the server.
    pub time_offset: i32,
}

impl MsgIdGenerator {
    /// A generator for ids sent by `side`.
    pub fn new(side: Side, time_offset: i32) -> Self {
        Self { last: 0, side, time_offset }
    }

    /// The next id for "now".
    pub fn next(&mut self) -> i64 {
        let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
        self.next_at(now)
    }

    /// The next id as if the clock read `now` (since the Unix epoch).
    pub fn next_at(&mut self, now: Duration) -> i64 {
        let secs = now.as_secs() as i64 + i64::from(self.time_offset);
        let mut id = (secs << 32) | (i64::from(now.subsec_nanos()) << 2);
        if id <= self.last {
            id = (self.last & !3) + 4;
        }
        if self.side == Side::Server {
            id |= 1;
        }
        self.last = id;
        id
    }

    /// Re-derive the clock offset from an id the server just sent.
    pub fn correct_time(&mut self, server_msg_id: i64) {
        let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
        self.correct_time_at(server_msg_id, now);
    }

    /// [`correct_time`](Self::correct_time) as if the clock read `now`.
    ///
    /// Ids issued under the old offset are forgotten, so the next id follows
    /// the corrected clock even when it moved backwards.
    pub fn correct_time_at(&mut self, server_msg_id: i64, now: Duration) {
        self.time_offset = ((server_msg_id >> 32) - now.as_secs() as i64) as i32;
        self.last = 0;
    }
}

/// A message read from the plaintext envelope.
#[derive(Clone, Debug, PartialEq)]
pub struct PlainMessage {
    /// The `msg_id` of the message.
    pub msg_id: i64,
    /// TL-serialized body.
    pub body: Vec<u8>,
}

/// A message read from the encrypted envelope.
#[derive(Clone, Debug, PartialEq)]
pub struct EncryptedMessage {
    /// `salt` the sender used.
    pub salt: i64,
    /// The `session_id` from the frame.
    pub session_id: i64,
    /// The `msg_id` of the inner message.
    pub msg_id: i64,
    /// `seq_no` of the inner message.
    pub seq_no: i32,
    /// TL-serialized body of the inner message.
    pub body: Vec<u8>,
}

/// Either envelope kind, as seen by the session engine.
#[derive(Clone, Debug, PartialEq)]
pub enum Message {
    /// Sent before an auth key exists.
    Plain(PlainMessage),
    /// Sent under an auth key.
    Encrypted(EncryptedMessage),
}

impl Message {
    /// The TL body.
    pub fn payload(&self) -> &[u8] {
        match self {
            Self::Plain(m) => &m.body,
            Self::Encrypted(m) => &m.body,
        }
    }

    /// The message id.
    pub fn id(&self) -> i64 {
        match self {
            Self::Plain(m) => m.msg_id,
            Self::Encrypted(m) => m.msg_id,
        }
    }

    /// The sequence number. Plaintext messages carry none and report 0.
    pub fn seq_no(&self) -> i32 {
        match self {
            Self::Plain(_) => 0,
            Self::Encrypted(m) => m.seq_no,
        }
    }

    /// Odd sequence numbers mark content-related messages, which the
    /// receiver must acknowledge.
    pub fn requires_ack(&self) -> bool {
        self.seq_no() & 1 == 1
    }

    /// Take the TL body.
    pub fn into_payload(self) -> Vec<u8> {
        match self {
            Self::Plain(m) => m.body,
            Self::Encrypted(m) => m.body,
        }
    }
}

impl From<PlainMessage> for Message {
    fn from(m: PlainMessage) -> Self { Self::Plain(m) }
}

impl From<EncryptedMessage> for Message {
    fn from(m: EncryptedMessage) -> Self { Self::Encrypted(m) }
}
