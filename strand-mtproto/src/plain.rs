//! The unencrypted envelope, used only while no auth key exists.
//!
//! ```text
//! auth_key_id:long   (always 0)
//! message_id:long
//! message_data_length:int
//! message_data:bytes
//! ```

use std::fmt;

use strand_crypto::Side;

use crate::message::{MsgIdGenerator, PlainMessage, msg_id_parity_ok};

const HEADER_LEN: usize = 8 + 8 + 4;

/// Reasons a plaintext frame is rejected.
#[derive(Clone, Debug, PartialEq)]
pub enum Error {
    /// Shorter than the 20-byte header.
    TooShort { len: usize },
    /// `auth_key_id` was not zero, so this is not a plaintext message.
    NonZeroKeyId { key_id: i64 },
    /// Low bits of the message id are illegal for the sender.
    BadMsgId { msg_id: i64 },
    /// Declared length disagrees with the bytes that follow.
    LengthMismatch { declared: u32, actual: usize },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooShort { len } => write!(f, "plaintext frame too short ({len} bytes)"),
            Self::NonZeroKeyId { key_id } => write!(f, "plaintext frame has auth_key_id {key_id}"),
            Self::BadMsgId { msg_id } => write!(f, "invalid msg_id parity: {msg_id:#x}"),
            Self::LengthMismatch { declared, actual } => {
                write!(f, "declared length {declared} but {actual} bytes follow")
            }
        }
    }
}

impl std::error::Error for Error {}

/// Wrap `body` in the plaintext envelope.
pub fn pack(msg_id: i64, body: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(HEADER_LEN + body.len());
    buf.extend(0i64.to_le_bytes());
    buf.extend(msg_id.to_le_bytes());
    buf.extend((body.len() as u32).to_le_bytes());
    buf.extend_from_slice(body);
    buf
}

/// Unwrap a plaintext envelope written by `sender`.
pub fn unpack(frame: &[u8], sender: Side) -> Result<PlainMessage, Error> {
    if frame.len() < HEADER_LEN {
        return Err(Error::TooShort { len: frame.len() });
    }
    let read_i64 = |at: usize| {
        let mut b = [0u8; 8];
        b.copy_from_slice(&frame[at..at + 8]);
        i64::from_le_bytes(b)
    };

    let key_id = read_i64(0);
    if key_id != 0 {
        return Err(Error::NonZeroKeyId { key_id });
    }
    let msg_id = read_i64(8);
    if !msg_id_parity_ok(msg_id, sender) {
        return Err(Error::BadMsgId { msg_id });
    }
    let declared = u32::from_le_bytes([frame[16], frame[17], frame[18], frame[19]]);
    let actual = frame.len() - HEADER_LEN;
    if declared as usize != actual {
        return Err(Error::LengthMismatch { declared, actual });
    }

    Ok(PlainMessage { msg_id, body: frame[HEADER_LEN..].to_vec() })
}

/// Message-id bookkeeping for the handshake phase.
pub struct PlainSession {
    ids: MsgIdGenerator,
}

impl PlainSession {
    /// A session for messages sent by `side`.
    pub fn new(side: Side) -> Self {
        Self { ids: MsgIdGenerator::new(side, 0) }
    }

    /// Frame `body` under a fresh message id.
    pub fn pack(&mut self, body: &[u8]) -> (Vec<u8>, i64) {
        let msg_id = self.ids.next();
        (pack(msg_id, body), msg_id)
    }
}

impl Default for PlainSession {
    fn default() -> Self { Self::new(Side::Client) }
}
