//! Read-loop dispatch: what happens to each frame the server sends.

use std::io::Read;
use std::sync::Arc;

use strand_mtproto::{Side, plain};
use strand_tl_types::deserialize::{self, Error};
use strand_tl_types::{
    Cursor, Deserializable, GZIP_PACKED_ID, Identifiable, MSG_CONTAINER_ID, RPC_RESULT_ID, enums, types,
};
use tokio::sync::mpsc;

use crate::connection::{Connection, DecodeHint, Payload, Reply, SessionState, Signal};
use crate::transport::MAX_FRAME_LEN;
use crate::{InvocationError, RpcError, Warning};

const RPC_ERROR: u32 = <types::RpcError as Identifiable>::CONSTRUCTOR_ID;
const PONG: u32 = <types::Pong as Identifiable>::CONSTRUCTOR_ID;
const NEW_SESSION_CREATED: u32 = <types::NewSessionCreated as Identifiable>::CONSTRUCTOR_ID;
const MSGS_ACK: u32 = <types::MsgsAck as Identifiable>::CONSTRUCTOR_ID;
const BAD_MSG_NOTIFICATION: u32 = <types::BadMsgNotification as Identifiable>::CONSTRUCTOR_ID;
const BAD_SERVER_SALT: u32 = <types::BadServerSalt as Identifiable>::CONSTRUCTOR_ID;
const FUTURE_SALTS: u32 = <types::FutureSalts as Identifiable>::CONSTRUCTOR_ID;
const MSG_DETAILED_INFO: u32 = <types::MsgDetailedInfo as Identifiable>::CONSTRUCTOR_ID;
const MSG_NEW_DETAILED_INFO: u32 = <types::MsgNewDetailedInfo as Identifiable>::CONSTRUCTOR_ID;
const MSGS_STATE_INFO: u32 = <types::MsgsStateInfo as Identifiable>::CONSTRUCTOR_ID;
const MSGS_ALL_INFO: u32 = <types::MsgsAllInfo as Identifiable>::CONSTRUCTOR_ID;
const MSG_RESEND_REQ: u32 = <types::MsgResendReq as Identifiable>::CONSTRUCTOR_ID;
const DESTROY_SESSION_OK: u32 = <types::DestroySessionOk as Identifiable>::CONSTRUCTOR_ID;
const DESTROY_SESSION_NONE: u32 = <types::DestroySessionNone as Identifiable>::CONSTRUCTOR_ID;

/// `bad_msg_notification` codes fixed by resyncing the clock and resending.
const MSG_ID_TOO_LOW: i32 = 16;
const MSG_ID_TOO_HIGH: i32 = 17;

/// Work a frame leaves for after the state lock is released.
#[derive(Default)]
struct Followups {
    acks: Vec<i64>,
    /// The salt changed and should reach the backend.
    save: bool,
}

impl Connection {
    pub(crate) async fn on_plain_frame(&self, frame: &[u8], service_tx: &mpsc::Sender<Vec<u8>>) {
        let msg = match plain::unpack(frame, Side::Server) {
            Ok(msg) => msg,
            Err(e) => return self.shared.warn(Warning::MalformedPlain(e)),
        };
        if !self.state.lock().await.handshaking {
            return self.shared.warn(Warning::UnexpectedFrame { encrypted: false });
        }
        // The handshake asks one question at a time; a second unsolicited
        // reply has nowhere to go.
        if service_tx.try_send(msg.body).is_err() {
            self.shared.warn(Warning::UnexpectedFrame { encrypted: false });
        }
    }

    /// Returns `Err` only when the connection can no longer be trusted.
    pub(crate) async fn on_encrypted_frame(self: &Arc<Self>, frame: &[u8]) -> Result<(), InvocationError> {
        let mut out = Followups::default();
        let snapshot = {
            let mut state = self.state.lock().await;
            let unpacked = match &state.session {
                Some(session) => session.unpack(frame),
                None => {
                    self.shared.warn(Warning::UnexpectedFrame { encrypted: true });
                    return Ok(());
                }
            };
            let msg = match unpacked {
                Ok(msg) => msg,
                Err(e) if e.is_authentication() => {
                    tracing::error!("[strand] {e}; dropping DC{}", self.dc_id);
                    return Err(InvocationError::Authentication);
                }
                Err(e) => {
                    self.shared.warn(Warning::Malformed(e));
                    return Ok(());
                }
            };
            self.dispatch(&mut state, msg.msg_id, msg.seq_no, &msg.body, &mut out);
            if out.save { self.snapshot(&state) } else { None }
        };
        if let Some(snapshot) = snapshot {
            if let Err(e) = self.save(snapshot).await {
                self.shared.warn(Warning::Persist(e));
            }
        }
        if !out.acks.is_empty() {
            self.ack(out.acks);
        }
        Ok(())
    }

    fn dispatch(&self, state: &mut SessionState, msg_id: i64, seq_no: i32, body: &[u8], out: &mut Followups) {
        if seq_no & 1 == 1 {
            out.acks.push(msg_id);
        }
        let tag = match Cursor::from_slice(body).peek_u32() {
            Ok(tag) => tag,
            Err(e) => return self.shared.warn(Warning::Decode(e)),
        };

        match tag {
            MSG_CONTAINER_ID => match parse_container(body) {
                Ok(inner) => {
                    for m in inner {
                        self.dispatch(state, m.msg_id, m.seq_no, m.body, out);
                    }
                }
                Err(e) => self.shared.warn(Warning::Decode(e)),
            },
            GZIP_PACKED_ID => match gunzip(body) {
                // Already counted for acks above.
                Ok(inflated) => self.dispatch(state, msg_id, 0, &inflated, out),
                Err(e) => self.shared.warn(Warning::Inflate(e)),
            },
            RPC_RESULT_ID => self.on_rpc_result(state, body),
            BAD_SERVER_SALT | BAD_MSG_NOTIFICATION => self.on_bad_msg(state, msg_id, body, out),
            NEW_SESSION_CREATED => self.on_new_session(state, body, out),
            MSGS_ACK => match enums::MsgsAck::from_bytes(body) {
                Ok(enums::MsgsAck::MsgsAck(ack)) => {
                    for id in ack.msg_ids {
                        state.unacked.remove(&id);
                    }
                }
                Err(e) => self.shared.warn(Warning::Decode(e)),
            },
            PONG => match enums::Pong::from_bytes(body) {
                Ok(enums::Pong::Pong(pong)) => self.deliver(state, pong.msg_id, body),
                Err(e) => self.shared.warn(Warning::Decode(e)),
            },
            FUTURE_SALTS | MSG_DETAILED_INFO | MSG_NEW_DETAILED_INFO | MSGS_STATE_INFO | MSGS_ALL_INFO
            | MSG_RESEND_REQ | DESTROY_SESSION_OK | DESTROY_SESSION_NONE => {
                let name = self.shared.registry.name_for_id(tag).unwrap_or("service message");
                tracing::debug!("[strand] {name} ({tag:#010x}) from DC{}", self.dc_id);
            }
            _ => self.on_unsolicited(tag, body),
        }
    }

    fn on_rpc_result(&self, state: &mut SessionState, body: &[u8]) {
        let mut cur = Cursor::from_slice(body);
        let req_msg_id = match u32::deserialize(&mut cur).and_then(|_| i64::deserialize(&mut cur)) {
            Ok(id) => id,
            Err(e) => return self.shared.warn(Warning::Decode(e)),
        };
        self.deliver(state, req_msg_id, cur.rest());
    }

    /// Decode `result` for the request `req_msg_id` and hand it over.
    fn deliver(&self, state: &mut SessionState, req_msg_id: i64, result: &[u8]) {
        let hint = state.hints.get(&req_msg_id).copied();
        match state.forget(req_msg_id) {
            Some(tx) => {
                let _ = tx.send(Signal::Done(self.decode_result(result, hint)));
            }
            None => self.shared.warn(Warning::UnknownRequest { msg_id: req_msg_id }),
        }
    }

    fn decode_result(&self, result: &[u8], hint: Option<DecodeHint>) -> Result<Payload, InvocationError> {
        let inflated;
        let mut result = result;
        let mut tag = Cursor::from_slice(result).peek_u32()?;
        if tag == GZIP_PACKED_ID {
            inflated = gunzip(result)?;
            result = &inflated;
            tag = Cursor::from_slice(result).peek_u32()?;
        }

        if tag == RPC_ERROR {
            let enums::RpcError::RpcError(e) = enums::RpcError::from_bytes(result)?;
            return Err(InvocationError::Rpc(RpcError::from_telegram(e.error_code, &e.error_message)));
        }

        let registry = &self.shared.registry;
        Ok(match hint {
            Some(DecodeHint::Raw) => Payload::Raw(result.to_vec()),
            Some(DecodeHint::Vector(element)) => Payload::Reply(Reply::Vector(registry.decode_vector(result, element)?)),
            None => Payload::Reply(Reply::Object(registry.decode(result)?)),
        })
    }

    fn on_bad_msg(&self, state: &mut SessionState, msg_id: i64, body: &[u8], out: &mut Followups) {
        let notification = match enums::BadMsgNotification::from_bytes(body) {
            Ok(n) => n,
            Err(e) => return self.shared.warn(Warning::Decode(e)),
        };

        match notification {
            enums::BadMsgNotification::BadServerSalt(bad) => {
                tracing::info!(
                    "[strand] salt rotated on DC{}; resending {} request(s)",
                    self.dc_id,
                    state.pending.len()
                );
                if let Some(session) = state.session.as_mut() {
                    session.salt = bad.new_server_salt;
                }
                out.save = true;
                // Everything still pending went out with the old salt.
                state.hints.clear();
                state.unacked.clear();
                for (_, tx) in state.pending.drain() {
                    let _ = tx.send(Signal::Resend);
                }
            }
            enums::BadMsgNotification::BadMsgNotification(bad) => {
                let code = bad.error_code;
                let signal = match code {
                    MSG_ID_TOO_LOW | MSG_ID_TOO_HIGH => {
                        if let Some(session) = state.session.as_mut() {
                            session.correct_time(msg_id);
                            tracing::info!("[strand] clock resynced, offset now {}s", session.time_offset());
                        }
                        Signal::Resend
                    }
                    _ => Signal::Done(Err(InvocationError::BadMessage { code })),
                };
                match state.forget(bad.bad_msg_id) {
                    Some(tx) => {
                        let _ = tx.send(signal);
                    }
                    None => self.shared.warn(Warning::BadMessage { msg_id: bad.bad_msg_id, code }),
                }
            }
        }
    }

    fn on_new_session(&self, state: &mut SessionState, body: &[u8], out: &mut Followups) {
        match enums::NewSession::from_bytes(body) {
            Ok(enums::NewSession::Created(created)) => {
                tracing::debug!("[strand] new session created, first msg {}", created.first_msg_id);
                if let Some(session) = state.session.as_mut() {
                    session.salt = created.server_salt;
                }
                out.save = true;
            }
            Err(e) => self.shared.warn(Warning::Decode(e)),
        }
    }

    fn on_unsolicited(&self, tag: u32, body: &[u8]) {
        match self.shared.registry.decode(body) {
            Ok(obj) => {
                if !self.shared.handle(&*obj) {
                    let name = self.shared.registry.name_for_id(tag);
                    self.shared.warn(Warning::Unhandled { constructor_id: tag, name });
                }
            }
            Err(e) => self.shared.warn(Warning::Decode(e)),
        }
    }
}

// ─── Envelope helpers ─────────────────────────────────────────────────────────

#[derive(Debug, PartialEq)]
struct Inner<'a> {
    msg_id: i64,
    seq_no: i32,
    body: &'a [u8],
}

/// `msg_container#73f1f8dc messages:vector<message>`, in server order.
fn parse_container(body: &[u8]) -> deserialize::Result<Vec<Inner<'_>>> {
    let mut cur = Cursor::from_slice(body);
    u32::deserialize(&mut cur)?;
    let count = i32::deserialize(&mut cur)?;
    // Each message needs at least its 16-byte header.
    if count < 0 || count as usize > cur.remaining() / 16 {
        return Err(Error::InvalidLength { len: count });
    }
    (0..count)
        .map(|_| {
            let msg_id = i64::deserialize(&mut cur)?;
            let seq_no = i32::deserialize(&mut cur)?;
            let len = i32::deserialize(&mut cur)?;
            if len < 0 || len % 4 != 0 {
                return Err(Error::InvalidLength { len });
            }
            Ok(Inner { msg_id, seq_no, body: cur.take(len as usize)? })
        })
        .collect()
}

/// `gzip_packed#3072cfa1 packed_data:bytes`
fn gunzip(body: &[u8]) -> Result<Vec<u8>, InvocationError> {
    inflate(body, MAX_FRAME_LEN)
}

/// [`gunzip`] that stops reading once the output passes `limit` bytes.
fn inflate(body: &[u8], limit: usize) -> Result<Vec<u8>, InvocationError> {
    let mut cur = Cursor::from_slice(body);
    u32::deserialize(&mut cur)?;
    let packed = Vec::<u8>::deserialize(&mut cur)?;

    let cap = limit as u64 + 1;
    let mut out = Vec::new();
    let gz = flate2::read::GzDecoder::new(&packed[..]).take(cap).read_to_end(&mut out);
    if gz.is_err() || out.is_empty() {
        out.clear();
        flate2::read::ZlibDecoder::new(&packed[..]).take(cap).read_to_end(&mut out)?;
    }
    if out.len() > limit {
        return Err(InvocationError::Protocol(format!("gzip_packed inflates past {limit} bytes")));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use strand_tl_types::Serializable;

    fn header(msg_id: i64, seq_no: i32, body: &[u8]) -> Vec<u8> {
        let mut out = msg_id.to_bytes();
        out.extend(seq_no.to_bytes());
        out.extend((body.len() as i32).to_bytes());
        out.extend_from_slice(body);
        out
    }

    #[test]
    fn container_keeps_server_order() {
        let a = 1u32.to_bytes();
        let b = 2i64.to_bytes();
        let mut body = MSG_CONTAINER_ID.to_bytes();
        body.extend(2i32.to_bytes());
        body.extend(header(11, 1, &a));
        body.extend(header(12, 2, &b));

        let inner = parse_container(&body).unwrap();
        assert_eq!(inner, vec![
            Inner { msg_id: 11, seq_no: 1, body: &a },
            Inner { msg_id: 12, seq_no: 2, body: &b },
        ]);
    }

    #[test]
    fn container_count_beyond_input_is_rejected() {
        let mut body = MSG_CONTAINER_ID.to_bytes();
        body.extend(1000i32.to_bytes());
        assert_eq!(parse_container(&body), Err(Error::InvalidLength { len: 1000 }));
    }

    #[test]
    fn truncated_container_is_eof() {
        let mut body = MSG_CONTAINER_ID.to_bytes();
        body.extend(1i32.to_bytes());
        body.extend(header(11, 1, &[0; 8]));
        body.truncate(body.len() - 4);
        assert_eq!(parse_container(&body), Err(Error::UnexpectedEof));
    }

    #[test]
    fn gzip_packed_inflates() {
        let payload = enums::Pong::from(types::Pong { msg_id: 5, ping_id: 6 }).to_bytes();
        let mut gz = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        gz.write_all(&payload).unwrap();
        let mut body = GZIP_PACKED_ID.to_bytes();
        body.extend(gz.finish().unwrap().to_bytes());

        assert_eq!(gunzip(&body).unwrap(), payload);
    }

    fn packed(payload: &[u8]) -> Vec<u8> {
        let mut gz = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        gz.write_all(payload).unwrap();
        let mut body = GZIP_PACKED_ID.to_bytes();
        body.extend(gz.finish().unwrap().to_bytes());
        body
    }

    #[test]
    fn inflation_stops_at_the_limit() {
        let body = packed(&[0; 4096]);
        assert_eq!(inflate(&body, 4096).unwrap().len(), 4096);
        assert!(matches!(inflate(&body, 4095), Err(InvocationError::Protocol(_))));
    }

    #[test]
    fn gzip_bomb_is_refused() {
        let body = packed(&vec![0; MAX_FRAME_LEN + 1]);
        assert!(body.len() < 64 * 1024);
        assert!(matches!(gunzip(&body), Err(InvocationError::Protocol(_))));
    }

    #[test]
    fn garbage_in_gzip_packed_is_an_error() {
        let mut body = GZIP_PACKED_ID.to_bytes();
        body.extend(vec![1u8, 2, 3, 4, 5].to_bytes());
        assert!(gunzip(&body).is_err());
    }
}
