//! An in-process MTProto server for driving a real `Client`.
//!
//! Every dial opens a `tokio::io::duplex` pipe and spawns a task that speaks
//! the server side: the full auth key handshake with a local RSA key, then
//! encrypted traffic answered by a per-address script. `ping` is answered
//! with `pong` and `msgs_ack` is recorded; everything else goes to the
//! script.

#![allow(dead_code)]

use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use num_bigint::BigUint;
use strand_client::transport::{BoxedStream, DialFuture, Dialer, INTERMEDIATE_INIT, recv_frame, send_frame};
use strand_client::{Config, DcDirectory, InMemoryBackend};
use strand_crypto::rsa::PublicKey;
use strand_crypto::{AuthKey, Scheme, Side, aes, encrypt_with_hash, generate_key_data_from_nonce, prime, sha256};
use strand_mtproto::{EncryptedSession, PlainSession, plain};
use strand_tl_types::{
    Cursor, Deserializable, GZIP_PACKED_ID, Identifiable, MSG_CONTAINER_ID, RPC_RESULT_ID, Serializable, enums,
    functions, types,
};
use tokio::io::{AsyncReadExt, DuplexStream};

/// 2048-bit modulus of the key the mock server decrypts with.
const N: &str = "\
244876093796494376288350942989362597503124249524631010271957915739058773512836776096352072313380\
595684056143140343342276838192745801400734627072206595832587705059168419524469003611204514420332\
826860755735692251199010220916897396851104263306959263864127418850899112960714352251414976449834\
455537434119504887736441030663426808246263058847226075916638615789345997809684670985366468807743\
383639566529032484403102039884169027111754110091519575212222130657424241947279674506690562601944\
153613305203511340719037432058260191522896049969612766805501691059670290427141442609373108331206\
18364545904307164209914332170004150576283";

/// Its private exponent.
const D: &str = "\
138899002255075483225401802869929432222731294563813314247673277075297478471187181509769930515244\
980147994309551842827804128705572919438956757660286677655074467062415533628371923344720030197620\
466388783949808867450020689875409979561819275892593552876773008657145179443697382098571804241056\
899921396706569948221574235899558151470882846559944572620715377060392626020755184492445269859360\
496985505571371927680044082843156127952270277337822422063660740622075157729892415153420944031364\
893719061984744649343960671626319581234400369919069531459929338667557709875439934578244989067647\
62271799574497953525727509793100920822433";

const PQ: u64 = 1470626929934143021;
pub const SERVER_NONCE: [u8; 16] = [0x42; 16];

pub const DC2: &str = "dc2.test:443";
pub const DC4: &str = "dc4.test:443";

pub fn public_key() -> PublicKey {
    PublicKey::new(N, "65537").unwrap()
}

fn secret() -> BigUint {
    BigUint::from_bytes_be(&[0x5a; 256])
}

// ─── Scripts ──────────────────────────────────────────────────────────────────

/// One decrypted client message.
#[derive(Clone, Debug)]
pub struct Incoming {
    pub msg_id: i64,
    pub seq_no: i32,
    pub salt: i64,
    pub body: Vec<u8>,
}

impl Incoming {
    pub fn tag(&self) -> u32 {
        Cursor::from_slice(&self.body).peek_u32().unwrap()
    }
}

/// What the server does in response.
pub enum Out {
    /// A content-related message.
    Message(Vec<u8>),
    /// Several messages in one `msg_container`, in the given order.
    Container(Vec<Vec<u8>>),
    /// A message whose `msg_key` no longer matches.
    Tampered(Vec<u8>),
    /// A 4-byte transport error code.
    TransportError(i32),
    /// Hang up.
    Close,
}

pub type Script = Arc<dyn Fn(&Incoming) -> Vec<Out> + Send + Sync>;

pub fn rpc_result(req_msg_id: i64, result: &[u8]) -> Vec<u8> {
    let mut body = RPC_RESULT_ID.to_bytes();
    body.extend(req_msg_id.to_bytes());
    body.extend_from_slice(result);
    body
}

pub fn rpc_error(req_msg_id: i64, code: i32, message: &str) -> Vec<u8> {
    let error = enums::RpcError::from(types::RpcError { error_code: code, error_message: message.into() });
    rpc_result(req_msg_id, &error.to_bytes())
}

pub fn gzip_packed(body: &[u8]) -> Vec<u8> {
    use std::io::Write;
    let mut gz = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    gz.write_all(body).unwrap();
    let mut out = GZIP_PACKED_ID.to_bytes();
    out.extend(gz.finish().unwrap().to_bytes());
    out
}

pub fn bad_server_salt(bad_msg_id: i64, new_server_salt: i64) -> Vec<u8> {
    enums::BadMsgNotification::from(types::BadServerSalt {
        bad_msg_id,
        bad_msg_seqno: 1,
        error_code: 48,
        new_server_salt,
    })
    .to_bytes()
}

pub fn bad_msg(bad_msg_id: i64, error_code: i32) -> Vec<u8> {
    enums::BadMsgNotification::from(types::BadMsgNotification { bad_msg_id, bad_msg_seqno: 1, error_code })
        .to_bytes()
}

/// `future_salts` echoing `num` in `now`, so replies are easy to tell apart.
pub fn future_salts(req_msg_id: i64, now: i32) -> Vec<u8> {
    enums::FutureSalts::from(types::FutureSalts {
        req_msg_id,
        now,
        salts: strand_tl_types::RawVec(vec![]),
    })
    .to_bytes()
}

/// The `num` of a `get_future_salts` request.
pub fn requested_num(incoming: &Incoming) -> i32 {
    functions::GetFutureSalts::from_bytes(&incoming.body).unwrap().num
}

// ─── MockNet ──────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct Stats {
    pub dials: Vec<String>,
    pub handshakes: Vec<String>,
    pub acked: Vec<i64>,
}

struct NetInner {
    scheme: Scheme,
    scripts: Mutex<HashMap<String, Script>>,
    keys: Mutex<HashMap<String, AuthKey>>,
    stats: Mutex<Stats>,
    /// Seconds the server clock runs ahead of the host clock.
    clock_offset: AtomicI32,
}

/// A set of fake datacenters, addressed by `host:port`.
#[derive(Clone)]
pub struct MockNet {
    inner: Arc<NetInner>,
}

impl MockNet {
    pub fn new() -> Self {
        Self::with_scheme(Scheme::V2)
    }

    pub fn with_scheme(scheme: Scheme) -> Self {
        Self {
            inner: Arc::new(NetInner {
                scheme,
                scripts: Mutex::new(HashMap::new()),
                keys: Mutex::new(HashMap::new()),
                stats: Mutex::new(Stats::default()),
                clock_offset: AtomicI32::new(0),
            }),
        }
    }

    /// Serve `addr` with `script`.
    pub fn dc<F>(&self, addr: &str, script: F) -> &Self
    where
        F: Fn(&Incoming) -> Vec<Out> + Send + Sync + 'static,
    {
        self.inner.scripts.lock().unwrap().insert(addr.to_owned(), Arc::new(script));
        self
    }

    /// Skew the server clock by `secs` for every later message id.
    pub fn set_clock_offset(&self, secs: i32) -> &Self {
        self.inner.clock_offset.store(secs, Ordering::Relaxed);
        self
    }

    /// The server's idea of the current unix time.
    pub fn server_now(&self) -> i64 {
        let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs() as i64;
        now + i64::from(self.inner.clock_offset.load(Ordering::Relaxed))
    }

    /// Stop serving `addr`; later dials are refused.
    pub fn unplug(&self, addr: &str) -> &Self {
        self.inner.scripts.lock().unwrap().remove(addr);
        self
    }

    pub fn dials(&self) -> Vec<String> {
        self.inner.stats.lock().unwrap().dials.clone()
    }

    pub fn handshakes(&self) -> Vec<String> {
        self.inner.stats.lock().unwrap().handshakes.clone()
    }

    pub fn acked(&self) -> Vec<i64> {
        self.inner.stats.lock().unwrap().acked.clone()
    }

    /// A client configuration pointed at [`DC2`], with [`DC4`] in the
    /// directory, an empty in-memory session and keepalive off.
    pub fn config(&self) -> Config {
        let mut directory = DcDirectory::empty();
        directory.insert(2, DC2).insert(4, DC4);
        Config {
            server_addr: DC2.into(),
            dc_id: 2,
            public_keys: vec![public_key()],
            scheme: self.inner.scheme,
            session_backend: Arc::new(InMemoryBackend::new()),
            dc_directory: directory,
            dialer: Arc::new(self.clone()),
            ping_interval: Duration::ZERO,
            handshake_timeout: Duration::from_secs(10),
            reconnect_delay: Duration::from_millis(10),
            ..Config::default()
        }
    }
}

impl Dialer for MockNet {
    fn dial<'a>(&'a self, addr: &'a str) -> DialFuture<'a> {
        Box::pin(async move {
            let script = self
                .inner
                .scripts
                .lock()
                .unwrap()
                .get(addr)
                .cloned()
                .ok_or_else(|| io::Error::new(io::ErrorKind::ConnectionRefused, addr.to_owned()))?;
            self.inner.stats.lock().unwrap().dials.push(addr.to_owned());

            let (client, server) = tokio::io::duplex(1 << 20);
            tokio::spawn(serve(Arc::clone(&self.inner), addr.to_owned(), script, server));
            Ok(Box::new(client) as BoxedStream)
        })
    }
}

// ─── Server side ──────────────────────────────────────────────────────────────

const PING: u32 = <functions::Ping as Identifiable>::CONSTRUCTOR_ID;
const MSGS_ACK: u32 = <types::MsgsAck as Identifiable>::CONSTRUCTOR_ID;
const REQ_PQ_MULTI: u32 = <functions::ReqPqMulti as Identifiable>::CONSTRUCTOR_ID;
const REQ_DH_PARAMS: u32 = <functions::ReqDhParams as Identifiable>::CONSTRUCTOR_ID;
const SET_CLIENT_DH_PARAMS: u32 = <functions::SetClientDhParams as Identifiable>::CONSTRUCTOR_ID;

async fn serve(net: Arc<NetInner>, addr: String, script: Script, mut stream: DuplexStream) {
    let mut init = [0u8; 4];
    if stream.read_exact(&mut init).await.is_err() || init != INTERMEDIATE_INIT {
        return;
    }

    let mut handshake: Option<Dh> = None;
    let mut key = net.keys.lock().unwrap().get(&addr).cloned();
    let mut plain_out = PlainSession::new(Side::Server);
    let mut session: Option<EncryptedSession> = None;

    loop {
        let Ok(frame) = recv_frame(&mut stream).await else { return };

        if frame.len() >= 8 && frame[..8] == [0; 8] {
            let Ok(msg) = plain::unpack(&frame, Side::Client) else { return };
            let Some(reply) = handshake_reply(&net, &addr, &mut handshake, &mut key, &msg.body) else { return };
            let (out, _) = plain_out.pack(&reply);
            if send_frame(&mut stream, &out).await.is_err() {
                return;
            }
            continue;
        }

        let Some(key) = key.clone() else { return };
        let skew = net.clock_offset.load(Ordering::Relaxed);
        let session = session.get_or_insert_with(|| {
            EncryptedSession::with_session_id(key.clone(), 0, skew, net.scheme, Side::Server, 0)
        });
        let Ok(msg) = session.unpack(&frame) else { return };
        if msg.session_id != session.session_id() {
            *session = EncryptedSession::with_session_id(key, session.salt, skew, net.scheme, Side::Server, msg.session_id);
        }
        let incoming = Incoming { msg_id: msg.msg_id, seq_no: msg.seq_no, salt: msg.salt, body: msg.body };

        let outs = match incoming.tag() {
            PING => {
                let ping = functions::Ping::from_bytes(&incoming.body).unwrap();
                let pong = enums::Pong::from(types::Pong { msg_id: incoming.msg_id, ping_id: ping.ping_id });
                vec![Out::Message(pong.to_bytes())]
            }
            MSGS_ACK => {
                let enums::MsgsAck::MsgsAck(ack) = enums::MsgsAck::from_bytes(&incoming.body).unwrap();
                net.stats.lock().unwrap().acked.extend(ack.msg_ids);
                Vec::new()
            }
            _ => script(&incoming),
        };
        for out in outs {
            if !emit(session, &mut stream, out).await {
                return;
            }
        }
    }
}

async fn emit(session: &mut EncryptedSession, stream: &mut DuplexStream, out: Out) -> bool {
    let frame = match out {
        Out::Message(body) => session.pack(&body, true).0,
        Out::Container(bodies) => {
            let mut container = MSG_CONTAINER_ID.to_bytes();
            container.extend((bodies.len() as i32).to_bytes());
            for body in bodies {
                container.extend(session.next_msg_id().to_bytes());
                container.extend(session.next_seq_no(true).to_bytes());
                container.extend((body.len() as i32).to_bytes());
                container.extend(body);
            }
            let msg_id = session.next_msg_id();
            let seq_no = session.next_seq_no(false);
            session.pack_with(msg_id, seq_no, &container)
        }
        Out::Tampered(body) => {
            let mut frame = session.pack(&body, true).0;
            frame[8] ^= 0x01;
            frame
        }
        Out::TransportError(code) => code.to_le_bytes().to_vec(),
        Out::Close => return false,
    };
    send_frame(stream, &frame).await.is_ok()
}

struct Dh {
    nonce: [u8; 16],
    new_nonce: [u8; 32],
}

fn handshake_reply(
    net: &NetInner,
    addr: &str,
    dh: &mut Option<Dh>,
    key: &mut Option<AuthKey>,
    body: &[u8],
) -> Option<Vec<u8>> {
    match Cursor::from_slice(body).peek_u32().ok()? {
        REQ_PQ_MULTI => {
            let req = functions::ReqPqMulti::from_bytes(body).ok()?;
            *dh = Some(Dh { nonce: req.nonce, new_nonce: [0; 32] });
            let res = enums::ResPq::from(types::ResPq {
                nonce: req.nonce,
                server_nonce: SERVER_NONCE,
                pq: PQ.to_be_bytes().to_vec(),
                server_public_key_fingerprints: vec![public_key().fingerprint()],
            });
            Some(res.to_bytes())
        }
        REQ_DH_PARAMS => {
            let req = functions::ReqDhParams::from_bytes(body).ok()?;
            let state = dh.as_mut()?;
            state.new_nonce = decrypt_new_nonce(&req.encrypted_data)?;

            let p = prime::known_dh_prime();
            let g_a = BigUint::from(3u32).modpow(&secret(), &p);
            let server_time = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs() as i32;
            let inner = enums::ServerDhInnerData::from(types::ServerDhInnerData {
                nonce: state.nonce,
                server_nonce: SERVER_NONCE,
                g: 3,
                dh_prime: p.to_bytes_be(),
                g_a: g_a.to_bytes_be(),
                server_time,
            })
            .to_bytes();
            let (k, iv) = generate_key_data_from_nonce(&SERVER_NONCE, &state.new_nonce);
            let params = enums::ServerDhParams::from(types::ServerDhParamsOk {
                nonce: state.nonce,
                server_nonce: SERVER_NONCE,
                encrypted_answer: encrypt_with_hash(&inner, &k, &iv, &[0; 16]),
            });
            Some(params.to_bytes())
        }
        SET_CLIENT_DH_PARAMS => {
            let req = functions::SetClientDhParams::from_bytes(body).ok()?;
            let state = dh.as_ref()?;
            let (k, iv) = generate_key_data_from_nonce(&SERVER_NONCE, &state.new_nonce);
            let mut plain = req.encrypted_data.clone();
            aes::ige_decrypt(&mut plain, &k, &iv);
            let enums::ClientDhInnerData::ClientDhInnerData(inner) =
                enums::ClientDhInnerData::from_bytes(plain.get(20..)?).ok()?;

            let g_ab = BigUint::from_bytes_be(&inner.g_b).modpow(&secret(), &prime::known_dh_prime());
            let auth_key = AuthKey::from_be_slice(&g_ab.to_bytes_be())?;
            let new_nonce_hash1 = auth_key.calc_new_nonce_hash(&state.new_nonce, 1);

            net.keys.lock().unwrap().insert(addr.to_owned(), auth_key.clone());
            net.stats.lock().unwrap().handshakes.push(addr.to_owned());
            *key = Some(auth_key);

            let answer = enums::SetClientDhParamsAnswer::from(types::DhGenOk {
                nonce: state.nonce,
                server_nonce: SERVER_NONCE,
                new_nonce_hash1,
            });
            Some(answer.to_bytes())
        }
        _ => None,
    }
}

/// Undo the client's RSA encryption of `p_q_inner_data*` and return its
/// `new_nonce`. Handles both `RSA_PAD` and the SHA-1 scheme.
fn decrypt_new_nonce(encrypted: &[u8]) -> Option<[u8; 32]> {
    let n = BigUint::parse_bytes(N.as_bytes(), 10)?;
    let d = BigUint::parse_bytes(D.as_bytes(), 10)?;
    let m = BigUint::from_bytes_be(encrypted).modpow(&d, &n).to_bytes_be();
    let mut block = vec![0u8; 256 - m.len()];
    block.extend(m);

    let (key_xor, rest) = block.split_at(32);
    let hash = sha256!(rest);
    let temp_key: [u8; 32] = core::array::from_fn(|i| key_xor[i] ^ hash[i]);
    let mut data_with_hash = rest.to_vec();
    aes::ige_decrypt(&mut data_with_hash, &temp_key, &[0; 32]);
    let data_with_padding: Vec<u8> = data_with_hash[..192].iter().rev().copied().collect();

    let inner = if sha256!(&temp_key, &data_with_padding)[..] == data_with_hash[192..] {
        enums::PQInnerData::from_bytes(&data_with_padding).ok()?
    } else {
        // 0x00, SHA1(data), data, padding
        enums::PQInnerData::from_bytes(block.get(21..)?).ok()?
    };
    Some(match inner {
        enums::PQInnerData::PQInnerData(i) => i.new_nonce,
        enums::PQInnerData::Dc(i) => i.new_nonce,
    })
}
