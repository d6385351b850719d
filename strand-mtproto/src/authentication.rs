//! Sans-IO MTProto authorization key generation.
//!
//! # Flow
//!
//! ```text
//! let (req, s1) = authentication::step1();
//! // send req, receive resp
//! let (req, s2) = authentication::step2(s1, resp, &keys, scheme, dc_id)?;
//! // send req, receive resp
//! let (req, s3) = authentication::step3(s2, resp)?;
//! // send req, receive resp
//! let done = authentication::finish(s3, resp)?;
//! // done.auth_key is ready
//! ```

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use num_bigint::BigUint;
use num_traits::ToPrimitive;
use sha1::{Digest, Sha1};
use strand_crypto::rsa::{self, PublicKey};
use strand_crypto::{AuthKey, Scheme, aes, factorize, generate_key_data_from_nonce, prime, random_bytes};
use strand_tl_types::{Cursor, Deserializable, Serializable, enums, functions, types};

/// Bits a server DH prime must have.
const DH_PRIME_BITS: u64 = 2048;

/// `g_a` and `g_b` must stay this many bits away from both ends of `p`.
const DH_SAFETY_BITS: usize = 64;

/// New nonce (32) plus enough padding for either RSA scheme (255).
const STEP2_RANDOM: usize = 32 + 255;

/// Secret exponent `b` (256) plus answer padding (16).
const STEP3_RANDOM: usize = 256 + 16;

// ─── Error ────────────────────────────────────────────────────────────────────

/// Errors that can occur during auth key generation.
#[allow(missing_docs)]
#[derive(Clone, Debug, PartialEq)]
pub enum Error {
    InvalidNonce { got: [u8; 16], expected: [u8; 16] },
    InvalidServerNonce { got: [u8; 16], expected: [u8; 16] },
    InvalidPqSize { size: usize },
    InvalidPq { pq: u64 },
    UnknownFingerprints { fingerprints: Vec<i64> },
    RsaInput { len: usize },
    DhParamsFail,
    EncryptedResponseNotPadded { len: usize },
    InvalidDhInnerData { error: strand_tl_types::deserialize::Error },
    InvalidAnswerHash { got: [u8; 20], expected: [u8; 20] },
    InvalidDhPrime,
    InvalidGenerator { g: i32 },
    GParameterOutOfRange { value: BigUint, low: BigUint, high: BigUint },
    DhGenRetry,
    DhGenFail,
    InvalidNewNonceHash { got: [u8; 16], expected: [u8; 16] },
}

impl std::error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidNonce { got, expected } => {
                write!(f, "nonce mismatch: got {got:?}, expected {expected:?}")
            }
            Self::InvalidServerNonce { got, expected } => {
                write!(f, "server_nonce mismatch: got {got:?}, expected {expected:?}")
            }
            Self::InvalidPqSize { size } => write!(f, "pq size {size} invalid (expected 1..=8)"),
            Self::InvalidPq { pq } => write!(f, "pq {pq} is not a product of two primes"),
            Self::UnknownFingerprints { fingerprints } => {
                write!(f, "no known fingerprint in {fingerprints:?}")
            }
            Self::RsaInput { len } => write!(f, "inner data of {len} bytes does not fit the RSA block"),
            Self::DhParamsFail => write!(f, "server returned DH params failure"),
            Self::EncryptedResponseNotPadded { len } => {
                write!(f, "encrypted answer len {len} is not 16-byte aligned")
            }
            Self::InvalidDhInnerData { error } => {
                write!(f, "DH inner data deserialization error: {error}")
            }
            Self::InvalidAnswerHash { got, expected } => {
                write!(f, "answer hash mismatch: got {got:?}, expected {expected:?}")
            }
            Self::InvalidDhPrime => write!(f, "dh_prime is not a 2048-bit safe prime"),
            Self::InvalidGenerator { g } => write!(f, "g={g} does not generate the required subgroup"),
            Self::GParameterOutOfRange { value, low, high } => {
                write!(f, "g={value} not in range ({low}, {high})")
            }
            Self::DhGenRetry => write!(f, "DH gen retry requested"),
            Self::DhGenFail => write!(f, "DH gen failed"),
            Self::InvalidNewNonceHash { got, expected } => {
                write!(f, "new nonce hash mismatch: got {got:?}, expected {expected:?}")
            }
        }
    }
}

// ─── Step state ──────────────────────────────────────────────────────────────

/// State after step 1.
pub struct Step1 {
    nonce: [u8; 16],
}

/// State after step 2.
pub struct Step2 {
    nonce: [u8; 16],
    server_nonce: [u8; 16],
    new_nonce: [u8; 32],
}

/// State after step 3.
pub struct Step3 {
    nonce: [u8; 16],
    server_nonce: [u8; 16],
    new_nonce: [u8; 32],
    gab: BigUint,
    time_offset: i32,
}

/// The final output of a successful auth key handshake.
#[derive(Clone, Debug, PartialEq)]
pub struct Finished {
    /// The authorization key.
    pub auth_key: AuthKey,
    /// Clock skew in seconds relative to the server.
    pub time_offset: i32,
    /// Initial server salt.
    pub first_salt: i64,
}

// ─── Step 1: req_pq_multi ────────────────────────────────────────────────────

/// Generate a `req_pq_multi` request. Returns the request + opaque state.
pub fn step1() -> (functions::ReqPqMulti, Step1) {
    do_step1(&random_bytes())
}

fn do_step1(random: &[u8; 16]) -> (functions::ReqPqMulti, Step1) {
    let nonce = *random;
    log::debug!("[handshake] req_pq_multi");
    (functions::ReqPqMulti { nonce }, Step1 { nonce })
}

// ─── Step 2: req_DH_params ───────────────────────────────────────────────────

/// Process `ResPQ` and generate `req_DH_params`.
///
/// `keys` are the server public keys we trust; the first fingerprint the
/// server lists that matches one of them is used. `dc_id` is only sent with
/// [`Scheme::V2`].
pub fn step2(
    data: Step1,
    response: enums::ResPq,
    keys: &[PublicKey],
    scheme: Scheme,
    dc_id: i32,
) -> Result<(functions::ReqDhParams, Step2), Error> {
    do_step2(data, response, keys, scheme, dc_id, &random_bytes())
}

fn do_step2(
    data: Step1,
    response: enums::ResPq,
    keys: &[PublicKey],
    scheme: Scheme,
    dc_id: i32,
    random: &[u8; STEP2_RANDOM],
) -> Result<(functions::ReqDhParams, Step2), Error> {
    let Step1 { nonce } = data;
    let enums::ResPq::ResPq(res_pq) = response;

    check_nonce(&res_pq.nonce, &nonce)?;

    if res_pq.pq.is_empty() || res_pq.pq.len() > 8 {
        return Err(Error::InvalidPqSize { size: res_pq.pq.len() });
    }
    let mut pq_be = [0u8; 8];
    pq_be[8 - res_pq.pq.len()..].copy_from_slice(&res_pq.pq);
    let pq = u64::from_be_bytes(pq_be);
    let (p, q) = factorize(pq).ok_or(Error::InvalidPq { pq })?;

    let key = res_pq
        .server_public_key_fingerprints
        .iter()
        .find_map(|&fp| keys.iter().find(|k| k.fingerprint() == fp))
        .ok_or_else(|| Error::UnknownFingerprints {
            fingerprints: res_pq.server_public_key_fingerprints.clone(),
        })?;

    let mut new_nonce = [0u8; 32];
    new_nonce.copy_from_slice(&random[..32]);

    let p_bytes = trim_be(p);
    let q_bytes = trim_be(q);

    let encrypted_data = match scheme {
        Scheme::V2 => {
            let inner = enums::PQInnerData::Dc(types::PQInnerDataDc {
                pq: res_pq.pq.clone(),
                p: p_bytes.clone(),
                q: q_bytes.clone(),
                nonce,
                server_nonce: res_pq.server_nonce,
                new_nonce,
                dc: dc_id,
            })
            .to_bytes();
            let mut rnd = [0u8; 224];
            rnd.copy_from_slice(&random[32..256]);
            rsa::encrypt_hashed(&inner, key, &rnd).ok_or(Error::RsaInput { len: inner.len() })?
        }
        Scheme::V1 => {
            let inner = enums::PQInnerData::PQInnerData(types::PQInnerData {
                pq: res_pq.pq.clone(),
                p: p_bytes.clone(),
                q: q_bytes.clone(),
                nonce,
                server_nonce: res_pq.server_nonce,
                new_nonce,
            })
            .to_bytes();
            let mut rnd = [0u8; 255];
            rnd.copy_from_slice(&random[32..]);
            rsa::encrypt_sha1_padded(&inner, key, &rnd).ok_or(Error::RsaInput { len: inner.len() })?
        }
    };

    log::debug!("[handshake] req_DH_params (fingerprint {})", key.fingerprint());
    Ok((
        functions::ReqDhParams {
            nonce,
            server_nonce: res_pq.server_nonce,
            p: p_bytes,
            q: q_bytes,
            public_key_fingerprint: key.fingerprint(),
            encrypted_data,
        },
        Step2 { nonce, server_nonce: res_pq.server_nonce, new_nonce },
    ))
}

// ─── Step 3: set_client_DH_params ────────────────────────────────────────────

/// Process `ServerDhParams` and generate `set_client_DH_params`.
pub fn step3(
    data: Step2,
    response: enums::ServerDhParams,
) -> Result<(functions::SetClientDhParams, Step3), Error> {
    let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs() as i32;
    do_step3(data, response, &random_bytes(), now)
}

fn do_step3(
    data: Step2,
    response: enums::ServerDhParams,
    random: &[u8; STEP3_RANDOM],
    now: i32,
) -> Result<(functions::SetClientDhParams, Step3), Error> {
    let Step2 { nonce, server_nonce, new_nonce } = data;

    let mut server_dh_ok = match response {
        enums::ServerDhParams::Fail(f) => {
            check_nonce(&f.nonce, &nonce)?;
            check_server_nonce(&f.server_nonce, &server_nonce)?;
            let digest: [u8; 20] = Sha1::digest(new_nonce).into();
            let mut expected_hash = [0u8; 16];
            expected_hash.copy_from_slice(&digest[4..]);
            check_new_nonce_hash(&f.new_nonce_hash, &expected_hash)?;
            return Err(Error::DhParamsFail);
        }
        enums::ServerDhParams::Ok(x) => x,
    };

    check_nonce(&server_dh_ok.nonce, &nonce)?;
    check_server_nonce(&server_dh_ok.server_nonce, &server_nonce)?;

    let len = server_dh_ok.encrypted_answer.len();
    if len % 16 != 0 || len < 32 {
        return Err(Error::EncryptedResponseNotPadded { len });
    }

    let (key, iv) = generate_key_data_from_nonce(&server_nonce, &new_nonce);
    aes::ige_decrypt(&mut server_dh_ok.encrypted_answer, &key, &iv);
    let plain = server_dh_ok.encrypted_answer;

    let mut got_hash = [0u8; 20];
    got_hash.copy_from_slice(&plain[..20]);
    let mut cursor = Cursor::from_slice(&plain[20..]);

    let enums::ServerDhInnerData::ServerDhInnerData(inner) =
        enums::ServerDhInnerData::deserialize(&mut cursor)
            .map_err(|error| Error::InvalidDhInnerData { error })?;

    let expected_hash: [u8; 20] = Sha1::digest(&plain[20..20 + cursor.pos()]).into();
    if got_hash != expected_hash {
        return Err(Error::InvalidAnswerHash { got: got_hash, expected: expected_hash });
    }

    check_nonce(&inner.nonce, &nonce)?;
    check_server_nonce(&inner.server_nonce, &server_nonce)?;

    let dh_prime = BigUint::from_bytes_be(&inner.dh_prime);
    check_dh_prime(&dh_prime)?;
    check_generator(inner.g, &dh_prime)?;

    let g = BigUint::from(inner.g as u32);
    let g_a = BigUint::from_bytes_be(&inner.g_a);
    let time_offset = inner.server_time.wrapping_sub(now);

    let b = BigUint::from_bytes_be(&random[..256]);
    let g_b = g.modpow(&b, &dh_prime);

    let one = BigUint::from(1u32);
    let p_minus_one = &dh_prime - &one;
    check_g_in_range(&g, &one, &p_minus_one)?;
    check_g_in_range(&g_a, &one, &p_minus_one)?;
    check_g_in_range(&g_b, &one, &p_minus_one)?;
    let safety = &one << (DH_PRIME_BITS as usize - DH_SAFETY_BITS);
    let upper = &dh_prime - &safety;
    check_g_in_range(&g_a, &safety, &upper)?;
    check_g_in_range(&g_b, &safety, &upper)?;

    let gab = g_a.modpow(&b, &dh_prime);

    let client_dh_inner = enums::ClientDhInnerData::ClientDhInnerData(types::ClientDhInnerData {
        nonce,
        server_nonce,
        retry_id: 0,
        g_b: g_b.to_bytes_be(),
    })
    .to_bytes();

    let mut padding = [0u8; 16];
    padding.copy_from_slice(&random[256..]);
    let encrypted_data = strand_crypto::encrypt_with_hash(&client_dh_inner, &key, &iv, &padding);

    log::debug!("[handshake] set_client_DH_params (g={}, time offset {time_offset}s)", inner.g);
    Ok((
        functions::SetClientDhParams { nonce, server_nonce, encrypted_data },
        Step3 { nonce, server_nonce, new_nonce, gab, time_offset },
    ))
}

// ─── finish: create_key ──────────────────────────────────────────────────────

/// Finalise the handshake. Returns the ready [`Finished`] on success.
pub fn finish(data: Step3, response: enums::SetClientDhParamsAnswer) -> Result<Finished, Error> {
    let Step3 { nonce, server_nonce, new_nonce, gab, time_offset } = data;

    struct DhData {
        nonce: [u8; 16],
        server_nonce: [u8; 16],
        hash: [u8; 16],
        num: u8,
    }

    let dh = match response {
        enums::SetClientDhParamsAnswer::DhGenOk(x) => {
            DhData { nonce: x.nonce, server_nonce: x.server_nonce, hash: x.new_nonce_hash1, num: 1 }
        }
        enums::SetClientDhParamsAnswer::DhGenRetry(x) => {
            DhData { nonce: x.nonce, server_nonce: x.server_nonce, hash: x.new_nonce_hash2, num: 2 }
        }
        enums::SetClientDhParamsAnswer::DhGenFail(x) => {
            DhData { nonce: x.nonce, server_nonce: x.server_nonce, hash: x.new_nonce_hash3, num: 3 }
        }
    };

    check_nonce(&dh.nonce, &nonce)?;
    check_server_nonce(&dh.server_nonce, &server_nonce)?;

    // g_ab < p, so it always fits.
    let auth_key = AuthKey::from_be_slice(&gab.to_bytes_be()).ok_or(Error::InvalidDhPrime)?;
    let expected_hash = auth_key.calc_new_nonce_hash(&new_nonce, dh.num);
    check_new_nonce_hash(&dh.hash, &expected_hash)?;

    let first_salt = {
        let mut buf = [0u8; 8];
        for ((dst, a), b) in buf.iter_mut().zip(&new_nonce[..8]).zip(&server_nonce[..8]) {
            *dst = a ^ b;
        }
        i64::from_le_bytes(buf)
    };

    match dh.num {
        1 => {
            log::debug!("[handshake] done, {auth_key:?}");
            Ok(Finished { auth_key, time_offset, first_salt })
        }
        2 => Err(Error::DhGenRetry),
        _ => Err(Error::DhGenFail),
    }
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

fn trim_be(v: u64) -> Vec<u8> {
    let b = v.to_be_bytes();
    let skip = b.iter().position(|&x| x != 0).unwrap_or(7);
    b[skip..].to_vec()
}

fn check_nonce(got: &[u8; 16], expected: &[u8; 16]) -> Result<(), Error> {
    if got == expected {
        Ok(())
    } else {
        Err(Error::InvalidNonce { got: *got, expected: *expected })
    }
}

fn check_server_nonce(got: &[u8; 16], expected: &[u8; 16]) -> Result<(), Error> {
    if got == expected {
        Ok(())
    } else {
        Err(Error::InvalidServerNonce { got: *got, expected: *expected })
    }
}

fn check_new_nonce_hash(got: &[u8; 16], expected: &[u8; 16]) -> Result<(), Error> {
    if got == expected {
        Ok(())
    } else {
        Err(Error::InvalidNewNonceHash { got: *got, expected: *expected })
    }
}

fn check_g_in_range(val: &BigUint, lo: &BigUint, hi: &BigUint) -> Result<(), Error> {
    if lo < val && val < hi {
        Ok(())
    } else {
        Err(Error::GParameterOutOfRange { value: val.clone(), low: lo.clone(), high: hi.clone() })
    }
}

fn check_dh_prime(p: &BigUint) -> Result<(), Error> {
    if p.bits() == DH_PRIME_BITS && prime::is_safe_prime(p) {
        Ok(())
    } else {
        Err(Error::InvalidDhPrime)
    }
}

/// `g` must generate a cyclic subgroup of prime order `(p - 1) / 2`, which
/// reduces to a residue condition on `p` for each allowed `g`.
fn check_generator(g: i32, p: &BigUint) -> Result<(), Error> {
    let rem = |m: u32| (p % m).to_u32().unwrap_or(u32::MAX);
    let ok = match g {
        2 => rem(8) == 7,
        3 => rem(3) == 2,
        4 => true,
        5 => matches!(rem(5), 1 | 4),
        6 => matches!(rem(24), 19 | 23),
        7 => matches!(rem(7), 3 | 5 | 6),
        _ => false,
    };
    if ok { Ok(()) } else { Err(Error::InvalidGenerator { g }) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strand_crypto::encrypt_with_hash;

    const PQ: u64 = 1470626929934143021;
    const SERVER_NONCE: [u8; 16] = [9; 16];
    const SERVER_TIME: i32 = 1_700_000_000;

    fn secret_a() -> BigUint {
        BigUint::from_bytes_be(&[0x5a; 256])
    }

    fn res_pq(nonce: [u8; 16]) -> enums::ResPq {
        enums::ResPq::from(types::ResPq {
            nonce,
            server_nonce: SERVER_NONCE,
            pq: PQ.to_be_bytes().to_vec(),
            server_public_key_fingerprints: vec![1234, PublicKey::production().fingerprint()],
        })
    }

    fn new_nonce() -> [u8; 32] {
        core::array::from_fn(|i| i as u8)
    }

    fn step2_random() -> [u8; STEP2_RANDOM] {
        core::array::from_fn(|i| (i * 13) as u8)
    }

    fn run_to_step2(scheme: Scheme) -> (functions::ReqDhParams, Step2) {
        let (_, s1) = do_step1(&[7; 16]);
        let mut random = step2_random();
        random[..32].copy_from_slice(&new_nonce());
        do_step2(s1, res_pq([7; 16]), &[PublicKey::production()], scheme, 2, &random).unwrap()
    }

    /// What a server answers to `req_DH_params` with the given group.
    fn server_dh_params(g: i32, dh_prime: &BigUint) -> enums::ServerDhParams {
        let g_a = BigUint::from(g as u32).modpow(&secret_a(), dh_prime);
        let inner = enums::ServerDhInnerData::from(types::ServerDhInnerData {
            nonce: [7; 16],
            server_nonce: SERVER_NONCE,
            g,
            dh_prime: dh_prime.to_bytes_be(),
            g_a: g_a.to_bytes_be(),
            server_time: SERVER_TIME,
        })
        .to_bytes();
        let (key, iv) = generate_key_data_from_nonce(&SERVER_NONCE, &new_nonce());
        enums::ServerDhParams::from(types::ServerDhParamsOk {
            nonce: [7; 16],
            server_nonce: SERVER_NONCE,
            encrypted_answer: encrypt_with_hash(&inner, &key, &iv, &[0; 16]),
        })
    }

    fn server_key_from(request: &functions::SetClientDhParams) -> AuthKey {
        let (key, iv) = generate_key_data_from_nonce(&SERVER_NONCE, &new_nonce());
        let mut plain = request.encrypted_data.clone();
        aes::ige_decrypt(&mut plain, &key, &iv);
        let enums::ClientDhInnerData::ClientDhInnerData(inner) =
            enums::ClientDhInnerData::from_bytes(&plain[20..]).unwrap();
        assert_eq!(inner.retry_id, 0);
        let g_ab = BigUint::from_bytes_be(&inner.g_b).modpow(&secret_a(), &prime::known_dh_prime());
        AuthKey::from_be_slice(&g_ab.to_bytes_be()).unwrap()
    }

    fn full_handshake(b: [u8; STEP3_RANDOM]) -> (Finished, AuthKey) {
        let (_, s2) = run_to_step2(Scheme::V2);
        let params = server_dh_params(3, &prime::known_dh_prime());
        let (request, s3) = do_step3(s2, params, &b, SERVER_TIME - 5).unwrap();
        let server_key = server_key_from(&request);

        let answer = enums::SetClientDhParamsAnswer::from(types::DhGenOk {
            nonce: [7; 16],
            server_nonce: SERVER_NONCE,
            new_nonce_hash1: server_key.calc_new_nonce_hash(&new_nonce(), 1),
        });
        (finish(s3, answer).unwrap(), server_key)
    }

    #[test]
    fn handshake_agrees_with_the_server() {
        let (done, server_key) = full_handshake([0x33; STEP3_RANDOM]);
        assert_eq!(done.auth_key, server_key);
        assert_eq!(done.time_offset, 5);

        let mut salt = [0u8; 8];
        for i in 0..8 {
            salt[i] = new_nonce()[i] ^ SERVER_NONCE[i];
        }
        assert_eq!(done.first_salt, i64::from_le_bytes(salt));
    }

    #[test]
    fn fixed_randomness_is_reproducible() {
        let (a, _) = full_handshake([0x33; STEP3_RANDOM]);
        let (b, _) = full_handshake([0x33; STEP3_RANDOM]);
        assert_eq!(a, b);

        let (c, _) = full_handshake([0x44; STEP3_RANDOM]);
        assert_ne!(a.auth_key, c.auth_key);
    }

    #[test]
    fn step2_factors_pq() {
        let (request, _) = run_to_step2(Scheme::V2);
        assert_eq!(request.p, 1206429347u32.to_be_bytes());
        assert_eq!(request.q, 1218991343u32.to_be_bytes());
        assert_eq!(request.public_key_fingerprint, PublicKey::production().fingerprint());
        assert_eq!(request.encrypted_data.len(), 256);

        let (legacy, _) = run_to_step2(Scheme::V1);
        assert_eq!(legacy.encrypted_data.len(), 256);
        assert_ne!(legacy.encrypted_data, request.encrypted_data);
    }

    #[test]
    fn step2_rejects_foreign_nonce() {
        let (_, s1) = do_step1(&[7; 16]);
        let err = do_step2(s1, res_pq([8; 16]), &[PublicKey::production()], Scheme::V2, 2, &step2_random());
        assert!(matches!(err, Err(Error::InvalidNonce { .. })));
    }

    #[test]
    fn step2_needs_a_known_key() {
        let (_, s1) = do_step1(&[7; 16]);
        let err = do_step2(s1, res_pq([7; 16]), &[PublicKey::test()], Scheme::V2, 2, &step2_random());
        assert!(matches!(err, Err(Error::UnknownFingerprints { fingerprints }) if fingerprints.len() == 2));
    }

    #[test]
    fn step2_rejects_prime_pq() {
        let (_, s1) = do_step1(&[7; 16]);
        let resp = enums::ResPq::from(types::ResPq {
            nonce: [7; 16],
            server_nonce: SERVER_NONCE,
            pq: 1_000_000_007u64.to_be_bytes().to_vec(),
            server_public_key_fingerprints: vec![PublicKey::production().fingerprint()],
        });
        let err = do_step2(s1, resp, &[PublicKey::production()], Scheme::V2, 2, &step2_random());
        assert!(matches!(err, Err(Error::InvalidPq { pq: 1_000_000_007 })));
    }

    #[test]
    fn dh_params_fail_aborts() {
        let (_, s2) = run_to_step2(Scheme::V2);
        let digest: [u8; 20] = Sha1::digest(new_nonce()).into();
        let mut hash = [0u8; 16];
        hash.copy_from_slice(&digest[4..]);
        let fail = enums::ServerDhParams::from(types::ServerDhParamsFail {
            nonce: [7; 16],
            server_nonce: SERVER_NONCE,
            new_nonce_hash: hash,
        });
        assert!(matches!(do_step3(s2, fail, &[0x33; STEP3_RANDOM], 0), Err(Error::DhParamsFail)));
    }

    #[test]
    fn generator_without_residue_condition_is_rejected() {
        // The known prime is 3 mod 8, so 2 is not a valid generator for it.
        for g in [2, 9] {
            let (_, s2) = run_to_step2(Scheme::V2);
            let params = server_dh_params(g, &prime::known_dh_prime());
            let err = do_step3(s2, params, &[0x33; STEP3_RANDOM], 0);
            assert!(matches!(err, Err(Error::InvalidGenerator { g: bad }) if bad == g));
        }
    }

    #[test]
    fn tampered_prime_is_rejected() {
        let (_, s2) = run_to_step2(Scheme::V2);
        let params = server_dh_params(3, &(prime::known_dh_prime() + 2u32));
        assert!(matches!(do_step3(s2, params, &[0x33; STEP3_RANDOM], 0), Err(Error::InvalidDhPrime)));
    }

    #[test]
    fn dh_gen_retry_aborts_without_a_key() {
        let (_, s2) = run_to_step2(Scheme::V2);
        let params = server_dh_params(3, &prime::known_dh_prime());
        let (request, s3) = do_step3(s2, params, &[0x33; STEP3_RANDOM], 0).unwrap();
        let server_key = server_key_from(&request);

        let answer = enums::SetClientDhParamsAnswer::from(types::DhGenRetry {
            nonce: [7; 16],
            server_nonce: SERVER_NONCE,
            new_nonce_hash2: server_key.calc_new_nonce_hash(&new_nonce(), 2),
        });
        assert_eq!(finish(s3, answer), Err(Error::DhGenRetry));
    }

    #[test]
    fn wrong_new_nonce_hash_is_rejected() {
        let (_, s2) = run_to_step2(Scheme::V2);
        let params = server_dh_params(3, &prime::known_dh_prime());
        let (_, s3) = do_step3(s2, params, &[0x33; STEP3_RANDOM], 0).unwrap();
        let answer = enums::SetClientDhParamsAnswer::from(types::DhGenOk {
            nonce: [7; 16],
            server_nonce: SERVER_NONCE,
            new_nonce_hash1: [0; 16],
        });
        assert!(matches!(finish(s3, answer), Err(Error::InvalidNewNonceHash { .. })));
    }
}
