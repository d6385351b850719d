//! Cryptographic primitives for MTProto.
//!
//! Provides:
//! - AES-256-IGE encryption/decryption
//! - SHA-1 / SHA-256 hash macros
//! - Pollard-rho PQ factorization
//! - RSA encryption of the handshake payload (`RSA_PAD` and the SHA-1 scheme)
//! - Safe-prime checks for server DH groups
//! - `AuthKey`, the 256-byte session key
//! - Message encryption / decryption for both key-derivation schemes
//! - DH nonce→key derivation

#![deny(unsafe_code)]

pub mod aes;
mod auth_key;
mod factorize;
#[doc(hidden)]
pub mod hash;
pub mod prime;
pub mod rsa;

pub use auth_key::AuthKey;
pub use factorize::factorize;

/// Fill `buf` from the operating system's CSPRNG.
///
/// An OS without a working entropy source cannot run MTProto at all, so a
/// failure here aborts.
pub fn fill_random(buf: &mut [u8]) {
    getrandom::getrandom(buf).expect("getrandom failed");
}

/// `N` random bytes from the OS CSPRNG.
pub fn random_bytes<const N: usize>() -> [u8; N] {
    let mut buf = [0u8; N];
    fill_random(&mut buf);
    buf
}

// ─── Message encryption ──────────────────────────────────────────────────────

/// Errors from [`decrypt_message`].
#[derive(Clone, Debug, PartialEq)]
pub enum DecryptError {
    /// Ciphertext too short or not block-aligned.
    InvalidBuffer,
    /// The `auth_key_id` in front of the ciphertext is not ours.
    AuthKeyMismatch,
    /// The transmitted `msg_key` does not match the decrypted contents.
    MessageKeyMismatch,
}

impl std::fmt::Display for DecryptError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidBuffer => write!(f, "invalid ciphertext buffer length"),
            Self::AuthKeyMismatch => write!(f, "auth_key_id mismatch"),
            Self::MessageKeyMismatch => write!(f, "msg_key mismatch"),
        }
    }
}
impl std::error::Error for DecryptError {}

/// Who produced a message. Selects which slice of the auth key feeds the
/// key derivation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Side {
    Client,
    Server,
}

impl Side {
    fn x(self) -> usize {
        match self {
            Side::Client => 0,
            Side::Server => 8,
        }
    }
}

/// Message-key and cipher-key derivation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Scheme {
    /// SHA-1 message key over the unpadded plaintext, SHA-1 key derivation,
    /// RSA with a SHA-1 prefix during the handshake.
    V1,
    /// MTProto 2.0: SHA-256 message key over the padded plaintext (mixed
    /// with part of the auth key), SHA-256 key derivation, `RSA_PAD`.
    #[default]
    V2,
}

/// Offset of the payload length inside the plaintext header
/// (`salt + session_id + msg_id + seq_no`).
const LEN_OFFSET: usize = 28;
const HEADER_LEN: usize = 32;

fn calc_key_v2(auth_key: &AuthKey, msg_key: &[u8; 16], side: Side) -> ([u8; 32], [u8; 32]) {
    let x = side.x();
    let sha_a = sha256!(msg_key, &auth_key.data[x..x + 36]);
    let sha_b = sha256!(&auth_key.data[40 + x..40 + x + 36], msg_key);

    let mut aes_key = [0u8; 32];
    aes_key[..8].copy_from_slice(&sha_a[..8]);
    aes_key[8..24].copy_from_slice(&sha_b[8..24]);
    aes_key[24..].copy_from_slice(&sha_a[24..]);

    let mut aes_iv = [0u8; 32];
    aes_iv[..8].copy_from_slice(&sha_b[..8]);
    aes_iv[8..24].copy_from_slice(&sha_a[8..24]);
    aes_iv[24..].copy_from_slice(&sha_b[24..]);

    (aes_key, aes_iv)
}

fn calc_key_v1(auth_key: &AuthKey, msg_key: &[u8; 16], side: Side) -> ([u8; 32], [u8; 32]) {
    let x = side.x();
    let k = &auth_key.data;
    let sha_a = sha1!(msg_key, &k[x..x + 32]);
    let sha_b = sha1!(&k[32 + x..48 + x], msg_key, &k[48 + x..64 + x]);
    let sha_c = sha1!(&k[64 + x..96 + x], msg_key);
    let sha_d = sha1!(msg_key, &k[96 + x..128 + x]);

    let mut aes_key = [0u8; 32];
    aes_key[..8].copy_from_slice(&sha_a[..8]);
    aes_key[8..20].copy_from_slice(&sha_b[8..20]);
    aes_key[20..].copy_from_slice(&sha_c[4..16]);

    let mut aes_iv = [0u8; 32];
    aes_iv[..12].copy_from_slice(&sha_a[8..20]);
    aes_iv[12..20].copy_from_slice(&sha_b[..8]);
    aes_iv[20..24].copy_from_slice(&sha_c[16..20]);
    aes_iv[24..].copy_from_slice(&sha_d[..8]);

    (aes_key, aes_iv)
}

fn msg_key_v2(auth_key: &AuthKey, padded: &[u8], side: Side) -> [u8; 16] {
    let x = side.x();
    let large = sha256!(&auth_key.data[88 + x..88 + x + 32], padded);
    let mut msg_key = [0u8; 16];
    msg_key.copy_from_slice(&large[8..24]);
    msg_key
}

fn msg_key_v1(unpadded: &[u8]) -> [u8; 16] {
    let sha = sha1!(unpadded);
    let mut msg_key = [0u8; 16];
    msg_key.copy_from_slice(&sha[4..20]);
    msg_key
}

fn padding_len(len: usize, scheme: Scheme) -> usize {
    match scheme {
        // 12..1024 bytes are allowed; this always picks 17..32.
        Scheme::V2 => 16 + (16 - (len % 16)),
        Scheme::V1 => (16 - (len % 16)) % 16,
    }
}

/// Encrypt a full plaintext (header + payload, unpadded).
///
/// Returns `key_id || msg_key || ciphertext`.
pub fn encrypt_message(plaintext: &[u8], auth_key: &AuthKey, sender: Side, scheme: Scheme) -> Vec<u8> {
    encrypt_message_with(plaintext, auth_key, sender, scheme, &random_bytes())
}

/// [`encrypt_message`] with caller-supplied padding bytes.
pub fn encrypt_message_with(
    plaintext: &[u8],
    auth_key: &AuthKey,
    sender: Side,
    scheme: Scheme,
    rnd: &[u8; 32],
) -> Vec<u8> {
    let mut buffer = plaintext.to_vec();
    buffer.extend(rnd.iter().take(padding_len(plaintext.len(), scheme)).copied());

    let msg_key = match scheme {
        Scheme::V2 => msg_key_v2(auth_key, &buffer, sender),
        Scheme::V1 => msg_key_v1(plaintext),
    };
    let (key, iv) = match scheme {
        Scheme::V2 => calc_key_v2(auth_key, &msg_key, sender),
        Scheme::V1 => calc_key_v1(auth_key, &msg_key, sender),
    };
    aes::ige_encrypt(&mut buffer, &key, &iv);

    let mut out = Vec::with_capacity(24 + buffer.len());
    out.extend_from_slice(&auth_key.key_id);
    out.extend_from_slice(&msg_key);
    out.extend(buffer);
    out
}

/// Decrypt `key_id || msg_key || ciphertext` and authenticate it.
///
/// On success returns the padded plaintext. Any mismatch between the
/// transmitted and the recomputed message key is reported as
/// [`DecryptError::MessageKeyMismatch`].
pub fn decrypt_message(
    buffer: &[u8],
    auth_key: &AuthKey,
    sender: Side,
    scheme: Scheme,
) -> Result<Vec<u8>, DecryptError> {
    if buffer.len() < 24 + HEADER_LEN || (buffer.len() - 24) % 16 != 0 {
        return Err(DecryptError::InvalidBuffer);
    }
    if auth_key.key_id != buffer[..8] {
        return Err(DecryptError::AuthKeyMismatch);
    }
    let mut msg_key = [0u8; 16];
    msg_key.copy_from_slice(&buffer[8..24]);

    let (key, iv) = match scheme {
        Scheme::V2 => calc_key_v2(auth_key, &msg_key, sender),
        Scheme::V1 => calc_key_v1(auth_key, &msg_key, sender),
    };
    let mut plain = buffer[24..].to_vec();
    aes::ige_decrypt(&mut plain, &key, &iv);

    let expected = match scheme {
        Scheme::V2 => msg_key_v2(auth_key, &plain, sender),
        Scheme::V1 => {
            // Only the unpadded part is hashed, so the declared length has to
            // be trusted far enough to locate it.
            let mut len = [0u8; 4];
            len.copy_from_slice(&plain[LEN_OFFSET..HEADER_LEN]);
            let end = HEADER_LEN.saturating_add(u32::from_le_bytes(len) as usize);
            match plain.get(..end) {
                Some(unpadded) => msg_key_v1(unpadded),
                None => return Err(DecryptError::MessageKeyMismatch),
            }
        }
    };
    if msg_key != expected {
        return Err(DecryptError::MessageKeyMismatch);
    }
    Ok(plain)
}

// ─── Handshake helpers ───────────────────────────────────────────────────────

/// Derive `(key, iv)` from nonces for the DH answer and `client_DH_inner_data`.
pub fn generate_key_data_from_nonce(server_nonce: &[u8; 16], new_nonce: &[u8; 32]) -> ([u8; 32], [u8; 32]) {
    let h1 = sha1!(new_nonce, server_nonce);
    let h2 = sha1!(server_nonce, new_nonce);
    let h3 = sha1!(new_nonce, new_nonce);

    let mut key = [0u8; 32];
    key[..20].copy_from_slice(&h1);
    key[20..].copy_from_slice(&h2[..12]);

    let mut iv = [0u8; 32];
    iv[..8].copy_from_slice(&h2[12..]);
    iv[8..28].copy_from_slice(&h3);
    iv[28..].copy_from_slice(&new_nonce[..4]);

    (key, iv)
}

/// `SHA1(data) + data + padding`, AES-IGE encrypted with a nonce-derived key.
///
/// `padding` must hold at least 15 bytes; only what alignment needs is used.
pub fn encrypt_with_hash(data: &[u8], key: &[u8; 32], iv: &[u8; 32], padding: &[u8; 16]) -> Vec<u8> {
    let pad_len = (16 - (20 + data.len()) % 16) % 16;
    let mut out = Vec::with_capacity(20 + data.len() + pad_len);
    out.extend_from_slice(&sha1!(data));
    out.extend_from_slice(data);
    out.extend_from_slice(&padding[..pad_len]);
    aes::ige_encrypt(&mut out, key, iv);
    out
}
