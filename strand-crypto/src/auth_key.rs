//! The 2048-bit authorization key shared with the server.

use crate::sha1;

/// An authorization key (256 big-endian bytes) plus the identifiers
/// derived from it.
#[derive(Clone)]
pub struct AuthKey {
    pub(crate) data: [u8; 256],
    pub(crate) aux_hash: [u8; 8],
    pub(crate) key_id: [u8; 8],
}

impl AuthKey {
    /// Wrap the raw 256-byte DH output.
    pub fn from_bytes(data: [u8; 256]) -> Self {
        let sha = sha1!(&data);
        let mut aux_hash = [0u8; 8];
        aux_hash.copy_from_slice(&sha[..8]);
        let mut key_id = [0u8; 8];
        key_id.copy_from_slice(&sha[12..20]);
        Self { data, aux_hash, key_id }
    }

    /// Build a key from a big-endian integer of at most 256 bytes,
    /// left-padding it with zeros.
    pub fn from_be_slice(bytes: &[u8]) -> Option<Self> {
        if bytes.len() > 256 {
            return None;
        }
        let mut data = [0u8; 256];
        data[256 - bytes.len()..].copy_from_slice(bytes);
        Some(Self::from_bytes(data))
    }

    pub fn to_bytes(&self) -> [u8; 256] { self.data }

    pub fn as_bytes(&self) -> &[u8; 256] { &self.data }

    /// Low 64 bits of SHA-1(key), sent in front of every encrypted message.
    pub fn key_id(&self) -> [u8; 8] { self.key_id }

    /// High 64 bits of SHA-1(key).
    pub fn aux_hash(&self) -> [u8; 8] { self.aux_hash }

    /// `new_nonce_hash{number}` as used by `dh_gen_ok` (1), `dh_gen_retry` (2)
    /// and `dh_gen_fail` (3).
    pub fn calc_new_nonce_hash(&self, new_nonce: &[u8; 32], number: u8) -> [u8; 16] {
        let sha = sha1!(new_nonce, [number], &self.aux_hash);
        let mut out = [0u8; 16];
        out.copy_from_slice(&sha[4..]);
        out
    }
}

impl std::fmt::Debug for AuthKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "AuthKey(id={:016x})", u64::from_le_bytes(self.key_id))
    }
}

impl PartialEq for AuthKey {
    fn eq(&self, other: &Self) -> bool { self.data == other.data }
}

impl Eq for AuthKey {}
