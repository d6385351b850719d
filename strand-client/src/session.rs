//! Session persistence: saves the auth key, server salt, address and DC id.

use std::io;
use std::path::Path;

use strand_crypto::AuthKey;

/// Leading byte of the binary format.
const FORMAT_VERSION: u8 = 1;

/// Everything needed to resume a session without a new handshake.
#[derive(Clone, Debug, PartialEq)]
pub struct PersistedSession {
    pub dc_id: i32,
    pub server_addr: String,
    pub auth_key: AuthKey,
    pub salt: i64,
}

impl PersistedSession {
    /// `version:u8 dc_id:i32 auth_key:[u8; 256] salt:i64 addr_len:u8 addr`
    pub fn to_bytes(&self) -> Vec<u8> {
        let addr = self.server_addr.as_bytes();
        let addr = &addr[..addr.len().min(u8::MAX as usize)];

        let mut b = Vec::with_capacity(1 + 4 + 256 + 8 + 1 + addr.len());
        b.push(FORMAT_VERSION);
        b.extend_from_slice(&self.dc_id.to_le_bytes());
        b.extend_from_slice(self.auth_key.as_bytes());
        b.extend_from_slice(&self.salt.to_le_bytes());
        b.push(addr.len() as u8);
        b.extend_from_slice(addr);
        b
    }

    pub fn from_bytes(buf: &[u8]) -> io::Result<Self> {
        let mut p = 0usize;
        let mut next = |n: usize| take(buf, &mut p, n);

        let version = next(1)?[0];
        if version != FORMAT_VERSION {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("unsupported session format {version}"),
            ));
        }
        let mut dc_id = [0u8; 4];
        dc_id.copy_from_slice(next(4)?);
        let mut key = [0u8; 256];
        key.copy_from_slice(next(256)?);
        let mut salt = [0u8; 8];
        salt.copy_from_slice(next(8)?);
        let addr_len = next(1)?[0] as usize;
        let server_addr = String::from_utf8(next(addr_len)?.to_vec())
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        Ok(Self {
            dc_id: i32::from_le_bytes(dc_id),
            server_addr,
            auth_key: AuthKey::from_bytes(key),
            salt: i64::from_le_bytes(salt),
        })
    }

    pub fn save(&self, path: &Path) -> io::Result<()> {
        std::fs::write(path, self.to_bytes())
    }

    pub fn load(path: &Path) -> io::Result<Self> {
        Self::from_bytes(&std::fs::read(path)?)
    }
}

fn take<'a>(buf: &'a [u8], pos: &mut usize, n: usize) -> io::Result<&'a [u8]> {
    let s = buf
        .get(*pos..*pos + n)
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "truncated session"))?;
    *pos += n;
    Ok(s)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> PersistedSession {
        PersistedSession {
            dc_id: 4,
            server_addr: "149.154.167.91:443".into(),
            auth_key: AuthKey::from_bytes([0x5c; 256]),
            salt: -77,
        }
    }

    #[test]
    fn bytes_roundtrip() {
        let s = sample();
        assert_eq!(PersistedSession::from_bytes(&s.to_bytes()).unwrap(), s);
    }

    #[test]
    fn truncated_input_is_invalid_data() {
        let bytes = sample().to_bytes();
        let err = PersistedSession::from_bytes(&bytes[..bytes.len() - 3]).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn unknown_version_is_rejected() {
        let mut bytes = sample().to_bytes();
        bytes[0] = 9;
        assert!(PersistedSession::from_bytes(&bytes).is_err());
    }
}
