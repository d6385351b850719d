//! Pluggable session storage backend.
//!
//! The [`SessionBackend`] trait abstracts over session persistence so that
//! callers can swap in a database, a custom file format, or anything else.
//!
//! Two built-in backends are provided:
//! * [`BinaryFileBackend`]: a compact binary file (default).
//! * [`InMemoryBackend`]: nothing touches the disk.

use std::io;
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};

use crate::session::PersistedSession;

// ─── Trait ────────────────────────────────────────────────────────────────────

/// An abstraction over where and how session data is persisted.
pub trait SessionBackend: Send + Sync {
    /// Persist the given session.
    fn save(&self, session: &PersistedSession) -> io::Result<()>;

    /// Load a previously persisted session, or return `None` if none exists.
    ///
    /// Any error other than "not found" is fatal to [`crate::Client::connect`].
    fn load(&self) -> io::Result<Option<PersistedSession>>;

    /// Remove the stored session.
    fn delete(&self) -> io::Result<()>;

    /// Human-readable name of this backend (for log messages).
    fn name(&self) -> &str;
}

// ─── BinaryFileBackend ────────────────────────────────────────────────────────

/// The default session backend. Stores the session in a compact binary file.
pub struct BinaryFileBackend {
    path: PathBuf,
}

impl BinaryFileBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl SessionBackend for BinaryFileBackend {
    fn save(&self, session: &PersistedSession) -> io::Result<()> {
        session.save(&self.path)
    }

    fn load(&self) -> io::Result<Option<PersistedSession>> {
        match PersistedSession::load(&self.path) {
            Ok(s) => Ok(Some(s)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn delete(&self) -> io::Result<()> {
        match std::fs::remove_file(&self.path) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }

    fn name(&self) -> &str { "binary-file" }
}

// ─── InMemoryBackend ─────────────────────────────────────────────────────────

/// An ephemeral session backend that stores nothing on disk.
///
/// Useful for testing or for clients that should always start fresh.
#[derive(Default)]
pub struct InMemoryBackend {
    data: Mutex<Option<PersistedSession>>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// A backend that already holds `session`.
    pub fn with_session(session: PersistedSession) -> Self {
        Self { data: Mutex::new(Some(session)) }
    }
}

impl SessionBackend for InMemoryBackend {
    fn save(&self, session: &PersistedSession) -> io::Result<()> {
        *self.data.lock().unwrap_or_else(PoisonError::into_inner) = Some(session.clone());
        Ok(())
    }

    fn load(&self) -> io::Result<Option<PersistedSession>> {
        Ok(self.data.lock().unwrap_or_else(PoisonError::into_inner).clone())
    }

    fn delete(&self) -> io::Result<()> {
        *self.data.lock().unwrap_or_else(PoisonError::into_inner) = None;
        Ok(())
    }

    fn name(&self) -> &str { "in-memory" }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strand_crypto::AuthKey;

    fn sample() -> PersistedSession {
        PersistedSession {
            dc_id: 2,
            server_addr: "149.154.167.51:443".into(),
            auth_key: AuthKey::from_bytes([1; 256]),
            salt: 99,
        }
    }

    #[test]
    fn file_backend_roundtrip() {
        let path = std::env::temp_dir().join(format!("strand-test-{}.session", std::process::id()));
        let backend = BinaryFileBackend::new(&path);
        backend.delete().unwrap();
        assert!(backend.load().unwrap().is_none());

        backend.save(&sample()).unwrap();
        assert_eq!(backend.load().unwrap(), Some(sample()));

        backend.delete().unwrap();
        assert!(backend.load().unwrap().is_none());
    }

    #[test]
    fn corrupt_file_is_an_error_not_a_fresh_start() {
        let path = std::env::temp_dir().join(format!("strand-corrupt-{}.session", std::process::id()));
        std::fs::write(&path, [1, 2, 3]).unwrap();
        assert!(BinaryFileBackend::new(&path).load().is_err());
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn memory_backend() {
        let backend = InMemoryBackend::new();
        assert!(backend.load().unwrap().is_none());
        backend.save(&sample()).unwrap();
        assert_eq!(backend.load().unwrap().unwrap().salt, 99);
        backend.delete().unwrap();
        assert!(backend.load().unwrap().is_none());
    }
}
