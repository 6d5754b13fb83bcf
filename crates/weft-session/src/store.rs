//! Session stores.
//!
//! A store maps a session key to a [`StoredSession`]. Stores may be
//! asynchronous ([`SessionStore`]) or synchronous ([`SyncSessionStore`]);
//! every synchronous store is usable wherever an asynchronous one is
//! expected.
//!
//! | Store | Backing |
//! |-------|---------|
//! | [`MemoryStore`] | in-process map, the default |
//! | [`FileStore`] | one JSON file per key in a directory |

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::trace;

use crate::error::SessionResult;
use crate::record::StoredSession;

// =============================================================================
// Traits
// =============================================================================

/// An asynchronous keyed record store.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Loads the record stored under `key`.
    async fn get(&self, key: &str) -> SessionResult<Option<StoredSession>>;

    /// Stores `value` under `key`, replacing any previous record.
    async fn set(&self, key: &str, value: StoredSession) -> SessionResult<()>;
}

/// A synchronous keyed record store.
pub trait SyncSessionStore: Send + Sync {
    fn get(&self, key: &str) -> SessionResult<Option<StoredSession>>;

    fn set(&self, key: &str, value: StoredSession) -> SessionResult<()>;
}

#[async_trait]
impl<T: SyncSessionStore> SessionStore for T {
    async fn get(&self, key: &str) -> SessionResult<Option<StoredSession>> {
        SyncSessionStore::get(self, key)
    }

    async fn set(&self, key: &str, value: StoredSession) -> SessionResult<()> {
        SyncSessionStore::set(self, key, value)
    }
}

// =============================================================================
// MemoryStore
// =============================================================================

/// An in-process store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<HashMap<String, StoredSession>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored records.
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

impl SyncSessionStore for MemoryStore {
    fn get(&self, key: &str) -> SessionResult<Option<StoredSession>> {
        Ok(self.records.read().get(key).cloned())
    }

    fn set(&self, key: &str, value: StoredSession) -> SessionResult<()> {
        self.records.write().insert(key.to_string(), value);
        Ok(())
    }
}

// =============================================================================
// FileStore
// =============================================================================

/// A store keeping one JSON file per key under a directory.
///
/// Keys are percent-encoded into file names, so any key is safe to use.
/// Writes go through a temporary file and a rename.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Creates a store rooted at `dir`. The directory is created on the
    /// first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let mut name = String::with_capacity(key.len() + 5);
        for byte in key.bytes() {
            if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_' {
                name.push(char::from(byte));
            } else {
                name.push_str(&format!("%{byte:02X}"));
            }
        }
        name.push_str(".json");
        self.dir.join(name)
    }
}

#[async_trait]
impl SessionStore for FileStore {
    async fn get(&self, key: &str) -> SessionResult<Option<StoredSession>> {
        let path = self.path_for(key);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    async fn set(&self, key: &str, value: StoredSession) -> SessionResult<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, serde_json::to_vec(&value)?).await?;
        tokio::fs::rename(&tmp, &path).await?;
        trace!(path = %path.display(), "session written");
        Ok(())
    }
}
