//! Durable token storage.
//!
//! Tokens must survive a restart (the "page reload" case) but not an
//! explicit logout. The session manager is the only writer; it talks to
//! storage through the [`TokenStore`] trait so the backing medium can be
//! swapped: [`FileStore`] for real use, [`MemoryStore`] for tests.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use crate::SessionError;

/// The two entries the session persists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageKey {
    AccessToken,
    RefreshToken,
}

impl StorageKey {
    /// The key's name in storage. Fixed, so existing sessions keep
    /// working across client versions.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AccessToken => "accessToken",
            Self::RefreshToken => "refreshToken",
        }
    }
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A persistent string key-value store.
///
/// Methods are synchronous: each call is one small read or overwrite,
/// and the session manager calls them while holding its state lock so
/// storage and memory never disagree.
pub trait TokenStore: Send + Sync + 'static {
    fn get(&self, key: StorageKey) -> Result<Option<String>, SessionError>;

    /// Overwrites the entry for `key`.
    fn set(&self, key: StorageKey, value: &str) -> Result<(), SessionError>;

    /// Removes the entry for `key`. Removing a missing entry is not an error.
    fn remove(&self, key: StorageKey) -> Result<(), SessionError>;
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

/// In-memory store. Clones share the same entries, so a test can hand one
/// clone to a session manager and inspect (or "reload" from) another.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Arc<RwLock<BTreeMap<&'static str, String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl TokenStore for MemoryStore {
    fn get(&self, key: StorageKey) -> Result<Option<String>, SessionError> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.get(key.as_str()).cloned())
    }

    fn set(&self, key: StorageKey, value: &str) -> Result<(), SessionError> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.insert(key.as_str(), value.to_owned());
        Ok(())
    }

    fn remove(&self, key: StorageKey) -> Result<(), SessionError> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.remove(key.as_str());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// FileStore
// ---------------------------------------------------------------------------

/// A JSON object on disk, e.g. `{"accessToken": "...", "refreshToken": "..."}`.
///
/// Every write rewrites the whole file through a temporary sibling and a
/// rename, so a crash mid-write leaves either the old or the new contents.
/// A missing file reads as an empty store.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    /// Serializes read-modify-write cycles within this process.
    write_lock: Mutex<()>,
}

impl FileStore {
    /// Uses `path` as the backing file. Parent directories are created on
    /// first write.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<BTreeMap<String, String>, SessionError> {
        match fs::read(&self.path) {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Ok(BTreeMap::new()),
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| {
                SessionError::Storage(format!("{} is not a token file: {e}", self.path.display()))
            }),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(storage_io(&self.path, e)),
        }
    }

    fn save(&self, entries: &BTreeMap<String, String>) -> Result<(), SessionError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| storage_io(parent, e))?;
        }
        let bytes = serde_json::to_vec_pretty(entries)
            .map_err(|e| SessionError::Storage(e.to_string()))?;

        let tmp = self.path.with_extension("tmp");
        let mut file = fs::File::create(&tmp).map_err(|e| storage_io(&tmp, e))?;
        file.write_all(&bytes).map_err(|e| storage_io(&tmp, e))?;
        file.sync_all().map_err(|e| storage_io(&tmp, e))?;
        drop(file);
        fs::rename(&tmp, &self.path).map_err(|e| storage_io(&self.path, e))
    }

    fn update(&self, f: impl FnOnce(&mut BTreeMap<String, String>)) -> Result<(), SessionError> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut entries = self.load()?;
        f(&mut entries);
        self.save(&entries)
    }
}

impl TokenStore for FileStore {
    fn get(&self, key: StorageKey) -> Result<Option<String>, SessionError> {
        Ok(self.load()?.remove(key.as_str()))
    }

    fn set(&self, key: StorageKey, value: &str) -> Result<(), SessionError> {
        self.update(|entries| {
            entries.insert(key.as_str().to_owned(), value.to_owned());
        })
    }

    fn remove(&self, key: StorageKey) -> Result<(), SessionError> {
        if !self.path.exists() {
            return Ok(());
        }
        self.update(|entries| {
            entries.remove(key.as_str());
        })
    }
}

fn storage_io(path: &Path, err: io::Error) -> SessionError {
    SessionError::Storage(format!("{}: {err}", path.display()))
}
