use crate::error::StorageError;
use crate::sync;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// An abstract string key-value backend.
#[async_trait]
pub trait StorageAdapter: Send + Sync {
    /// Read the value stored under `key`.
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Store `value` under `key`, replacing any previous value.
    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Delete `key`. Missing keys are not an error.
    async fn remove(&self, key: &str) -> Result<(), StorageError>;

    /// Delete every key in the backend.
    async fn clear(&self) -> Result<(), StorageError>;

    /// Enumerate stored keys, or `None` when the backend cannot.
    async fn keys(&self) -> Result<Option<Vec<String>>, StorageError> {
        Ok(None)
    }
}

/// In-memory backend, mainly for tests and ephemeral hosts.
///
/// An optional byte capacity (keys plus values) makes writes fail with
/// [`StorageError::QuotaExceeded`] once exceeded.
#[derive(Debug)]
pub struct MemoryStorage {
    entries: Mutex<BTreeMap<String, String>>,
    capacity: Option<usize>,
    enumerable: bool,
}

impl MemoryStorage {
    /// Unbounded, enumerable storage.
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(BTreeMap::new()),
            capacity: None,
            enumerable: true,
        }
    }

    /// Limit the total size of keys and values to `bytes`.
    pub fn with_capacity(mut self, bytes: usize) -> Self {
        self.capacity = Some(bytes);
        self
    }

    /// Toggle key enumeration support.
    pub fn enumerable(mut self, enabled: bool) -> Self {
        self.enumerable = enabled;
        self
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        sync::lock(&self.entries).len()
    }

    /// Whether nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Raw value under `key`, bypassing the async interface.
    pub fn raw(&self, key: &str) -> Option<String> {
        sync::lock(&self.entries).get(key).cloned()
    }

    /// Write a raw value, bypassing the async interface and capacity.
    pub fn insert_raw(&self, key: &str, value: &str) {
        sync::lock(&self.entries).insert(key.to_string(), value.to_string());
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StorageAdapter for MemoryStorage {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.raw(key))
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut entries = sync::lock(&self.entries);
        if let Some(capacity) = self.capacity {
            let used: usize = entries
                .iter()
                .filter(|(k, _)| k.as_str() != key)
                .map(|(k, v)| k.len() + v.len())
                .sum();
            let needed = key.len() + value.len();
            if used + needed > capacity {
                return Err(StorageError::QuotaExceeded {
                    key: key.to_string(),
                    needed,
                    available: capacity.saturating_sub(used),
                });
            }
        }
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        sync::lock(&self.entries).remove(key);
        Ok(())
    }

    async fn clear(&self) -> Result<(), StorageError> {
        sync::lock(&self.entries).clear();
        Ok(())
    }

    async fn keys(&self) -> Result<Option<Vec<String>>, StorageError> {
        if !self.enumerable {
            return Ok(None);
        }
        Ok(Some(sync::lock(&self.entries).keys().cloned().collect()))
    }
}

const ENTRY_EXTENSION: &str = "entry";
const TEMP_EXTENSION: &str = "entry.tmp";

/// Map a failed write of `needed` bytes, reporting a full disk or an
/// exhausted user quota as [`StorageError::QuotaExceeded`].
fn write_error(key: &str, needed: usize, err: io::Error) -> StorageError {
    match err.kind() {
        ErrorKind::StorageFull | ErrorKind::QuotaExceeded => StorageError::QuotaExceeded {
            key: key.to_string(),
            needed,
            available: 0,
        },
        _ => StorageError::Io(err),
    }
}

/// Directory-backed storage: one file per key.
///
/// File names are the hex-encoded key, so any key is a valid name.
#[derive(Clone, Debug)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    /// Store entries under `dir`, created on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Directory holding the entries.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.{ENTRY_EXTENSION}", hex::encode(key)))
    }

    fn temp_path(&self, key: &str) -> PathBuf {
        self.entry_path(key).with_extension(TEMP_EXTENSION)
    }

    fn decode_name(path: &Path) -> Option<String> {
        if path.extension()? != ENTRY_EXTENSION {
            return None;
        }
        let stem = path.file_stem()?.to_str()?;
        let bytes = hex::decode(stem).ok()?;
        String::from_utf8(bytes).ok()
    }

    async fn entry_paths(&self) -> Result<Vec<PathBuf>, StorageError> {
        let mut dir = match tokio::fs::read_dir(&self.dir).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut paths = Vec::new();
        while let Some(entry) = dir.next_entry().await? {
            let path = entry.path();
            if Self::decode_name(&path).is_some() {
                paths.push(path);
            }
        }
        Ok(paths)
    }
}

#[async_trait]
impl StorageAdapter for FileStorage {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        match tokio::fs::read_to_string(self.entry_path(key)).await {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| write_error(key, value.len(), e))?;

        // Write to a temp file, then rename over the entry.
        let temp_path = self.temp_path(key);
        if let Err(err) = tokio::fs::write(&temp_path, value).await {
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(write_error(key, value.len(), err));
        }
        tokio::fs::rename(&temp_path, self.entry_path(key))
            .await
            .map_err(|e| write_error(key, value.len(), e))
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        match tokio::fs::remove_file(self.entry_path(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn clear(&self) -> Result<(), StorageError> {
        for path in self.entry_paths().await? {
            tokio::fs::remove_file(path).await?;
        }
        Ok(())
    }

    async fn keys(&self) -> Result<Option<Vec<String>>, StorageError> {
        let keys = self
            .entry_paths()
            .await?
            .iter()
            .filter_map(|path| Self::decode_name(path))
            .collect();
        Ok(Some(keys))
    }
}
