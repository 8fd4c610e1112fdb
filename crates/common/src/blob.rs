//! Opaque blob store boundary for state checkpoints.
//! The core persists a single small blob per key; the backend decides
//! where the bytes live.

use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::PathBuf;

use async_trait::async_trait;
use parking_lot::RwLock;
use thiserror::Error;

/// Errors from the blob store boundary.
#[derive(Debug, Error)]
pub enum BlobError {
    /// No blob stored under the requested key.
    #[error("blob not found: {0}")]
    NotFound(String),

    /// Backend I/O failure.
    #[error("blob store I/O error: {0}")]
    Io(#[from] io::Error),

    /// Backend-specific failure (remote store, quota, ...).
    #[error("blob store backend error: {0}")]
    Backend(String),
}

/// Opaque key-value blob storage.
///
/// Implementations must be `Send + Sync`; `get` on an absent key returns
/// [`BlobError::NotFound`] so callers can distinguish "fresh start" from
/// actual backend failure.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<(), BlobError>;
    async fn get(&self, key: &str) -> Result<Vec<u8>, BlobError>;
}

// ════════════════════════════════════════════════════════════════════════════
// MEMORY BACKEND
// ════════════════════════════════════════════════════════════════════════════

/// In-memory blob store. Used by tests and the local harness.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored blobs (test helper).
    pub fn len(&self) -> usize {
        self.blobs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.read().is_empty()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<(), BlobError> {
        self.blobs.write().insert(key.to_string(), bytes.to_vec());
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, BlobError> {
        self.blobs
            .read()
            .get(key)
            .cloned()
            .ok_or_else(|| BlobError::NotFound(key.to_string()))
    }
}

// ════════════════════════════════════════════════════════════════════════════
// FILESYSTEM BACKEND
// ════════════════════════════════════════════════════════════════════════════

/// Filesystem-backed blob store: one file per key under a base directory.
///
/// Writes are truncate-then-write followed by `flush()` + `sync_all()`,
/// so a completed `put` never leaves partial bytes from a previous write.
pub struct FsBlobStore {
    base_dir: PathBuf,
}

impl FsBlobStore {
    /// Root the store at `base_dir`. The directory is created on first write.
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        FsBlobStore {
            base_dir: base_dir.into(),
        }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.base_dir.join(key)
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<(), BlobError> {
        fs::create_dir_all(&self.base_dir)?;
        let path = self.path_for(key);
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&path)?;
        file.write_all(bytes)?;
        file.flush()?;
        file.sync_all()?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, BlobError> {
        let path = self.path_for(key);
        match fs::read(&path) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(BlobError::NotFound(key.to_string()))
            }
            Err(e) => Err(BlobError::Io(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_roundtrip() {
        let store = MemoryBlobStore::new();
        store.put("state", b"payload").await.expect("put");
        let got = store.get("state").await.expect("get");
        assert_eq!(got, b"payload");
    }

    #[tokio::test]
    async fn test_memory_missing_key_is_not_found() {
        let store = MemoryBlobStore::new();
        match store.get("absent").await {
            Err(BlobError::NotFound(key)) => assert_eq!(key, "absent"),
            other => panic!("expected NotFound, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_fs_roundtrip_and_overwrite() {
        let tmp = tempfile::TempDir::new().expect("tmpdir");
        let store = FsBlobStore::new(tmp.path());

        store.put("state", b"first").await.expect("put");
        store.put("state", b"second-longer").await.expect("overwrite");
        let got = store.get("state").await.expect("get");
        assert_eq!(got, b"second-longer");
    }

    #[tokio::test]
    async fn test_fs_missing_key_is_not_found() {
        let tmp = tempfile::TempDir::new().expect("tmpdir");
        let store = FsBlobStore::new(tmp.path());
        assert!(matches!(
            store.get("absent").await,
            Err(BlobError::NotFound(_))
        ));
    }
}
