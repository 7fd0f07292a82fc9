//! Blob store adapters.
//!
//! The stats document lives in an external object store that offers
//! per-object atomic `get`/`put`/`delete` but no transactions across calls.
//! `BlobStore` is the seam; the stats repository never sees which backend
//! it talks to.
//!
//! Backends:
//! - `memory`: process-local map (tests, ephemeral runs)
//! - `fs`: one file per key under a root directory
//! - `http`: remote object store addressed as `<base-url>/<key>` with a
//!   bearer token

mod fs;
mod http;
mod memory;

use std::fmt::Debug;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

pub use fs::FilesystemStore;
pub use http::HttpStore;
pub use memory::MemoryStore;

/// Errors raised by blob store adapters.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("invalid object key: {0:?}")]
    InvalidKey(String),

    #[error("invalid store configuration: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected status {status} for object {key:?}")]
    Status { status: u16, key: String },

    #[error("store call timed out after {0:?}")]
    Timeout(Duration),
}

/// An object read from the store.
#[derive(Debug, Clone)]
pub struct Blob {
    pub bytes: Vec<u8>,
    /// Opaque version token used by conditional writes. `None` when the
    /// backend cannot report one.
    pub version: Option<String>,
}

/// Result of a conditional write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    Written,
    /// The object changed (or appeared) since the expected version was read.
    Conflict,
}

/// Opaque key-value object store.
#[async_trait]
pub trait BlobStore: Debug + Send + Sync {
    /// Short backend name for health and log output.
    fn kind(&self) -> &'static str;

    /// Reads an object. Returns `Ok(None)` when the key does not exist.
    async fn get(&self, key: &str) -> Result<Option<Blob>, StoreError>;

    /// Unconditionally replaces the object stored under `key`.
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<(), StoreError>;

    /// Replaces the object only if its current version equals `expected`.
    /// `expected = None` means the object must not exist yet.
    async fn put_if(
        &self,
        key: &str,
        bytes: Vec<u8>,
        expected: Option<&str>,
    ) -> Result<PutOutcome, StoreError>;

    /// Deletes an object. Deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    async fn exists(&self, key: &str) -> Result<bool, StoreError>;
}

/// Backend selection.
#[derive(Debug, Clone)]
pub enum StoreConfig {
    Memory,
    Filesystem { root: PathBuf },
    Http { base_url: String, token: Option<String> },
}

/// Builds the configured backend.
pub fn open(config: &StoreConfig) -> Result<Arc<dyn BlobStore>, StoreError> {
    let store: Arc<dyn BlobStore> = match config {
        StoreConfig::Memory => Arc::new(MemoryStore::new()),
        StoreConfig::Filesystem { root } => Arc::new(FilesystemStore::new(root.clone())),
        StoreConfig::Http { base_url, token } => {
            Arc::new(HttpStore::new(base_url, token.clone())?)
        }
    };
    Ok(store)
}

/// Rejects keys that are empty or would escape the store namespace.
pub(crate) fn validate_key(key: &str) -> Result<(), StoreError> {
    let bad = key.is_empty()
        || key.starts_with('/')
        || key.contains('\\')
        || key
            .split('/')
            .any(|seg| seg.is_empty() || seg == "." || seg == "..");
    if bad {
        return Err(StoreError::InvalidKey(key.to_string()));
    }
    Ok(())
}
