//! Blob Store Module
//!
//! The object store that committed blocks are persisted to.
//!
//! ## Responsibilities
//! - Create the target container on startup
//! - Store and fetch named byte blobs
//! - List blob names under a path prefix
//!
//! ## Object Layout
//! ```text
//! {container}/
//!   └── {partition_key}/
//!         └── {key_column}/
//!               └── {start}-{end}-{hash}
//! ```
//!
//! Paths handed to a store are relative to its container and always use `/`.

mod local;
mod memory;

use std::io::Read;
use std::sync::Arc;

use bytes::Bytes;

use crate::config::StoreConfig;
use crate::error::{FloeError, Result};

pub use local::LocalBlobStore;
pub use memory::MemoryBlobStore;

/// A container-scoped blob store
pub trait BlobStore: Send + Sync {
    /// Create the container if it does not exist yet (idempotent)
    fn ensure_container_exists(&self) -> Result<()>;

    /// Store `data` under `path`, replacing any existing blob
    fn put(&self, path: &str, data: Bytes) -> Result<()>;

    /// Open a blob for reading
    fn get(&self, path: &str) -> Result<Box<dyn Read + Send>>;

    /// All blob paths starting with `prefix`
    fn list(&self, prefix: &str) -> Result<Vec<String>>;
}

/// Scheme prefix selecting the in-memory store
pub const MEMORY_SCHEME: &str = "memory://";

/// Scheme prefix selecting the local directory store
pub const FILE_SCHEME: &str = "file://";

/// Validate `config` and open the store its endpoint names
///
/// - `memory://…` → a fresh `MemoryBlobStore`
/// - `file:///dir` or `/dir` → `LocalBlobStore` rooted at `dir/{account}/{container}`
pub fn connect(config: &StoreConfig) -> Result<Arc<dyn BlobStore>> {
    config.validate()?;

    let endpoint = config.endpoint.trim();
    if endpoint.starts_with(MEMORY_SCHEME) {
        tracing::debug!("Connecting to in-memory store for container {}", config.container);
        return Ok(Arc::new(MemoryBlobStore::new()));
    }

    let root = endpoint.strip_prefix(FILE_SCHEME).unwrap_or(endpoint);
    if root.contains("://") {
        return Err(FloeError::Config(format!(
            "unsupported store endpoint: {}",
            endpoint
        )));
    }

    tracing::debug!(
        "Connecting to local store at {} (account {}, container {})",
        root,
        config.account,
        config.container
    );
    Ok(Arc::new(LocalBlobStore::new(
        std::path::Path::new(root).join(&config.account).join(&config.container),
    )))
}

/// Join path segments with `/`
pub fn blob_path(segments: &[&str]) -> String {
    segments.join("/")
}
