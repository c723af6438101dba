//! In-memory blob store
//!
//! Backs tests and `memory://` endpoints. Supports failure injection and
//! counts calls so callers can assert on I/O that did (or did not) happen.

use std::collections::BTreeMap;
use std::io::{Cursor, Read};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use bytes::Bytes;
use parking_lot::RwLock;

use crate::error::{FloeError, Result};

use super::BlobStore;

/// Blob store held entirely in memory
#[derive(Default)]
pub struct MemoryBlobStore {
    /// Set by `ensure_container_exists`; writes before that fail
    container_exists: AtomicBool,

    /// path → contents
    blobs: RwLock<BTreeMap<String, Bytes>>,

    // Failure injection
    failing_puts: AtomicUsize,
    fail_gets: AtomicBool,
    fail_lists: AtomicBool,
    get_delay_ms: AtomicU64,

    // Call counters
    put_count: AtomicU64,
    get_count: AtomicU64,
    list_count: AtomicU64,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    // =========================================================================
    // Failure Injection
    // =========================================================================

    /// Make the next `n` puts fail
    pub fn fail_next_puts(&self, n: usize) {
        self.failing_puts.store(n, Ordering::SeqCst);
    }

    /// Make every get fail until reset
    pub fn set_fail_gets(&self, fail: bool) {
        self.fail_gets.store(fail, Ordering::SeqCst);
    }

    /// Make every list fail until reset
    pub fn set_fail_lists(&self, fail: bool) {
        self.fail_lists.store(fail, Ordering::SeqCst);
    }

    /// Delay every get by `delay`
    pub fn set_get_delay(&self, delay: Duration) {
        self.get_delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    // =========================================================================
    // Inspection
    // =========================================================================

    pub fn put_count(&self) -> u64 {
        self.put_count.load(Ordering::SeqCst)
    }

    pub fn get_count(&self) -> u64 {
        self.get_count.load(Ordering::SeqCst)
    }

    pub fn list_count(&self) -> u64 {
        self.list_count.load(Ordering::SeqCst)
    }

    /// All stored paths, sorted
    pub fn paths(&self) -> Vec<String> {
        self.blobs.read().keys().cloned().collect()
    }

    pub fn blob_count(&self) -> usize {
        self.blobs.read().len()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.blobs.read().contains_key(path)
    }
}

impl BlobStore for MemoryBlobStore {
    fn ensure_container_exists(&self) -> Result<()> {
        self.container_exists.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn put(&self, path: &str, data: Bytes) -> Result<()> {
        self.put_count.fetch_add(1, Ordering::SeqCst);

        if !self.container_exists.load(Ordering::SeqCst) {
            return Err(FloeError::Store("container does not exist".to_string()));
        }

        let injected = self
            .failing_puts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(FloeError::Store(format!("injected put failure for {}", path)));
        }

        self.blobs.write().insert(path.to_string(), data);
        Ok(())
    }

    fn get(&self, path: &str) -> Result<Box<dyn Read + Send>> {
        self.get_count.fetch_add(1, Ordering::SeqCst);

        let delay = self.get_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            std::thread::sleep(Duration::from_millis(delay));
        }

        if self.fail_gets.load(Ordering::SeqCst) {
            return Err(FloeError::Store(format!("injected get failure for {}", path)));
        }

        match self.blobs.read().get(path) {
            Some(data) => Ok(Box::new(Cursor::new(data.clone()))),
            None => Err(FloeError::NotFound(path.to_string())),
        }
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>> {
        self.list_count.fetch_add(1, Ordering::SeqCst);

        if self.fail_lists.load(Ordering::SeqCst) {
            return Err(FloeError::Store(format!("injected list failure for {}", prefix)));
        }

        Ok(self
            .blobs
            .read()
            .keys()
            .filter(|path| path.starts_with(prefix))
            .cloned()
            .collect())
    }
}
