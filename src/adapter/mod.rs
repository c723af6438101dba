//! Storage Adapter
//!
//! Persists committed blocks to a blob store and answers range queries.
//!
//! ## Write Path
//! A single worker thread consumes committed blocks, encodes each into a
//! container, names it through the range index and uploads it to
//! `{partition_key}/{key_column}/{filename}`. Failed uploads are retried
//! forever (see `writer`).
//!
//! ## Read Path
//! `query` lists a partition, prunes blocks by filename, fetches the
//! survivors in parallel and filters their rows (see `query`).

mod query;
mod writer;

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{self, Receiver, RecvTimeoutError};

use crate::block::Block;
use crate::codec::RowCodec;
use crate::config::Config;
use crate::error::{FloeError, Result};
use crate::row::{KeyValue, Row};
use crate::store::{self, BlobStore};

use writer::Uploader;

/// Point-in-time view of the adapter's counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AdapterStats {
    /// Blocks successfully uploaded
    pub blocks_uploaded: u64,

    /// Bytes successfully uploaded
    pub bytes_uploaded: u64,

    /// Failed upload attempts
    pub upload_failures: u64,

    /// Blocks waiting in the retry queue
    pub retries_pending: usize,

    /// Blocks currently being encoded/uploaded (0 or 1)
    pub in_flight: usize,

    /// Queries served
    pub queries: u64,

    /// Listed blocks skipped by filename pruning
    pub blocks_pruned: u64,

    /// Blocks downloaded by queries
    pub blocks_fetched: u64,

    /// Fetches abandoned after a sibling failed or the query timed out
    pub fetches_cancelled: u64,
}

/// Live counters, shared with the worker and query threads
#[derive(Debug, Default)]
pub(crate) struct Counters {
    blocks_uploaded: AtomicU64,
    bytes_uploaded: AtomicU64,
    upload_failures: AtomicU64,
    retries_pending: AtomicUsize,
    in_flight: AtomicUsize,
    queries: AtomicU64,
    blocks_pruned: AtomicU64,
    blocks_fetched: AtomicU64,
    fetches_cancelled: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> AdapterStats {
        // Read before retries_pending: a block moving between the two is
        // always visible in at least one
        let in_flight = self.in_flight.load(Ordering::SeqCst);
        AdapterStats {
            blocks_uploaded: self.blocks_uploaded.load(Ordering::SeqCst),
            bytes_uploaded: self.bytes_uploaded.load(Ordering::SeqCst),
            upload_failures: self.upload_failures.load(Ordering::SeqCst),
            retries_pending: self.retries_pending.load(Ordering::SeqCst),
            in_flight,
            queries: self.queries.load(Ordering::SeqCst),
            blocks_pruned: self.blocks_pruned.load(Ordering::SeqCst),
            blocks_fetched: self.blocks_fetched.load(Ordering::SeqCst),
            fetches_cancelled: self.fetches_cancelled.load(Ordering::SeqCst),
        }
    }
}

/// Bridges committed blocks and queries to a blob store
pub struct StorageAdapter {
    config: Config,
    codec: Arc<RowCodec>,

    /// Store supplied up front instead of connecting from `config.store`
    injected_store: Option<Arc<dyn BlobStore>>,

    /// Connected store (set by `connect`)
    store: Option<Arc<dyn BlobStore>>,

    /// Committed-block input (kept to report unconsumed blocks)
    input: Option<Receiver<Block>>,

    /// Write worker and its completion signal
    worker: Option<JoinHandle<()>>,
    finished: Option<Receiver<()>>,

    /// Asks the worker to exit after its current upload
    shutdown: Arc<AtomicBool>,

    counters: Arc<Counters>,
}

impl StorageAdapter {
    /// Adapter that connects to the store named by `config.store`
    pub fn new(config: Config, codec: Arc<RowCodec>) -> Self {
        Self {
            config,
            codec,
            injected_store: None,
            store: None,
            input: None,
            worker: None,
            finished: None,
            shutdown: Arc::new(AtomicBool::new(false)),
            counters: Arc::new(Counters::default()),
        }
    }

    /// Adapter over an already constructed store
    pub fn with_store(config: Config, codec: Arc<RowCodec>, store: Arc<dyn BlobStore>) -> Self {
        let mut adapter = Self::new(config, codec);
        adapter.injected_store = Some(store);
        adapter
    }

    /// Validate connection parameters, connect, and ensure the container
    /// exists. Enough for query-only use; `start` calls it.
    pub fn connect(&mut self) -> Result<()> {
        if self.store.is_some() {
            return Ok(());
        }

        self.config.store.validate()?;

        let store = match &self.injected_store {
            Some(store) => Arc::clone(store),
            None => store::connect(&self.config.store)?,
        };
        store.ensure_container_exists()?;

        tracing::info!(
            "StorageAdapter connected to container {} (account {})",
            self.config.store.container,
            self.config.store.account
        );
        self.store = Some(store);
        Ok(())
    }

    /// Connect and launch the write worker on `input`
    pub fn start(&mut self, input: Receiver<Block>) -> Result<()> {
        if self.worker.is_some() {
            return Err(FloeError::Config("StorageAdapter already started".to_string()));
        }

        self.connect()?;
        let store = self.connected_store()?;

        let uploader = Uploader::new(store, Arc::clone(&self.codec), Arc::clone(&self.counters));
        let (finished_tx, finished_rx) = channel::bounded(1);
        let worker_input = input.clone();
        let shutdown = Arc::clone(&self.shutdown);
        let retry_capacity = self.config.retry_queue_capacity.max(1);
        let backoff = self.config.retry_backoff();

        let handle = thread::Builder::new()
            .name("floe-storage-writer".to_string())
            .spawn(move || {
                writer::run(uploader, worker_input, shutdown, retry_capacity, backoff);
                let _ = finished_tx.send(());
            })?;

        self.input = Some(input);
        self.worker = Some(handle);
        self.finished = Some(finished_rx);

        tracing::info!("StorageAdapter started");
        Ok(())
    }

    /// Wait for the write worker to finish
    ///
    /// The worker finishes once its input is closed and every block is
    /// uploaded. After the drain ceiling the worker is told to give up, and
    /// any blocks still unconsumed are reported as `DrainTimeout`.
    pub fn stop(&mut self) -> Result<()> {
        tracing::info!("StorageAdapter stopping");

        let finished = match self.finished.take() {
            Some(finished) => finished,
            None => return Ok(()),
        };

        let ceiling = self.config.drain_ceiling();
        let completed = match finished.recv_timeout(ceiling) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => true,
            Err(RecvTimeoutError::Timeout) => false,
        };

        if completed {
            if let Some(handle) = self.worker.take() {
                if handle.join().is_err() {
                    tracing::error!("StorageAdapter worker panicked");
                }
            }
        } else {
            tracing::warn!("StorageAdapter worker still busy after {:?}, abandoning", ceiling);
            self.shutdown.store(true, Ordering::SeqCst);
            // A hung upload must not hang shutdown; the thread is detached
            self.worker.take();
        }

        let queued = self.input.as_ref().map(|i| i.len()).unwrap_or(0);
        let stats = self.counters.snapshot();
        let remaining = queued + stats.retries_pending + stats.in_flight;

        if remaining > 0 {
            return Err(FloeError::DrainTimeout {
                component: "storage adapter".to_string(),
                remaining,
            });
        }

        tracing::info!(
            "StorageAdapter stopped ({} blocks uploaded, {} failed attempts)",
            stats.blocks_uploaded,
            stats.upload_failures
        );
        Ok(())
    }

    /// Rows of `partition_key` whose key lies in `[start, end]`
    ///
    /// Rows come back grouped by block, in the order fetches completed. On
    /// failure the error is `FloeError::Query`, carrying the rows gathered
    /// before the first failing fetch; the remaining fetches are cancelled.
    pub fn query(&self, partition_key: &str, start: &KeyValue, end: &KeyValue) -> Result<Vec<Row>> {
        let store = self.connected_store()?;
        self.counters.queries.fetch_add(1, Ordering::SeqCst);

        query::run(
            query::QueryContext {
                store,
                codec: Arc::clone(&self.codec),
                key_column: &self.config.key_column,
                timeout: self.config.fetch_timeout(),
                counters: Arc::clone(&self.counters),
            },
            partition_key,
            start,
            end,
        )
    }

    /// Current counters
    pub fn stats(&self) -> AdapterStats {
        self.counters.snapshot()
    }

    /// The connected store, if `connect` has run
    pub fn store(&self) -> Option<&Arc<dyn BlobStore>> {
        self.store.as_ref()
    }

    pub fn is_running(&self) -> bool {
        self.worker.as_ref().map(|h| !h.is_finished()).unwrap_or(false)
    }

    fn connected_store(&self) -> Result<Arc<dyn BlobStore>> {
        self.store
            .clone()
            .ok_or_else(|| FloeError::NotStarted("StorageAdapter".to_string()))
    }
}

/// Blob path of a block within the container
pub fn block_path(partition_key: &str, key_column: &str, filename: &str) -> String {
    store::blob_path(&[partition_key, key_column, filename])
}

/// Maximum rows decoded between cancellation checks
pub(crate) const CANCEL_CHECK_INTERVAL: usize = 1024;

/// Pause used by the worker while only retries are pending
pub(crate) fn retry_pause(backoff: Duration) -> Duration {
    backoff.max(Duration::from_millis(1))
}
