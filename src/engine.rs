//! Engine Module
//!
//! Wires the ingestion pipeline together.
//!
//! ## Responsibilities
//! - Build the row codec shared by blocks and the storage adapter
//! - Connect and start the storage adapter, then the block manager
//! - Hand out row senders and serve queries
//! - Shut both components down in order
//!
//! ```text
//! producers ──Row──► [unbounded] ──► BlockManager ──Block──► [bounded] ──► StorageAdapter ──► BlobStore
//!                                                                               ▲
//!                                                            query ─────────────┘
//! ```

use std::sync::Arc;

use crossbeam::channel::{self, Sender};

use crate::adapter::{AdapterStats, StorageAdapter};
use crate::codec::{RowCodec, Schema};
use crate::config::Config;
use crate::error::{FloeError, Result};
use crate::manager::BlockManager;
use crate::row::{KeyValue, Row};
use crate::store::BlobStore;

/// A running ingestion pipeline
///
/// ## Shutdown Order
/// 1. Drop the engine's own row sender (the input closes once every
///    producer has dropped theirs too)
/// 2. Stop the block manager: drain buffered rows, force-commit open blocks
/// 3. Stop the storage adapter: upload everything the manager committed
///
/// The manager's block sender lives in its worker thread, so step 2 closes
/// the adapter's input and lets step 3 finish.
pub struct Engine {
    config: Config,
    codec: Arc<RowCodec>,

    /// Row input; `None` once closed
    rows: Option<Sender<Row>>,

    manager: Option<BlockManager>,
    adapter: StorageAdapter,
}

impl Engine {
    /// Open an engine on the store named by `config.store`
    pub fn open(config: Config, schema: Schema) -> Result<Self> {
        let codec = Arc::new(RowCodec::new(schema, config.compression));
        let adapter = StorageAdapter::new(config.clone(), Arc::clone(&codec));
        Self::start(config, codec, adapter)
    }

    /// Open an engine on an already constructed store
    ///
    /// Connection parameters are still validated.
    pub fn open_with_store(config: Config, schema: Schema, store: Arc<dyn BlobStore>) -> Result<Self> {
        let codec = Arc::new(RowCodec::new(schema, config.compression));
        let adapter = StorageAdapter::with_store(config.clone(), Arc::clone(&codec), store);
        Self::start(config, codec, adapter)
    }

    fn start(config: Config, codec: Arc<RowCodec>, mut adapter: StorageAdapter) -> Result<Self> {
        // Step 1: Reject bad configuration before spawning anything
        config.validate()?;

        // Step 2: Channels
        let (row_tx, row_rx) = channel::unbounded();
        let (block_tx, block_rx) = channel::bounded(config.block_channel_capacity);

        // Step 3: Persistence first, so committed blocks always have a consumer
        adapter.start(block_rx)?;

        // Step 4: Block manager
        let manager = match BlockManager::start(&config, Arc::clone(&codec), row_rx, block_tx) {
            Ok(manager) => manager,
            Err(e) => {
                // block_tx is gone with the failed start; let the adapter finish
                if let Err(stop_err) = adapter.stop() {
                    tracing::warn!("StorageAdapter stop after failed start: {}", stop_err);
                }
                return Err(e);
            }
        };

        tracing::info!(
            "Engine started (container: {}, compression: {})",
            config.store.container,
            config.compression
        );

        Ok(Self {
            config,
            codec,
            rows: Some(row_tx),
            manager: Some(manager),
            adapter,
        })
    }

    /// A new handle for producing rows
    pub fn sender(&self) -> Result<Sender<Row>> {
        self.rows
            .clone()
            .ok_or_else(|| FloeError::ChannelClosed("engine is closed".to_string()))
    }

    /// Queue one row for ingestion
    pub fn ingest(&self, row: Row) -> Result<()> {
        let rows = self
            .rows
            .as_ref()
            .ok_or_else(|| FloeError::ChannelClosed("engine is closed".to_string()))?;
        rows.send(row)
            .map_err(|_| FloeError::ChannelClosed("block manager has stopped".to_string()))
    }

    /// Rows of `partition_key` whose key lies in `[start, end]`
    ///
    /// See `StorageAdapter::query`; only persisted blocks are visible.
    pub fn query(&self, partition_key: &str, start: &KeyValue, end: &KeyValue) -> Result<Vec<Row>> {
        self.adapter.query(partition_key, start, end)
    }

    /// Commit aged blocks now (every open block when `all`)
    pub fn commit(&self, all: bool) -> Result<usize> {
        match &self.manager {
            Some(manager) => manager.commit_blocks(all),
            None => Err(FloeError::NotStarted("BlockManager".to_string())),
        }
    }

    /// Shut the pipeline down, returning the first drain error
    pub fn close(mut self) -> Result<()> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Result<()> {
        let manager = match self.manager.take() {
            Some(manager) => manager,
            None => return Ok(()),
        };

        tracing::info!("Engine closing");
        drop(self.rows.take());

        let manager_result = manager.stop();
        let adapter_result = self.adapter.stop();

        let stats = self.adapter.stats();
        tracing::info!(
            "Engine closed ({} blocks, {} bytes uploaded)",
            stats.blocks_uploaded,
            stats.bytes_uploaded
        );

        manager_result.and(adapter_result)
    }

    // =========================================================================
    // Accessors (for testing and monitoring)
    // =========================================================================

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn codec(&self) -> &Arc<RowCodec> {
        &self.codec
    }

    /// The running block manager; `None` after `close`
    pub fn manager(&self) -> Option<&BlockManager> {
        self.manager.as_ref()
    }

    pub fn adapter(&self) -> &StorageAdapter {
        &self.adapter
    }

    pub fn stats(&self) -> AdapterStats {
        self.adapter.stats()
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        if self.manager.is_some() {
            if let Err(e) = self.shutdown() {
                tracing::warn!("Engine dropped without close: {}", e);
            }
        }
    }
}
