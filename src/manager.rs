//! Block Manager
//!
//! Routes incoming rows to per-partition blocks and decides when blocks are
//! committed to the storage adapter.
//!
//! ## Concurrency Model: Single Owner
//!
//! One worker thread owns the map of open blocks outright. Every mutation
//! arrives as a message and is handled to completion before the next:
//!
//! ```text
//!   rows ──────────┐
//!   ticker ────────┼──► select! ──► { partition → Block } ──► committed blocks
//!   control ───────┘   (one thread)
//! ```
//!
//! - **Rows** are routed, appended, and committed at `max_size`
//! - **Ticks** (every `flush_check_interval_ms`) commit blocks older than `max_age_ms`
//! - **Control** requests force commits and stop the worker
//!
//! Handing a block to the output channel blocks while the adapter is busy.
//! That stalls ingestion and age checks for *all* partitions alike (global
//! backpressure).

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam::channel::{self, never, select, tick, Receiver, Sender, TryRecvError};

use crate::block::Block;
use crate::codec::RowCodec;
use crate::config::Config;
use crate::error::{FloeError, Result};
use crate::row::{KeyValue, Row, Value};

/// Requests handled by the manager's worker
enum Control {
    /// Commit aged blocks (or all blocks); replies with the number committed
    Commit { all: bool, ack: Sender<usize> },

    /// Drain buffered input until `deadline`, force-commit, exit; replies
    /// with the number of rows left unconsumed
    Stop { deadline: Instant, ack: Sender<usize> },
}

/// Counters shared between the worker and the handle
#[derive(Debug, Default)]
struct ManagerStats {
    rows_ingested: AtomicU64,
    rows_rejected: AtomicU64,
    blocks_committed: AtomicU64,
    open_blocks: AtomicUsize,
    buffered_rows: AtomicUsize,
    input_closed: AtomicBool,
}

/// Handle to a running block manager
pub struct BlockManager {
    /// Row input (kept to report unconsumed rows)
    input: Receiver<Row>,

    /// Requests to the worker
    control: Sender<Control>,

    /// Worker thread
    worker: Option<JoinHandle<()>>,

    /// How long `stop` lets the worker drain buffered rows
    drain_ceiling: Duration,

    stats: Arc<ManagerStats>,
}

impl BlockManager {
    /// Start consuming `input`, emitting committed blocks on `output`
    pub fn start(
        config: &Config,
        codec: Arc<RowCodec>,
        input: Receiver<Row>,
        output: Sender<Block>,
    ) -> Result<Self> {
        if config.max_size == 0 {
            return Err(FloeError::Config("max_size must be at least 1".to_string()));
        }

        let (control_tx, control_rx) = channel::unbounded();
        let stats = Arc::new(ManagerStats::default());

        let worker = Worker {
            partition_column: config.partition_column.clone(),
            key_column: config.key_column.clone(),
            max_size: config.max_size,
            max_age: config.max_age(),
            codec,
            output,
            blocks: HashMap::new(),
            stats: Arc::clone(&stats),
        };

        let ticker = tick(config.flush_check_interval());
        let worker_input = input.clone();
        let handle = thread::Builder::new()
            .name("floe-block-manager".to_string())
            .spawn(move || worker.run(worker_input, control_rx, ticker))?;

        tracing::info!(
            "BlockManager started (partition column: {}, key column: {}, max size: {}, max age: {}ms)",
            config.partition_column,
            config.key_column,
            config.max_size,
            config.max_age_ms
        );

        Ok(Self {
            input,
            control: control_tx,
            worker: Some(handle),
            drain_ceiling: config.drain_ceiling(),
            stats,
        })
    }

    /// Commit every block older than `max_age` (or every block when `all`)
    ///
    /// Returns the number of blocks committed.
    pub fn commit_blocks(&self, all: bool) -> Result<usize> {
        let (ack_tx, ack_rx) = channel::bounded(1);
        self.control
            .send(Control::Commit { all, ack: ack_tx })
            .map_err(|_| FloeError::ChannelClosed("block manager has stopped".to_string()))?;
        ack_rx
            .recv()
            .map_err(|_| FloeError::ChannelClosed("block manager has stopped".to_string()))
    }

    /// Stop the manager
    ///
    /// Lets the worker drain rows already buffered on the input (up to the
    /// drain ceiling), then force-commits every open block. Rows still
    /// buffered when the ceiling passes are reported as `DrainTimeout`; the
    /// open blocks are committed regardless.
    pub fn stop(mut self) -> Result<()> {
        tracing::info!("Stopping BlockManager");

        let buffered = self.input.len();
        if buffered > 0 {
            tracing::info!(
                "Waiting up to {:?} for BlockManager to consume {} buffered rows",
                self.drain_ceiling,
                buffered
            );
        }

        let deadline = Instant::now() + self.drain_ceiling;
        let (ack_tx, ack_rx) = channel::bounded(1);
        let remaining = match self.control.send(Control::Stop { deadline, ack: ack_tx }) {
            Ok(()) => ack_rx.recv().unwrap_or(0),
            Err(_) => self.input.len(),
        };

        if let Some(handle) = self.worker.take() {
            if handle.join().is_err() {
                tracing::error!("BlockManager worker panicked");
            }
        }

        if remaining > 0 {
            tracing::warn!(
                "BlockManager stopped with {} unconsumed rows after {:?}",
                remaining,
                self.drain_ceiling
            );
            return Err(FloeError::DrainTimeout {
                component: "block manager".to_string(),
                remaining,
            });
        }

        tracing::info!(
            "BlockManager stopped ({} rows ingested, {} rejected, {} blocks committed)",
            self.rows_ingested(),
            self.rows_rejected(),
            self.blocks_committed()
        );
        Ok(())
    }

    // =========================================================================
    // Accessors (for testing and monitoring)
    // =========================================================================

    /// Number of partitions with an open block
    pub fn open_blocks(&self) -> usize {
        self.stats.open_blocks.load(Ordering::SeqCst)
    }

    /// Rows held in open blocks
    pub fn buffered_rows(&self) -> usize {
        self.stats.buffered_rows.load(Ordering::SeqCst)
    }

    /// Rows accepted into a block
    pub fn rows_ingested(&self) -> u64 {
        self.stats.rows_ingested.load(Ordering::SeqCst)
    }

    /// Rows dropped for routing or key-type errors
    pub fn rows_rejected(&self) -> u64 {
        self.stats.rows_rejected.load(Ordering::SeqCst)
    }

    pub fn blocks_committed(&self) -> u64 {
        self.stats.blocks_committed.load(Ordering::SeqCst)
    }

    /// True once every row sender has been dropped and the input drained
    pub fn input_closed(&self) -> bool {
        self.stats.input_closed.load(Ordering::SeqCst)
    }
}

/// Derive the partition key from a row
///
/// The partition column must be a string, or a map with exactly one entry
/// whose value is a string (a union-wrapped string). The key becomes the
/// first segment of every blob path in the partition, so it must be
/// non-empty, free of `/` and must not start with `.`.
pub fn partition_key(row: &Row, partition_column: &str) -> Result<String> {
    match row.get(partition_column) {
        Some(Value::String(key)) => storable(key, partition_column),
        Some(Value::Map(nested)) if nested.len() == 1 => match nested.values().next() {
            Some(Value::String(key)) => storable(key, partition_column),
            Some(other) => Err(FloeError::PartitionRouting(format!(
                "nested partition column '{}' holds {}, expected string",
                partition_column,
                other.kind_name()
            ))),
            None => Err(FloeError::PartitionRouting(format!(
                "partition column '{}' is an empty map",
                partition_column
            ))),
        },
        Some(Value::Map(nested)) => Err(FloeError::PartitionRouting(format!(
            "partition column '{}' is a map with {} entries, expected exactly one",
            partition_column,
            nested.len()
        ))),
        Some(other) => Err(FloeError::PartitionRouting(format!(
            "partition column '{}' has unsupported type {}",
            partition_column,
            other.kind_name()
        ))),
        None => Err(FloeError::PartitionRouting(format!(
            "partition column '{}' missing from row",
            partition_column
        ))),
    }
}

/// Reject keys that cannot form a single blob path segment
fn storable(key: &str, partition_column: &str) -> Result<String> {
    let problem = if key.is_empty() {
        "is empty"
    } else if key.contains('/') {
        "contains '/'"
    } else if key.starts_with('.') {
        "starts with '.'"
    } else {
        return Ok(key.to_string());
    };
    Err(FloeError::PartitionRouting(format!(
        "partition column '{}' value {:?} {}",
        partition_column, key, problem
    )))
}

// =============================================================================
// Worker
// =============================================================================

/// Sole owner of the open blocks
struct Worker {
    partition_column: String,
    key_column: String,
    max_size: usize,
    max_age: Duration,
    codec: Arc<RowCodec>,
    output: Sender<Block>,
    /// partition key → open block
    blocks: HashMap<String, Block>,
    stats: Arc<ManagerStats>,
}

impl Worker {
    fn run(mut self, input: Receiver<Row>, control: Receiver<Control>, ticker: Receiver<Instant>) {
        let closed: Receiver<Row> = never();
        let mut input_open = true;

        loop {
            let rows = if input_open { &input } else { &closed };

            select! {
                recv(rows) -> msg => match msg {
                    Ok(row) => self.ingest(row),
                    Err(_) => {
                        // Disconnection is only reported once the buffer is empty
                        tracing::info!("Row input closed, consumption finished");
                        self.stats.input_closed.store(true, Ordering::SeqCst);
                        input_open = false;
                    }
                },
                recv(ticker) -> _ => {
                    self.commit_blocks(false);
                }
                recv(control) -> msg => match msg {
                    Ok(Control::Commit { all, ack }) => {
                        let committed = self.commit_blocks(all);
                        let _ = ack.send(committed);
                    }
                    Ok(Control::Stop { deadline, ack }) => {
                        let remaining = self.drain(&input, deadline);
                        self.commit_blocks(true);
                        let _ = ack.send(remaining);
                        break;
                    }
                    Err(_) => {
                        // Handle dropped without stop: flush what we have
                        self.commit_blocks(true);
                        break;
                    }
                },
            }
        }

        tracing::debug!("BlockManager worker exiting");
    }

    /// Consume rows already buffered on the input, until empty or `deadline`
    ///
    /// Returns the number of rows left behind.
    fn drain(&mut self, input: &Receiver<Row>, deadline: Instant) -> usize {
        loop {
            if Instant::now() >= deadline {
                return input.len();
            }
            match input.try_recv() {
                Ok(row) => self.ingest(row),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => return 0,
            }
        }
    }

    /// Route a row, append it to its partition's block, commit when full
    fn ingest(&mut self, row: Row) {
        let partition_key = match partition_key(&row, &self.partition_column) {
            Ok(key) => key,
            Err(e) => {
                tracing::warn!("Dropping row: {}", e);
                self.stats.rows_rejected.fetch_add(1, Ordering::SeqCst);
                return;
            }
        };

        // Reject before touching the map so no empty block is ever created,
        // and so no block holds a row the codec would refuse to upload
        let checked = KeyValue::from_row(&row, &self.key_column)
            .and_then(|_| self.codec.schema().validate(&row));
        if let Err(e) = checked {
            tracing::warn!("Dropping row for partition {}: {}", partition_key, e);
            self.stats.rows_rejected.fetch_add(1, Ordering::SeqCst);
            return;
        }

        if !self.blocks.contains_key(&partition_key) {
            let block = Block::new(&partition_key, &self.key_column, Arc::clone(&self.codec));
            self.blocks.insert(partition_key.clone(), block);
            self.stats.open_blocks.store(self.blocks.len(), Ordering::SeqCst);
            tracing::debug!(
                "Creating block for partition key: {} uncommitted block count: {}",
                partition_key,
                self.blocks.len()
            );
        }

        let full = match self.blocks.get_mut(&partition_key) {
            Some(block) => match block.write(row) {
                Ok(()) => {
                    self.stats.rows_ingested.fetch_add(1, Ordering::SeqCst);
                    self.stats.buffered_rows.fetch_add(1, Ordering::SeqCst);
                    block.len() >= self.max_size
                }
                Err(e) => {
                    tracing::warn!("Dropping row for partition {}: {}", partition_key, e);
                    self.stats.rows_rejected.fetch_add(1, Ordering::SeqCst);
                    false
                }
            },
            None => false,
        };

        if full {
            if let Some(block) = self.blocks.remove(&partition_key) {
                self.commit(block);
            }
        }
    }

    /// Commit aged blocks, or every block when `all`
    fn commit_blocks(&mut self, all: bool) -> usize {
        let due: Vec<String> = self
            .blocks
            .iter()
            .filter(|(_, block)| all || block.age() > self.max_age)
            .map(|(key, _)| key.clone())
            .collect();

        if due.is_empty() {
            return 0;
        }

        tracing::debug!("Committing {} blocks, all: {}", due.len(), all);
        for key in &due {
            if let Some(block) = self.blocks.remove(key) {
                self.commit(block);
            }
        }
        due.len()
    }

    /// Hand a block (already removed from the map) to the output
    fn commit(&self, block: Block) {
        self.stats.open_blocks.store(self.blocks.len(), Ordering::SeqCst);
        self.stats.buffered_rows.fetch_sub(block.len(), Ordering::SeqCst);
        self.stats.blocks_committed.fetch_add(1, Ordering::SeqCst);

        tracing::info!(
            "Committing block PartitionKey: {} StartingKey: {:?} EndingKey: {:?} with {} rows. {} uncommitted blocks remaining.",
            block.partition_key(),
            block.starting_key(),
            block.ending_key(),
            block.len(),
            self.blocks.len()
        );

        if let Err(e) = self.output.send(block) {
            tracing::error!(
                "Committed block for partition {} lost: output channel closed",
                e.0.partition_key()
            );
        }
    }
}
