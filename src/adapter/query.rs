//! Read path
//!
//! ```text
//! list {partition}/ ──► keep {partition}/{key_column}/{file}
//!                   ──► prune by filename (no I/O)
//!                   ──► one fetch thread per surviving block
//!                          get → decode → rebuild block → filter
//!                   ──► merge in completion order
//! ```
//!
//! The first failing fetch ends the query. Sibling fetches see the shared
//! cancel flag at their next checkpoint and stop without reporting.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam::channel::{self, after, never, select, Sender};

use crate::block::Block;
use crate::codec::RowCodec;
use crate::error::{FloeError, Result};
use crate::index;
use crate::row::{KeyValue, Row};
use crate::store::BlobStore;

use super::{block_path, Counters, CANCEL_CHECK_INTERVAL};

/// Everything a query needs from its adapter
pub(super) struct QueryContext<'a> {
    pub store: Arc<dyn BlobStore>,
    pub codec: Arc<RowCodec>,
    pub key_column: &'a str,
    pub timeout: Option<Duration>,
    pub counters: Arc<Counters>,
}

/// Inputs for a single block fetch
struct Fetch {
    store: Arc<dyn BlobStore>,
    codec: Arc<RowCodec>,
    partition_key: String,
    key_column: String,
    path: String,
    start: KeyValue,
    end: KeyValue,
    cancel: Arc<AtomicBool>,
    counters: Arc<Counters>,
}

pub(super) fn run(
    ctx: QueryContext<'_>,
    partition_key: &str,
    start: &KeyValue,
    end: &KeyValue,
) -> Result<Vec<Row>> {
    let started = Instant::now();

    if !start.same_kind(end) {
        return Err(failed(
            Vec::new(),
            FloeError::KeyType(format!(
                "query bounds differ in type: {} vs {}",
                start.kind_name(),
                end.kind_name()
            )),
        ));
    }

    // Step 1: List the partition
    let prefix = format!("{}/", partition_key);
    let listed = ctx
        .store
        .list(&prefix)
        .map_err(|e| failed(Vec::new(), e))?;

    // Step 2: Keep this key column's blocks
    let filenames = block_filenames(&listed, partition_key, ctx.key_column);

    // Step 3: Prune on filenames alone
    let mut candidates = Vec::new();
    for name in &filenames {
        match index::decode(name) {
            Ok(parsed) if parsed.intersects(start, end) => candidates.push(*name),
            Ok(_) => {}
            Err(e) => {
                tracing::warn!("Ignoring malformed block name {}/{}/{}: {}", partition_key, ctx.key_column, name, e);
            }
        }
    }
    let pruned = filenames.len() - candidates.len();
    ctx.counters.blocks_pruned.fetch_add(pruned as u64, Ordering::SeqCst);

    tracing::debug!(
        "Query {} [{}, {}]: {} blocks listed, {} pruned, {} to fetch",
        partition_key,
        start,
        end,
        filenames.len(),
        pruned,
        candidates.len()
    );

    if candidates.is_empty() {
        return Ok(Vec::new());
    }

    // Step 4: Fetch survivors in parallel
    let (result_tx, result_rx) = channel::unbounded::<Vec<Row>>();
    let (error_tx, error_rx) = channel::unbounded::<FloeError>();
    let cancel = Arc::new(AtomicBool::new(false));

    for filename in &candidates {
        let fetch = Fetch {
            store: Arc::clone(&ctx.store),
            codec: Arc::clone(&ctx.codec),
            partition_key: partition_key.to_string(),
            key_column: ctx.key_column.to_string(),
            path: block_path(partition_key, ctx.key_column, filename),
            start: start.clone(),
            end: end.clone(),
            cancel: Arc::clone(&cancel),
            counters: Arc::clone(&ctx.counters),
        };
        ctx.counters.blocks_fetched.fetch_add(1, Ordering::SeqCst);
        if let Err(e) = spawn_fetch(fetch, result_tx.clone(), error_tx.clone()) {
            cancel.store(true, Ordering::SeqCst);
            return Err(failed(Vec::new(), e));
        }
    }
    drop(result_tx);
    drop(error_tx);

    // Step 5: Merge in completion order; first error wins
    let deadline = match ctx.timeout {
        Some(timeout) => after(timeout.saturating_sub(started.elapsed())),
        None => never(),
    };

    let mut rows = Vec::new();
    let mut pending = candidates.len();
    while pending > 0 {
        select! {
            recv(result_rx) -> msg => match msg {
                Ok(block_rows) => {
                    rows.extend(block_rows);
                    pending -= 1;
                }
                Err(_) => {
                    // Every fetch has finished; a failed one left its error behind
                    cancel.store(true, Ordering::SeqCst);
                    let error = error_rx.try_recv().unwrap_or_else(|_| {
                        FloeError::ChannelClosed("fetch workers exited without reporting".to_string())
                    });
                    tracing::warn!("Query {} failed after {} rows: {}", partition_key, rows.len(), error);
                    return Err(failed(rows, error));
                }
            },
            recv(error_rx) -> msg => {
                cancel.store(true, Ordering::SeqCst);
                let error = msg.unwrap_or_else(|_| {
                    FloeError::ChannelClosed("fetch workers exited without reporting".to_string())
                });
                tracing::warn!("Query {} failed after {} rows: {}", partition_key, rows.len(), error);
                return Err(failed(rows, error));
            }
            recv(deadline) -> _ => {
                cancel.store(true, Ordering::SeqCst);
                tracing::warn!("Query {} timed out with {} fetches outstanding", partition_key, pending);
                return Err(failed(rows, FloeError::Timeout(format!(
                    "query on partition {} exceeded {:?}",
                    partition_key,
                    ctx.timeout.unwrap_or_default()
                ))));
            }
        }
    }

    tracing::debug!("Query {} returned {} rows in {:?}", partition_key, rows.len(), started.elapsed());
    Ok(rows)
}

/// Filenames of `{partition}/{key_column}/{filename}` paths in a listing
fn block_filenames<'a>(listed: &'a [String], partition_key: &str, key_column: &str) -> Vec<&'a str> {
    listed
        .iter()
        .filter_map(|path| {
            let segments: Vec<&str> = path.split('/').collect();
            match segments.as_slice() {
                [partition, column, filename]
                    if *partition == partition_key && *column == key_column =>
                {
                    Some(*filename)
                }
                _ => None,
            }
        })
        .collect()
}

fn spawn_fetch(fetch: Fetch, results: Sender<Vec<Row>>, errors: Sender<FloeError>) -> Result<()> {
    thread::Builder::new()
        .name("floe-query-fetch".to_string())
        .spawn(move || match fetch_block(&fetch) {
            Ok(rows) => {
                let _ = results.send(rows);
            }
            Err(FloeError::Cancelled) => {
                fetch.counters.fetches_cancelled.fetch_add(1, Ordering::SeqCst);
                tracing::debug!("Fetch of {} cancelled", fetch.path);
            }
            Err(e) => {
                tracing::warn!("Fetch of {} failed: {}", fetch.path, e);
                let _ = errors.send(e);
            }
        })?;
    Ok(())
}

/// Download one block and return its rows in range
fn fetch_block(fetch: &Fetch) -> Result<Vec<Row>> {
    checkpoint(&fetch.cancel)?;
    let reader = fetch.store.get(&fetch.path)?;

    checkpoint(&fetch.cancel)?;
    let container = RowCodec::decode_container(reader)?;

    let mut rows = Vec::new();
    for (i, row) in container.enumerate() {
        if i % CANCEL_CHECK_INTERVAL == 0 {
            checkpoint(&fetch.cancel)?;
        }
        rows.push(row?);
    }

    let block = Block::from_rows(
        fetch.partition_key.as_str(),
        fetch.key_column.as_str(),
        Arc::clone(&fetch.codec),
        rows,
    );
    Ok(block.into_range(&fetch.start, &fetch.end))
}

fn checkpoint(cancel: &AtomicBool) -> Result<()> {
    if cancel.load(Ordering::SeqCst) {
        Err(FloeError::Cancelled)
    } else {
        Ok(())
    }
}

fn failed(partial: Vec<Row>, source: FloeError) -> FloeError {
    FloeError::Query {
        partial,
        source: Box::new(source),
    }
}
