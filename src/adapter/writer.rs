//! Write path
//!
//! ## Retry Policy
//! A failed upload is never dropped. It moves to a bounded local retry queue
//! and is attempted again:
//! - fresh blocks are taken first, so one failing block cannot starve the rest
//! - with retries pending, the worker waits up to `retry_backoff` for fresh
//!   work before re-attempting the oldest retry
//! - once the retry queue is full, the worker stops taking fresh blocks; the
//!   committed-block channel then fills and throttles the block manager
//!
//! `retries_pending` and `upload_failures` expose the queue in `AdapterStats`.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam::channel::{Receiver, RecvTimeoutError};

use crate::block::Block;
use crate::codec::RowCodec;
use crate::error::Result;
use crate::store::BlobStore;

use super::{block_path, retry_pause, Counters};

/// Encodes and uploads one block at a time
pub(crate) struct Uploader {
    store: Arc<dyn BlobStore>,
    codec: Arc<RowCodec>,
    counters: Arc<Counters>,
}

impl Uploader {
    pub(crate) fn new(store: Arc<dyn BlobStore>, codec: Arc<RowCodec>, counters: Arc<Counters>) -> Self {
        Self { store, codec, counters }
    }

    /// Encode, name and store a block; returns the blob path
    pub fn upload(&self, block: &Block) -> Result<String> {
        tracing::debug!(
            "Uploading block PartitionKey: {} StartingKey: {:?} EndingKey: {:?} with {} rows",
            block.partition_key(),
            block.starting_key(),
            block.ending_key(),
            block.len()
        );

        let data = self.codec.encode_container(block.rows())?;
        let filename = block.filename()?;
        let path = block_path(block.partition_key(), block.key_column(), &filename);
        let size = data.len() as u64;

        self.store.put(&path, data)?;

        self.counters.blocks_uploaded.fetch_add(1, Ordering::SeqCst);
        self.counters.bytes_uploaded.fetch_add(size, Ordering::SeqCst);
        tracing::info!("Uploaded block {} ({} rows, {} bytes)", path, block.len(), size);

        Ok(path)
    }
}

/// Worker loop: runs until the input is closed and nothing is left to retry,
/// or until `shutdown` is raised
pub(super) fn run(
    uploader: Uploader,
    input: Receiver<Block>,
    shutdown: Arc<AtomicBool>,
    retry_capacity: usize,
    backoff: Duration,
) {
    let counters = Arc::clone(&uploader.counters);
    let mut retries: VecDeque<Block> = VecDeque::new();
    let mut input_open = true;

    loop {
        if shutdown.load(Ordering::SeqCst) {
            tracing::warn!("Storage writer shutting down with {} blocks awaiting retry", retries.len());
            break;
        }

        let block = if !input_open || retries.len() >= retry_capacity {
            // Retry-only: either nothing new can arrive or the queue is full
            match retries.pop_front() {
                Some(block) => {
                    std::thread::sleep(retry_pause(backoff));
                    block
                }
                None => break,
            }
        } else if retries.is_empty() {
            match input.recv() {
                Ok(block) => block,
                Err(_) => {
                    input_open = false;
                    continue;
                }
            }
        } else {
            match input.recv_timeout(retry_pause(backoff)) {
                Ok(block) => block,
                Err(RecvTimeoutError::Timeout) => match retries.pop_front() {
                    Some(block) => block,
                    None => continue,
                },
                Err(RecvTimeoutError::Disconnected) => {
                    input_open = false;
                    continue;
                }
            }
        };
        // The block is counted as in flight before it leaves the retry gauge
        // and stays counted until it is back in the queue
        counters.in_flight.store(1, Ordering::SeqCst);
        counters.retries_pending.store(retries.len(), Ordering::SeqCst);

        if let Err(e) = uploader.upload(&block) {
            counters.upload_failures.fetch_add(1, Ordering::SeqCst);
            tracing::warn!(
                "Uploading block failed PartitionKey: {} StartingKey: {:?} EndingKey: {:?} with {}. Retrying.",
                block.partition_key(),
                block.starting_key(),
                block.ending_key(),
                e
            );
            retries.push_back(block);
            counters.retries_pending.store(retries.len(), Ordering::SeqCst);
        }
        counters.in_flight.store(0, Ordering::SeqCst);
    }

    counters.retries_pending.store(retries.len(), Ordering::SeqCst);
    tracing::info!("Storage writer finished");
}
