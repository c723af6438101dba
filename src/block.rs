//! Block
//!
//! An append-only buffer of rows for a single partition. While open it tracks
//! the min/max of the key column; once committed it is immutable and its
//! content-addressed filename can be derived.
//!
//! ## Invariants
//! - `starting_key` / `ending_key` are `None` until the first row is written,
//!   then always hold the true min/max of the key column over `rows`
//! - all keys in a block are the same `KeyValue` variant
//! - a rejected write leaves the block untouched

use std::sync::Arc;
use std::time::{Duration, Instant};

use sha1::{Digest, Sha1};

use crate::codec::RowCodec;
use crate::error::{FloeError, Result};
use crate::index;
use crate::row::{KeyValue, Row};

/// In-memory buffer of rows for one partition
#[derive(Debug, Clone)]
pub struct Block {
    /// Logical stream this block belongs to
    partition_key: String,

    /// Column driving range tracking
    key_column: String,

    /// Rows in insertion order
    rows: Vec<Row>,

    /// Running min of the key column
    starting_key: Option<KeyValue>,

    /// Running max of the key column
    ending_key: Option<KeyValue>,

    /// Set at construction, drives age-based commit
    created_at: Instant,

    /// Row serializer used for content hashing
    codec: Arc<RowCodec>,
}

impl Block {
    /// Create an empty block
    pub fn new(
        partition_key: impl Into<String>,
        key_column: impl Into<String>,
        codec: Arc<RowCodec>,
    ) -> Self {
        Self {
            partition_key: partition_key.into(),
            key_column: key_column.into(),
            rows: Vec::new(),
            starting_key: None,
            ending_key: None,
            created_at: Instant::now(),
            codec,
        }
    }

    /// Rebuild a block from rows read back from storage
    ///
    /// Rows whose key cannot be range-tracked are skipped and logged.
    pub fn from_rows(
        partition_key: impl Into<String>,
        key_column: impl Into<String>,
        codec: Arc<RowCodec>,
        rows: impl IntoIterator<Item = Row>,
    ) -> Self {
        let mut block = Self::new(partition_key, key_column, codec);
        for row in rows {
            if let Err(e) = block.write(row) {
                tracing::warn!(
                    "Skipping row in partition {}: {}",
                    block.partition_key,
                    e
                );
            }
        }
        block
    }

    /// Append a row and widen the key range
    ///
    /// Fails with `KeyType` (block unchanged) if the key column is missing,
    /// is not an integer or string, or differs in kind from earlier rows.
    pub fn write(&mut self, row: Row) -> Result<()> {
        let key = KeyValue::from_row(&row, &self.key_column)?;
        self.update_key_range(key)?;
        self.rows.push(row);
        Ok(())
    }

    fn update_key_range(&mut self, key: KeyValue) -> Result<()> {
        match (&self.starting_key, &self.ending_key) {
            (Some(start), Some(end)) => {
                if !start.same_kind(&key) {
                    return Err(FloeError::KeyType(format!(
                        "block for partition '{}' holds {} keys, got {} key {}",
                        self.partition_key,
                        start.kind_name(),
                        key.kind_name(),
                        key
                    )));
                }
                if key < *start {
                    self.starting_key = Some(key);
                } else if key > *end {
                    self.ending_key = Some(key);
                }
            }
            _ => {
                self.starting_key = Some(key.clone());
                self.ending_key = Some(key);
            }
        }
        Ok(())
    }

    /// Number of rows
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows whose key lies in `[start, end]` (inclusive)
    pub fn filter_by_range(&self, start: &KeyValue, end: &KeyValue) -> Vec<Row> {
        self.rows
            .iter()
            .filter(|row| self.row_in_range(row, start, end))
            .cloned()
            .collect()
    }

    /// Consuming variant of `filter_by_range`
    pub fn into_range(self, start: &KeyValue, end: &KeyValue) -> Vec<Row> {
        let Block { rows, key_column, partition_key, .. } = self;
        rows.into_iter()
            .filter(|row| in_range(&partition_key, &key_column, row, start, end))
            .collect()
    }

    fn row_in_range(&self, row: &Row, start: &KeyValue, end: &KeyValue) -> bool {
        in_range(&self.partition_key, &self.key_column, row, start, end)
    }

    /// SHA-1 over the serialized rows, in insertion order
    pub fn content_hash(&self) -> Result<[u8; 20]> {
        let mut hasher = Sha1::new();
        for row in &self.rows {
            hasher.update(self.codec.encode_row(row)?);
        }
        Ok(hasher.finalize().into())
    }

    /// Content-addressed filename (see `index`)
    ///
    /// Fails with `EmptyBlock` if no rows have been written.
    pub fn filename(&self) -> Result<String> {
        index::encode(self)
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn partition_key(&self) -> &str {
        &self.partition_key
    }

    pub fn key_column(&self) -> &str {
        &self.key_column
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<Row> {
        self.rows
    }

    pub fn starting_key(&self) -> Option<&KeyValue> {
        self.starting_key.as_ref()
    }

    pub fn ending_key(&self) -> Option<&KeyValue> {
        self.ending_key.as_ref()
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    /// Time since the block was created
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    pub fn codec(&self) -> &Arc<RowCodec> {
        &self.codec
    }
}

fn in_range(partition_key: &str, key_column: &str, row: &Row, start: &KeyValue, end: &KeyValue) -> bool {
    match KeyValue::from_row(row, key_column) {
        Ok(key) if key.same_kind(start) && key.same_kind(end) => key.within(start, end),
        Ok(key) => {
            tracing::debug!(
                "Excluding row from partition {}: {} key {} not comparable with {} range",
                partition_key,
                key.kind_name(),
                key,
                start.kind_name()
            );
            false
        }
        Err(e) => {
            tracing::debug!("Excluding row from partition {}: {}", partition_key, e);
            false
        }
    }
}
