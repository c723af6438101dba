//! Configuration for Floe
//!
//! Centralized configuration with sensible defaults.

use std::time::Duration;

use crate::codec::Compression;
use crate::error::{FloeError, Result};

/// Main configuration for a Floe instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Row Layout
    // -------------------------------------------------------------------------
    /// Column that routes rows to partitions
    pub partition_column: String,

    /// Column whose values define block key ranges
    pub key_column: String,

    // -------------------------------------------------------------------------
    // Commit Policy
    // -------------------------------------------------------------------------
    /// Commit a block once it is older than this (milliseconds)
    pub max_age_ms: u64,

    /// Commit a block once it holds this many rows
    pub max_size: usize,

    /// How often open blocks are checked against `max_age_ms` (milliseconds)
    pub flush_check_interval_ms: u64,

    // -------------------------------------------------------------------------
    // Shutdown Drain
    // -------------------------------------------------------------------------
    /// Drain ceiling = drain_attempts × drain_interval_ms
    pub drain_attempts: u32,

    pub drain_interval_ms: u64,

    // -------------------------------------------------------------------------
    // Persistence
    // -------------------------------------------------------------------------
    /// Container compression
    pub compression: Compression,

    /// Capacity of the committed-block channel (manager → adapter)
    pub block_channel_capacity: usize,

    /// Failed uploads held for retry before the adapter stops taking new blocks
    pub retry_queue_capacity: usize,

    /// Pause before re-attempting a failed upload (milliseconds)
    pub retry_backoff_ms: u64,

    /// Deadline for a whole query; 0 disables it (milliseconds)
    pub fetch_timeout_ms: u64,

    /// Blob store connection
    pub store: StoreConfig,
}

/// Blob store connection parameters
#[derive(Debug, Clone, Default)]
pub struct StoreConfig {
    /// `memory://`, `file:///path` or a bare directory path
    pub endpoint: String,

    /// Storage account name
    pub account: String,

    /// Access key for the account
    pub access_key: String,

    /// Container / bucket holding all partitions
    pub container: String,
}

impl StoreConfig {
    /// Fail fast on blank required parameters
    pub fn validate(&self) -> Result<()> {
        let required = [
            ("endpoint", &self.endpoint),
            ("account", &self.account),
            ("access_key", &self.access_key),
            ("container", &self.container),
        ];
        for (name, value) in required {
            if value.trim().is_empty() {
                return Err(FloeError::Config(format!(
                    "store not correctly configured with {}",
                    name
                )));
            }
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            partition_column: "id".to_string(),
            key_column: "ts".to_string(),
            max_age_ms: 60_000,
            max_size: 10_000,
            flush_check_interval_ms: 1_000,
            drain_attempts: 100,
            drain_interval_ms: 200,
            compression: Compression::None,
            block_channel_capacity: 16,
            retry_queue_capacity: 64,
            retry_backoff_ms: 100,
            fetch_timeout_ms: 0,
            store: StoreConfig::default(),
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Check settings that would make the engine misbehave
    pub fn validate(&self) -> Result<()> {
        if self.partition_column.is_empty() {
            return Err(FloeError::Config("partition_column is empty".to_string()));
        }
        if self.key_column.is_empty() {
            return Err(FloeError::Config("key_column is empty".to_string()));
        }
        // Second segment of every blob path
        if self.key_column.contains('/') || self.key_column.starts_with('.') {
            return Err(FloeError::Config(format!(
                "key_column {:?} cannot be used as a path segment",
                self.key_column
            )));
        }
        if self.max_size == 0 {
            return Err(FloeError::Config("max_size must be at least 1".to_string()));
        }
        if self.flush_check_interval_ms == 0 {
            return Err(FloeError::Config(
                "flush_check_interval_ms must be positive".to_string(),
            ));
        }
        if self.retry_queue_capacity == 0 {
            return Err(FloeError::Config(
                "retry_queue_capacity must be at least 1".to_string(),
            ));
        }
        self.store.validate()
    }

    pub fn max_age(&self) -> Duration {
        Duration::from_millis(self.max_age_ms)
    }

    pub fn flush_check_interval(&self) -> Duration {
        Duration::from_millis(self.flush_check_interval_ms)
    }

    /// Total time a shutdown waits for buffered work before proceeding
    pub fn drain_ceiling(&self) -> Duration {
        Duration::from_millis(self.drain_interval_ms) * self.drain_attempts
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn fetch_timeout(&self) -> Option<Duration> {
        (self.fetch_timeout_ms > 0).then(|| Duration::from_millis(self.fetch_timeout_ms))
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the partition column
    pub fn partition_column(mut self, column: impl Into<String>) -> Self {
        self.config.partition_column = column.into();
        self
    }

    /// Set the key column
    pub fn key_column(mut self, column: impl Into<String>) -> Self {
        self.config.key_column = column.into();
        self
    }

    /// Set the block age limit (in milliseconds)
    pub fn max_age_ms(mut self, ms: u64) -> Self {
        self.config.max_age_ms = ms;
        self
    }

    /// Set the block size limit (in rows)
    pub fn max_size(mut self, rows: usize) -> Self {
        self.config.max_size = rows;
        self
    }

    /// Set the age check interval (in milliseconds)
    pub fn flush_check_interval_ms(mut self, ms: u64) -> Self {
        self.config.flush_check_interval_ms = ms;
        self
    }

    /// Set the shutdown drain ceiling as attempts × interval
    pub fn drain(mut self, attempts: u32, interval_ms: u64) -> Self {
        self.config.drain_attempts = attempts;
        self.config.drain_interval_ms = interval_ms;
        self
    }

    /// Set the container compression
    pub fn compression(mut self, compression: Compression) -> Self {
        self.config.compression = compression;
        self
    }

    /// Set the committed-block channel capacity
    pub fn block_channel_capacity(mut self, capacity: usize) -> Self {
        self.config.block_channel_capacity = capacity;
        self
    }

    /// Set the retry queue capacity
    pub fn retry_queue_capacity(mut self, capacity: usize) -> Self {
        self.config.retry_queue_capacity = capacity;
        self
    }

    /// Set the pause between upload retries (in milliseconds)
    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    /// Set the query deadline (in milliseconds, 0 = none)
    pub fn fetch_timeout_ms(mut self, ms: u64) -> Self {
        self.config.fetch_timeout_ms = ms;
        self
    }

    /// Set the blob store connection
    pub fn store(mut self, store: StoreConfig) -> Self {
        self.config.store = store;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
