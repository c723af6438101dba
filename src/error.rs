//! Error types for Floe
//!
//! Provides a unified error type for all operations.

use thiserror::Error;

use crate::row::Row;

/// Result type alias using FloeError
pub type Result<T> = std::result::Result<T, FloeError>;

/// Unified error type for Floe operations
#[derive(Debug, Error)]
pub enum FloeError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),

    // -------------------------------------------------------------------------
    // Row Errors (contained locally: the row is dropped, the stream continues)
    // -------------------------------------------------------------------------
    #[error("Partition routing error: {0}")]
    PartitionRouting(String),

    #[error("Key type error: {0}")]
    KeyType(String),

    // -------------------------------------------------------------------------
    // Block / Range Index Errors
    // -------------------------------------------------------------------------
    #[error("Block for partition '{0}' has no rows")]
    EmptyBlock(String),

    #[error("Invalid block filename '{name}': {reason}")]
    InvalidFilename { name: String, reason: String },

    // -------------------------------------------------------------------------
    // Serialization Errors
    // -------------------------------------------------------------------------
    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Schema violation: {0}")]
    Schema(String),

    #[error("Container corruption detected: {0}")]
    Corruption(String),

    #[error("Unsupported compression: {0}")]
    UnsupportedCompression(String),

    // -------------------------------------------------------------------------
    // Storage Errors
    // -------------------------------------------------------------------------
    #[error("Store error: {0}")]
    Store(String),

    #[error("Object not found: {0}")]
    NotFound(String),

    // -------------------------------------------------------------------------
    // Lifecycle / Concurrency Errors
    // -------------------------------------------------------------------------
    #[error("Channel closed: {0}")]
    ChannelClosed(String),

    #[error("{0} has not been started")]
    NotStarted(String),

    #[error("{component} did not drain in time, {remaining} items remaining")]
    DrainTimeout { component: String, remaining: usize },

    #[error("Operation timed out: {0}")]
    Timeout(String),

    #[error("Operation cancelled")]
    Cancelled,

    // -------------------------------------------------------------------------
    // Query Errors
    // -------------------------------------------------------------------------
    /// A query failed part-way; `partial` holds the rows gathered before the
    /// first failure.
    #[error("Query failed after collecting {} rows: {source}", .partial.len())]
    Query {
        partial: Vec<Row>,
        #[source]
        source: Box<FloeError>,
    },
}

impl FloeError {
    /// Rows collected before a query failed (empty for any other error)
    pub fn partial_rows(&self) -> &[Row] {
        match self {
            FloeError::Query { partial, .. } => partial,
            _ => &[],
        }
    }
}

impl From<bincode::Error> for FloeError {
    fn from(e: bincode::Error) -> Self {
        FloeError::Serialization(e.to_string())
    }
}
