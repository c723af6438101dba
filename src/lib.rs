//! # Floe
//!
//! A partitioned, append-only ingestion engine:
//! - Rows are routed by a partition column into per-partition blocks
//! - Blocks are committed by size, by age, or on shutdown
//! - Committed blocks are persisted under content-addressed filenames that
//!   encode their key range, so queries prune blocks without reading them
//! - Failed uploads are retried until they succeed
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Producers                             │
//! │                  (Sender<Row> clones)                        │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │ unbounded
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                    Block Manager                             │
//! │        (actor thread: partition → open Block)                │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │ bounded (backpressure)
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                   Storage Adapter                            │
//! │     write worker (retry forever)  │  query (prune + fetch)   │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!          ┌────────────┴────────────┐
//!          │                         │
//!          ▼                         ▼
//!   ┌─────────────┐          ┌─────────────┐
//!   │ Range Index │          │  Blob Store │
//!   │ (filenames) │          │ {pk}/{kc}/… │
//!   └─────────────┘          └─────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod row;
pub mod codec;
pub mod block;
pub mod index;
pub mod store;
pub mod manager;
pub mod adapter;
pub mod engine;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{FloeError, Result};
pub use config::{Config, StoreConfig};
pub use row::{KeyValue, Row, Value};
pub use codec::{Compression, RowCodec, Schema};
pub use block::Block;
pub use store::{BlobStore, LocalBlobStore, MemoryBlobStore};
pub use manager::BlockManager;
pub use adapter::{AdapterStats, StorageAdapter};
pub use engine::Engine;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of Floe
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
