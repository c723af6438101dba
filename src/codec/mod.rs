//! Codec Module
//!
//! Row serialization and the self-describing object container that committed
//! blocks are uploaded as.
//!
//! ## Container Format
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │ Header                                                       │
//! │   Magic: "FLOE" (4) | Version: u16 (2) | Compression: u16 (2)│
//! │   RowCount: u64 (8) | SchemaLen: u32 (4) | Schema (bincode)  │
//! ├──────────────────────────────────────────────────────────────┤
//! │ Body (compressed as a whole)                                 │
//! │   [RowLen: u32][Row (bincode)]                               │
//! │   ... repeated for each row, in insertion order ...         │
//! ├──────────────────────────────────────────────────────────────┤
//! │ Footer (16 bytes)                                            │
//! │   BodyLen: u64 (8) | BodyCRC: u32 (4) | Magic: "FLOE" (4)    │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! All integers are little-endian. The CRC covers the stored (compressed)
//! body bytes.

mod compression;
mod container;
mod schema;

use std::io::Read;

use bytes::Bytes;
use crossbeam::channel::Sender;

use crate::error::{FloeError, Result};
use crate::row::Row;

pub use compression::Compression;
pub use container::ContainerReader;
pub use schema::{Field, FieldKind, Schema};

// =============================================================================
// Shared Constants (used by the container writer and reader)
// =============================================================================

/// Magic bytes identifying a Floe container
pub(crate) const MAGIC: &[u8; 4] = b"FLOE";

/// Current container format version
pub(crate) const VERSION: u16 = 1;

/// Fixed header prefix: Magic (4) + Version (2) + Compression (2) + RowCount (8) + SchemaLen (4)
pub(crate) const HEADER_PREFIX_SIZE: usize = 20;

/// Footer size: BodyLen (8) + BodyCRC (4) + Magic (4)
pub(crate) const FOOTER_SIZE: usize = 16;

// =============================================================================
// Row Codec
// =============================================================================

/// Encodes rows against a fixed deployment schema
///
/// Shared (behind `Arc`) by the block manager, for content hashing, and by the
/// storage adapter, for container encoding.
#[derive(Debug, Clone)]
pub struct RowCodec {
    schema: Schema,
    compression: Compression,
}

impl RowCodec {
    pub fn new(schema: Schema, compression: Compression) -> Self {
        Self { schema, compression }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn compression(&self) -> Compression {
        self.compression
    }

    /// Serialize a single row (validated against the schema)
    ///
    /// This is the byte sequence fed to the block content hash.
    pub fn encode_row(&self, row: &Row) -> Result<Vec<u8>> {
        self.schema.validate(row)?;
        Ok(bincode::serialize(row)?)
    }

    /// Serialize rows into a container using the configured compression
    pub fn encode_container(&self, rows: &[Row]) -> Result<Bytes> {
        container::encode(&self.schema, self.compression, rows, |row| self.encode_row(row))
    }

    /// Open a container from a byte stream; rows are decoded lazily
    pub fn decode_container<R: Read>(reader: R) -> Result<ContainerReader> {
        ContainerReader::open(reader)
    }
}

/// Stream every row of a container into `rows`
///
/// Used to replay a stored block back into an ingestion pipeline. Rows are
/// sent as they are decoded; on a decode error the rows before it have
/// already been delivered. Returns the number of rows sent.
pub fn read_container_into<R: Read>(reader: R, rows: &Sender<Row>) -> Result<usize> {
    let container = RowCodec::decode_container(reader)?;
    let mut sent = 0;
    for row in container {
        rows.send(row?)
            .map_err(|_| FloeError::ChannelClosed("row receiver dropped".to_string()))?;
        sent += 1;
    }
    Ok(sent)
}
