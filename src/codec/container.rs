//! Container writer and lazy reader

use std::io::Read;

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{FloeError, Result};
use crate::row::Row;

use super::{Compression, Schema, FOOTER_SIZE, HEADER_PREFIX_SIZE, MAGIC, VERSION};

/// Length prefix in front of each row in the body
const ROW_PREFIX_SIZE: usize = 4;

/// Build a container from rows; `encode_row` serializes (and validates) one row
pub(super) fn encode<F>(
    schema: &Schema,
    compression: Compression,
    rows: &[Row],
    mut encode_row: F,
) -> Result<Bytes>
where
    F: FnMut(&Row) -> Result<Vec<u8>>,
{
    // Body: [row_len(4)][row] for each row
    let mut body = BytesMut::new();
    for row in rows {
        let encoded = encode_row(row)?;
        body.put_u32_le(encoded.len() as u32);
        body.put_slice(&encoded);
    }
    let stored_body = compression.compress(&body)?;

    let schema_bytes = bincode::serialize(schema)?;

    let mut out = BytesMut::with_capacity(
        HEADER_PREFIX_SIZE + schema_bytes.len() + stored_body.len() + FOOTER_SIZE,
    );

    // Header
    out.put_slice(MAGIC);
    out.put_u16_le(VERSION);
    out.put_u16_le(compression as u16);
    out.put_u64_le(rows.len() as u64);
    out.put_u32_le(schema_bytes.len() as u32);
    out.put_slice(&schema_bytes);

    // Body
    out.put_slice(&stored_body);

    // Footer
    out.put_u64_le(stored_body.len() as u64);
    out.put_u32_le(crc32fast::hash(&stored_body));
    out.put_slice(MAGIC);

    Ok(out.freeze())
}

/// Reads rows out of a container one at a time
///
/// Header, footer and checksum are validated up front by `open`; row payloads
/// are only deserialized as the iterator advances.
#[derive(Debug)]
pub struct ContainerReader {
    schema: Schema,
    compression: Compression,
    row_count: u64,
    body: Bytes,
    pos: usize,
    rows_read: u64,
    failed: bool,
}

impl ContainerReader {
    /// Read a container from a byte stream
    pub fn open<R: Read>(mut reader: R) -> Result<Self> {
        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;
        Self::from_bytes(Bytes::from(data))
    }

    pub fn from_bytes(data: Bytes) -> Result<Self> {
        if data.len() < HEADER_PREFIX_SIZE + FOOTER_SIZE {
            return Err(FloeError::Corruption(format!(
                "Container too short: {} bytes",
                data.len()
            )));
        }

        // Header
        if &data[0..4] != MAGIC {
            return Err(FloeError::Corruption(format!(
                "Invalid container magic: expected FLOE, got {:?}",
                &data[0..4]
            )));
        }

        let version = u16::from_le_bytes([data[4], data[5]]);
        if version != VERSION {
            return Err(FloeError::Corruption(format!(
                "Unsupported container version: {}",
                version
            )));
        }

        let compression = Compression::try_from(u16::from_le_bytes([data[6], data[7]]))?;
        let row_count = read_u64(&data[8..16]);
        let schema_len = read_u32(&data[16..20]) as usize;

        let schema_end = HEADER_PREFIX_SIZE + schema_len;
        if schema_end + FOOTER_SIZE > data.len() {
            return Err(FloeError::Corruption(format!(
                "Schema length {} exceeds container size {}",
                schema_len,
                data.len()
            )));
        }
        let schema: Schema = bincode::deserialize(&data[HEADER_PREFIX_SIZE..schema_end])?;

        // Footer
        let footer = &data[data.len() - FOOTER_SIZE..];
        if &footer[12..16] != MAGIC {
            return Err(FloeError::Corruption(
                "Invalid container footer magic".to_string(),
            ));
        }
        let body_len = read_u64(&footer[0..8]) as usize;
        let expected_crc = read_u32(&footer[8..12]);

        let body_end = data.len() - FOOTER_SIZE;
        if schema_end + body_len != body_end {
            return Err(FloeError::Corruption(format!(
                "Body length mismatch: footer says {}, container holds {}",
                body_len,
                body_end - schema_end
            )));
        }

        let stored_body = data.slice(schema_end..body_end);
        let actual_crc = crc32fast::hash(&stored_body);
        if actual_crc != expected_crc {
            return Err(FloeError::Corruption(format!(
                "Body CRC mismatch: expected {:08x}, got {:08x}",
                expected_crc, actual_crc
            )));
        }

        let body = match compression {
            Compression::None => stored_body,
            _ => Bytes::from(compression.decompress(&stored_body)?),
        };

        // The CRC does not cover the header; every row costs at least its
        // length prefix
        let max_rows = (body.len() / ROW_PREFIX_SIZE) as u64;
        if row_count > max_rows {
            return Err(FloeError::Corruption(format!(
                "Row count {} exceeds what a {} byte body can hold",
                row_count,
                body.len()
            )));
        }

        Ok(Self {
            schema,
            compression,
            row_count,
            body,
            pos: 0,
            rows_read: 0,
            failed: false,
        })
    }

    /// Schema embedded in the container header
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn compression(&self) -> Compression {
        self.compression
    }

    /// Row count recorded in the header
    pub fn row_count(&self) -> u64 {
        self.row_count
    }

    fn read_row(&mut self) -> Result<Row> {
        if self.pos + ROW_PREFIX_SIZE > self.body.len() {
            return Err(FloeError::Corruption(format!(
                "Truncated row header at byte {}",
                self.pos
            )));
        }
        let row_len = read_u32(&self.body[self.pos..self.pos + ROW_PREFIX_SIZE]) as usize;
        self.pos += ROW_PREFIX_SIZE;

        if self.pos + row_len > self.body.len() {
            return Err(FloeError::Corruption(format!(
                "Truncated row at byte {}: need {} bytes",
                self.pos, row_len
            )));
        }
        let row: Row = bincode::deserialize(&self.body[self.pos..self.pos + row_len])?;
        self.pos += row_len;

        Ok(row)
    }
}

impl Iterator for ContainerReader {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.rows_read >= self.row_count {
            return None;
        }

        match self.read_row() {
            Ok(row) => {
                self.rows_read += 1;
                Some(Ok(row))
            }
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}

fn read_u32(bytes: &[u8]) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&bytes[..4]);
    u32::from_le_bytes(buf)
}

fn read_u64(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[..8]);
    u64::from_le_bytes(buf)
}
