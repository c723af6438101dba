//! Range Index
//!
//! Encodes a block's key range and content hash into its object name so that
//! queries can prune blocks from a listing alone, without fetching any bytes.
//!
//! ## Filename Format
//! ```text
//! base32(start_key) "-" base32(end_key) "-" base32(sha1(rows))
//! ```
//! Keys are stored as text (decimal for integers, UTF-8 for strings) and
//! base32-encoded with the RFC 4648 padded alphabet, which never contains `-`.
//!
//! Example: keys 100..300 →
//! `GEYDA===-GMYDA===-<32 base32 chars of sha1>`

use data_encoding::BASE32;

use crate::block::Block;
use crate::error::{FloeError, Result};
use crate::row::KeyValue;

/// Separator between filename components
pub const SEPARATOR: char = '-';

/// Raw components decoded from a block filename
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockName {
    /// Start key as stored (decimal or UTF-8 text)
    pub start_key: Vec<u8>,

    /// End key as stored
    pub end_key: Vec<u8>,

    /// SHA-1 of the serialized rows
    pub hash: Vec<u8>,
}

impl BlockName {
    /// Interpret the stored bounds as keys of the same variant as `like`
    pub fn key_range_like(&self, like: &KeyValue) -> Option<(KeyValue, KeyValue)> {
        Some((like.parse_like(&self.start_key)?, like.parse_like(&self.end_key)?))
    }

    /// True unless this block lies strictly outside `[start, end]`
    ///
    /// Bounds that cannot be read as the query's key type do not intersect.
    pub fn intersects(&self, start: &KeyValue, end: &KeyValue) -> bool {
        if !start.same_kind(end) {
            return false;
        }
        match self.key_range_like(start) {
            Some((block_start, block_end)) => !(*start > block_end || *end < block_start),
            None => false,
        }
    }
}

/// Derive the content-addressed filename for a block
pub fn encode(block: &Block) -> Result<String> {
    let (start, end) = match (block.starting_key(), block.ending_key()) {
        (Some(start), Some(end)) if !block.is_empty() => (start, end),
        _ => return Err(FloeError::EmptyBlock(block.partition_key().to_string())),
    };

    let hash = block.content_hash()?;
    Ok(encode_parts(start, end, &hash))
}

/// Assemble a filename from its components
pub fn encode_parts(start: &KeyValue, end: &KeyValue, hash: &[u8]) -> String {
    format!(
        "{}{sep}{}{sep}{}",
        BASE32.encode(&start.to_key_bytes()),
        BASE32.encode(&end.to_key_bytes()),
        BASE32.encode(hash),
        sep = SEPARATOR
    )
}

/// Split and base32-decode a filename
pub fn decode(filename: &str) -> Result<BlockName> {
    let parts: Vec<&str> = filename.split(SEPARATOR).collect();
    if parts.len() != 3 {
        return Err(FloeError::InvalidFilename {
            name: filename.to_string(),
            reason: format!("expected 3 components, found {}", parts.len()),
        });
    }

    let decode_part = |label: &str, part: &str| {
        BASE32
            .decode(part.as_bytes())
            .map_err(|e| FloeError::InvalidFilename {
                name: filename.to_string(),
                reason: format!("{} is not valid base32: {}", label, e),
            })
    };

    Ok(BlockName {
        start_key: decode_part("start key", parts[0])?,
        end_key: decode_part("end key", parts[1])?,
        hash: decode_part("hash", parts[2])?,
    })
}

/// True unless the block named `filename` lies strictly outside
/// `[start, end]`
///
/// Malformed names and key-type mismatches count as "does not intersect".
pub fn intersects(filename: &str, start: &KeyValue, end: &KeyValue) -> bool {
    match decode(filename) {
        Ok(name) => name.intersects(start, end),
        Err(_) => false,
    }
}

/// Filter a listing down to the blocks that may hold keys in `[start, end]`
pub fn intersecting<'a, I>(filenames: I, start: &KeyValue, end: &KeyValue) -> Vec<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    filenames
        .into_iter()
        .filter(|name| intersects(name, start, end))
        .collect()
}
