//! Container compression

use std::fmt;
use std::str::FromStr;

use crate::error::{FloeError, Result};

/// Compression applied to a container body
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u16)]
pub enum Compression {
    #[default]
    None = 0,
    Lz4 = 1,
    Zstd = 2,
}

/// zstd level used for container bodies
const ZSTD_LEVEL: i32 = 3;

impl Compression {
    /// Canonical configuration name
    pub fn name(&self) -> &'static str {
        match self {
            Compression::None => "null",
            Compression::Lz4 => "lz4",
            Compression::Zstd => "zstd",
        }
    }

    pub fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        match self {
            Compression::None => Ok(data.to_vec()),
            Compression::Lz4 => Ok(lz4_flex::compress_prepend_size(data)),
            Compression::Zstd => Ok(zstd::encode_all(data, ZSTD_LEVEL)?),
        }
    }

    pub fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
        match self {
            Compression::None => Ok(data.to_vec()),
            Compression::Lz4 => lz4_flex::decompress_size_prepended(data)
                .map_err(|e| FloeError::Corruption(format!("lz4 decompression failed: {}", e))),
            Compression::Zstd => zstd::decode_all(data)
                .map_err(|e| FloeError::Corruption(format!("zstd decompression failed: {}", e))),
        }
    }
}

impl TryFrom<u16> for Compression {
    type Error = FloeError;

    fn try_from(value: u16) -> Result<Self> {
        match value {
            0 => Ok(Compression::None),
            1 => Ok(Compression::Lz4),
            2 => Ok(Compression::Zstd),
            _ => Err(FloeError::UnsupportedCompression(format!("code {}", value))),
        }
    }
}

impl FromStr for Compression {
    type Err = FloeError;

    fn from_str(name: &str) -> Result<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "" | "null" | "none" => Ok(Compression::None),
            "lz4" => Ok(Compression::Lz4),
            "zstd" | "zstandard" => Ok(Compression::Zstd),
            other => Err(FloeError::UnsupportedCompression(other.to_string())),
        }
    }
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
