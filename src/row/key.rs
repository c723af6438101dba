//! Key column values
//!
//! Only integers and strings can drive range tracking and pruning. Everything
//! that compares or encodes keys goes through `KeyValue` so each operation is
//! written once per variant.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{FloeError, Result};

use super::{Row, Value};

/// A range-trackable key column value
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyValue {
    /// Numeric ordering
    Integer(i64),

    /// Lexicographic (byte-wise) ordering
    String(String),
}

impl KeyValue {
    /// Convert a column value into a key, rejecting unsupported kinds
    pub fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Long(v) => Ok(KeyValue::Integer(*v)),
            Value::String(s) => Ok(KeyValue::String(s.clone())),
            other => Err(FloeError::KeyType(format!(
                "unsupported key type {}",
                other.kind_name()
            ))),
        }
    }

    /// Extract the key column from a row
    pub fn from_row(row: &Row, key_column: &str) -> Result<Self> {
        match row.get(key_column) {
            Some(value) => Self::from_value(value),
            None => Err(FloeError::KeyType(format!(
                "key column '{}' missing from row",
                key_column
            ))),
        }
    }

    /// Variant name (for logging and error messages)
    pub fn kind_name(&self) -> &'static str {
        match self {
            KeyValue::Integer(_) => "integer",
            KeyValue::String(_) => "string",
        }
    }

    /// True if both keys are the same variant and therefore comparable
    pub fn same_kind(&self, other: &KeyValue) -> bool {
        matches!(
            (self, other),
            (KeyValue::Integer(_), KeyValue::Integer(_)) | (KeyValue::String(_), KeyValue::String(_))
        )
    }

    /// Bytes stored in a block filename: decimal text for integers,
    /// raw UTF-8 for strings
    pub fn to_key_bytes(&self) -> Vec<u8> {
        match self {
            KeyValue::Integer(v) => v.to_string().into_bytes(),
            KeyValue::String(s) => s.as_bytes().to_vec(),
        }
    }

    /// Interpret decoded filename bytes as a key of the same variant as `self`
    ///
    /// Returns `None` if the bytes do not parse as that variant.
    pub fn parse_like(&self, bytes: &[u8]) -> Option<KeyValue> {
        let text = std::str::from_utf8(bytes).ok()?;
        match self {
            KeyValue::Integer(_) => text.parse::<i64>().ok().map(KeyValue::Integer),
            KeyValue::String(_) => Some(KeyValue::String(text.to_string())),
        }
    }

    /// Same-variant comparison; `None` across variants
    pub fn compare(&self, other: &KeyValue) -> Option<Ordering> {
        match (self, other) {
            (KeyValue::Integer(a), KeyValue::Integer(b)) => Some(a.cmp(b)),
            (KeyValue::String(a), KeyValue::String(b)) => Some(a.as_bytes().cmp(b.as_bytes())),
            _ => None,
        }
    }

    /// True if `self` lies in `[start, end]` (inclusive); false on any
    /// variant mismatch
    pub fn within(&self, start: &KeyValue, end: &KeyValue) -> bool {
        matches!(
            self.compare(start),
            Some(Ordering::Greater) | Some(Ordering::Equal)
        ) && matches!(self.compare(end), Some(Ordering::Less) | Some(Ordering::Equal))
    }
}

impl PartialOrd for KeyValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        self.compare(other)
    }
}

impl fmt::Display for KeyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyValue::Integer(v) => write!(f, "{}", v),
            KeyValue::String(s) => write!(f, "{}", s),
        }
    }
}

impl From<i64> for KeyValue {
    fn from(v: i64) -> Self {
        KeyValue::Integer(v)
    }
}

impl From<&str> for KeyValue {
    fn from(v: &str) -> Self {
        KeyValue::String(v.to_string())
    }
}

impl From<String> for KeyValue {
    fn from(v: String) -> Self {
        KeyValue::String(v)
    }
}

impl From<KeyValue> for Value {
    fn from(key: KeyValue) -> Self {
        match key {
            KeyValue::Integer(v) => Value::Long(v),
            KeyValue::String(s) => Value::String(s),
        }
    }
}
