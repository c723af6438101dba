//! Row Module
//!
//! The semi-structured record model flowing through the engine.
//!
//! ## Responsibilities
//! - `Value`: the closed set of column value kinds a row may carry
//! - `Row`: column name → value, ordered by column name so that
//!   serialization is deterministic (required for content addressing)
//! - `KeyValue`: the two key-column kinds that support range logic
//! - JSON conversion at the CLI boundary

mod key;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{FloeError, Result};

pub use key::KeyValue;

/// A single row: column name → value
pub type Row = BTreeMap<String, Value>;

/// A column value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// Absent / null value
    Null,

    /// Boolean
    Boolean(bool),

    /// 64-bit signed integer
    Long(i64),

    /// 64-bit float
    Double(f64),

    /// UTF-8 string
    String(String),

    /// Raw bytes
    Bytes(Vec<u8>),

    /// Nested record (used e.g. for union-wrapped partition columns)
    Map(BTreeMap<String, Value>),
}

impl Value {
    /// Short name of the value kind (for error messages)
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Boolean(_) => "boolean",
            Value::Long(_) => "long",
            Value::Double(_) => "double",
            Value::String(_) => "string",
            Value::Bytes(_) => "bytes",
            Value::Map(_) => "map",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Long(v) => Some(*v),
            _ => None,
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Long(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(v: BTreeMap<String, Value>) -> Self {
        Value::Map(v)
    }
}

// =============================================================================
// JSON Conversion
// =============================================================================

impl TryFrom<serde_json::Value> for Value {
    type Error = FloeError;

    fn try_from(json: serde_json::Value) -> Result<Self> {
        Ok(match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Boolean(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Long(i),
                None => Value::Double(n.as_f64().ok_or_else(|| {
                    FloeError::Serialization(format!("Number out of range: {}", n))
                })?),
            },
            serde_json::Value::String(s) => Value::String(s),
            // Bytes are written out as arrays of octets
            serde_json::Value::Array(items) => {
                let bytes = items
                    .iter()
                    .map(|item| item.as_u64().and_then(|b| u8::try_from(b).ok()))
                    .collect::<Option<Vec<u8>>>()
                    .ok_or_else(|| {
                        FloeError::Serialization(
                            "JSON arrays are only supported as byte arrays (integers 0-255)".to_string(),
                        )
                    })?;
                Value::Bytes(bytes)
            }
            serde_json::Value::Object(map) => {
                let mut nested = BTreeMap::new();
                for (column, value) in map {
                    nested.insert(column, Value::try_from(value)?);
                }
                Value::Map(nested)
            }
        })
    }
}

impl From<&Value> for serde_json::Value {
    fn from(value: &Value) -> Self {
        match value {
            Value::Null => serde_json::Value::Null,
            Value::Boolean(b) => serde_json::Value::Bool(*b),
            Value::Long(i) => serde_json::Value::from(*i),
            Value::Double(f) => serde_json::Value::from(*f),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Bytes(b) => serde_json::Value::from(b.clone()),
            Value::Map(map) => serde_json::Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), serde_json::Value::from(v)))
                    .collect(),
            ),
        }
    }
}

/// Parse a JSON object into a row
pub fn row_from_json(json: serde_json::Value) -> Result<Row> {
    match Value::try_from(json)? {
        Value::Map(row) => Ok(row),
        other => Err(FloeError::Serialization(format!(
            "Expected a JSON object for a row, got {}",
            other.kind_name()
        ))),
    }
}

/// Render a row as a JSON object
pub fn row_to_json(row: &Row) -> serde_json::Value {
    serde_json::Value::Object(
        row.iter()
            .map(|(k, v)| (k.clone(), serde_json::Value::from(v)))
            .collect(),
    )
}
