//! Deployment schema
//!
//! The schema is fixed per deployment and embedded in every container header
//! so objects stay readable without out-of-band metadata.

use serde::{Deserialize, Serialize};

use crate::error::{FloeError, Result};
use crate::row::{Row, Value};

/// Kind of a schema field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    Long,
    Double,
    String,
    Boolean,
    Bytes,
    Map,
}

impl FieldKind {
    fn accepts(&self, value: &Value) -> bool {
        matches!(
            (self, value),
            (FieldKind::Long, Value::Long(_))
                | (FieldKind::Double, Value::Double(_))
                | (FieldKind::Double, Value::Long(_))
                | (FieldKind::String, Value::String(_))
                | (FieldKind::Boolean, Value::Boolean(_))
                | (FieldKind::Bytes, Value::Bytes(_))
                | (FieldKind::Map, Value::Map(_))
        )
    }
}

/// A named, typed column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub kind: FieldKind,
    #[serde(default)]
    pub nullable: bool,
}

impl Field {
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            nullable: false,
        }
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }
}

/// Row schema
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    pub name: String,
    pub fields: Vec<Field>,

    /// Accept columns not listed in `fields`
    #[serde(default)]
    pub allow_extra_columns: bool,
}

impl Schema {
    pub fn new(name: impl Into<String>, fields: Vec<Field>) -> Self {
        Self {
            name: name.into(),
            fields,
            allow_extra_columns: false,
        }
    }

    /// A schema that accepts any row
    pub fn open(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
            allow_extra_columns: true,
        }
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Check a row against the schema
    pub fn validate(&self, row: &Row) -> Result<()> {
        for field in &self.fields {
            match row.get(&field.name) {
                None | Some(Value::Null) if field.nullable => {}
                None => {
                    return Err(FloeError::Schema(format!(
                        "{}: missing required column '{}'",
                        self.name, field.name
                    )))
                }
                Some(value) if !field.kind.accepts(value) => {
                    return Err(FloeError::Schema(format!(
                        "{}: column '{}' expects {:?}, got {}",
                        self.name,
                        field.name,
                        field.kind,
                        value.kind_name()
                    )))
                }
                Some(_) => {}
            }
        }

        if !self.allow_extra_columns {
            if let Some(column) = row.keys().find(|c| self.field(c).is_none()) {
                return Err(FloeError::Schema(format!(
                    "{}: unknown column '{}'",
                    self.name, column
                )));
            }
        }

        Ok(())
    }
}
