use std::fmt;

use serde::{Deserialize, Serialize};

/// Scalar value carried by a decoded point.
///
/// New kinds may be added; consumers outside this crate must handle the
/// wildcard case (log and continue).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
#[non_exhaustive]
pub enum Value {
    Int(i32),
    Float(f64),
    Str(String),
    Bool(bool),
    Bytes(Vec<u8>),
    /// Metadata-only point carrying no measurement.
    Absent,
}

impl Value {
    pub fn is_absent(&self) -> bool {
        matches!(self, Value::Absent)
    }

    /// Short name of the value kind, used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::Bool(_) => "bool",
            Value::Bytes(_) => "bytes",
            Value::Absent => "absent",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Str(v) => f.write_str(v),
            Value::Bool(v) => write!(f, "{v}"),
            Value::Bytes(v) => {
                for b in v {
                    write!(f, "{b:02x}")?;
                }
                Ok(())
            }
            Value::Absent => Ok(()),
        }
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_owned())
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

/// A single attribute/value pair produced by a decoder or parser.
#[derive(Debug, Clone, PartialEq)]
pub struct Point {
    /// Attribute name, never empty.
    pub attr: String,
    pub value: Value,
}

impl Point {
    pub fn new(attr: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            attr: attr.into(),
            value: value.into(),
        }
    }

    /// A point that carries only its attribute name.
    pub fn absent(attr: impl Into<String>) -> Self {
        Self {
            attr: attr.into(),
            value: Value::Absent,
        }
    }
}
