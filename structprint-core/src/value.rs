use std::fmt;

use serde::Serialize;

/// A single decoded field.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Int(i64),
    UInt(u64),
    Float(f64),
    Bool(bool),
    Bytes(Vec<u8>),
    Text(String),
    Hex(String),
    /// A zero pointer.
    Null,
    /// The record a non-zero pointer refers to.
    Row(Row),
}

impl Value {
    /// Lowercase `0x` rendering of an integral value, `-0x..` when negative.
    pub fn to_hex(&self) -> Option<String> {
        match *self {
            Value::Int(v) if v < 0 => Some(format!("-{:#x}", v.unsigned_abs())),
            Value::Int(v) => Some(format!("{v:#x}")),
            Value::UInt(v) => Some(format!("{v:#x}")),
            Value::Bool(v) => Some(format!("{:#x}", v as u8)),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{v}"),
            Value::UInt(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v:?}"),
            Value::Bool(v) => write!(f, "{v}"),
            Value::Bytes(b) => write!(f, "b\"{}\"", b.escape_ascii()),
            Value::Text(s) => write!(f, "{s:?}"),
            Value::Hex(s) => write!(f, "{s}"),
            Value::Null => write!(f, "NULL"),
            Value::Row(row) => match row.values() {
                [single] => write!(f, "{single}"),
                values => write!(f, "({})", join(values)),
            },
        }
    }
}

/// One decoded record of a specifier's top-level fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Row(pub Vec<Value>);

impl Row {
    pub fn values(&self) -> &[Value] {
        &self.0
    }
}

/// A top-level row prints as its fields joined by `, ` without parentheses.
impl fmt::Display for Row {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", join(&self.0))
    }
}

fn join(values: &[Value]) -> String {
    values
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
