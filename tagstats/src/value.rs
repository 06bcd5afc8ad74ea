//! The value half of a tag or measurement.

use std::fmt;

/// A typed value bound to a [`crate::Key`].
///
/// The variant used must match the key's [`crate::KeyKind`]; this is
/// enforced at [`crate::TagSetBuilder::upsert`] time.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// A UTF-8 string value.
    String(String),
    /// A 64-bit signed integer value.
    Int64(i64),
    /// A 64-bit floating point value.
    Float64(f64),
    /// A boolean value.
    Bool(bool),
}

impl Value {
    /// Render the value as the canonical UTF-8 bytes used by the wire
    /// codec (`encoding::encode`) and by tag-signature derivation.
    pub fn to_canonical_bytes(&self) -> Vec<u8> {
        match self {
            Value::String(s) => s.as_bytes().to_vec(),
            Value::Int64(i) => i.to_string().into_bytes(),
            Value::Float64(f) => f.to_string().into_bytes(),
            Value::Bool(b) => b.to_string().into_bytes(),
        }
    }

    pub(crate) fn kind(&self) -> crate::key::KeyKind {
        use crate::key::KeyKind;
        match self {
            Value::String(_) => KeyKind::String,
            Value::Int64(_) => KeyKind::Int64,
            Value::Float64(_) => KeyKind::Float64,
            Value::Bool(_) => KeyKind::Bool,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => f.write_str(s),
            Value::Int64(i) => write!(f, "{i}"),
            Value::Float64(v) => write!(f, "{v}"),
            Value::Bool(b) => write!(f, "{b}"),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_owned())
    }
}
impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}
impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int64(v)
    }
}
impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float64(v)
    }
}
impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}
