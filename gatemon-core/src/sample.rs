//! Samples and indicator values.
//!
//! A [`Sample`] is one tick's worth of indicators: an insertion-ordered
//! mapping from dotted indicator names (`virtual.used`, `eth0.rec.bytes`)
//! to values, plus the mandatory `timestamp` field. Insertion order is
//! load-bearing: the first sample of a run fixes the CSV column order.

use std::fmt;

use indexmap::IndexMap;

/// Name of the mandatory timestamp field, always the first column.
pub const TIMESTAMP_FIELD: &str = "timestamp";

/// A single indicator reading.
///
/// Values are passed through as received from the source; numeric
/// conversion is never forced. Shell-backed probes produce text tokens,
/// in-process probes produce numbers, and the sink renders both the same
/// way.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Uint(u64),
    Float(f64),
    Text(String),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{v}"),
            Value::Uint(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Text(v) => write!(f, "{v}"),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::Uint(v)
    }
}

impl From<usize> for Value {
    fn from(v: usize) -> Self {
        Value::Uint(v as u64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(v as f64)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

/// One tick's indicators, in insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Sample {
    fields: IndexMap<String, Value>,
}

impl Sample {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an indicator. Re-inserting an existing key overwrites the
    /// value in place (last writer wins) without changing its position.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(key.into(), value.into());
    }

    /// Merge another sample into this one, preserving first-seen order.
    pub fn extend(&mut self, other: Sample) {
        self.fields.extend(other.fields);
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// The `timestamp` field, when present and integral.
    pub fn timestamp(&self) -> Option<i64> {
        match self.fields.get(TIMESTAMP_FIELD) {
            Some(Value::Int(v)) => Some(*v),
            Some(Value::Uint(v)) => i64::try_from(*v).ok(),
            _ => None,
        }
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Sample {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut sample = Sample::new();
        for (k, v) in iter {
            sample.insert(k, v);
        }
        sample
    }
}
