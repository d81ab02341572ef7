use bytes::Bytes;
use std::collections::BTreeMap;

/// One bencoded value: integer, byte string, list, or dictionary.
///
/// Dictionary keys are byte strings kept in a `BTreeMap` so that encoding
/// always emits them in the canonical sorted order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Int(i64),
    Bytes(Bytes),
    List(Vec<Value>),
    Dict(BTreeMap<Bytes, Value>),
}

impl Value {
    /// Builds a byte-string value from UTF-8 text.
    pub fn text(s: &str) -> Self {
        Value::Bytes(Bytes::copy_from_slice(s.as_bytes()))
    }

    pub fn int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn bytes(&self) -> Option<&Bytes> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// The value as UTF-8 text, if it is a byte string holding valid UTF-8.
    pub fn str(&self) -> Option<&str> {
        match self {
            Value::Bytes(b) => std::str::from_utf8(b).ok(),
            _ => None,
        }
    }

    pub fn list(&self) -> Option<&[Value]> {
        match self {
            Value::List(l) => Some(l),
            _ => None,
        }
    }

    pub fn dict(&self) -> Option<&BTreeMap<Bytes, Value>> {
        match self {
            Value::Dict(d) => Some(d),
            _ => None,
        }
    }

    /// Dictionary lookup; `None` when this is not a dict or the key is absent.
    pub fn get(&self, key: &[u8]) -> Option<&Value> {
        self.dict()?.get(key)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<u32> for Value {
    fn from(i: u32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::text(s)
    }
}

impl From<Bytes> for Value {
    fn from(b: Bytes) -> Self {
        Value::Bytes(b)
    }
}

impl From<Vec<Value>> for Value {
    fn from(l: Vec<Value>) -> Self {
        Value::List(l)
    }
}

impl From<BTreeMap<Bytes, Value>> for Value {
    fn from(d: BTreeMap<Bytes, Value>) -> Self {
        Value::Dict(d)
    }
}

/// Convenience builder for bencoded dictionaries.
#[derive(Debug, Default)]
pub struct DictBuilder {
    entries: BTreeMap<Bytes, Value>,
}

impl DictBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(mut self, key: &'static [u8], value: impl Into<Value>) -> Self {
        self.entries.insert(Bytes::from_static(key), value.into());
        self
    }

    pub fn build(self) -> Value {
        Value::Dict(self.entries)
    }
}
