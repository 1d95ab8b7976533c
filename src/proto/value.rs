//! Dynamic tagged values: the tree representation the wire codec works on.

use std::collections::BTreeMap;

/// A dynamic protobuf value. Owned all the way down; dropping the root
/// releases the whole tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Raw varint payload (int32/64, uint32/64, sint32/64, bool, enum).
    /// Signedness interpretation is left to the caller.
    Varint(u64),
    /// Raw 64-bit payload (double, fixed64, sfixed64).
    Fixed64(u64),
    /// Raw 32-bit payload (float, fixed32, sfixed32).
    Fixed32(u32),
    /// Length-delimited payload (string and bytes both land here).
    Bytes(Vec<u8>),
    /// Nested message, fields keyed by tag.
    Message(BTreeMap<u32, Value>),
    /// Repeated field elements in insertion order.
    Repeated(Vec<Value>),
}

impl Value {
    /// Build a string value.
    pub fn string(s: &str) -> Value {
        Value::Bytes(s.as_bytes().to_vec())
    }

    /// Build an empty message value.
    pub fn message() -> Value {
        Value::Message(BTreeMap::new())
    }

    pub fn as_varint(&self) -> Option<u64> {
        match self {
            Value::Varint(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_fixed64(&self) -> Option<u64> {
        match self {
            Value::Fixed64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_fixed32(&self) -> Option<u32> {
        match self {
            Value::Fixed32(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// Bytes reinterpreted as UTF-8, for string fields.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Bytes(b) => std::str::from_utf8(b).ok(),
            _ => None,
        }
    }

    pub fn as_message(&self) -> Option<&BTreeMap<u32, Value>> {
        match self {
            Value::Message(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_repeated(&self) -> Option<&[Value]> {
        match self {
            Value::Repeated(v) => Some(v),
            _ => None,
        }
    }

    /// Double stored in a fixed64 payload.
    pub fn as_f64(&self) -> Option<f64> {
        self.as_fixed64().map(f64::from_bits)
    }

    /// Float stored in a fixed32 payload.
    pub fn as_f32(&self) -> Option<f32> {
        self.as_fixed32().map(f32::from_bits)
    }

    /// Insert a field into a message value; no-op on other variants.
    pub fn set(&mut self, tag: u32, value: Value) {
        if let Value::Message(fields) = self {
            fields.insert(tag, value);
        }
    }

    /// Field lookup on a message value.
    pub fn get(&self, tag: u32) -> Option<&Value> {
        self.as_message().and_then(|m| m.get(&tag))
    }
}
