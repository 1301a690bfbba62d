use std::{collections::BTreeMap, fmt};

use num_bigint::BigInt;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::{codec, Bytes};

/// Dictionary key. Binary keys order before text keys.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Key {
    Binary(Bytes),
    Text(String),
}

impl From<&str> for Key {
    fn from(value: &str) -> Self {
        Key::Text(value.to_owned())
    }
}

impl From<String> for Key {
    fn from(value: String) -> Self {
        Key::Text(value)
    }
}

impl From<Bytes> for Key {
    fn from(value: Bytes) -> Self {
        Key::Binary(value)
    }
}

/// A state value as stored in an account.
///
/// Values are self-describing and have exactly one canonical binary encoding (see
/// [`crate::codec`]), which makes them safe to content-address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Value {
    Null,
    Boolean(bool),
    Integer(BigInt),
    Binary(Bytes),
    Text(String),
    List(Vec<Value>),
    Dictionary(BTreeMap<Key, Value>),
}

impl Value {
    pub fn as_integer(&self) -> Option<&BigInt> {
        match self {
            Value::Integer(i) => Some(i),
            _ => None,
        }
    }

    pub fn as_binary(&self) -> Option<&Bytes> {
        match self {
            Value::Binary(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_dictionary(&self) -> Option<&BTreeMap<Key, Value>> {
        match self {
            Value::Dictionary(d) => Some(d),
            _ => None,
        }
    }

    /// Returns the canonical encoding of this value.
    pub fn encode(&self) -> Vec<u8> {
        codec::encode(self)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Boolean(b) => write!(f, "{b}"),
            Value::Integer(i) => write!(f, "{i}"),
            Value::Binary(b) => write!(f, "{b}"),
            Value::Text(t) => write!(f, "{t:?}"),
            Value::List(l) => write!(f, "[{} items]", l.len()),
            Value::Dictionary(d) => write!(f, "{{{} entries}}", d.len()),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Boolean(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Integer(value.into())
    }
}

impl From<BigInt> for Value {
    fn from(value: BigInt) -> Self {
        Value::Integer(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_owned())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<Bytes> for Value {
    fn from(value: Bytes) -> Self {
        Value::Binary(value)
    }
}

impl From<Vec<Value>> for Value {
    fn from(value: Vec<Value>) -> Self {
        Value::List(value)
    }
}

impl FromIterator<(Key, Value)> for Value {
    fn from_iter<T: IntoIterator<Item = (Key, Value)>>(iter: T) -> Self {
        Value::Dictionary(iter.into_iter().collect())
    }
}

// On the wire a value travels as the hex of its canonical encoding. This keeps the JSON
// representation unambiguous (binary vs text, key ordering) without a bespoke schema.
impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(codec::encode(self)))
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        let bytes = hex::decode(&s).map_err(serde::de::Error::custom)?;
        codec::decode(&bytes).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_ordering_binary_before_text() {
        let mut keys = [Key::from("a"), Key::Binary(Bytes::from("z")), Key::from("B")];
        keys.sort();
        assert_eq!(keys, [Key::Binary(Bytes::from("z")), Key::from("B"), Key::from("a")]);
    }

    #[test]
    fn test_json_representation() {
        let value = Value::from("hi");
        let json = serde_json::to_string(&value).unwrap();
        // u2:hi
        assert_eq!(json, "\"75323a6869\"");
        assert_eq!(serde_json::from_str::<Value>(&json).unwrap(), value);
    }

    #[test]
    fn test_json_rejects_deeply_nested_value() {
        let nested = [vec![b'l'; 100_000], vec![b'e'; 100_000]].concat();
        let json = format!("\"{}\"", hex::encode(nested));

        let err = serde_json::from_str::<Value>(&json).unwrap_err();

        assert!(err.to_string().contains("nested too deeply"));
    }
}
