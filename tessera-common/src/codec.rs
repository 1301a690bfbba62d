//! Canonical binary codec for [`Value`].
//!
//! Bencodex flavoured: `n` null, `t`/`f` booleans, `i<decimal>e` integers, `<len>:<bytes>`
//! binaries, `u<len>:<utf8>` texts, `l...e` lists and `d...e` dictionaries whose keys are
//! written in ascending [`Key`] order. Every value has exactly one encoding and no encoding
//! starts with `x`, which leaves that byte free as an "absent" marker for the state cache.
use std::{collections::BTreeMap, str::FromStr};

use num_bigint::BigInt;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    models::{Key, Value},
    Bytes,
};

#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CodecError {
    #[error("Unexpected end of input at offset {0}")]
    UnexpectedEof(usize),
    #[error("Invalid token {token:#04x} at offset {offset}")]
    InvalidToken { token: u8, offset: usize },
    #[error("Invalid length prefix at offset {0}")]
    InvalidLength(usize),
    #[error("Invalid UTF-8 text at offset {0}")]
    InvalidUtf8(usize),
    #[error("Invalid integer at offset {0}")]
    InvalidInteger(usize),
    #[error("Dictionary keys not in canonical order at offset {0}")]
    UnsortedKeys(usize),
    #[error("{0} trailing bytes after value")]
    TrailingBytes(usize),
    #[error("Unexpected value shape: {0}")]
    UnexpectedShape(String),
    #[error("Containers nested too deeply at offset {0}")]
    TooDeep(usize),
}

/// Deepest nesting of lists and dictionaries [`decode`] accepts.
pub const MAX_DEPTH: usize = 128;

/// Encodes `value` into its canonical binary form.
pub fn encode(value: &Value) -> Vec<u8> {
    let mut out = Vec::new();
    write_value(value, &mut out);
    out
}

/// Decodes a single value. The whole input must be consumed.
pub fn decode(bytes: &[u8]) -> Result<Value, CodecError> {
    let mut reader = Reader { bytes, pos: 0, depth: 0 };
    let value = reader.read_value()?;
    let rest = bytes.len() - reader.pos;
    if rest > 0 {
        return Err(CodecError::TrailingBytes(rest));
    }
    Ok(value)
}

fn write_value(value: &Value, out: &mut Vec<u8>) {
    match value {
        Value::Null => out.push(b'n'),
        Value::Boolean(true) => out.push(b't'),
        Value::Boolean(false) => out.push(b'f'),
        Value::Integer(i) => {
            out.push(b'i');
            out.extend_from_slice(i.to_string().as_bytes());
            out.push(b'e');
        }
        Value::Binary(b) => write_binary(b, out),
        Value::Text(t) => write_text(t, out),
        Value::List(items) => {
            out.push(b'l');
            for item in items {
                write_value(item, out);
            }
            out.push(b'e');
        }
        Value::Dictionary(entries) => {
            out.push(b'd');
            // BTreeMap iteration already yields canonical key order
            for (key, item) in entries {
                match key {
                    Key::Binary(b) => write_binary(b, out),
                    Key::Text(t) => write_text(t, out),
                }
                write_value(item, out);
            }
            out.push(b'e');
        }
    }
}

fn write_binary(bytes: &[u8], out: &mut Vec<u8>) {
    out.extend_from_slice(bytes.len().to_string().as_bytes());
    out.push(b':');
    out.extend_from_slice(bytes);
}

fn write_text(text: &str, out: &mut Vec<u8>) {
    out.push(b'u');
    write_binary(text.as_bytes(), out);
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
    /// Number of containers currently open.
    depth: usize,
}

impl<'a> Reader<'a> {
    fn peek(&self) -> Result<u8, CodecError> {
        self.bytes
            .get(self.pos)
            .copied()
            .ok_or(CodecError::UnexpectedEof(self.pos))
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], CodecError> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.bytes.len())
            .ok_or(CodecError::UnexpectedEof(self.bytes.len()))?;
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    /// Reads bytes up to (and consuming) `terminator`.
    fn take_until(&mut self, terminator: u8) -> Result<&'a [u8], CodecError> {
        let start = self.pos;
        let offset = self.bytes[start..]
            .iter()
            .position(|b| *b == terminator)
            .ok_or(CodecError::UnexpectedEof(self.bytes.len()))?;
        self.pos = start + offset + 1;
        Ok(&self.bytes[start..start + offset])
    }

    fn enter(&mut self, offset: usize) -> Result<(), CodecError> {
        if self.depth == MAX_DEPTH {
            return Err(CodecError::TooDeep(offset));
        }
        self.depth += 1;
        self.pos += 1;
        Ok(())
    }

    fn read_value(&mut self) -> Result<Value, CodecError> {
        let offset = self.pos;
        match self.peek()? {
            b'n' => {
                self.pos += 1;
                Ok(Value::Null)
            }
            b't' => {
                self.pos += 1;
                Ok(Value::Boolean(true))
            }
            b'f' => {
                self.pos += 1;
                Ok(Value::Boolean(false))
            }
            b'i' => {
                self.pos += 1;
                self.read_integer(offset)
                    .map(Value::Integer)
            }
            b'u' => {
                self.pos += 1;
                self.read_text(offset)
                    .map(Value::Text)
            }
            b'0'..=b'9' => self
                .read_binary()
                .map(Value::Binary),
            b'l' => {
                self.enter(offset)?;
                let mut items = Vec::new();
                while self.peek()? != b'e' {
                    items.push(self.read_value()?);
                }
                self.pos += 1;
                self.depth -= 1;
                Ok(Value::List(items))
            }
            b'd' => {
                self.enter(offset)?;
                let mut entries = BTreeMap::new();
                let mut last: Option<Key> = None;
                while self.peek()? != b'e' {
                    let key_offset = self.pos;
                    let key = self.read_key()?;
                    if last
                        .as_ref()
                        .is_some_and(|prev| *prev >= key)
                    {
                        return Err(CodecError::UnsortedKeys(key_offset));
                    }
                    let value = self.read_value()?;
                    last = Some(key.clone());
                    entries.insert(key, value);
                }
                self.pos += 1;
                self.depth -= 1;
                Ok(Value::Dictionary(entries))
            }
            token => Err(CodecError::InvalidToken { token, offset }),
        }
    }

    fn read_key(&mut self) -> Result<Key, CodecError> {
        let offset = self.pos;
        match self.peek()? {
            b'u' => {
                self.pos += 1;
                self.read_text(offset)
                    .map(Key::Text)
            }
            b'0'..=b'9' => self
                .read_binary()
                .map(Key::Binary),
            token => Err(CodecError::InvalidToken { token, offset }),
        }
    }

    fn read_length(&mut self) -> Result<usize, CodecError> {
        let offset = self.pos;
        let digits = self.take_until(b':')?;
        if digits.is_empty() || (digits.len() > 1 && digits[0] == b'0') {
            return Err(CodecError::InvalidLength(offset));
        }
        std::str::from_utf8(digits)
            .ok()
            .and_then(|s| s.parse::<usize>().ok())
            .ok_or(CodecError::InvalidLength(offset))
    }

    fn read_binary(&mut self) -> Result<Bytes, CodecError> {
        let len = self.read_length()?;
        self.take(len)
            .map(Bytes::from)
    }

    fn read_text(&mut self, offset: usize) -> Result<String, CodecError> {
        let len = self.read_length()?;
        let raw = self.take(len)?;
        String::from_utf8(raw.to_vec()).map_err(|_| CodecError::InvalidUtf8(offset))
    }

    fn read_integer(&mut self, offset: usize) -> Result<BigInt, CodecError> {
        let digits = self.take_until(b'e')?;
        let text = std::str::from_utf8(digits).map_err(|_| CodecError::InvalidInteger(offset))?;
        let unsigned = text.strip_prefix('-').unwrap_or(text);
        let canonical = !unsigned.is_empty() &&
            unsigned.bytes().all(|b| b.is_ascii_digit()) &&
            !(unsigned.len() > 1 && unsigned.starts_with('0')) &&
            text != "-0";
        if !canonical {
            return Err(CodecError::InvalidInteger(offset));
        }
        BigInt::from_str(text).map_err(|_| CodecError::InvalidInteger(offset))
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    fn dict(entries: Vec<(Key, Value)>) -> Value {
        entries.into_iter().collect()
    }

    #[rstest]
    #[case::null(Value::Null, b"n".to_vec())]
    #[case::bool_true(Value::Boolean(true), b"t".to_vec())]
    #[case::bool_false(Value::Boolean(false), b"f".to_vec())]
    #[case::zero(Value::from(0), b"i0e".to_vec())]
    #[case::negative(Value::from(-123), b"i-123e".to_vec())]
    #[case::binary(Value::from(Bytes::from("abc")), b"3:abc".to_vec())]
    #[case::empty_binary(Value::from(Bytes::new()), b"0:".to_vec())]
    #[case::text(Value::from("héllo"), "u6:héllo".as_bytes().to_vec())]
    #[case::list(Value::from(vec![Value::Null, Value::from(1)]), b"lni1ee".to_vec())]
    fn test_encode(#[case] value: Value, #[case] expected: Vec<u8>) {
        assert_eq!(encode(&value), expected);
        assert_eq!(decode(&expected).unwrap(), value);
    }

    #[test]
    fn test_dictionary_keys_are_sorted() {
        let value = dict(vec![
            (Key::from("b"), Value::from(2)),
            (Key::from("a"), Value::from(1)),
            (Key::Binary(Bytes::from("z")), Value::Null),
        ]);

        assert_eq!(encode(&value), b"d1:znu1:ai1eu1:bi2ee".to_vec());
    }

    #[rstest]
    #[case::unsorted(b"du1:bi2eu1:ai1ee".to_vec(), CodecError::UnsortedKeys(8))]
    #[case::duplicate(b"du1:ai2eu1:ai1ee".to_vec(), CodecError::UnsortedKeys(8))]
    #[case::leading_zero(b"i01e".to_vec(), CodecError::InvalidInteger(0))]
    #[case::negative_zero(b"i-0e".to_vec(), CodecError::InvalidInteger(0))]
    #[case::truncated(b"5:abc".to_vec(), CodecError::UnexpectedEof(5))]
    #[case::trailing(b"nn".to_vec(), CodecError::TrailingBytes(1))]
    #[case::absent_marker(b"x".to_vec(), CodecError::InvalidToken { token: b'x', offset: 0 })]
    fn test_decode_rejects(#[case] input: Vec<u8>, #[case] expected: CodecError) {
        assert_eq!(decode(&input).unwrap_err(), expected);
    }

    fn nested_lists(depth: usize) -> Vec<u8> {
        [vec![b'l'; depth], vec![b'e'; depth]].concat()
    }

    #[test]
    fn test_decode_accepts_max_depth() {
        let value = decode(&nested_lists(MAX_DEPTH)).unwrap();

        let mut depth = 0;
        let mut current = &value;
        while let Value::List(items) = current {
            depth += 1;
            match items.first() {
                Some(inner) => current = inner,
                None => break,
            }
        }
        assert_eq!(depth, MAX_DEPTH);
    }

    #[rstest]
    #[case::one_too_many(nested_lists(MAX_DEPTH + 1), MAX_DEPTH)]
    #[case::very_deep(nested_lists(1_000_000), MAX_DEPTH)]
    #[case::dictionaries(
        [b"du1:a".repeat(MAX_DEPTH + 1), vec![b'e'; MAX_DEPTH + 1]].concat(),
        MAX_DEPTH * 5
    )]
    fn test_decode_rejects_deep_nesting(#[case] input: Vec<u8>, #[case] offset: usize) {
        assert_eq!(decode(&input).unwrap_err(), CodecError::TooDeep(offset));
    }

    #[test]
    fn test_no_encoding_starts_with_absent_marker() {
        let values = [
            Value::Null,
            Value::from(true),
            Value::from(42),
            Value::from(Bytes::from("x")),
            Value::from("x"),
            Value::List(vec![]),
            dict(vec![]),
        ];
        for value in values {
            assert_ne!(encode(&value)[0], b'x');
        }
    }
}
