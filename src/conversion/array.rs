//! Array type implementation.
//!
//! PostgreSQL array binary format:
//! - ndim: i32 - number of dimensions (0 for an empty array)
//! - has_nulls: i32 - flag, nonzero if any element is NULL
//! - element_oid: i32 - OID of the element type
//! - per dimension: length i32, lower_bound i32
//! - elements: each as a length-prefixed value (-1 length for NULL)
//!
//! Text format is the familiar `{1,2,NULL,4}` brace/comma syntax, with
//! double-quoted elements for values containing commas, braces, quotes,
//! backslashes, or that would otherwise be ambiguous with the NULL keyword.
//!
//! Only one-dimensional arrays are supported; PostgreSQL's genuinely
//! multi-dimensional (rectangular) arrays are rare outside of system
//! catalogs and are rejected with a decode error rather than silently
//! misinterpreted.

use std::ops::{Deref, DerefMut};

use crate::error::{Error, Result};
use crate::protocol::types::{Oid, oid};

use super::{FromWireValue, ToWireValue};

/// A PostgreSQL array value: an ordered sequence of elements, any of which
/// may be NULL.
///
/// Wraps `Vec<Option<T>>` rather than implementing `FromWireValue`/
/// `ToWireValue` directly on `Vec<T>`, so that `Vec<u8>` keeps its existing
/// meaning as `bytea` instead of colliding with "array of `u8`".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Array<T>(pub Vec<Option<T>>);

impl<T> Default for Array<T> {
    fn default() -> Self {
        Array(Vec::new())
    }
}

impl<T> From<Vec<Option<T>>> for Array<T> {
    fn from(v: Vec<Option<T>>) -> Self {
        Array(v)
    }
}

impl<T> From<Array<T>> for Vec<Option<T>> {
    fn from(a: Array<T>) -> Self {
        a.0
    }
}

impl<T> FromIterator<Option<T>> for Array<T> {
    fn from_iter<I: IntoIterator<Item = Option<T>>>(iter: I) -> Self {
        Array(iter.into_iter().collect())
    }
}

impl<T> Deref for Array<T> {
    type Target = Vec<Option<T>>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<T> DerefMut for Array<T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

fn decode_error(oid: Oid) -> Error {
    Error::Decode(format!("oid {} is not a recognized array type", oid))
}

impl<'a, T: FromWireValue<'a>> FromWireValue<'a> for Array<T> {
    fn from_text(oid: Oid, bytes: &'a [u8]) -> Result<Self> {
        let elem_oid = oid::array_element(oid).ok_or_else(|| decode_error(oid))?;
        let s = simdutf8::compat::from_utf8(bytes)
            .map_err(|e| Error::Decode(format!("invalid UTF-8 in array literal: {}", e)))?;
        let trimmed = s.trim();
        let inner = trimmed
            .strip_prefix('{')
            .and_then(|s| s.strip_suffix('}'))
            .ok_or_else(|| Error::Decode(format!("malformed array literal: {:?}", trimmed)))?;

        if inner.is_empty() {
            return Ok(Array(Vec::new()));
        }

        let tokens = split_array_literal(inner)?;
        let mut out = Vec::with_capacity(tokens.len());
        for token in tokens {
            out.push(match token {
                None => None,
                Some(raw) => Some(T::from_text(elem_oid, raw.as_bytes())?),
            });
        }
        Ok(Array(out))
    }

    fn from_binary(oid: Oid, bytes: &'a [u8]) -> Result<Self> {
        oid::array_element(oid).ok_or_else(|| decode_error(oid))?;

        if bytes.len() < 12 {
            return Err(Error::Decode("array header truncated".into()));
        }
        let ndim = i32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        let elem_oid = u32::from_be_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]);

        if ndim == 0 {
            return Ok(Array(Vec::new()));
        }
        if ndim != 1 {
            return Err(Error::Decode(format!(
                "{}-dimensional arrays are not supported",
                ndim
            )));
        }
        if bytes.len() < 20 {
            return Err(Error::Decode("array dimension header truncated".into()));
        }
        let len = i32::from_be_bytes([bytes[12], bytes[13], bytes[14], bytes[15]]);
        if len < 0 {
            return Err(Error::Decode(format!("invalid array dimension length: {len}")));
        }
        let len = len as usize;

        let mut out = Vec::with_capacity(len);
        let mut offset = 20;
        for _ in 0..len {
            if offset + 4 > bytes.len() {
                return Err(Error::Decode("array element header truncated".into()));
            }
            let elem_len = i32::from_be_bytes([
                bytes[offset],
                bytes[offset + 1],
                bytes[offset + 2],
                bytes[offset + 3],
            ]);
            offset += 4;
            if elem_len < 0 {
                out.push(None);
                continue;
            }
            let elem_len = elem_len as usize;
            if offset + elem_len > bytes.len() {
                return Err(Error::Decode("array element data truncated".into()));
            }
            let elem_bytes = &bytes[offset..offset + elem_len];
            offset += elem_len;
            out.push(Some(T::from_binary(elem_oid, elem_bytes)?));
        }
        Ok(Array(out))
    }
}

impl<T: ToWireValue> ToWireValue for Array<T> {
    fn natural_oid(&self) -> Oid {
        self.0
            .iter()
            .flatten()
            .next()
            .and_then(|v| oid::array_of(v.natural_oid()))
            .unwrap_or(oid::UNKNOWN)
    }

    fn encode(&self, target_oid: Oid, buf: &mut Vec<u8>) -> Result<()> {
        let elem_oid =
            oid::array_element(target_oid).ok_or_else(|| Error::type_mismatch(self.natural_oid(), target_oid))?;

        let mut body = Vec::new();
        if self.0.is_empty() {
            body.extend_from_slice(&0_i32.to_be_bytes());
            body.extend_from_slice(&0_i32.to_be_bytes());
            body.extend_from_slice(&(elem_oid as i32).to_be_bytes());
        } else {
            body.extend_from_slice(&1_i32.to_be_bytes());
            body.extend_from_slice(&1_i32.to_be_bytes()); // conservatively report possible NULLs
            body.extend_from_slice(&(elem_oid as i32).to_be_bytes());
            body.extend_from_slice(&(self.0.len() as i32).to_be_bytes());
            body.extend_from_slice(&1_i32.to_be_bytes()); // lower bound
            for el in &self.0 {
                el.encode(elem_oid, &mut body)?;
            }
        }

        buf.extend_from_slice(&(body.len() as i32).to_be_bytes());
        buf.extend_from_slice(&body);
        Ok(())
    }
}

/// Split the interior of a `{...}` array literal on top-level commas,
/// unescaping double-quoted elements and recognizing the bare `NULL`
/// keyword. Returns `None` for a NULL element, `Some(text)` otherwise.
fn split_array_literal(s: &str) -> Result<Vec<Option<String>>> {
    let mut out = Vec::new();
    let mut chars = s.chars().peekable();

    loop {
        let mut token = String::new();
        let quoted = chars.peek() == Some(&'"');

        if quoted {
            chars.next();
            let mut closed = false;
            while let Some(c) = chars.next() {
                match c {
                    '\\' => match chars.next() {
                        Some(escaped) => token.push(escaped),
                        None => return Err(Error::Decode("unterminated escape in array element".into())),
                    },
                    '"' => {
                        closed = true;
                        break;
                    }
                    _ => token.push(c),
                }
            }
            if !closed {
                return Err(Error::Decode("unterminated quoted array element".into()));
            }
        } else {
            while let Some(&c) = chars.peek() {
                if c == ',' {
                    break;
                }
                if c == '{' || c == '}' {
                    return Err(Error::Decode(
                        "nested/multi-dimensional arrays are not supported".into(),
                    ));
                }
                token.push(c);
                chars.next();
            }
        }

        out.push(if !quoted && token.eq_ignore_ascii_case("NULL") {
            None
        } else {
            Some(token)
        });

        match chars.next() {
            Some(',') => continue,
            None => break,
            Some(other) => {
                return Err(Error::Decode(format!(
                    "unexpected character '{other}' in array literal"
                )));
            }
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::types::oid;

    #[test]
    fn decode_text_array_with_null() {
        let arr = Array::<i32>::from_text(oid::INT4ARRAY, b"{1,2,NULL,4}").unwrap();
        assert_eq!(arr.0, vec![Some(1), Some(2), None, Some(4)]);
    }

    #[test]
    fn decode_text_array_empty() {
        let arr = Array::<i32>::from_text(oid::INT4ARRAY, b"{}").unwrap();
        assert!(arr.0.is_empty());
    }

    #[test]
    fn decode_text_array_quoted_element() {
        let arr = Array::<String>::from_text(oid::TEXTARRAY, br#"{"hello, world","a\"b",NULL}"#).unwrap();
        assert_eq!(
            arr.0,
            vec![Some("hello, world".to_string()), Some("a\"b".to_string()), None]
        );
    }

    #[test]
    fn encode_then_decode_binary_round_trip() {
        let arr = Array::<i32>(vec![Some(1), None, Some(3)]);
        let mut buf = Vec::new();
        arr.encode(oid::INT4ARRAY, &mut buf).unwrap();

        // buf is [len:i32][body]; from_binary expects just the body.
        let body = &buf[4..];
        let decoded = Array::<i32>::from_binary(oid::INT4ARRAY, body).unwrap();
        assert_eq!(decoded.0, arr.0);
    }

    #[test]
    fn encode_empty_array() {
        let arr: Array<i32> = Array(Vec::new());
        let mut buf = Vec::new();
        arr.encode(oid::INT4ARRAY, &mut buf).unwrap();
        let body = &buf[4..];
        let decoded = Array::<i32>::from_binary(oid::INT4ARRAY, body).unwrap();
        assert!(decoded.0.is_empty());
    }

    #[test]
    fn rejects_multi_dimensional_text() {
        let err = Array::<i32>::from_text(oid::INT4ARRAY, b"{{1,2},{3,4}}");
        assert!(err.is_err());
    }
}
