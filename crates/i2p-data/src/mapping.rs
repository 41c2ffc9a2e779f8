//! Mapping: an ordered set of string key/value pairs.
//!
//! ```text
//! Mapping = Size[2] ‖ ( String '=' String ';' )*
//! ```
//!
//! Pairs keep their wire order so that re-serializing a parsed mapping yields
//! the signed bytes. Mappings built locally are sorted by key.

use bytes::{BufMut, BytesMut};

use crate::error::{take, DataError, Parsed};
use crate::primitives::{read_string, write_string};

const STRUCTURE: &str = "mapping";

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Mapping {
    pairs: Vec<(String, String)>,
}

impl Mapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a mapping from pairs, sorted by key.
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        let mut pairs: Vec<(String, String)> = pairs
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        pairs.sort_by(|a, b| a.0.cmp(&b.0));
        Self { pairs }
    }

    /// First value for `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Insert or replace, keeping keys sorted.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.pairs.binary_search_by(|(k, _)| k.as_str().cmp(&key)) {
            Ok(index) => self.pairs[index].1 = value,
            Err(index) => self.pairs.insert(index, (key, value)),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Parse a mapping.
    ///
    /// A size larger than the input yields an `InvalidLength` error alongside
    /// the pairs that could be read. A malformed pair stops parsing and is
    /// reported the same way.
    pub fn read(data: &[u8]) -> Result<Parsed<'_, Self>, DataError> {
        let (size, rest) = take(STRUCTURE, data, 2)?;
        let size = usize::from(u16::from_be_bytes([size[0], size[1]]));

        let (mut body, remainder, mut error) = if size > rest.len() {
            (
                rest,
                &rest[rest.len()..],
                Some(DataError::InvalidLength {
                    structure: STRUCTURE,
                    declared: size,
                    available: rest.len(),
                }),
            )
        } else {
            let (body, remainder) = rest.split_at(size);
            (body, remainder, None)
        };

        let mut pairs = Vec::new();
        while !body.is_empty() {
            match read_pair(body) {
                Ok((pair, rest)) => {
                    pairs.push(pair);
                    body = rest;
                }
                Err(err) => {
                    if error.is_none() {
                        error = Some(err);
                    }
                    break;
                }
            }
        }

        let mut parsed = Parsed::ok(Self { pairs }, remainder);
        parsed.note(error);
        Ok(parsed)
    }

    pub fn write(&self, buf: &mut BytesMut) -> Result<(), DataError> {
        let mut body = BytesMut::new();
        for (key, value) in &self.pairs {
            write_string(&mut body, key)?;
            body.put_u8(b'=');
            write_string(&mut body, value)?;
            body.put_u8(b';');
        }
        let size = u16::try_from(body.len())
            .map_err(|_| DataError::malformed(STRUCTURE, "encoded size exceeds 65535"))?;
        buf.put_u16(size);
        buf.put_slice(&body);
        Ok(())
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, DataError> {
        let mut buf = BytesMut::new();
        self.write(&mut buf)?;
        Ok(buf.to_vec())
    }
}

fn read_pair(data: &[u8]) -> Result<((String, String), &[u8]), DataError> {
    let (key, rest) = read_string(data)?;
    let rest = expect_byte(rest, b'=')?;
    let (value, rest) = read_string(rest)?;
    let rest = expect_byte(rest, b';')?;
    Ok(((key, value), rest))
}

fn expect_byte(data: &[u8], byte: u8) -> Result<&[u8], DataError> {
    match data.split_first() {
        Some((b, rest)) if *b == byte => Ok(rest),
        _ => Err(DataError::malformed(
            STRUCTURE,
            format!("expected '{}' separator", byte as char),
        )),
    }
}
