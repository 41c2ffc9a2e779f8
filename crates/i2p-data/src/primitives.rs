//! Primitive encodings: Integer, Date and String.
//!
//! ```text
//! Integer = 1..8 bytes, big-endian, unsigned
//! Date    = Integer[8], milliseconds since the epoch, 0 = undefined / never
//! String  = Length[1] ‖ UTF-8 bytes[Length]
//! ```

use bytes::BufMut;
use chrono::{DateTime, Utc};

use crate::error::{take, DataError};

/// Maximum encoded length of an Integer.
pub const INTEGER_SIZE: usize = 8;

/// Encoded length of a Date.
pub const DATE_SIZE: usize = 8;

/// Longest String payload.
pub const MAX_STRING_LEN: usize = 255;

/// Read a big-endian integer of `len` bytes (1..=8).
pub fn read_integer(data: &[u8], len: usize) -> Result<(u64, &[u8]), DataError> {
    if len == 0 || len > INTEGER_SIZE {
        return Err(DataError::malformed(
            "integer",
            format!("width {} outside 1..=8", len),
        ));
    }
    let (head, rest) = take("integer", data, len)?;
    let value = head.iter().fold(0u64, |acc, b| (acc << 8) | u64::from(*b));
    Ok((value, rest))
}

/// Write `value` as a big-endian integer of `len` bytes (1..=8).
pub fn write_integer(buf: &mut impl BufMut, value: u64, len: usize) -> Result<(), DataError> {
    if len == 0 || len > INTEGER_SIZE {
        return Err(DataError::malformed(
            "integer",
            format!("width {} outside 1..=8", len),
        ));
    }
    if len < INTEGER_SIZE && value >> (len * 8) != 0 {
        return Err(DataError::malformed(
            "integer",
            format!("{} does not fit in {} bytes", value, len),
        ));
    }
    buf.put_uint(value, len);
    Ok(())
}

/// Milliseconds since the Unix epoch. Zero means undefined, or "never" for
/// expirations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Date(u64);

impl Date {
    pub const NEVER: Date = Date(0);

    pub fn from_millis(millis: u64) -> Self {
        Self(millis)
    }

    pub fn now() -> Self {
        Self::from_datetime(Utc::now())
    }

    pub fn from_datetime(time: DateTime<Utc>) -> Self {
        Self(time.timestamp_millis().max(0) as u64)
    }

    pub fn millis(&self) -> u64 {
        self.0
    }

    /// Whole seconds, saturating at `u32::MAX`.
    pub fn seconds(&self) -> u32 {
        (self.0 / 1000).min(u64::from(u32::MAX)) as u32
    }

    pub fn is_undefined(&self) -> bool {
        self.0 == 0
    }

    pub fn to_datetime(&self) -> Option<DateTime<Utc>> {
        if self.is_undefined() {
            return None;
        }
        i64::try_from(self.0)
            .ok()
            .and_then(DateTime::<Utc>::from_timestamp_millis)
    }

    pub fn read(data: &[u8]) -> Result<(Self, &[u8]), DataError> {
        let (head, rest) = take("date", data, DATE_SIZE)?;
        let (millis, _) = read_integer(head, DATE_SIZE)?;
        Ok((Self(millis), rest))
    }

    pub fn write(&self, buf: &mut impl BufMut) {
        buf.put_u64(self.0);
    }
}

impl std::fmt::Display for Date {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.to_datetime() {
            Some(time) => write!(f, "{}", time.to_rfc3339()),
            None => f.write_str("never"),
        }
    }
}

/// Read a length-prefixed UTF-8 string.
pub fn read_string(data: &[u8]) -> Result<(String, &[u8]), DataError> {
    let (len, rest) = take("string", data, 1)?;
    let len = usize::from(len[0]);
    if rest.len() < len {
        return Err(DataError::InvalidLength {
            structure: "string",
            declared: len,
            available: rest.len(),
        });
    }
    let (body, rest) = rest.split_at(len);
    let value = std::str::from_utf8(body)
        .map_err(|e| DataError::malformed("string", e))?
        .to_owned();
    Ok((value, rest))
}

/// Write a length-prefixed string.
pub fn write_string(buf: &mut impl BufMut, value: &str) -> Result<(), DataError> {
    if value.len() > MAX_STRING_LEN {
        return Err(DataError::malformed(
            "string",
            format!("{} bytes exceeds {}", value.len(), MAX_STRING_LEN),
        ));
    }
    buf.put_u8(value.len() as u8);
    buf.put_slice(value.as_bytes());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    #[test]
    fn integer_widths() {
        assert_eq!(read_integer(&[0x01, 0x02, 0xff], 2).unwrap(), (0x0102, &[0xff][..]));
        assert_eq!(read_integer(&[0xff; 8], 8).unwrap().0, u64::MAX);
        assert!(read_integer(&[0x01], 2).is_err());
        assert!(read_integer(&[0x01], 0).is_err());

        let mut buf = BytesMut::new();
        write_integer(&mut buf, 0x0102, 3).unwrap();
        assert_eq!(&buf[..], &[0x00, 0x01, 0x02]);
        assert!(write_integer(&mut buf, 256, 1).is_err());
    }

    #[test]
    fn date_roundtrip_and_never() {
        let date = Date::from_millis(86_400_000);
        let mut buf = BytesMut::new();
        date.write(&mut buf);
        assert_eq!(buf.len(), DATE_SIZE);
        assert_eq!(Date::read(&buf).unwrap().0, date);
        assert_eq!(date.seconds(), 86_400);
        assert_eq!(date.to_string(), "1970-01-02T00:00:00+00:00");

        let (never, rest) = Date::read(&[0u8; 9]).unwrap();
        assert!(never.is_undefined());
        assert_eq!(never, Date::NEVER);
        assert_eq!(never.to_datetime(), None);
        assert_eq!(rest.len(), 1);
    }

    #[test]
    fn date_now_is_recent() {
        let now = Date::now();
        assert!(now.millis() > 1_600_000_000_000);
    }

    #[test]
    fn string_roundtrip() {
        let mut buf = BytesMut::new();
        write_string(&mut buf, "NTCP2").unwrap();
        assert_eq!(&buf[..], b"\x05NTCP2");
        let (value, rest) = read_string(&buf).unwrap();
        assert_eq!(value, "NTCP2");
        assert!(rest.is_empty());

        let mut empty = BytesMut::new();
        write_string(&mut empty, "").unwrap();
        assert_eq!(read_string(&empty).unwrap().0, "");
    }

    #[test]
    fn string_errors() {
        assert!(matches!(
            read_string(b"\x05NTC"),
            Err(DataError::InvalidLength {
                declared: 5,
                available: 3,
                ..
            })
        ));
        assert!(matches!(
            read_string(&[2, 0xc3, 0x28]),
            Err(DataError::Malformed { .. })
        ));
        assert!(matches!(
            read_string(&[]),
            Err(DataError::InsufficientData { .. })
        ));

        let long = "x".repeat(256);
        assert!(write_string(&mut BytesMut::new(), &long).is_err());
    }
}
