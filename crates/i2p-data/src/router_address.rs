//! RouterAddress: one transport endpoint published in a RouterInfo.
//!
//! ```text
//! RouterAddress = Cost[1] ‖ Expiration[Date] ‖ TransportStyle[String] ‖ Options[Mapping]
//! ```
//!
//! NTCP2 options: `host`, `port`, `s` (static X25519 key, I2P base64),
//! `i` (16-byte IV, I2P base64) and `v` (protocol version).

use std::net::{IpAddr, SocketAddr};

use bytes::{BufMut, BytesMut};

use crate::error::{take, DataError, Parsed};
use crate::mapping::Mapping;
use crate::primitives::{read_string, write_string, Date};

/// Transport style of NTCP2 addresses.
pub const NTCP2_STYLE: &str = "NTCP2";

pub const HOST_OPTION: &str = "host";
pub const PORT_OPTION: &str = "port";
pub const STATIC_KEY_OPTION: &str = "s";
pub const IV_OPTION: &str = "i";
pub const VERSION_OPTION: &str = "v";

/// Static key length (X25519).
pub const STATIC_KEY_SIZE: usize = 32;

/// Obfuscation IV length.
pub const IV_SIZE: usize = 16;

const STRUCTURE: &str = "router address";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouterAddress {
    pub cost: u8,
    pub expiration: Date,
    pub transport_style: String,
    pub options: Mapping,
}

impl RouterAddress {
    pub fn new(
        cost: u8,
        expiration: Date,
        transport_style: impl Into<String>,
        options: Mapping,
    ) -> Self {
        Self {
            cost,
            expiration,
            transport_style: transport_style.into(),
            options,
        }
    }

    /// An NTCP2 address that never expires.
    pub fn ntcp2(
        cost: u8,
        addr: SocketAddr,
        static_key: &[u8; STATIC_KEY_SIZE],
        iv: Option<&[u8; IV_SIZE]>,
    ) -> Self {
        let mut options = Mapping::new();
        options.insert(HOST_OPTION, addr.ip().to_string());
        options.insert(PORT_OPTION, addr.port().to_string());
        options.insert(STATIC_KEY_OPTION, crate::base64::encode(static_key));
        options.insert(VERSION_OPTION, "2");
        if let Some(iv) = iv {
            options.insert(IV_OPTION, crate::base64::encode(iv));
        }
        Self::new(cost, Date::NEVER, NTCP2_STYLE, options)
    }

    pub fn read(data: &[u8]) -> Result<Parsed<'_, Self>, DataError> {
        let (cost, rest) = take(STRUCTURE, data, 1)?;
        let (expiration, rest) = Date::read(rest)?;
        let (transport_style, rest) = read_string(rest)?;
        let options = Mapping::read(rest)?;

        let mut parsed = Parsed::ok(
            Self {
                cost: cost[0],
                expiration,
                transport_style,
                options: options.value,
            },
            options.remainder,
        );
        parsed.note(options.error);
        Ok(parsed)
    }

    pub fn write(&self, buf: &mut BytesMut) -> Result<(), DataError> {
        buf.put_u8(self.cost);
        self.expiration.write(buf);
        write_string(buf, &self.transport_style)?;
        self.options.write(buf)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, DataError> {
        let mut buf = BytesMut::new();
        self.write(&mut buf)?;
        Ok(buf.to_vec())
    }

    pub fn is_ntcp2(&self) -> bool {
        self.transport_style == NTCP2_STYLE
    }

    /// Expired when an expiration is set and lies before `now`.
    pub fn is_expired(&self, now: Date) -> bool {
        !self.expiration.is_undefined() && self.expiration < now
    }

    pub fn host(&self) -> Option<&str> {
        self.options.get(HOST_OPTION)
    }

    pub fn port(&self) -> Option<u16> {
        self.options.get(PORT_OPTION)?.parse().ok()
    }

    pub fn version(&self) -> Option<&str> {
        self.options.get(VERSION_OPTION)
    }

    /// `host` and `port` as a socket address.
    pub fn socket_addr(&self) -> Result<SocketAddr, DataError> {
        let host = self
            .host()
            .ok_or_else(|| DataError::malformed(STRUCTURE, "missing host option"))?;
        let ip: IpAddr = host
            .parse()
            .map_err(|e| DataError::malformed(STRUCTURE, format!("host {:?}: {}", host, e)))?;
        let port = self
            .port()
            .ok_or_else(|| DataError::malformed(STRUCTURE, "missing or invalid port option"))?;
        Ok(SocketAddr::new(ip, port))
    }

    /// The peer's static X25519 key from the `s` option.
    pub fn static_key(&self) -> Result<[u8; STATIC_KEY_SIZE], DataError> {
        decode_fixed(&self.options, STATIC_KEY_OPTION)
    }

    /// The obfuscation IV from the `i` option.
    pub fn iv(&self) -> Result<[u8; IV_SIZE], DataError> {
        decode_fixed(&self.options, IV_OPTION)
    }
}

fn decode_fixed<const N: usize>(options: &Mapping, key: &str) -> Result<[u8; N], DataError> {
    let value = options
        .get(key)
        .ok_or_else(|| DataError::malformed(STRUCTURE, format!("missing {} option", key)))?;
    let bytes = crate::base64::decode(value)?;
    bytes.as_slice().try_into().map_err(|_| {
        DataError::malformed(
            STRUCTURE,
            format!("{} option is {} bytes, expected {}", key, bytes.len(), N),
        )
    })
}
