//! Hardware identity of a node.
//!
//! Identity format: six hex octets, `AA:BB:CC:DD:EE:FF`.
//!
//! Parsing accepts `:` or `-` separators in either case. Display is always
//! upper-case and colon-separated, which is the form used as the address
//! table key, the `mac=` query parameter, and `macAddress` in readings.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A stable hardware (MAC) address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DeviceIdentity {
    octets: [u8; 6],
}

impl DeviceIdentity {
    /// Create an identity from raw octets.
    pub const fn new(octets: [u8; 6]) -> Self {
        Self { octets }
    }

    /// The raw octets.
    pub fn octets(&self) -> [u8; 6] {
        self.octets
    }
}

impl fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.octets;
        write!(f, "{a:02X}:{b:02X}:{c:02X}:{d:02X}:{e:02X}:{g:02X}")
    }
}

impl FromStr for DeviceIdentity {
    type Err = IdentityParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let parts: Vec<&str> = trimmed.split([':', '-']).collect();
        if parts.len() != 6 {
            return Err(IdentityParseError::OctetCount(trimmed.to_string()));
        }

        let mut octets = [0u8; 6];
        for (slot, part) in octets.iter_mut().zip(&parts) {
            if part.len() != 2 {
                return Err(IdentityParseError::InvalidOctet(part.to_string()));
            }
            *slot = u8::from_str_radix(part, 16)
                .map_err(|_| IdentityParseError::InvalidOctet(part.to_string()))?;
        }

        Ok(Self { octets })
    }
}

impl TryFrom<String> for DeviceIdentity {
    type Error = IdentityParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<DeviceIdentity> for String {
    fn from(id: DeviceIdentity) -> Self {
        id.to_string()
    }
}

/// Error parsing a hardware identity string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdentityParseError {
    #[error("hardware address must have six octets, got: {0}")]
    OctetCount(String),
    #[error("invalid hardware address octet: {0:?}")]
    InvalidOctet(String),
}
