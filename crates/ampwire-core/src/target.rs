//! Connection targets for the collector endpoint.

use crate::DeviceIdentity;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;

/// Transport protocol revision advertised in the connection path.
pub const PROTOCOL_VERSION: u8 = 4;

/// Transport security mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Security {
    #[default]
    Plaintext,
    Encrypted,
}

impl Security {
    /// URL scheme for this mode.
    pub fn scheme(&self) -> &'static str {
        match self {
            Self::Plaintext => "ws",
            Self::Encrypted => "wss",
        }
    }
}

impl fmt::Display for Security {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Plaintext => "plaintext",
            Self::Encrypted => "encrypted",
        })
    }
}

/// Where a session connects and how it introduces itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionTarget {
    pub security: Security,
    pub host: String,
    pub port: u16,
    pub identity: DeviceIdentity,
    pub address: Ipv4Addr,
}

impl ConnectionTarget {
    pub fn new(
        security: Security,
        host: impl Into<String>,
        port: u16,
        identity: DeviceIdentity,
        address: Ipv4Addr,
    ) -> Self {
        Self {
            security,
            host: host.into(),
            port,
            identity,
            address,
        }
    }

    /// Request path, including the query parameters that identify the node.
    pub fn path(&self) -> String {
        format!(
            "/socket.io{}/?EIO={}&transport=websocket&mac={}&ip={}",
            crate::DEVICE_NAMESPACE,
            PROTOCOL_VERSION,
            self.identity,
            self.address
        )
    }

    /// Full URL.
    pub fn url(&self) -> String {
        format!(
            "{}://{}:{}{}",
            self.security.scheme(),
            self.host,
            self.port,
            self.path()
        )
    }
}
