//! Error taxonomy for the node.
//!
//! Link and transport faults are recovered locally by retrying; they only
//! surface as errors from the bring-up barriers, where they are fatal.

use std::io;
use std::time::Duration;

/// Result type alias
pub type Result<T> = std::result::Result<T, NodeError>;

/// Radio association never achieved within the bring-up budget.
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    #[error("link not associated after {polls} polls ({elapsed:?})")]
    AssociationTimeout { polls: u32, elapsed: Duration },
}

/// Streaming socket faults.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("transport is not open")]
    NotOpen,
    #[error("transport closed")]
    Closed,
    #[error("cannot open transport: {0}")]
    Open(String),
}

/// Wall-clock synchronization faults.
#[derive(Debug, thiserror::Error)]
pub enum TimeSyncError {
    #[error("no plausible time from {server} after {attempts} attempts ({elapsed:?})")]
    Timeout {
        server: String,
        attempts: u32,
        elapsed: Duration,
    },
    #[error("UTC offset of {0} seconds is out of range")]
    InvalidOffset(i64),
}

/// Configuration loading faults.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config: {0}")]
    Io(#[from] io::Error),
    #[error("cannot parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Fatal node errors.
#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Link(#[from] LinkError),
    #[error(transparent)]
    TimeSync(#[from] TimeSyncError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("radio reports no hardware address and none is configured")]
    MissingIdentity,
}
