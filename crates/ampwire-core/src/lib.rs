//! Core types for ampwire.
//!
//! This crate provides the wire primitives shared by sensor nodes and
//! collectors: identities, frames, readings and connection targets. It does
//! no I/O; the node crate drives these types over a real transport.

mod frame;
mod identity;
mod reading;
mod target;
mod timestamp;

pub use frame::{DEVICE_NAMESPACE, Frame, FrameError, OpenInfo, ROOT_NAMESPACE};
pub use identity::{DeviceIdentity, IdentityParseError};
pub use reading::Reading;
pub use target::{ConnectionTarget, PROTOCOL_VERSION, Security};
pub use timestamp::{Timestamp, TimestampError};

/// Physical link lifecycle state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LinkState {
    /// No association, no attempt in flight.
    #[default]
    Disconnected,
    /// Association attempt in flight.
    Connecting,
    /// Radio reports association.
    Connected,
}

impl LinkState {
    pub const fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }
}

/// Transport session lifecycle state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SessionState {
    /// No transport; a reconnect may be scheduled.
    #[default]
    Closed,
    /// Transport opening or namespace connect pending.
    Handshaking,
    /// Application messages may be sent.
    Open,
    /// Orderly teardown in progress.
    Draining,
}

impl SessionState {
    /// Whether outbound application messages are permitted.
    pub const fn accepts_messages(&self) -> bool {
        matches!(self, Self::Open)
    }
}
