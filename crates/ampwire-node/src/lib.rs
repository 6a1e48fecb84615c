//! Sensor node runtime for ampwire.
//!
//! A node keeps a radio link up, holds a message session open to a
//! collector and publishes one current reading per interval. The state
//! machines here are non-blocking and generic over their hardware; the
//! `ampwire-node` binary wires them to sysfs, SNTP and WebSockets.

mod address;
pub mod config;
pub mod error;
mod indicator;
mod link;
mod node;
mod radio;
mod scheduler;
mod sensor;
mod session;
mod time;
mod transport;

pub use address::{AddressAssignment, AddressTable, StaticAddress};
pub use config::{BringUpBudget, NodeConfig};
pub use error::{NodeError, Result};
pub use indicator::{IndicatorOutput, LogIndicator, SysfsLed};
pub use link::{Credentials, LinkManager, Radio};
pub use node::{Node, Phase, StepReport};
pub use radio::SysfsRadio;
pub use scheduler::{ReadingSink, SamplingScheduler, TickOutcome};
pub use sensor::{AdcSensor, CurrentSensor};
pub use session::{SessionOptions, SessionStats, TransportSession};
pub use time::{NetworkClock, PLAUSIBLE_UNIX_MILLIS, SntpClient, SyncedClock, TimeSource, WallClock};
pub use transport::{Transport, TransportEvent, WebSocketTransport};
