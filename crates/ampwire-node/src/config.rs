//! Node configuration.
//!
//! Loaded once at startup from a TOML file; never reloaded. Every field has a
//! default, so an empty file (or no file) yields a runnable plaintext setup
//! pointed at a local collector.

use crate::error::ConfigError;
use ampwire_core::{DeviceIdentity, Security};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level node configuration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct NodeConfig {
    pub server: ServerConfig,
    pub network: NetworkConfig,
    pub addressing: AddressingConfig,
    pub sensor: SensorConfig,
    pub session: SessionConfig,
    pub time: TimeConfig,
    pub sampling: SamplingConfig,
    pub indicator: IndicatorConfig,
    pub logging: LoggingConfig,
}

/// Collector endpoint.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    pub security: Security,
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            security: Security::Plaintext,
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

/// Radio link settings.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Network interface backing the link.
    pub interface: String,
    pub ssid: String,
    pub password: String,
    /// Overrides the radio-reported hardware address.
    pub identity: Option<DeviceIdentity>,
    /// Delay between association polls during bring-up.
    pub poll_delay_ms: u64,
    /// Polls without association before an attempt is restarted (0 = never).
    pub attempt_polls: u32,
    /// Bring-up limit (0 = wait forever).
    pub bring_up_timeout_ms: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            interface: "wlan0".to_string(),
            ssid: String::new(),
            password: String::new(),
            identity: None,
            poll_delay_ms: 100,
            attempt_polls: 300,
            bring_up_timeout_ms: 120_000,
        }
    }
}

/// Static address assignment.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct AddressingConfig {
    /// Network the table suffixes are placed in; the last octet is replaced.
    pub network: Ipv4Addr,
    pub gateway: Ipv4Addr,
    pub subnet: Ipv4Addr,
    pub dns: Ipv4Addr,
    /// Hardware identity to host suffix.
    pub table: BTreeMap<DeviceIdentity, u8>,
}

impl Default for AddressingConfig {
    fn default() -> Self {
        Self {
            network: Ipv4Addr::new(10, 231, 200, 0),
            gateway: Ipv4Addr::new(10, 231, 200, 1),
            subnet: Ipv4Addr::new(255, 255, 255, 0),
            dns: Ipv4Addr::new(8, 8, 8, 8),
            table: factory_table(),
        }
    }
}

fn factory_table() -> BTreeMap<DeviceIdentity, u8> {
    [
        ([0xAC, 0x15, 0x18, 0xD7, 0xAB, 0x10], 200),
        ([0xAC, 0x15, 0x18, 0xD5, 0x3A, 0xEC], 201),
        ([0xAC, 0x15, 0x18, 0xD8, 0x65, 0xA8], 202),
        ([0xAC, 0x15, 0x18, 0xD7, 0x52, 0xD0], 203),
        ([0x88, 0x13, 0xBF, 0x62, 0x51, 0xA0], 204),
        ([0xAC, 0x15, 0x18, 0xD6, 0xBB, 0x48], 205),
        ([0xCC, 0x7B, 0x5C, 0xFB, 0xEE, 0x44], 206),
        ([0xAC, 0x15, 0x18, 0xD7, 0xE2, 0x40], 207),
        ([0xAC, 0x15, 0x18, 0xD7, 0x5A, 0x5C], 208),
        ([0xAC, 0x15, 0x18, 0xD5, 0xBF, 0xCC], 209),
    ]
    .into_iter()
    .map(|(octets, suffix)| (DeviceIdentity::new(octets), suffix))
    .collect()
}

/// Current sensor input.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SensorConfig {
    /// File holding the raw converter value (sysfs/IIO).
    pub path: PathBuf,
    /// Amps per raw unit.
    pub calibration: f64,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("/sys/bus/iio/devices/iio:device0/in_voltage6_raw"),
            calibration: 100.0,
        }
    }
}

/// Transport session behaviour.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Minimum delay between connection attempts.
    pub reconnect_interval_ms: u64,
    /// Stay handshaking until the peer acknowledges the namespace connect.
    pub await_ack: bool,
    /// Give up on an attempt that has not opened within this time (0 = wait forever).
    pub handshake_timeout_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            reconnect_interval_ms: 500,
            await_ack: false,
            handshake_timeout_ms: 10_000,
        }
    }
}

/// Wall-clock synchronization.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeConfig {
    pub ntp_server: String,
    pub gmt_offset_secs: i64,
    pub daylight_offset_secs: i64,
    /// Delay between synchronization attempts.
    pub poll_delay_ms: u64,
    /// Bring-up limit (0 = wait forever).
    pub sync_timeout_ms: u64,
}

impl Default for TimeConfig {
    fn default() -> Self {
        Self {
            ntp_server: "pool.ntp.org".to_string(),
            gmt_offset_secs: 0,
            daylight_offset_secs: 0,
            poll_delay_ms: 100,
            sync_timeout_ms: 60_000,
        }
    }
}

/// Sampling cadence.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SamplingConfig {
    pub interval_ms: u64,
    /// Control loop period.
    pub loop_period_ms: u64,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            interval_ms: 1000,
            loop_period_ms: 10,
        }
    }
}

/// Status indicator output.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct IndicatorConfig {
    /// LED `brightness` file; the indicator is only logged when unset.
    pub led: Option<PathBuf>,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive, overridden by `RUST_LOG`.
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl NodeConfig {
    /// Load and validate configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        let config: NodeConfig = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.host.is_empty() {
            return Err(ConfigError::Invalid("server.host is empty".into()));
        }
        if self.server.port == 0 {
            return Err(ConfigError::Invalid("server.port must be non-zero".into()));
        }
        if self.sampling.interval_ms == 0 {
            return Err(ConfigError::Invalid("sampling.interval_ms must be non-zero".into()));
        }
        if self.sampling.loop_period_ms == 0 {
            return Err(ConfigError::Invalid(
                "sampling.loop_period_ms must be non-zero".into(),
            ));
        }
        let (gmt, daylight) = (self.time.gmt_offset_secs, self.time.daylight_offset_secs);
        let offset = gmt.checked_add(daylight);
        if !offset.is_some_and(|secs| secs.unsigned_abs() < 86_400) {
            return Err(ConfigError::Invalid(format!(
                "combined UTC offset {gmt}s + {daylight}s is out of range"
            )));
        }
        Ok(())
    }
}

/// Poll budget for a bring-up barrier.
///
/// A budget with neither limit set waits forever.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BringUpBudget {
    pub poll_delay: Duration,
    pub max_polls: Option<u32>,
    pub timeout: Option<Duration>,
}

impl BringUpBudget {
    pub fn unbounded(poll_delay: Duration) -> Self {
        Self {
            poll_delay,
            max_polls: None,
            timeout: None,
        }
    }

    pub fn is_exhausted(&self, polls: u32, elapsed: Duration) -> bool {
        self.max_polls.is_some_and(|max| polls >= max)
            || self.timeout.is_some_and(|limit| elapsed >= limit)
    }

    /// Budget for link association.
    pub fn for_link(config: &NetworkConfig) -> Self {
        Self {
            poll_delay: Duration::from_millis(config.poll_delay_ms),
            max_polls: None,
            timeout: nonzero_millis(config.bring_up_timeout_ms),
        }
    }

    /// Budget for time synchronization.
    pub fn for_time(config: &TimeConfig) -> Self {
        Self {
            poll_delay: Duration::from_millis(config.poll_delay_ms),
            max_polls: None,
            timeout: nonzero_millis(config.sync_timeout_ms),
        }
    }
}

fn nonzero_millis(ms: u64) -> Option<Duration> {
    (ms > 0).then(|| Duration::from_millis(ms))
}
