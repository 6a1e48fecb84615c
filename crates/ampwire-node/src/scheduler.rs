//! Fixed-interval sampling.

use crate::sensor::CurrentSensor;
use crate::time::WallClock;
use ampwire_core::{DeviceIdentity, Reading, Timestamp};

/// Where readings are published.
pub trait ReadingSink {
    /// Publish a reading; `false` if it was not transmitted.
    fn publish(&mut self, reading: &Reading) -> bool;
}

/// Result of one scheduler tick.
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// Interval not yet elapsed.
    Idle,
    Sent(Reading),
    /// Built but not transmitted; readings are never buffered.
    Dropped(Reading),
}

/// Fires once per interval, measured from the last fire.
///
/// Missed intervals are not caught up: after a stall the next tick fires once
/// and the interval restarts from there.
#[derive(Debug, Clone)]
pub struct SamplingScheduler {
    device: DeviceIdentity,
    interval_ms: u64,
    last_fired: Option<u64>,
}

impl SamplingScheduler {
    pub fn new(device: DeviceIdentity, interval_ms: u64) -> Self {
        Self {
            device,
            interval_ms,
            last_fired: None,
        }
    }

    pub fn last_fired(&self) -> Option<u64> {
        self.last_fired
    }

    pub fn is_due(&self, now_ms: u64) -> bool {
        self.last_fired
            .is_none_or(|last| now_ms.saturating_sub(last) >= self.interval_ms)
    }

    pub fn tick<S, C, K>(
        &mut self,
        now_ms: u64,
        sensor: &mut S,
        clock: &C,
        sink: &mut K,
    ) -> TickOutcome
    where
        S: CurrentSensor + ?Sized,
        C: WallClock + ?Sized,
        K: ReadingSink + ?Sized,
    {
        if !self.is_due(now_ms) {
            return TickOutcome::Idle;
        }

        let value = sensor.sample();
        let timestamp = Timestamp::render(clock.now());
        let reading = Reading::new(self.device, value, timestamp);
        self.last_fired = Some(now_ms);

        if sink.publish(&reading) {
            tracing::debug!("Sent reading {:.3} A at {}", value, reading.timestamp());
            TickOutcome::Sent(reading)
        } else {
            tracing::debug!("Dropped reading {:.3} A, session not open", value);
            TickOutcome::Dropped(reading)
        }
    }
}
