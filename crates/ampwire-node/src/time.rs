//! Wall-clock synchronization.
//!
//! [`TimeSource::synchronize`] is a one-shot bring-up barrier. It queries a
//! network time server until the answer is plausible and hands back a
//! [`SyncedClock`], the only [`WallClock`] a node can build readings with.
//! The synced clock advances with a monotonic [`Instant`] and is never
//! re-synchronized.

use crate::config::BringUpBudget;
use crate::error::TimeSyncError;
use chrono::{DateTime, FixedOffset, Utc};
use std::io;
use std::net::UdpSocket;
use std::thread;
use std::time::{Duration, Instant};

/// Earliest wall-clock value accepted as synchronized (2001-09-09).
pub const PLAUSIBLE_UNIX_MILLIS: i64 = 1_000_000_000_000;

/// Seconds between the NTP era (1900) and the Unix epoch.
const NTP_UNIX_DELTA: i64 = 2_208_988_800;
const NTP_PORT: u16 = 123;

/// Source of the current wall-clock time.
pub trait WallClock {
    fn now(&self) -> DateTime<FixedOffset>;
}

/// A network time query.
pub trait NetworkClock {
    /// Current time according to `server`, in Unix milliseconds.
    fn query(&mut self, server: &str) -> io::Result<i64>;
}

/// Minimal SNTP client (client mode, single request per query).
#[derive(Debug, Clone)]
pub struct SntpClient {
    timeout: Duration,
}

impl SntpClient {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for SntpClient {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}

impl NetworkClock for SntpClient {
    fn query(&mut self, server: &str) -> io::Result<i64> {
        let socket = UdpSocket::bind(("0.0.0.0", 0))?;
        socket.set_read_timeout(Some(self.timeout))?;
        socket.connect((server, NTP_PORT))?;

        let mut packet = [0u8; 48];
        // LI = 0, version 4, mode 3 (client).
        packet[0] = 0b00_100_011;
        socket.send(&packet)?;

        let mut reply = [0u8; 48];
        let len = socket.recv(&mut reply)?;
        parse_sntp_reply(&reply[..len])
    }
}

fn parse_sntp_reply(reply: &[u8]) -> io::Result<i64> {
    if reply.len() < 48 {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "short SNTP reply"));
    }
    let mode = reply[0] & 0b111;
    if mode != 4 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("unexpected SNTP mode {mode}"),
        ));
    }
    if reply[1] == 0 {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "SNTP kiss-o'-death"));
    }

    let seconds = u32::from_be_bytes([reply[40], reply[41], reply[42], reply[43]]);
    let fraction = u32::from_be_bytes([reply[44], reply[45], reply[46], reply[47]]);
    let millis = (u64::from(fraction) * 1000) >> 32;
    Ok((i64::from(seconds) - NTP_UNIX_DELTA) * 1000 + millis as i64)
}

/// One-shot clock synchronizer.
#[derive(Debug)]
pub struct TimeSource<N> {
    network: N,
}

impl<N: NetworkClock> TimeSource<N> {
    pub fn new(network: N) -> Self {
        Self { network }
    }

    /// Block until `server` yields a plausible time or the budget runs out.
    pub fn synchronize(
        &mut self,
        server: &str,
        gmt_offset_secs: i64,
        daylight_offset_secs: i64,
        budget: &BringUpBudget,
    ) -> Result<SyncedClock, TimeSyncError> {
        let total = gmt_offset_secs.saturating_add(daylight_offset_secs);
        let offset = i32::try_from(total)
            .ok()
            .and_then(FixedOffset::east_opt)
            .ok_or(TimeSyncError::InvalidOffset(total))?;

        tracing::info!("Waiting for time sync from {}...", server);
        let started = Instant::now();
        let mut attempts = 0u32;
        loop {
            attempts += 1;
            match self.network.query(server) {
                Ok(millis) if millis >= PLAUSIBLE_UNIX_MILLIS => {
                    tracing::info!("Time synchronized after {} attempts", attempts);
                    return Ok(SyncedClock::new(millis, offset));
                }
                Ok(millis) => tracing::debug!("Implausible time {} from {}", millis, server),
                Err(e) => tracing::debug!("Time query to {} failed: {}", server, e),
            }

            let elapsed = started.elapsed();
            if budget.is_exhausted(attempts, elapsed) {
                tracing::error!("Time sync gave up after {} attempts", attempts);
                return Err(TimeSyncError::Timeout {
                    server: server.to_string(),
                    attempts,
                    elapsed,
                });
            }
            thread::sleep(budget.poll_delay);
        }
    }
}

/// Wall clock anchored at a synchronized instant.
#[derive(Debug, Clone, Copy)]
pub struct SyncedClock {
    base_millis: i64,
    base: Instant,
    offset: FixedOffset,
}

impl SyncedClock {
    fn new(base_millis: i64, offset: FixedOffset) -> Self {
        Self {
            base_millis,
            base: Instant::now(),
            offset,
        }
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    pub fn unix_millis(&self) -> i64 {
        self.base_millis + self.base.elapsed().as_millis() as i64
    }
}

impl WallClock for SyncedClock {
    fn now(&self) -> DateTime<FixedOffset> {
        DateTime::<Utc>::from_timestamp_millis(self.unix_millis())
            .unwrap_or_default()
            .with_timezone(&self.offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ampwire_core::Timestamp;
    use std::collections::VecDeque;

    struct ScriptedClock {
        answers: VecDeque<io::Result<i64>>,
        queries: u32,
    }

    impl ScriptedClock {
        fn new(answers: Vec<io::Result<i64>>) -> Self {
            Self {
                answers: answers.into(),
                queries: 0,
            }
        }
    }

    impl NetworkClock for ScriptedClock {
        fn query(&mut self, _server: &str) -> io::Result<i64> {
            self.queries += 1;
            self.answers
                .pop_front()
                .unwrap_or_else(|| Err(io::Error::from(io::ErrorKind::TimedOut)))
        }
    }

    fn budget(max_polls: u32) -> BringUpBudget {
        BringUpBudget {
            poll_delay: Duration::ZERO,
            max_polls: Some(max_polls),
            timeout: None,
        }
    }

    #[test]
    fn waits_for_plausible_time() {
        let mut source = TimeSource::new(ScriptedClock::new(vec![
            Err(io::Error::from(io::ErrorKind::TimedOut)),
            Ok(5_000),
            Ok(1_709_622_489_004),
        ]));
        let clock = source.synchronize("pool.ntp.org", 0, 0, &budget(10)).unwrap();
        assert_eq!(source.network.queries, 3);
        assert!(clock.unix_millis() >= 1_709_622_489_004);
        assert!(clock.unix_millis() < 1_709_622_489_004 + 60_000);
    }

    #[test]
    fn gives_up_when_budget_runs_out() {
        let mut source = TimeSource::new(ScriptedClock::new(vec![Ok(0), Ok(1)]));
        let err = source.synchronize("pool.ntp.org", 0, 0, &budget(4)).unwrap_err();
        assert!(matches!(err, TimeSyncError::Timeout { attempts: 4, .. }));
    }

    #[test]
    fn rejects_out_of_range_offset() {
        let mut source = TimeSource::new(ScriptedClock::new(vec![Ok(1_709_622_489_004)]));
        let err = source
            .synchronize("pool.ntp.org", 90_000, 0, &budget(1))
            .unwrap_err();
        assert!(matches!(err, TimeSyncError::InvalidOffset(90_000)));
        assert_eq!(source.network.queries, 0);

        let err = source
            .synchronize("pool.ntp.org", i64::MAX, 1, &budget(1))
            .unwrap_err();
        assert!(matches!(err, TimeSyncError::InvalidOffset(i64::MAX)));
        assert_eq!(source.network.queries, 0);
    }

    #[test]
    fn clock_renders_in_configured_offset() {
        let mut source = TimeSource::new(ScriptedClock::new(vec![Ok(1_709_622_489_004)]));
        let clock = source
            .synchronize("pool.ntp.org", -5 * 3600, 3600, &budget(1))
            .unwrap();
        assert_eq!(clock.offset().local_minus_utc(), -4 * 3600);
        let rendered = Timestamp::render(clock.now());
        assert!(rendered.as_str().ends_with(" -0400"), "{rendered}");
        assert_eq!(rendered.as_str().len(), Timestamp::LEN);
    }

    #[test]
    fn clock_is_monotonic() {
        let mut source = TimeSource::new(ScriptedClock::new(vec![Ok(1_709_622_489_004)]));
        let clock = source.synchronize("pool.ntp.org", 0, 0, &budget(1)).unwrap();
        let mut last = clock.now();
        for _ in 0..100 {
            let next = clock.now();
            assert!(next >= last);
            last = next;
        }
    }

    #[test]
    fn parses_sntp_transmit_timestamp() {
        let mut reply = [0u8; 48];
        reply[0] = 0b00_100_100;
        reply[1] = 2;
        let seconds = (1_709_622_489 + NTP_UNIX_DELTA) as u32;
        reply[40..44].copy_from_slice(&seconds.to_be_bytes());
        // Half a second.
        reply[44..48].copy_from_slice(&0x8000_0000u32.to_be_bytes());
        assert_eq!(parse_sntp_reply(&reply).unwrap(), 1_709_622_489_500);
    }

    #[test]
    fn rejects_bad_sntp_replies() {
        assert!(parse_sntp_reply(&[0u8; 12]).is_err());

        let mut reply = [0u8; 48];
        reply[0] = 0b00_100_011;
        reply[1] = 2;
        assert!(parse_sntp_reply(&reply).is_err());

        reply[0] = 0b00_100_100;
        reply[1] = 0;
        assert!(parse_sntp_reply(&reply).is_err());
    }
}
