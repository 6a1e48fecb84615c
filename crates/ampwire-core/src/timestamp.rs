//! Fixed-width reading timestamps.
//!
//! Format: `YYYY-MM-DD HH:MM:SS.mmm ±HHMM`, always [`Timestamp::LEN`] bytes.
//! The offset suffix is the offset the wall time was rendered in.

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f %z";

/// A rendered timestamp string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Timestamp(String);

impl Timestamp {
    /// Rendered length in bytes.
    pub const LEN: usize = 29;

    /// Render a wall-clock time in its own offset.
    pub fn render(time: DateTime<FixedOffset>) -> Self {
        Self(time.format(FORMAT).to_string())
    }

    /// Parse the rendered string back into a wall-clock time.
    pub fn to_datetime(&self) -> Result<DateTime<FixedOffset>, TimestampError> {
        DateTime::parse_from_str(&self.0, FORMAT).map_err(|e| TimestampError::Format(e.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Timestamp {
    type Err = TimestampError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != Self::LEN {
            return Err(TimestampError::Length(s.len()));
        }
        DateTime::parse_from_str(s, FORMAT).map_err(|e| TimestampError::Format(e.to_string()))?;
        Ok(Self(s.to_string()))
    }
}

impl TryFrom<String> for Timestamp {
    type Error = TimestampError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Timestamp> for String {
    fn from(ts: Timestamp) -> Self {
        ts.0
    }
}

/// Error parsing a timestamp string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TimestampError {
    #[error("timestamp has wrong length: {0} bytes")]
    Length(usize),
    #[error("malformed timestamp: {0}")]
    Format(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(offset_secs: i32, millis: i64) -> DateTime<FixedOffset> {
        let offset = FixedOffset::east_opt(offset_secs).unwrap();
        offset.timestamp_millis_opt(millis).unwrap()
    }

    #[test]
    fn renders_utc_with_padded_millis() {
        // 2024-03-05 07:08:09.004 UTC
        let ts = Timestamp::render(at(0, 1_709_622_489_004));
        assert_eq!(ts.as_str(), "2024-03-05 07:08:09.004 +0000");
        assert_eq!(ts.as_str().len(), Timestamp::LEN);
    }

    #[test]
    fn renders_negative_offset() {
        let ts = Timestamp::render(at(-4 * 3600, 1_709_622_489_120));
        assert_eq!(ts.as_str(), "2024-03-05 03:08:09.120 -0400");
    }

    #[test]
    fn length_is_fixed_across_values() {
        let offsets = [0, 3600, -4 * 3600, 5 * 3600 + 1800, -12 * 3600, 14 * 3600];
        for offset in offsets {
            for millis in [1_000_000_000_000, 1_000_000_000_001, 1_999_999_999_999, 1_709_622_489_999] {
                let ts = Timestamp::render(at(offset, millis));
                assert_eq!(ts.as_str().len(), Timestamp::LEN, "{ts}");
            }
        }
    }

    #[test]
    fn parse_back_to_same_instant() {
        let time = at(-4 * 3600, 1_709_622_489_120);
        let ts = Timestamp::render(time);
        let parsed: Timestamp = ts.as_str().parse().unwrap();
        assert_eq!(parsed.to_datetime().unwrap(), time);
    }

    #[test]
    fn rejects_wrong_shapes() {
        assert_eq!(
            "2024-03-05 07:08:09 +0000".parse::<Timestamp>(),
            Err(TimestampError::Length(25))
        );
        assert!(matches!(
            "2024-03-05T07:08:09.004 +0000".parse::<Timestamp>(),
            Err(TimestampError::Format(_))
        ));
    }
}
