//! Sensor readings.

use crate::{DeviceIdentity, Timestamp};
use serde::{Deserialize, Serialize};

/// One timestamped current measurement.
///
/// Wire form:
/// `{"macAddress": "<id>", "reading": {"value": <amps>, "timestamp": "<ts>"}}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "ReadingWire", from = "ReadingWire")]
pub struct Reading {
    device: DeviceIdentity,
    value: f64,
    timestamp: Timestamp,
}

impl Reading {
    /// Event name readings are published under.
    pub const EVENT: &'static str = "reading";

    pub fn new(device: DeviceIdentity, value: f64, timestamp: Timestamp) -> Self {
        Self {
            device,
            value,
            timestamp,
        }
    }

    pub fn device(&self) -> DeviceIdentity {
        self.device
    }

    /// Current magnitude in amps.
    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn timestamp(&self) -> &Timestamp {
        &self.timestamp
    }

    /// Encode as the JSON event argument. Non-finite values have no JSON
    /// number form and are rejected.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        if !self.value.is_finite() {
            return Err(<serde_json::Error as serde::ser::Error>::custom(format!(
                "reading value {} is not a finite number",
                self.value
            )));
        }
        serde_json::to_string(self)
    }

    /// Decode a JSON event argument.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReadingWire {
    mac_address: DeviceIdentity,
    reading: ValueWire,
}

#[derive(Serialize, Deserialize)]
struct ValueWire {
    value: f64,
    timestamp: Timestamp,
}

impl From<Reading> for ReadingWire {
    fn from(r: Reading) -> Self {
        Self {
            mac_address: r.device,
            reading: ValueWire {
                value: r.value,
                timestamp: r.timestamp,
            },
        }
    }
}

impl From<ReadingWire> for Reading {
    fn from(w: ReadingWire) -> Self {
        Self {
            device: w.mac_address,
            value: w.reading.value,
            timestamp: w.reading.timestamp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DEVICE_NAMESPACE, Frame};

    fn sample() -> Reading {
        Reading::new(
            "AC:15:18:D7:AB:10".parse().unwrap(),
            4.321,
            "2024-03-05 07:08:09.004 +0000".parse().unwrap(),
        )
    }

    #[test]
    fn wire_shape() {
        assert_eq!(
            sample().to_json().unwrap(),
            r#"{"macAddress":"AC:15:18:D7:AB:10","reading":{"value":4.321,"timestamp":"2024-03-05 07:08:09.004 +0000"}}"#
        );
    }

    #[test]
    fn peer_decodes_event_frame() {
        let reading = sample();
        let frame = Frame::event(DEVICE_NAMESPACE, Reading::EVENT, reading.to_json().unwrap());
        let wire = frame.encode();
        assert!(wire.starts_with(r#"42/devices,["reading",{"macAddress""#));

        let Frame::Event { name, payload, .. } = Frame::parse(&wire).unwrap() else {
            panic!("expected event");
        };
        assert_eq!(name, Reading::EVENT);
        let decoded = Reading::from_json(&payload).unwrap();
        assert_eq!(decoded.value(), 4.321);
        assert_eq!(decoded.timestamp().as_str(), "2024-03-05 07:08:09.004 +0000");
        assert_eq!(decoded, reading);
    }

    #[test]
    fn non_finite_values_do_not_encode() {
        for value in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let reading = Reading::new(sample().device(), value, sample().timestamp().clone());
            assert!(reading.to_json().is_err(), "{value}");
        }
        // A null value never decodes either.
        let json = r#"{"macAddress":"AC:15:18:D7:AB:10","reading":{"value":null,"timestamp":"2024-03-05 07:08:09.004 +0000"}}"#;
        assert!(Reading::from_json(json).is_err());
    }

    #[test]
    fn rejects_bad_timestamp() {
        let json = r#"{"macAddress":"AC:15:18:D7:AB:10","reading":{"value":1.0,"timestamp":"now"}}"#;
        assert!(Reading::from_json(json).is_err());
    }
}
