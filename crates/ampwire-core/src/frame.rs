//! Text frames exchanged over a transport session.
//!
//! A frame is two-level: the first character is the transport packet kind
//! (open, close, ping, pong, message, noop). Message packets carry a second
//! digit, the session packet kind (connect, disconnect, event, connect error),
//! followed by an optional namespace (`/devices,`), an optional ack id and a
//! JSON body.
//!
//! ```text
//! 2                              ping
//! 3                              pong
//! 40/devices,                    namespace connect (node -> peer)
//! 40/devices,{"sid":"abc"}       namespace connect acknowledgement (peer -> node)
//! 42/devices,["reading",{...}]   event
//! ```
//!
//! Kinds are matched explicitly rather than by string prefix, so an unknown
//! kind from a newer peer surfaces as a [`FrameError`] instead of being
//! mistaken for a ping.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Root namespace.
pub const ROOT_NAMESPACE: &str = "/";

/// Namespace used by sensor nodes.
pub const DEVICE_NAMESPACE: &str = "/devices";

/// Handshake parameters announced by the peer in its open packet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenInfo {
    pub sid: String,
    #[serde(default)]
    pub upgrades: Vec<String>,
    /// Milliseconds between peer pings.
    pub ping_interval: u64,
    /// Milliseconds the peer waits for a pong.
    pub ping_timeout: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_payload: Option<u64>,
}

impl OpenInfo {
    /// Longest silence after which the peer is considered gone.
    pub fn liveness_window_ms(&self) -> u64 {
        self.ping_interval + self.ping_timeout
    }
}

/// A single frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// Transport handshake from the peer.
    Open(OpenInfo),
    /// Transport close request.
    Close,
    /// Keep-alive probe from the peer.
    Ping,
    /// Keep-alive reply.
    Pong,
    /// Namespace connect request (no body).
    Connect { namespace: String },
    /// Namespace connect acknowledgement (body with session id).
    ConnectAck { namespace: String, sid: Option<String> },
    /// Namespace connect refused.
    ConnectError { namespace: String, message: String },
    /// Namespace disconnect.
    Disconnect { namespace: String },
    /// Named event with a JSON-encoded argument.
    Event {
        namespace: String,
        name: String,
        /// JSON text of the first argument.
        payload: String,
    },
    /// No-op filler.
    Noop,
}

impl Frame {
    /// Namespace connect frame for `namespace`.
    pub fn connect(namespace: impl Into<String>) -> Self {
        Self::Connect {
            namespace: namespace.into(),
        }
    }

    /// Event frame carrying already-encoded JSON.
    pub fn event(
        namespace: impl Into<String>,
        name: impl Into<String>,
        payload: impl Into<String>,
    ) -> Self {
        Self::Event {
            namespace: namespace.into(),
            name: name.into(),
            payload: payload.into(),
        }
    }

    /// Render the wire text.
    pub fn encode(&self) -> String {
        match self {
            Self::Open(info) => format!("0{}", open_body(info)),
            Self::Close => "1".to_string(),
            Self::Ping => "2".to_string(),
            Self::Pong => "3".to_string(),
            Self::Noop => "6".to_string(),
            Self::Connect { namespace } => format!("40{}", namespace_prefix(namespace)),
            Self::ConnectAck { namespace, sid } => {
                let body = match sid {
                    Some(sid) => serde_json::json!({ "sid": sid }),
                    None => serde_json::json!({}),
                };
                format!("40{}{}", namespace_prefix(namespace), body)
            }
            Self::ConnectError { namespace, message } => {
                let body = serde_json::json!({ "message": message });
                format!("44{}{}", namespace_prefix(namespace), body)
            }
            Self::Disconnect { namespace } => format!("41{}", namespace_prefix(namespace)),
            Self::Event {
                namespace,
                name,
                payload,
            } => format!(
                "42{}[{},{}]",
                namespace_prefix(namespace),
                Value::from(name.as_str()),
                payload
            ),
        }
    }

    /// Parse wire text.
    pub fn parse(text: &str) -> Result<Self, FrameError> {
        let mut chars = text.chars();
        let kind = chars.next().ok_or(FrameError::Empty)?;
        let rest = chars.as_str();

        match kind {
            '0' => {
                let info: OpenInfo =
                    serde_json::from_str(rest).map_err(|e| FrameError::Json(e.to_string()))?;
                Ok(Self::Open(info))
            }
            '1' => Ok(Self::Close),
            // Probe payloads ("2probe") are only used during upgrades.
            '2' => Ok(Self::Ping),
            '3' => Ok(Self::Pong),
            '4' => parse_message(rest),
            '6' => Ok(Self::Noop),
            other => Err(FrameError::UnknownTransportKind(other)),
        }
    }

    /// The namespace a message frame belongs to, if any.
    pub fn namespace(&self) -> Option<&str> {
        match self {
            Self::Connect { namespace }
            | Self::ConnectAck { namespace, .. }
            | Self::ConnectError { namespace, .. }
            | Self::Disconnect { namespace }
            | Self::Event { namespace, .. } => Some(namespace),
            _ => None,
        }
    }
}

fn open_body(info: &OpenInfo) -> Value {
    let mut body = serde_json::json!({
        "sid": info.sid,
        "upgrades": info.upgrades,
        "pingInterval": info.ping_interval,
        "pingTimeout": info.ping_timeout,
    });
    if let (Some(max), Some(map)) = (info.max_payload, body.as_object_mut()) {
        map.insert("maxPayload".to_string(), Value::from(max));
    }
    body
}

fn namespace_prefix(namespace: &str) -> String {
    if namespace == ROOT_NAMESPACE || namespace.is_empty() {
        String::new()
    } else {
        format!("{namespace},")
    }
}

fn parse_message(body: &str) -> Result<Frame, FrameError> {
    let mut chars = body.chars();
    let kind = chars.next().ok_or(FrameError::MissingSessionKind)?;
    let rest = chars.as_str();

    let (namespace, rest) = split_namespace(rest);
    // Ack ids sit between the namespace and the body; nodes never request acks.
    let rest = rest.trim_start_matches(|c: char| c.is_ascii_digit());

    match kind {
        '0' if rest.is_empty() => Ok(Frame::Connect { namespace }),
        '0' => {
            let body: Value =
                serde_json::from_str(rest).map_err(|e| FrameError::Json(e.to_string()))?;
            let sid = body.get("sid").and_then(Value::as_str).map(str::to_string);
            Ok(Frame::ConnectAck { namespace, sid })
        }
        '1' => Ok(Frame::Disconnect { namespace }),
        '2' => {
            let args: Vec<Value> =
                serde_json::from_str(rest).map_err(|e| FrameError::Json(e.to_string()))?;
            let mut args = args.into_iter();
            let name = match args.next() {
                Some(Value::String(name)) => name,
                _ => return Err(FrameError::MissingEventName),
            };
            let payload = args.next().unwrap_or(Value::Null).to_string();
            Ok(Frame::Event {
                namespace,
                name,
                payload,
            })
        }
        '4' => {
            let message = match serde_json::from_str::<Value>(rest) {
                Ok(body) => body
                    .get("message")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .unwrap_or_else(|| body.to_string()),
                Err(_) => rest.to_string(),
            };
            Ok(Frame::ConnectError { namespace, message })
        }
        other => Err(FrameError::UnknownSessionKind(other)),
    }
}

fn split_namespace(rest: &str) -> (String, &str) {
    if !rest.starts_with('/') {
        return (ROOT_NAMESPACE.to_string(), rest);
    }
    match rest.split_once(',') {
        Some((namespace, tail)) => (namespace.to_string(), tail),
        None => (rest.to_string(), ""),
    }
}

/// Error parsing a frame.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    #[error("empty frame")]
    Empty,
    #[error("unknown transport packet kind {0:?}")]
    UnknownTransportKind(char),
    #[error("message frame without session packet kind")]
    MissingSessionKind,
    #[error("unknown session packet kind {0:?}")]
    UnknownSessionKind(char),
    #[error("event frame without a name")]
    MissingEventName,
    #[error("malformed frame body: {0}")]
    Json(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn control_markers() {
        assert_eq!(Frame::Ping.encode(), "2");
        assert_eq!(Frame::Pong.encode(), "3");
        assert_eq!(Frame::parse("2").unwrap(), Frame::Ping);
        assert_eq!(Frame::parse("3").unwrap(), Frame::Pong);
        assert_eq!(Frame::parse("1").unwrap(), Frame::Close);
        assert_eq!(Frame::parse("6").unwrap(), Frame::Noop);
    }

    #[test]
    fn namespace_connect_wire_form() {
        let frame = Frame::connect(DEVICE_NAMESPACE);
        assert_eq!(frame.encode(), "40/devices,");
        assert_eq!(Frame::parse("40/devices,").unwrap(), frame);
        assert_eq!(Frame::connect(ROOT_NAMESPACE).encode(), "40");
    }

    #[test]
    fn connect_ack_carries_sid() {
        let frame = Frame::parse(r#"40/devices,{"sid":"xyz"}"#).unwrap();
        assert_eq!(
            frame,
            Frame::ConnectAck {
                namespace: DEVICE_NAMESPACE.into(),
                sid: Some("xyz".into()),
            }
        );
        assert_eq!(frame.encode(), r#"40/devices,{"sid":"xyz"}"#);
    }

    #[test]
    fn connect_error_message() {
        let frame = Frame::parse(r#"44/devices,{"message":"not allowed"}"#).unwrap();
        assert_eq!(
            frame,
            Frame::ConnectError {
                namespace: DEVICE_NAMESPACE.into(),
                message: "not allowed".into(),
            }
        );
    }

    #[test]
    fn event_wire_form() {
        let frame = Frame::event(DEVICE_NAMESPACE, "reading", r#"{"a":1}"#);
        assert_eq!(frame.encode(), r#"42/devices,["reading",{"a":1}]"#);
    }

    #[test]
    fn event_name_is_escaped() {
        let frame = Frame::event(ROOT_NAMESPACE, "we\"ird", "null");
        assert_eq!(frame.encode(), r#"42["we\"ird",null]"#);
        match Frame::parse(&frame.encode()).unwrap() {
            Frame::Event { name, namespace, .. } => {
                assert_eq!(name, "we\"ird");
                assert_eq!(namespace, ROOT_NAMESPACE);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn event_with_ack_id() {
        let frame = Frame::parse(r#"42/devices,17["reading",{"a":1}]"#).unwrap();
        assert_eq!(frame, Frame::event(DEVICE_NAMESPACE, "reading", r#"{"a":1}"#));
    }

    #[test]
    fn open_packet() {
        let text = r#"0{"sid":"s1","upgrades":[],"pingInterval":25000,"pingTimeout":20000,"maxPayload":1000000}"#;
        let Frame::Open(info) = Frame::parse(text).unwrap() else {
            panic!("expected open");
        };
        assert_eq!(info.sid, "s1");
        assert_eq!(info.liveness_window_ms(), 45000);
        assert_eq!(info.max_payload, Some(1_000_000));
        assert_eq!(Frame::parse(&Frame::Open(info.clone()).encode()).unwrap(), Frame::Open(info));
    }

    #[test]
    fn unknown_kinds_are_errors() {
        assert_eq!(Frame::parse(""), Err(FrameError::Empty));
        assert_eq!(Frame::parse("9"), Err(FrameError::UnknownTransportKind('9')));
        assert_eq!(Frame::parse("4"), Err(FrameError::MissingSessionKind));
        assert_eq!(Frame::parse("45/devices,"), Err(FrameError::UnknownSessionKind('5')));
        assert_eq!(Frame::parse("42/devices,[1]"), Err(FrameError::MissingEventName));
        assert!(matches!(Frame::parse("42/devices,[oops"), Err(FrameError::Json(_))));
    }

    #[test]
    fn upgrade_probe_is_a_ping() {
        assert_eq!(Frame::parse("2probe").unwrap(), Frame::Ping);
    }
}
