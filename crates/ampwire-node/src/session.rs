//! Message session on top of a streaming socket.
//!
//! [`TransportSession`] owns the [`SessionState`] machine:
//!
//! ```text
//!            connect                 socket connected
//! Closed ------------> Handshaking ---------------------> Open
//!   ^                       |        (or namespace ack)    |
//!   |    reconnect after    |                              |
//!   +---- fixed delay <-----+--- error / close / silence --+
//! ```
//!
//! The session answers peer pings inline: a ping frame is answered with
//! exactly one pong before the next frame is looked at. Reconnects are issued
//! at a fixed minimum spacing from the previous attempt, with no backoff.
//!
//! Application messages are fire-and-forget. [`TransportSession::send`]
//! emits nothing unless the session is open and never reports delivery.

use crate::config::SessionConfig;
use crate::scheduler::ReadingSink;
use crate::transport::{Transport, TransportEvent};
use ampwire_core::{ConnectionTarget, DEVICE_NAMESPACE, Frame, Reading, SessionState};

/// Session tuning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    pub namespace: String,
    pub reconnect_delay_ms: u64,
    /// Stay handshaking until the peer acknowledges the namespace connect.
    pub await_ack: bool,
    /// Abandon an attempt still handshaking after this long; 0 waits forever.
    pub handshake_timeout_ms: u64,
}

impl SessionOptions {
    pub fn from_config(config: &SessionConfig) -> Self {
        Self {
            namespace: DEVICE_NAMESPACE.to_string(),
            reconnect_delay_ms: config.reconnect_interval_ms,
            await_ack: config.await_ack,
            handshake_timeout_ms: config.handshake_timeout_ms,
        }
    }
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self::from_config(&SessionConfig::default())
    }
}

/// Counters for diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub attempts: u64,
    pub pings_answered: u64,
    pub messages_sent: u64,
    pub messages_dropped: u64,
}

/// Handshake, keep-alive and event framing over a [`Transport`].
pub struct TransportSession<T> {
    transport: T,
    options: SessionOptions,
    state: SessionState,
    target: Option<ConnectionTarget>,
    /// Time of the latest poll or connect.
    now_ms: u64,
    last_attempt_ms: Option<u64>,
    retry_at_ms: Option<u64>,
    last_heard_ms: u64,
    liveness_window_ms: Option<u64>,
    stats: SessionStats,
}

impl<T: Transport> TransportSession<T> {
    /// A closed session; nothing happens until [`connect`](Self::connect).
    pub fn new(transport: T, options: SessionOptions) -> Self {
        Self {
            transport,
            options,
            state: SessionState::Closed,
            target: None,
            now_ms: 0,
            last_attempt_ms: None,
            retry_at_ms: None,
            last_heard_ms: 0,
            liveness_window_ms: None,
            stats: SessionStats::default(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Whether [`send`](Self::send) would emit anything right now.
    pub fn is_open(&self) -> bool {
        self.state.accepts_messages()
    }

    /// Counters since construction.
    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    /// The collector this session keeps reconnecting to, until shut down.
    pub fn target(&self) -> Option<&ConnectionTarget> {
        self.target.as_ref()
    }

    /// When the next reconnect attempt is due, if one is scheduled.
    pub fn retry_at(&self) -> Option<u64> {
        self.retry_at_ms
    }

    /// The underlying socket.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Start a session with `target`; it is re-established after every failure.
    pub fn connect(&mut self, target: ConnectionTarget, now_ms: u64) {
        self.now_ms = now_ms;
        tracing::info!("Connecting session to {}", target.url());
        self.target = Some(target);
        self.transport.close();
        self.open_transport();
    }

    /// Drive transport I/O. Never blocks.
    pub fn poll(&mut self, now_ms: u64) -> SessionState {
        self.now_ms = now_ms;

        if self.state == SessionState::Closed
            && self.target.is_some()
            && self.retry_at_ms.is_some_and(|at| now_ms >= at)
        {
            self.open_transport();
        }

        while let Some(event) = self.transport.poll_event() {
            self.handle_event(event);
            if self.state == SessionState::Closed {
                break;
            }
        }

        let timeout = self.options.handshake_timeout_ms;
        if timeout > 0 && self.state == SessionState::Handshaking {
            let started = self.last_attempt_ms.unwrap_or(now_ms);
            if now_ms.saturating_sub(started) > timeout {
                self.fail(&format!("handshake not finished within {timeout} ms"));
            }
        }

        if let Some(window) = self.liveness_window_ms {
            let active = matches!(self.state, SessionState::Handshaking | SessionState::Open);
            if active && now_ms.saturating_sub(self.last_heard_ms) > window {
                self.fail(&format!("peer silent for more than {window} ms"));
            }
        }

        self.state
    }

    /// Publish an event. Returns `false` and emits nothing unless open.
    pub fn send(&mut self, event: &str, json_payload: &str) -> bool {
        if !self.state.accepts_messages() {
            self.stats.messages_dropped += 1;
            tracing::trace!("Not sending {:?}, session {:?}", event, self.state);
            return false;
        }
        let frame = Frame::event(self.options.namespace.as_str(), event, json_payload);
        let sent = self.transmit(&frame);
        if sent {
            self.stats.messages_sent += 1;
        } else {
            self.stats.messages_dropped += 1;
        }
        sent
    }

    /// Drop the socket after the link went away; reconnect as usual.
    pub fn reset(&mut self) {
        if self.state != SessionState::Closed {
            self.fail("link down");
        }
    }

    /// Leave the namespace and close for good.
    pub fn shutdown(&mut self) {
        if self.state == SessionState::Open {
            self.state = SessionState::Draining;
            let frame = Frame::Disconnect {
                namespace: self.options.namespace.clone(),
            };
            if self.transport.send_text(&frame.encode()).is_err() {
                tracing::debug!("Peer gone before disconnect");
            }
        }
        self.transport.close();
        self.state = SessionState::Closed;
        self.target = None;
        self.retry_at_ms = None;
        self.liveness_window_ms = None;
        tracing::info!("Session shut down");
    }

    fn open_transport(&mut self) {
        let Some(url) = self.target.as_ref().map(ConnectionTarget::url) else {
            return;
        };

        self.stats.attempts += 1;
        self.last_attempt_ms = Some(self.now_ms);
        self.retry_at_ms = None;
        self.liveness_window_ms = None;
        self.last_heard_ms = self.now_ms;

        match self.transport.open(&url) {
            Ok(()) => {
                tracing::debug!("Session handshaking (attempt {})", self.stats.attempts);
                self.state = SessionState::Handshaking;
            }
            Err(e) => {
                self.state = SessionState::Handshaking;
                self.fail(&e.to_string());
            }
        }
    }

    fn handle_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Connected => {
                self.last_heard_ms = self.now_ms;
                let connect = Frame::connect(self.options.namespace.as_str());
                if !self.transmit(&connect) {
                    return;
                }
                if !self.options.await_ack {
                    self.set_open();
                }
            }
            TransportEvent::Text(text) => {
                self.last_heard_ms = self.now_ms;
                self.handle_text(&text);
            }
            TransportEvent::Disconnected => self.fail("peer disconnected"),
            TransportEvent::Error(e) => self.fail(&e),
        }
    }

    fn handle_text(&mut self, text: &str) {
        let frame = match Frame::parse(text) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!("Ignoring frame {:?}: {}", text, e);
                return;
            }
        };

        if frame
            .namespace()
            .is_some_and(|ns| ns != self.options.namespace)
        {
            tracing::debug!("Ignoring frame for other namespace: {:?}", text);
            return;
        }

        match frame {
            Frame::Ping => {
                if self.transmit(&Frame::Pong) {
                    self.stats.pings_answered += 1;
                }
            }
            Frame::Open(info) => {
                tracing::debug!(
                    "Peer session {} (ping every {} ms, timeout {} ms)",
                    info.sid,
                    info.ping_interval,
                    info.ping_timeout
                );
                self.liveness_window_ms = Some(info.liveness_window_ms());
            }
            Frame::ConnectAck { .. } => {
                if self.state == SessionState::Handshaking {
                    self.set_open();
                }
            }
            Frame::ConnectError { message, .. } => {
                self.fail(&format!("namespace refused: {message}"))
            }
            Frame::Disconnect { .. } => self.fail("namespace disconnected by peer"),
            Frame::Close => self.fail("peer closed transport"),
            Frame::Event { name, .. } => tracing::debug!("Ignoring inbound event {:?}", name),
            Frame::Pong | Frame::Noop | Frame::Connect { .. } => {}
        }
    }

    fn transmit(&mut self, frame: &Frame) -> bool {
        match self.transport.send_text(&frame.encode()) {
            Ok(()) => true,
            Err(e) => {
                self.fail(&e.to_string());
                false
            }
        }
    }

    fn set_open(&mut self) {
        tracing::info!("Session open");
        self.state = SessionState::Open;
    }

    fn fail(&mut self, reason: &str) {
        self.transport.close();
        let was = self.state;
        self.state = SessionState::Closed;
        self.liveness_window_ms = None;

        if self.target.is_none() {
            return;
        }
        let earliest = self
            .last_attempt_ms
            .map_or(self.now_ms, |last| last + self.options.reconnect_delay_ms);
        let retry_at = earliest.max(self.now_ms);
        self.retry_at_ms = Some(retry_at);

        tracing::warn!(
            "Session {:?} -> Closed ({}); reconnecting in {} ms",
            was,
            reason,
            retry_at - self.now_ms
        );
    }
}

impl<T: Transport> ReadingSink for TransportSession<T> {
    fn publish(&mut self, reading: &Reading) -> bool {
        match reading.to_json() {
            Ok(json) => self.send(Reading::EVENT, &json),
            Err(e) => {
                tracing::warn!("Cannot encode reading: {}", e);
                false
            }
        }
    }
}
