//! Streaming text sockets.
//!
//! The session layer drives a [`Transport`] through non-blocking calls only.
//! [`WebSocketTransport`] bridges that to tokio-tungstenite: each `open`
//! spawns a driver task on the current runtime and talks to it over
//! unbounded channels. On a current-thread runtime the driver and the control
//! loop interleave cooperatively; nothing runs in parallel.

use crate::error::TransportError;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;

/// Something that happened on the socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Socket handshake finished.
    Connected,
    /// A text message arrived.
    Text(String),
    /// The peer closed the socket.
    Disconnected,
    /// Connect or I/O failure; the socket is gone.
    Error(String),
}

/// Non-blocking text socket.
pub trait Transport {
    /// Start connecting to `url`, replacing any previous socket.
    fn open(&mut self, url: &str) -> Result<(), TransportError>;

    /// Next pending event, if any.
    fn poll_event(&mut self) -> Option<TransportEvent>;

    /// Queue a text message.
    fn send_text(&mut self, text: &str) -> Result<(), TransportError>;

    /// Drop the socket. Pending events are discarded.
    fn close(&mut self);
}

/// WebSocket transport (`ws://` and `wss://`).
#[derive(Debug, Default)]
pub struct WebSocketTransport {
    events: Option<mpsc::UnboundedReceiver<TransportEvent>>,
    outbound: Option<mpsc::UnboundedSender<String>>,
    driver: Option<JoinHandle<()>>,
}

impl WebSocketTransport {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Transport for WebSocketTransport {
    fn open(&mut self, url: &str) -> Result<(), TransportError> {
        self.close();

        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| TransportError::Open(e.to_string()))?;
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

        tracing::debug!("Opening {}", url);
        self.driver = Some(runtime.spawn(drive(url.to_string(), event_tx, outbound_rx)));
        self.events = Some(event_rx);
        self.outbound = Some(outbound_tx);
        Ok(())
    }

    fn poll_event(&mut self) -> Option<TransportEvent> {
        self.events.as_mut()?.try_recv().ok()
    }

    fn send_text(&mut self, text: &str) -> Result<(), TransportError> {
        let outbound = self.outbound.as_ref().ok_or(TransportError::NotOpen)?;
        outbound
            .send(text.to_string())
            .map_err(|_| TransportError::Closed)
    }

    fn close(&mut self) {
        if let Some(driver) = self.driver.take() {
            driver.abort();
        }
        self.events = None;
        self.outbound = None;
    }
}

impl Drop for WebSocketTransport {
    fn drop(&mut self) {
        self.close();
    }
}

async fn drive(
    url: String,
    events: mpsc::UnboundedSender<TransportEvent>,
    mut outbound: mpsc::UnboundedReceiver<String>,
) {
    let ws = match tokio_tungstenite::connect_async(url.as_str()).await {
        Ok((ws, _response)) => ws,
        Err(e) => {
            let _ = events.send(TransportEvent::Error(e.to_string()));
            return;
        }
    };
    let _ = events.send(TransportEvent::Connected);
    let (mut sink, mut stream) = ws.split();

    loop {
        tokio::select! {
            msg = stream.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let _ = events.send(TransportEvent::Text(text.as_str().to_string()));
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        let _ = events.send(TransportEvent::Disconnected);
                        break;
                    }
                    // Socket-level ping/pong is answered by tungstenite itself.
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        let _ = events.send(TransportEvent::Error(e.to_string()));
                        break;
                    }
                }
            }

            text = outbound.recv() => {
                let Some(text) = text else {
                    let _ = sink.close().await;
                    break;
                };
                if let Err(e) = sink.send(Message::Text(text.into())).await {
                    let _ = events.send(TransportEvent::Error(e.to_string()));
                    break;
                }
            }
        }
    }
}
