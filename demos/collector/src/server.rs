//! Collector server implementation.

use ampwire_core::{DEVICE_NAMESPACE, DeviceIdentity, Frame, OpenInfo, Reading};
use futures_util::{SinkExt, StreamExt};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::RwLock;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};

const MAX_PAYLOAD: u64 = 1_000_000;

/// Peer keep-alive settings announced in the open packet.
#[derive(Debug, Clone, Copy)]
pub struct Keepalive {
    pub interval_ms: u64,
    pub timeout_ms: u64,
}

/// What the collector knows about a node.
#[derive(Debug, Default)]
struct DeviceStatus {
    address: Option<String>,
    readings: u64,
    last: Option<Reading>,
}

/// Shared collector state.
#[derive(Debug, Default)]
struct CollectorState {
    devices: HashMap<DeviceIdentity, DeviceStatus>,
    sessions: u64,
}

type SharedState = Arc<RwLock<CollectorState>>;

pub async fn run(addr: SocketAddr, keepalive: Keepalive) -> anyhow::Result<()> {
    let state: SharedState = Arc::new(RwLock::new(CollectorState::default()));

    let listener = TcpListener::bind(addr).await?;
    tracing::info!("Listening on ws://{}", addr);

    loop {
        let (stream, client_addr) = listener.accept().await?;
        let state = state.clone();

        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, client_addr, state, keepalive).await {
                tracing::warn!("Connection error from {}: {}", client_addr, e);
            }
        });
    }
}

async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    state: SharedState,
    keepalive: Keepalive,
) -> anyhow::Result<()> {
    let mut uri = String::new();
    let ws = tokio_tungstenite::accept_hdr_async(stream, |req: &Request, resp: Response| {
        uri = req.uri().to_string();
        Ok::<_, ErrorResponse>(resp)
    })
    .await?;
    let (mut sink, mut stream) = ws.split();

    let (device, address) = node_from_uri(&uri);
    tracing::debug!("New connection from {} ({})", addr, uri);

    let sid = {
        let mut s = state.write().await;
        s.sessions += 1;
        if let Some(device) = device {
            s.devices.entry(device).or_default().address = address.clone();
        }
        format!("s{}", s.sessions)
    };

    let open = Frame::Open(OpenInfo {
        sid: sid.clone(),
        upgrades: Vec::new(),
        ping_interval: keepalive.interval_ms,
        ping_timeout: keepalive.timeout_ms,
        max_payload: Some(MAX_PAYLOAD),
    });
    sink.send(Message::Text(open.encode().into())).await?;

    let mut ping = tokio::time::interval(Duration::from_millis(keepalive.interval_ms));
    // First tick completes immediately.
    ping.tick().await;
    let pong_timeout = Duration::from_millis(keepalive.timeout_ms);
    let mut awaiting_pong: Option<Instant> = None;

    loop {
        tokio::select! {
            msg = stream.next() => {
                let msg = match msg {
                    Some(Ok(msg)) => msg,
                    Some(Err(e)) => {
                        tracing::debug!("WebSocket error: {}", e);
                        break;
                    }
                    None => break,
                };

                let text = match msg {
                    Message::Text(text) => text,
                    Message::Close(_) => break,
                    _ => continue,
                };

                let frame = match Frame::parse(text.as_str()) {
                    Ok(frame) => frame,
                    Err(e) => {
                        tracing::warn!("Invalid frame from {}: {}", addr, e);
                        continue;
                    }
                };

                match frame {
                    Frame::Pong => awaiting_pong = None,
                    Frame::Connect { namespace } => {
                        let reply = if namespace == DEVICE_NAMESPACE {
                            Frame::ConnectAck { namespace, sid: Some(sid.clone()) }
                        } else {
                            Frame::ConnectError { namespace, message: "Invalid namespace".to_string() }
                        };
                        sink.send(Message::Text(reply.encode().into())).await?;
                    }
                    Frame::Event { name, payload, .. } if name == Reading::EVENT => {
                        match Reading::from_json(&payload) {
                            Ok(reading) => record(&state, reading).await,
                            Err(e) => tracing::warn!("Invalid reading from {}: {}", addr, e),
                        }
                    }
                    Frame::Event { name, .. } => tracing::debug!("Ignoring event {:?}", name),
                    Frame::Disconnect { .. } | Frame::Close => break,
                    other => tracing::debug!("Ignoring {:?}", other),
                }
            }

            _ = ping.tick() => {
                match awaiting_pong {
                    Some(sent) if sent.elapsed() > pong_timeout => {
                        tracing::warn!("No pong from {}, dropping session {}", addr, sid);
                        break;
                    }
                    Some(_) => {}
                    None => {
                        sink.send(Message::Text(Frame::Ping.encode().into())).await?;
                        awaiting_pong = Some(Instant::now());
                    }
                }
            }
        }
    }

    let (readings, last) = {
        let s = state.read().await;
        match device.and_then(|device| s.devices.get(&device)) {
            Some(status) => (status.readings, status.last.as_ref().map(Reading::value)),
            None => (0, None),
        }
    };
    tracing::info!(
        "Session {} closed: {} ({} readings total, last {:?} A)",
        sid,
        device.map_or_else(|| addr.to_string(), |d| d.to_string()),
        readings,
        last
    );
    Ok(())
}

async fn record(state: &SharedState, reading: Reading) {
    let mut s = state.write().await;
    let status = s.devices.entry(reading.device()).or_default();
    status.readings += 1;
    tracing::info!(
        "{} [{}] {:.3} A at {}",
        reading.device(),
        status.address.as_deref().unwrap_or("?"),
        reading.value(),
        reading.timestamp()
    );
    status.last = Some(reading);
}

/// Node identity and address from the session request query.
fn node_from_uri(uri: &str) -> (Option<DeviceIdentity>, Option<String>) {
    let query = uri.split_once('?').map_or("", |(_, query)| query);
    let mut device = None;
    let mut address = None;
    for pair in query.split('&') {
        match pair.split_once('=') {
            Some(("mac", value)) => device = value.parse().ok(),
            Some(("ip", value)) => address = Some(value.to_string()),
            _ => {}
        }
    }
    (device, address)
}
