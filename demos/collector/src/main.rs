//! Minimal ampwire collector.
//!
//! Accepts node sessions on the `/devices` namespace, keeps them alive with
//! pings and logs every reading:
//!
//!   cargo run -p ampwire-collector -- --port 8080 --ping-interval 25000
//!
//! Point a node at it with `ampwire-node --server-host 127.0.0.1 --server-port 8080`.

mod server;

use std::net::SocketAddr;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("ampwire_collector=info".parse()?),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    let port = parse_arg(&args, "--port").unwrap_or(8080);
    let bind = parse_arg_string(&args, "--bind").unwrap_or_else(|| "0.0.0.0".to_string());
    let ping_interval = parse_arg(&args, "--ping-interval").unwrap_or(25_000);
    let ping_timeout = parse_arg(&args, "--ping-timeout").unwrap_or(20_000);

    let addr: SocketAddr = format!("{bind}:{port}").parse()?;
    tracing::info!(
        "Collector on {} (ping every {} ms, timeout {} ms)",
        addr,
        ping_interval,
        ping_timeout
    );

    server::run(
        addr,
        server::Keepalive {
            interval_ms: ping_interval,
            timeout_ms: ping_timeout,
        },
    )
    .await
}

fn parse_arg(args: &[String], flag: &str) -> Option<u64> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .and_then(|v| v.parse().ok())
}

fn parse_arg_string(args: &[String], flag: &str) -> Option<String> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .cloned()
}
