//! ampwire-node: current-sensing node.
//!
//! Brings the link up, synchronizes the clock, then streams one reading per
//! interval to the collector until interrupted.
//!
//!   ampwire-node --config node.toml
//!   ampwire-node --server-host collector.local --server-port 8080

use ampwire_core::Security;
use ampwire_node::{
    AdcSensor, AddressTable, IndicatorOutput, LinkManager, LogIndicator, Node, NodeConfig,
    SntpClient, StepReport, SysfsLed, SysfsRadio, TickOutcome, TimeSource, WebSocketTransport,
};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG: &str = "ampwire.toml";

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file (defaults to ./ampwire.toml when present)
    #[arg(short, long, env = "AMPWIRE_CONFIG")]
    config: Option<PathBuf>,

    /// Collector host
    #[arg(long)]
    server_host: Option<String>,

    /// Collector port
    #[arg(long)]
    server_port: Option<u16>,

    /// Transport security: plaintext or encrypted
    #[arg(long, value_parser = parse_security)]
    security: Option<Security>,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = load_config(&args)?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.level)),
        )
        .init();

    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        tracing::debug!("TLS crypto provider already installed");
    }

    tracing::info!("ampwire-node v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        "Collector {}://{}:{} ({})",
        config.server.security.scheme(),
        config.server.host,
        config.server.port,
        config.server.security
    );

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    // Transport drivers are spawned onto this runtime during bring-up.
    let _guard = runtime.enter();

    let radio = SysfsRadio::new(
        &config.network.interface,
        format!("{}:{}", config.server.host, config.server.port),
    );
    let indicator: Box<dyn IndicatorOutput> = match &config.indicator.led {
        Some(path) => Box::new(SysfsLed::new(path)),
        None => Box::new(LogIndicator),
    };
    let addresses = AddressTable::new(&config.addressing);
    if addresses.is_empty() {
        tracing::info!("No static addresses configured, addresses are dynamic");
    } else {
        tracing::debug!("{} static addresses configured", addresses.len());
    }
    let link = LinkManager::new(radio, indicator, &config.network, addresses);
    let sensor = AdcSensor::new(&config.sensor.path, config.sensor.calibration);
    let mut time = TimeSource::new(SntpClient::default());

    let started = Instant::now();
    let node = Node::bring_up(
        &config,
        link,
        &mut time,
        WebSocketTransport::new(),
        sensor,
        elapsed_ms(started),
    )?;

    let loop_period = Duration::from_millis(config.sampling.loop_period_ms);
    runtime.block_on(run(node, loop_period, started))
}

async fn run(
    mut node: Node<SysfsRadio, Box<dyn IndicatorOutput>, WebSocketTransport, AdcSensor>,
    loop_period: Duration,
    started: Instant,
) -> anyhow::Result<()> {
    let mut interval = tokio::time::interval(loop_period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    let mut last = None;
    loop {
        tokio::select! {
            _ = interval.tick() => {
                let report = node.step(elapsed_ms(started));
                log_transitions(&mut last, &report);
            }
            result = &mut shutdown => {
                result?;
                tracing::info!("Shutting down");
                break;
            }
        }
    }

    node.shutdown();
    let stats = node.session().stats();
    tracing::info!(
        "Sent {} readings, dropped {}, {} connection attempts",
        stats.messages_sent,
        stats.messages_dropped,
        stats.attempts
    );
    Ok(())
}

fn log_transitions(last: &mut Option<StepReport>, report: &StepReport) {
    if let Some(prev) = last.as_ref() {
        if prev.link != report.link {
            tracing::info!("Link {:?} -> {:?}", prev.link, report.link);
        }
        if prev.session != report.session {
            tracing::info!("Session {:?} -> {:?}", prev.session, report.session);
        }
    }
    if let TickOutcome::Sent(reading) = &report.tick {
        tracing::trace!("{:.3} A", reading.value());
    }
    *last = Some(report.clone());
}

fn load_config(args: &Args) -> anyhow::Result<NodeConfig> {
    let mut config = match &args.config {
        Some(path) => NodeConfig::from_file(path)?,
        None if Path::new(DEFAULT_CONFIG).exists() => NodeConfig::from_file(DEFAULT_CONFIG)?,
        None => NodeConfig::default(),
    };

    if let Some(host) = &args.server_host {
        config.server.host = host.clone();
    }
    if let Some(port) = args.server_port {
        config.server.port = port;
    }
    if let Some(security) = args.security {
        config.server.security = security;
    }
    config.validate()?;
    Ok(config)
}

fn parse_security(value: &str) -> Result<Security, String> {
    match value {
        "plaintext" | "ws" => Ok(Security::Plaintext),
        "encrypted" | "wss" => Ok(Security::Encrypted),
        other => Err(format!("unknown security mode {other:?}")),
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}
