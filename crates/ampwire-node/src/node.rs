//! Node context and control loop step.
//!
//! A [`Node`] owns every component of the device. It is built by
//! [`Node::bring_up`], which runs the two blocking barriers in order (link
//! association, then time sync) and opens the session. After that the caller
//! drives [`Node::step`] on a fixed period.

use crate::config::{BringUpBudget, NodeConfig};
use crate::error::{NodeError, Result};
use crate::indicator::IndicatorOutput;
use crate::link::{LinkManager, Radio};
use crate::scheduler::{SamplingScheduler, TickOutcome};
use crate::sensor::CurrentSensor;
use crate::session::{SessionOptions, TransportSession};
use crate::time::{NetworkClock, SyncedClock, TimeSource, WallClock};
use crate::transport::Transport;
use ampwire_core::{ConnectionTarget, DeviceIdentity, LinkState, SessionState};
use std::fmt;

/// Bring-up progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    AwaitingLink,
    AwaitingTimeSync,
    Running,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::AwaitingLink => write!(f, "awaiting link"),
            Phase::AwaitingTimeSync => write!(f, "awaiting time sync"),
            Phase::Running => write!(f, "running"),
        }
    }
}

/// What one control loop step did.
#[derive(Debug, Clone, PartialEq)]
pub struct StepReport {
    pub link: LinkState,
    pub session: SessionState,
    pub tick: TickOutcome,
}

/// The device: link, session, sampler and clock.
pub struct Node<R, I, T, S, C = SyncedClock> {
    link: LinkManager<R, I>,
    session: TransportSession<T>,
    scheduler: SamplingScheduler,
    clock: C,
    sensor: S,
    identity: DeviceIdentity,
}

impl<R, I, T, S> Node<R, I, T, S, SyncedClock>
where
    R: Radio,
    I: IndicatorOutput,
    T: Transport,
    S: CurrentSensor,
{
    /// Run the bring-up barriers and open the session.
    pub fn bring_up<N: NetworkClock>(
        config: &NodeConfig,
        mut link: LinkManager<R, I>,
        time: &mut TimeSource<N>,
        transport: T,
        sensor: S,
        now_ms: u64,
    ) -> Result<Self> {
        tracing::info!("Bring-up: {}", Phase::AwaitingLink);
        link.ensure_connected(&BringUpBudget::for_link(&config.network))?;

        tracing::info!("Bring-up: {}", Phase::AwaitingTimeSync);
        let clock = time.synchronize(
            &config.time.ntp_server,
            config.time.gmt_offset_secs,
            config.time.daylight_offset_secs,
            &BringUpBudget::for_time(&config.time),
        )?;

        let node = Self::assemble(config, link, clock, transport, sensor, now_ms)?;
        tracing::info!("Bring-up: {}", Phase::Running);
        Ok(node)
    }
}

impl<R, I, T, S, C> Node<R, I, T, S, C>
where
    R: Radio,
    I: IndicatorOutput,
    T: Transport,
    S: CurrentSensor,
    C: WallClock,
{
    /// Build a node around an associated link and start the session.
    pub fn assemble(
        config: &NodeConfig,
        mut link: LinkManager<R, I>,
        clock: C,
        transport: T,
        sensor: S,
        now_ms: u64,
    ) -> Result<Self> {
        let identity = link.identity().ok_or(NodeError::MissingIdentity)?;
        let address = link.assigned_address();

        let mut session = TransportSession::new(transport, SessionOptions::from_config(&config.session));
        session.connect(
            ConnectionTarget::new(
                config.server.security,
                config.server.host.as_str(),
                config.server.port,
                identity,
                address,
            ),
            now_ms,
        );

        Ok(Self {
            link,
            session,
            scheduler: SamplingScheduler::new(identity, config.sampling.interval_ms),
            clock,
            sensor,
            identity,
        })
    }

    /// Identity reported in every reading.
    pub fn identity(&self) -> DeviceIdentity {
        self.identity
    }

    /// The radio link state machine.
    pub fn link(&self) -> &LinkManager<R, I> {
        &self.link
    }

    pub fn link_mut(&mut self) -> &mut LinkManager<R, I> {
        &mut self.link
    }

    /// The collector session.
    pub fn session(&self) -> &TransportSession<T> {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut TransportSession<T> {
        &mut self.session
    }

    /// Wall clock used to timestamp readings.
    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// One pass of the control loop. Never blocks.
    pub fn step(&mut self, now_ms: u64) -> StepReport {
        let link = self.link.poll();

        let session = if link.is_connected() {
            self.session.poll(now_ms)
        } else {
            if self.session.state() != SessionState::Closed {
                self.session.reset();
            }
            self.session.state()
        };

        let tick = self
            .scheduler
            .tick(now_ms, &mut self.sensor, &self.clock, &mut self.session);

        StepReport {
            link,
            session,
            tick,
        }
    }

    /// Leave the collector namespace and close the socket.
    pub fn shutdown(&mut self) {
        self.session.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::AddressTable;
    use crate::link::tests::{FakeRadio, RecordingIndicator};
    use crate::scheduler::tests::FixedClock;
    use crate::session::tests::ScriptedTransport;
    use crate::transport::TransportEvent;
    use std::io;

    const MAC: &str = "AC:15:18:D7:AB:10";

    struct FixedNetworkClock(i64);

    impl NetworkClock for FixedNetworkClock {
        fn query(&mut self, _server: &str) -> io::Result<i64> {
            Ok(self.0)
        }
    }

    fn config() -> NodeConfig {
        let mut config = NodeConfig::default();
        config.network.poll_delay_ms = 0;
        config.network.bring_up_timeout_ms = 50;
        config.time.poll_delay_ms = 0;
        config.time.sync_timeout_ms = 50;
        config.server.host = "collector.local".to_string();
        config
    }

    fn link(config: &NodeConfig, radio: FakeRadio) -> LinkManager<FakeRadio, RecordingIndicator> {
        LinkManager::new(
            radio,
            RecordingIndicator::default(),
            &config.network,
            AddressTable::new(&config.addressing),
        )
    }

    type TestNode = Node<FakeRadio, RecordingIndicator, ScriptedTransport, fn() -> f64, FixedClock>;

    fn running_node() -> TestNode {
        let config = config();
        let mut link = link(&config, FakeRadio::up(MAC));
        link.poll();
        let sensor: fn() -> f64 = || 4.321;
        let mut node = Node::assemble(
            &config,
            link,
            FixedClock::at_millis(1_709_622_489_004),
            ScriptedTransport::default(),
            sensor,
            0,
        )
        .unwrap();
        node.session_mut().transport_mut().push(TransportEvent::Connected);
        node
    }

    #[test]
    fn bring_up_connects_session_with_assigned_address() {
        let config = config();
        let mut time = TimeSource::new(FixedNetworkClock(1_709_622_489_004));
        let node = Node::bring_up(
            &config,
            link(&config, FakeRadio::up(MAC)),
            &mut time,
            ScriptedTransport::default(),
            || 1.0,
            0,
        )
        .unwrap();

        assert_eq!(node.identity().to_string(), MAC);
        assert_eq!(node.session().state(), SessionState::Handshaking);
        let target = node.session().target().unwrap();
        assert_eq!(target.address.to_string(), "10.231.200.200");
        assert!(node.clock().unix_millis() >= 1_709_622_489_004);
    }

    #[test]
    fn bring_up_fails_without_link() {
        let config = config();
        let mut radio = FakeRadio::up(MAC);
        radio.available = false;
        let mut time = TimeSource::new(FixedNetworkClock(1_709_622_489_004));
        let err = Node::bring_up(
            &config,
            link(&config, radio),
            &mut time,
            ScriptedTransport::default(),
            || 1.0,
            0,
        )
        .err()
        .unwrap();
        assert!(matches!(err, NodeError::Link(_)));
    }

    #[test]
    fn bring_up_fails_without_time() {
        let config = config();
        let mut time = TimeSource::new(FixedNetworkClock(12));
        let err = Node::bring_up(
            &config,
            link(&config, FakeRadio::up(MAC)),
            &mut time,
            ScriptedTransport::default(),
            || 1.0,
            0,
        )
        .err()
        .unwrap();
        assert!(matches!(err, NodeError::TimeSync(_)));
    }

    #[test]
    fn missing_identity_is_fatal() {
        let config = config();
        let mut radio = FakeRadio::up(MAC);
        radio.mac = None;
        let mut link = link(&config, radio);
        link.poll();
        let err = Node::assemble(
            &config,
            link,
            FixedClock::at_millis(0),
            ScriptedTransport::default(),
            || 1.0,
            0,
        )
        .err()
        .unwrap();
        assert!(matches!(err, NodeError::MissingIdentity));
    }

    #[test]
    fn steps_send_readings_once_per_interval() {
        let mut node = running_node();
        let report = node.step(0);
        assert_eq!(report.session, SessionState::Open);
        assert!(matches!(report.tick, TickOutcome::Sent(_)));

        for now in (10..1000).step_by(10) {
            assert_eq!(node.step(now).tick, TickOutcome::Idle);
        }
        assert!(matches!(node.step(1000).tick, TickOutcome::Sent(_)));

        let sent = &node.session().transport().sent;
        assert_eq!(sent[0], "40/devices,");
        assert_eq!(sent.len(), 3);
        assert!(sent[1].starts_with(r#"42/devices,["reading",{"macAddress":"AC:15:18:D7:AB:10""#));
    }

    #[test]
    fn link_loss_drops_readings_and_resets_session() {
        let mut node = running_node();
        node.step(0);
        node.link_mut().radio_mut().available = false;

        let report = node.step(1000);
        assert_eq!(report.link, LinkState::Disconnected);
        assert_eq!(report.session, SessionState::Closed);
        assert!(matches!(report.tick, TickOutcome::Dropped(_)));
        assert_eq!(node.session().transport().sent.len(), 2);

        // Link back: session reconnects on the next step.
        node.link_mut().radio_mut().available = true;
        let report = node.step(1100);
        assert_eq!(report.link, LinkState::Connected);
        assert_eq!(report.session, SessionState::Handshaking);
    }

    #[test]
    fn shutdown_disconnects_namespace() {
        let mut node = running_node();
        node.step(0);
        node.shutdown();
        assert_eq!(node.session().state(), SessionState::Closed);
        assert_eq!(
            node.session().transport().sent.last().map(String::as_str),
            Some("41/devices,")
        );
    }

    #[test]
    fn phases_display() {
        assert_eq!(Phase::AwaitingTimeSync.to_string(), "awaiting time sync");
    }
}
