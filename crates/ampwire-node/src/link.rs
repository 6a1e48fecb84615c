//! Physical link keeper.
//!
//! [`LinkManager`] owns the radio and the [`LinkState`] machine:
//!
//! ```text
//! Disconnected --begin--> Connecting --associated--> Connected
//!      ^                      |  ^                       |
//!      |                      +--+ restart after          |
//!      |                       attempt_polls               |
//!      +------------------- association lost -------------+
//! ```
//!
//! In the control loop it is stepped with [`LinkManager::poll`], which never
//! blocks. Before the loop starts, [`LinkManager::ensure_connected`] is the
//! bring-up barrier: it polls with a fixed delay until associated or until
//! the budget runs out.

use crate::address::{AddressAssignment, AddressTable};
use crate::config::{BringUpBudget, NetworkConfig};
use crate::error::LinkError;
use crate::indicator::IndicatorOutput;
use ampwire_core::{DeviceIdentity, LinkState};
use std::fmt;
use std::io;
use std::net::Ipv4Addr;
use std::thread;
use std::time::Instant;

/// Network credentials.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub ssid: String,
    pub password: String,
}

impl Credentials {
    pub fn new(ssid: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            ssid: ssid.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("ssid", &self.ssid)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Radio capability the link keeper drives.
pub trait Radio {
    /// Start an association attempt.
    fn begin(&mut self, credentials: &Credentials);

    /// Whether the radio currently reports association.
    fn is_associated(&mut self) -> bool;

    /// Stable hardware address, if the radio knows it.
    fn hardware_address(&mut self) -> Option<DeviceIdentity>;

    /// Address currently held on the link, if any.
    fn local_address(&mut self) -> Option<Ipv4Addr>;

    /// Apply a static interface configuration.
    fn configure_static(&mut self, address: &crate::address::StaticAddress) -> io::Result<()>;
}

/// Keeps the physical link associated.
pub struct LinkManager<R, I> {
    radio: R,
    indicator: I,
    credentials: Credentials,
    table: AddressTable,
    state: LinkState,
    attempt_polls: u32,
    polls_in_attempt: u32,
    lit: bool,
    identity: Option<DeviceIdentity>,
    assignment: Option<AddressAssignment>,
}

impl<R: Radio, I: IndicatorOutput> LinkManager<R, I> {
    pub fn new(radio: R, mut indicator: I, config: &NetworkConfig, table: AddressTable) -> Self {
        indicator.set(false);
        Self {
            radio,
            indicator,
            credentials: Credentials::new(&config.ssid, &config.password),
            table,
            state: LinkState::Disconnected,
            attempt_polls: config.attempt_polls,
            polls_in_attempt: 0,
            lit: false,
            identity: config.identity,
            assignment: None,
        }
    }

    /// Current link state, as of the last poll.
    pub fn state(&self) -> LinkState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state.is_connected()
    }

    /// Hardware identity, known once the link has come up.
    pub fn identity(&self) -> Option<DeviceIdentity> {
        self.identity
    }

    /// Address assignment, made once on the first association.
    pub fn assignment(&self) -> Option<AddressAssignment> {
        self.assignment
    }

    /// Address the node announces to the collector.
    pub fn assigned_address(&mut self) -> Ipv4Addr {
        match self.assignment {
            Some(AddressAssignment::Static(assigned)) => assigned.address,
            _ => self.radio.local_address().unwrap_or(Ipv4Addr::UNSPECIFIED),
        }
    }

    /// The radio driver.
    pub fn radio(&self) -> &R {
        &self.radio
    }

    pub fn radio_mut(&mut self) -> &mut R {
        &mut self.radio
    }

    /// One non-blocking step of the link state machine.
    pub fn poll(&mut self) -> LinkState {
        match self.state {
            LinkState::Disconnected => {
                self.start_attempt();
                self.poll_attempt();
            }
            LinkState::Connecting => self.poll_attempt(),
            LinkState::Connected => {
                if !self.radio.is_associated() {
                    tracing::warn!("Link lost");
                    self.set_indicator(false);
                    self.state = LinkState::Disconnected;
                }
            }
        }
        self.state
    }

    /// Block until associated, polling with the budget's fixed delay.
    pub fn ensure_connected(&mut self, budget: &BringUpBudget) -> Result<(), LinkError> {
        if self.is_connected() && self.radio.is_associated() {
            return Ok(());
        }

        let started = Instant::now();
        let mut polls = 0u32;
        loop {
            if self.poll().is_connected() {
                return Ok(());
            }
            polls += 1;
            let elapsed = started.elapsed();
            if budget.is_exhausted(polls, elapsed) {
                tracing::error!("Link bring-up gave up after {} polls", polls);
                return Err(LinkError::AssociationTimeout { polls, elapsed });
            }
            thread::sleep(budget.poll_delay);
        }
    }

    fn start_attempt(&mut self) {
        tracing::info!("Connecting to {:?}...", self.credentials.ssid);
        self.radio.begin(&self.credentials);
        self.polls_in_attempt = 0;
        self.state = LinkState::Connecting;
    }

    fn poll_attempt(&mut self) {
        if self.radio.is_associated() {
            self.on_associated();
            return;
        }

        self.set_indicator(!self.lit);
        self.polls_in_attempt += 1;
        if self.attempt_polls > 0 && self.polls_in_attempt >= self.attempt_polls {
            tracing::warn!(
                "No association after {} polls, restarting attempt",
                self.polls_in_attempt
            );
            self.start_attempt();
        }
    }

    fn on_associated(&mut self) {
        self.state = LinkState::Connected;
        self.set_indicator(true);

        if self.identity.is_none() {
            self.identity = self.radio.hardware_address();
        }
        if self.assignment.is_none() {
            self.assignment = Some(self.assign_address());
        }

        tracing::info!("Link connected, address {}", self.assigned_address());
    }

    fn assign_address(&mut self) -> AddressAssignment {
        let Some(identity) = self.identity else {
            tracing::warn!("No hardware address; using dynamic addressing");
            return AddressAssignment::Dynamic;
        };
        tracing::info!("Hardware address: {}", identity);

        match self.table.resolve(&identity) {
            AddressAssignment::Static(assigned) => {
                match self.radio.configure_static(&assigned) {
                    Ok(()) => AddressAssignment::Static(assigned),
                    Err(e) => {
                        tracing::warn!("Static address {} failed: {}", assigned.address, e);
                        AddressAssignment::Dynamic
                    }
                }
            }
            AddressAssignment::Dynamic => {
                tracing::info!("{} not in address table; using dynamic addressing", identity);
                AddressAssignment::Dynamic
            }
        }
    }

    fn set_indicator(&mut self, on: bool) {
        self.lit = on;
        self.indicator.set(on);
    }
}
