//! Fixed address assignment keyed by hardware identity.

use crate::config::AddressingConfig;
use ampwire_core::DeviceIdentity;
use std::collections::BTreeMap;
use std::net::Ipv4Addr;

/// A complete static interface configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaticAddress {
    pub address: Ipv4Addr,
    pub gateway: Ipv4Addr,
    pub subnet: Ipv4Addr,
    pub dns: Ipv4Addr,
}

/// Outcome of a table lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressAssignment {
    Static(StaticAddress),
    /// Identity absent from the table; the network assigns the address.
    Dynamic,
}

/// Read-only mapping from hardware identity to a fixed host suffix.
#[derive(Debug, Clone, PartialEq)]
pub struct AddressTable {
    network: Ipv4Addr,
    gateway: Ipv4Addr,
    subnet: Ipv4Addr,
    dns: Ipv4Addr,
    entries: BTreeMap<DeviceIdentity, u8>,
}

impl AddressTable {
    /// Table for the configured subnet and identity suffixes.
    pub fn new(config: &AddressingConfig) -> Self {
        Self {
            network: config.network,
            gateway: config.gateway,
            subnet: config.subnet,
            dns: config.dns,
            entries: config.table.clone(),
        }
    }

    /// Number of identities with a static address.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Static address for `identity`, or dynamic when it is not listed.
    pub fn resolve(&self, identity: &DeviceIdentity) -> AddressAssignment {
        match self.entries.get(identity) {
            Some(&suffix) => {
                let [a, b, c, _] = self.network.octets();
                AddressAssignment::Static(StaticAddress {
                    address: Ipv4Addr::new(a, b, c, suffix),
                    gateway: self.gateway,
                    subnet: self.subnet,
                    dns: self.dns,
                })
            }
            None => AddressAssignment::Dynamic,
        }
    }
}

impl Default for AddressTable {
    fn default() -> Self {
        Self::new(&AddressingConfig::default())
    }
}
