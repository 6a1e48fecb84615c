//! Host radio backed by the kernel's network interface state.
//!
//! Association is owned by the host's network stack (wpa_supplicant,
//! NetworkManager, ...); this radio only observes it through sysfs.

use crate::address::StaticAddress;
use crate::link::{Credentials, Radio};
use ampwire_core::DeviceIdentity;
use std::fs;
use std::io;
use std::net::{IpAddr, Ipv4Addr, UdpSocket};
use std::path::PathBuf;

const SYSFS_NET: &str = "/sys/class/net";

#[derive(Debug)]
pub struct SysfsRadio {
    interface: PathBuf,
    /// Remote `host:port` used to find the outbound address.
    probe: String,
}

impl SysfsRadio {
    pub fn new(interface: &str, probe: impl Into<String>) -> Self {
        Self::with_root(SYSFS_NET, interface, probe)
    }

    pub fn with_root(root: impl Into<PathBuf>, interface: &str, probe: impl Into<String>) -> Self {
        Self {
            interface: root.into().join(interface),
            probe: probe.into(),
        }
    }

    fn read(&self, attribute: &str) -> io::Result<String> {
        fs::read_to_string(self.interface.join(attribute)).map(|s| s.trim().to_string())
    }
}

impl Radio for SysfsRadio {
    fn begin(&mut self, credentials: &Credentials) {
        tracing::debug!(
            "Association with {:?} is managed by the host on {}",
            credentials.ssid,
            self.interface.display()
        );
    }

    fn is_associated(&mut self) -> bool {
        matches!(self.read("operstate").as_deref(), Ok("up"))
    }

    fn hardware_address(&mut self) -> Option<DeviceIdentity> {
        self.read("address").ok()?.parse().ok()
    }

    fn local_address(&mut self) -> Option<Ipv4Addr> {
        // Connecting a UDP socket sends nothing; it only selects a route.
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).ok()?;
        socket.connect(self.probe.as_str()).ok()?;
        match socket.local_addr().ok()?.ip() {
            IpAddr::V4(addr) if !addr.is_unspecified() => Some(addr),
            _ => None,
        }
    }

    fn configure_static(&mut self, address: &StaticAddress) -> io::Result<()> {
        if self.local_address() == Some(address.address) {
            return Ok(());
        }
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "interface addressing is managed by the host",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fake_sysfs(name: &str, operstate: &str, address: &str) -> PathBuf {
        let root = std::env::temp_dir().join(format!("ampwire-net-{}-{}", name, std::process::id()));
        let iface = root.join("wlan0");
        fs::create_dir_all(&iface).unwrap();
        fs::write(iface.join("operstate"), format!("{operstate}\n")).unwrap();
        fs::write(iface.join("address"), format!("{address}\n")).unwrap();
        root
    }

    #[test]
    fn reads_interface_state() {
        let root = fake_sysfs("up", "up", "ac:15:18:d7:ab:10");
        let mut radio = SysfsRadio::with_root(&root, "wlan0", "127.0.0.1:9");
        assert!(radio.is_associated());
        assert_eq!(
            radio.hardware_address(),
            Some("AC:15:18:D7:AB:10".parse().unwrap())
        );
        fs::remove_dir_all(&root).unwrap();
    }

    #[test]
    fn down_interface_is_not_associated() {
        let root = fake_sysfs("down", "dormant", "ac:15:18:d7:ab:10");
        let mut radio = SysfsRadio::with_root(&root, "wlan0", "127.0.0.1:9");
        assert!(!radio.is_associated());
        fs::remove_dir_all(&root).unwrap();
    }

    #[test]
    fn missing_interface() {
        let mut radio = SysfsRadio::with_root("/nonexistent/ampwire", "wlan9", "127.0.0.1:9");
        assert!(!radio.is_associated());
        assert_eq!(radio.hardware_address(), None);
    }

    #[test]
    fn loopback_route_address() {
        let mut radio = SysfsRadio::with_root("/nonexistent/ampwire", "lo", "127.0.0.1:9");
        assert_eq!(radio.local_address(), Some(Ipv4Addr::LOCALHOST));
    }
}
