//! Configuration types

use crate::ldn::LDN_PORT;
use crate::protocol::{Ipv4Subnet, MacAddr};
use crate::telemetry::LogConfig;
use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, SocketAddrV4};
use std::time::Duration;

/// Bridge configuration (config.toml). Every field has a default, so an
/// empty file is a valid configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub capture: CaptureConfig,
    pub subnet: SubnetConfig,
    pub arp: ArpConfig,
    pub tcp: TcpConfig,
    pub engine: EngineSection,
    pub ldn: LdnConfig,
    pub logging: LogConfig,
}

impl Config {
    pub fn subnet(&self) -> Ipv4Subnet {
        Ipv4Subnet::new(self.subnet.network, self.subnet.prefix_len)
    }

    pub fn broadcast(&self) -> Ipv4Addr {
        self.subnet().broadcast()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Link the console is attached to
    pub interface: String,
    /// Overrides the address read from /sys/class/net
    pub mac: Option<MacAddr>,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            interface: "eth0".to_string(),
            mac: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct SubnetConfig {
    pub network: Ipv4Addr,
    pub prefix_len: u8,
    pub gateway: Ipv4Addr,
}

impl Default for SubnetConfig {
    fn default() -> Self {
        Self {
            network: Ipv4Addr::new(10, 13, 0, 0),
            prefix_len: 16,
            gateway: Ipv4Addr::new(10, 13, 37, 1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ArpConfig {
    pub ttl_secs: u64,
    pub capacity: usize,
    /// Wait before the single retry of an unresolved lookup
    pub resolve_timeout_ms: u64,
}

impl ArpConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn resolve_timeout(&self) -> Duration {
        Duration::from_millis(self.resolve_timeout_ms)
    }
}

impl Default for ArpConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 30,
            capacity: 100,
            resolve_timeout_ms: 100,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct TcpConfig {
    /// Where relayed connections are sent; relay disabled when unset
    pub forward_target: Option<SocketAddrV4>,
    pub connect_timeout_ms: u64,
}

impl TcpConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

impl Default for TcpConfig {
    fn default() -> Self {
        Self {
            forward_target: None,
            connect_timeout_ms: 3000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct EngineSection {
    pub gc_interval_secs: u64,
    /// Buffered events per subscriber
    pub event_capacity: usize,
    /// Fixed seed for reproducible sequence numbers
    pub rng_seed: Option<u64>,
    /// Drop inbound IPv4/UDP/TCP/ICMP with a bad checksum
    pub verify_checksums: bool,
}

impl EngineSection {
    pub fn gc_interval(&self) -> Duration {
        Duration::from_secs(self.gc_interval_secs)
    }
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            gc_interval_secs: 30,
            event_capacity: 256,
            rng_seed: None,
            verify_checksums: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct LdnConfig {
    pub port: u16,
}

impl Default for LdnConfig {
    fn default() -> Self {
        Self { port: LDN_PORT }
    }
}
