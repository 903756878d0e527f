//! Configuration validation

use super::Config;
use crate::telemetry::{is_known_format, is_known_level, is_valid_directive};

#[derive(Debug, Clone)]
pub struct ValidationResult {
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self {
            warnings: Vec::new(),
            errors: Vec::new(),
        }
    }

    pub fn warn(&mut self, msg: impl Into<String>) {
        self.warnings.push(msg.into());
    }

    pub fn error(&mut self, msg: impl Into<String>) {
        self.errors.push(msg.into());
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn print_diagnostics(&self) {
        for warning in &self.warnings {
            println!("[WARN] {}", warning);
        }
        for error in &self.errors {
            println!("[ERROR] {}", error);
        }
    }
}

impl Default for ValidationResult {
    fn default() -> Self {
        Self::new()
    }
}

/// Validate configuration and return warnings/errors
pub fn validate(config: &Config) -> ValidationResult {
    let mut result = ValidationResult::new();

    validate_capture(config, &mut result);
    validate_subnet(config, &mut result);
    validate_arp(config, &mut result);
    validate_tcp(config, &mut result);
    validate_engine(config, &mut result);
    validate_logging(config, &mut result);

    result
}

fn validate_capture(config: &Config, result: &mut ValidationResult) {
    if config.capture.interface.is_empty() {
        result.error("capture.interface: must not be empty");
    }

    if let Some(mac) = config.capture.mac {
        if mac.is_multicast() || mac.is_zero() {
            result.error(format!("capture.mac: {} is not a unicast address", mac));
        }
    }
}

fn validate_subnet(config: &Config, result: &mut ValidationResult) {
    let prefix_len = config.subnet.prefix_len;
    if !(8..=30).contains(&prefix_len) {
        result.error(format!(
            "subnet.prefix_len: {} is outside 8..=30",
            prefix_len
        ));
        return;
    }

    let subnet = config.subnet();
    if subnet.network() != config.subnet.network {
        result.warn(format!(
            "subnet.network: {} has host bits set, using {}",
            config.subnet.network,
            subnet.network()
        ));
    }

    let gateway = config.subnet.gateway;
    if !subnet.contains(gateway) {
        result.error(format!(
            "subnet.gateway: {} is outside {}",
            gateway, subnet
        ));
    } else if gateway == subnet.network() || gateway == subnet.broadcast() {
        result.error(format!(
            "subnet.gateway: {} is the network or broadcast address of {}",
            gateway, subnet
        ));
    }
}

fn validate_arp(config: &Config, result: &mut ValidationResult) {
    if config.arp.capacity == 0 {
        result.error("arp.capacity: must be at least 1");
    }
    if config.arp.ttl_secs == 0 {
        result.error("arp.ttl_secs: must be at least 1");
    }
    if config.arp.resolve_timeout_ms == 0 {
        result.warn("arp.resolve_timeout_ms: 0 retries the lookup immediately");
    }
    if config.arp.ttl_secs > 0 && config.arp.ttl_secs < config.engine.gc_interval_secs {
        result.warn(format!(
            "arp.ttl_secs: {} is shorter than engine.gc_interval_secs ({}), expired entries linger until the next sweep",
            config.arp.ttl_secs, config.engine.gc_interval_secs
        ));
    }
}

fn validate_tcp(config: &Config, result: &mut ValidationResult) {
    match config.tcp.forward_target {
        None => result.warn("tcp.forward_target: not set, TCP relay disabled"),
        Some(target) => {
            if (8..=30).contains(&config.subnet.prefix_len) && config.subnet().contains(*target.ip()) {
                result.error(format!(
                    "tcp.forward_target: {} is inside the emulated subnet {}",
                    target,
                    config.subnet()
                ));
            }
            if target.port() == 0 {
                result.error("tcp.forward_target: port must not be 0");
            }
        }
    }

    if config.tcp.connect_timeout_ms == 0 {
        result.error("tcp.connect_timeout_ms: must be at least 1");
    }
}

fn validate_engine(config: &Config, result: &mut ValidationResult) {
    if config.engine.gc_interval_secs == 0 {
        result.error("engine.gc_interval_secs: must be at least 1");
    }
    if config.engine.event_capacity == 0 {
        result.error("engine.event_capacity: must be at least 1");
    }
    if config.ldn.port == 0 {
        result.error("ldn.port: must not be 0");
    }
}

fn validate_logging(config: &Config, result: &mut ValidationResult) {
    if !is_known_level(&config.logging.level) {
        result.warn(format!(
            "logging.level: unknown level '{}', using info",
            config.logging.level
        ));
    }
    if !is_known_format(&config.logging.format) {
        result.warn(format!(
            "logging.format: unknown format '{}', using pretty",
            config.logging.format
        ));
    }
    for directive in &config.logging.directives {
        if !is_valid_directive(directive) {
            result.warn(format!("logging.directives: ignoring '{}'", directive));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, SocketAddrV4};

    fn make_config() -> Config {
        let mut config = Config::default();
        config.tcp.forward_target = Some(SocketAddrV4::new(Ipv4Addr::new(203, 0, 113, 5), 80));
        config
    }

    #[test]
    fn test_valid_config() {
        let result = validate(&make_config());
        assert!(!result.has_errors());
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn test_defaults_warn_about_relay() {
        let result = validate(&Config::default());
        assert!(!result.has_errors());
        assert!(result
            .warnings
            .iter()
            .any(|w| w.contains("TCP relay disabled")));
    }

    #[test]
    fn test_prefix_out_of_range() {
        let mut config = make_config();
        config.subnet.prefix_len = 31;
        let result = validate(&config);
        assert!(result.errors.iter().any(|e| e.contains("outside 8..=30")));

        config.subnet.prefix_len = 4;
        assert!(validate(&config).has_errors());
    }

    #[test]
    fn test_gateway_outside_subnet() {
        let mut config = make_config();
        config.subnet.gateway = Ipv4Addr::new(192, 168, 0, 1);
        let result = validate(&config);
        assert!(result.errors.iter().any(|e| e.contains("is outside")));
    }

    #[test]
    fn test_gateway_is_broadcast() {
        let mut config = make_config();
        config.subnet.gateway = Ipv4Addr::new(10, 13, 255, 255);
        let result = validate(&config);
        assert!(result
            .errors
            .iter()
            .any(|e| e.contains("network or broadcast")));
    }

    #[test]
    fn test_host_bits_warning() {
        let mut config = make_config();
        config.subnet.network = Ipv4Addr::new(10, 13, 1, 0);
        let result = validate(&config);
        assert!(!result.has_errors());
        assert!(result.warnings.iter().any(|w| w.contains("host bits")));
    }

    #[test]
    fn test_zero_capacity_and_ttl() {
        let mut config = make_config();
        config.arp.capacity = 0;
        config.arp.ttl_secs = 0;
        let result = validate(&config);
        assert!(result.errors.iter().any(|e| e.contains("arp.capacity")));
        assert!(result.errors.iter().any(|e| e.contains("arp.ttl_secs")));
    }

    #[test]
    fn test_ttl_shorter_than_gc() {
        let mut config = make_config();
        config.arp.ttl_secs = 10;
        let result = validate(&config);
        assert!(!result.has_errors());
        assert!(result.warnings.iter().any(|w| w.contains("shorter than")));
    }

    #[test]
    fn test_zero_gc_interval() {
        let mut config = make_config();
        config.engine.gc_interval_secs = 0;
        let result = validate(&config);
        assert!(result
            .errors
            .iter()
            .any(|e| e.contains("engine.gc_interval_secs")));
    }

    #[test]
    fn test_forward_target_inside_subnet() {
        let mut config = make_config();
        config.tcp.forward_target = Some(SocketAddrV4::new(Ipv4Addr::new(10, 13, 0, 5), 80));
        let result = validate(&config);
        assert!(result
            .errors
            .iter()
            .any(|e| e.contains("inside the emulated subnet")));
    }

    #[test]
    fn test_multicast_mac_rejected() {
        let mut config = make_config();
        config.capture.mac = Some("01:00:5e:00:00:01".parse().unwrap());
        assert!(validate(&config).has_errors());
    }

    #[test]
    fn test_unknown_logging_values_warn() {
        let mut config = make_config();
        config.logging.level = "loud".to_string();
        config.logging.format = "xml".to_string();
        config.logging.directives = vec![
            "ldn_bridge::room=debug".to_string(),
            "room=chatty".to_string(),
        ];
        let result = validate(&config);
        assert!(!result.has_errors());
        assert_eq!(result.warnings.len(), 3);
    }
}
