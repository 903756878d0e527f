//! Engine counters.
//!
//! Plain atomic counters bumped on the packet paths and exported as
//! key-value pairs when the bridge shuts down.

use std::sync::atomic::{AtomicU64, Ordering};

/// Atomic counter for thread-safe increment operations.
#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    /// Creates a new counter initialized to zero.
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    /// Increments the counter by 1.
    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    /// Adds a value to the counter.
    pub fn add(&self, val: u64) {
        self.0.fetch_add(val, Ordering::Relaxed);
    }

    /// Gets the current value of the counter.
    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Counters for one packet forward engine.
#[derive(Debug, Default)]
pub struct EngineMetrics {
    // Link
    pub rx_frames: Counter,
    pub rx_bytes: Counter,
    pub tx_frames: Counter,
    pub tx_bytes: Counter,
    pub tx_errors: Counter,

    // Drops
    pub dropped_malformed: Counter,
    pub dropped_foreign_subnet: Counter,
    /// Frames we sent ourselves, seen again on the capture
    pub dropped_own_mac: Counter,
    pub checksum_failures: Counter,

    // ARP
    pub arp_replies: Counter,
    pub arp_requests: Counter,

    // Delivery
    pub udp_delivered: Counter,
    /// Unicast copies sent while emulating subnet broadcast
    pub broadcast_fanout: Counter,
    pub tcp_segments: Counter,
    pub icmp_echo_replies: Counter,
    /// Datagrams dropped because ARP resolution gave up
    pub unresolved_drops: Counter,

    // TCP relay
    pub sessions_opened: Counter,
    pub sessions_closed: Counter,
}

impl EngineMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a received frame.
    pub fn record_rx(&self, bytes: usize) {
        self.rx_frames.inc();
        self.rx_bytes.add(bytes as u64);
    }

    /// Records a transmitted frame.
    pub fn record_tx(&self, bytes: usize) {
        self.tx_frames.inc();
        self.tx_bytes.add(bytes as u64);
    }

    /// Exports all counters as key-value pairs.
    pub fn export(&self) -> Vec<(String, u64)> {
        [
            ("rx_frames", &self.rx_frames),
            ("rx_bytes", &self.rx_bytes),
            ("tx_frames", &self.tx_frames),
            ("tx_bytes", &self.tx_bytes),
            ("tx_errors", &self.tx_errors),
            ("dropped_malformed", &self.dropped_malformed),
            ("dropped_foreign_subnet", &self.dropped_foreign_subnet),
            ("dropped_own_mac", &self.dropped_own_mac),
            ("checksum_failures", &self.checksum_failures),
            ("arp_replies", &self.arp_replies),
            ("arp_requests", &self.arp_requests),
            ("udp_delivered", &self.udp_delivered),
            ("broadcast_fanout", &self.broadcast_fanout),
            ("tcp_segments", &self.tcp_segments),
            ("icmp_echo_replies", &self.icmp_echo_replies),
            ("unresolved_drops", &self.unresolved_drops),
            ("sessions_opened", &self.sessions_opened),
            ("sessions_closed", &self.sessions_closed),
        ]
        .into_iter()
        .map(|(name, counter)| (name.to_string(), counter.get()))
        .collect()
    }
}
