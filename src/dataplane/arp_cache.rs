//! ARP cache (IP to MAC mapping with expiry)
//!
//! Shared between the receive path, senders and the sweep task. Every
//! operation takes the table lock once, so readers never see a partial
//! update.

use crate::protocol::MacAddr;
use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Default lifetime of an entry
pub const DEFAULT_TTL: Duration = Duration::from_secs(30);
/// Default number of entries kept
pub const DEFAULT_CAPACITY: usize = 100;

#[derive(Debug, Clone, Copy)]
struct ArpCacheEntry {
    mac: MacAddr,
    expires_at: Instant,
}

impl ArpCacheEntry {
    fn is_fresh(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// IP to MAC table with per-entry TTL and bounded size
#[derive(Debug)]
pub struct ArpCache {
    entries: Mutex<HashMap<u32, ArpCacheEntry>>,
    ttl: Duration,
    capacity: usize,
}

impl ArpCache {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
            capacity: capacity.max(1),
        }
    }

    fn table(&self) -> MutexGuard<'_, HashMap<u32, ArpCacheEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Insert or refresh `ip -> mac`
    pub fn set(&self, mac: MacAddr, ip: Ipv4Addr) {
        self.set_at(mac, ip, Instant::now());
    }

    /// [`ArpCache::set`] with an explicit clock reading
    pub fn set_at(&self, mac: MacAddr, ip: Ipv4Addr, now: Instant) {
        if ip.is_unspecified() {
            return;
        }

        let key = u32::from(ip);
        let mut table = self.table();

        if !table.contains_key(&key) && table.len() >= self.capacity {
            // Earliest expiry goes first; not a true LRU
            let victim = table
                .iter()
                .min_by_key(|(_, entry)| entry.expires_at)
                .map(|(key, _)| *key);
            if let Some(victim) = victim {
                table.remove(&victim);
            }
        }

        table.insert(
            key,
            ArpCacheEntry {
                mac,
                expires_at: now + self.ttl,
            },
        );
    }

    /// MAC for `ip` if present and not expired
    pub fn try_get_mac(&self, ip: Ipv4Addr) -> Option<MacAddr> {
        self.try_get_mac_at(ip, Instant::now())
    }

    pub fn try_get_mac_at(&self, ip: Ipv4Addr, now: Instant) -> Option<MacAddr> {
        self.table()
            .get(&u32::from(ip))
            .filter(|entry| entry.is_fresh(now))
            .map(|entry| entry.mac)
    }

    pub fn has_ip(&self, ip: Ipv4Addr) -> bool {
        self.try_get_mac(ip).is_some()
    }

    pub fn has_ip_at(&self, ip: Ipv4Addr, now: Instant) -> bool {
        self.try_get_mac_at(ip, now).is_some()
    }

    /// Drop expired entries, returning how many were removed
    pub fn cleanup_expired(&self) -> usize {
        self.cleanup_expired_at(Instant::now())
    }

    pub fn cleanup_expired_at(&self, now: Instant) -> usize {
        let mut table = self.table();
        let before = table.len();
        table.retain(|_, entry| entry.is_fresh(now));
        before - table.len()
    }

    /// Snapshot of every fresh binding, ordered by address
    pub fn entries(&self) -> Vec<(Ipv4Addr, MacAddr)> {
        let now = Instant::now();
        let mut entries: Vec<_> = self
            .table()
            .iter()
            .filter(|(_, entry)| entry.is_fresh(now))
            .map(|(key, entry)| (Ipv4Addr::from(*key), entry.mac))
            .collect();
        entries.sort();
        entries
    }

    pub fn remove(&self, ip: Ipv4Addr) -> Option<MacAddr> {
        self.table().remove(&u32::from(ip)).map(|entry| entry.mac)
    }

    pub fn clear(&self) {
        self.table().clear();
    }

    /// Entries held, including expired ones not yet swept
    pub fn len(&self) -> usize {
        self.table().len()
    }

    pub fn is_empty(&self) -> bool {
        self.table().is_empty()
    }
}

impl Default for ArpCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL, DEFAULT_CAPACITY)
    }
}
