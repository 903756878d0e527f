//! Ethernet II frame parsing and construction

use super::MacAddr;
use crate::{Error, Result};

/// Ethernet header size (dst + src + ethertype), no VLAN tag, no FCS
pub const HEADER_SIZE: usize = 14;
/// Largest untagged frame we build (without FCS)
pub const MAX_FRAME_SIZE: usize = 1514;

/// Parsed Ethernet frame (zero-copy reference)
#[derive(Debug, Clone, Copy)]
pub struct Frame<'a> {
    buffer: &'a [u8],
}

impl<'a> Frame<'a> {
    /// Parse an Ethernet frame from a buffer
    pub fn parse(buffer: &'a [u8]) -> Result<Self> {
        if buffer.len() < HEADER_SIZE {
            return Err(Error::Parse("frame too short".into()));
        }
        Ok(Self { buffer })
    }

    pub fn dst_mac(&self) -> MacAddr {
        let mut mac = [0u8; 6];
        mac.copy_from_slice(&self.buffer[0..6]);
        MacAddr(mac)
    }

    pub fn src_mac(&self) -> MacAddr {
        let mut mac = [0u8; 6];
        mac.copy_from_slice(&self.buffer[6..12]);
        MacAddr(mac)
    }

    pub fn ethertype(&self) -> u16 {
        u16::from_be_bytes([self.buffer[12], self.buffer[13]])
    }

    pub fn is_broadcast(&self) -> bool {
        self.dst_mac().is_broadcast()
    }

    pub fn payload(&self) -> &'a [u8] {
        &self.buffer[HEADER_SIZE..]
    }

    pub fn as_bytes(&self) -> &'a [u8] {
        self.buffer
    }
}

/// Builder for constructing Ethernet frames
#[derive(Debug, Clone)]
pub struct FrameBuilder {
    dst_mac: MacAddr,
    src_mac: MacAddr,
    ethertype: u16,
    payload: Vec<u8>,
}

impl FrameBuilder {
    pub fn new() -> Self {
        Self {
            dst_mac: MacAddr::BROADCAST,
            src_mac: MacAddr::ZERO,
            ethertype: 0,
            payload: Vec::new(),
        }
    }

    pub fn dst_mac(mut self, mac: MacAddr) -> Self {
        self.dst_mac = mac;
        self
    }

    pub fn src_mac(mut self, mac: MacAddr) -> Self {
        self.src_mac = mac;
        self
    }

    pub fn ethertype(mut self, ethertype: u16) -> Self {
        self.ethertype = ethertype;
        self
    }

    pub fn payload(mut self, payload: &[u8]) -> Self {
        self.payload = payload.to_vec();
        self
    }

    pub fn build(self) -> Vec<u8> {
        let mut buffer = Vec::with_capacity(HEADER_SIZE + self.payload.len());
        buffer.extend_from_slice(&self.dst_mac.0);
        buffer.extend_from_slice(&self.src_mac.0);
        buffer.extend_from_slice(&self.ethertype.to_be_bytes());
        buffer.extend_from_slice(&self.payload);
        buffer
    }
}

impl Default for FrameBuilder {
    fn default() -> Self {
        Self::new()
    }
}
