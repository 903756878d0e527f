//! ARP (Address Resolution Protocol) - RFC 826

use super::{EtherType, MacAddr};
use crate::{Error, Result};
use std::net::Ipv4Addr;

/// ARP packet size (for Ethernet/IPv4)
pub const ARP_PACKET_SIZE: usize = 28;

const HARDWARE_ETHERNET: u16 = 1;

/// ARP operation codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ArpOp {
    Request = 1,
    Reply = 2,
}

impl ArpOp {
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            1 => Some(ArpOp::Request),
            2 => Some(ArpOp::Reply),
            _ => None,
        }
    }
}

/// Decoded ARP record
///
/// Parsing only requires the 28 bytes to be present. Whether the record
/// describes Ethernet/IPv4 is answered by [`ArpPacket::is_valid`], so a
/// caller can still log or count foreign ARP traffic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArpPacket {
    pub hardware_type: u16,
    pub protocol_type: u16,
    pub hardware_len: u8,
    pub protocol_len: u8,
    pub operation: u16,
    pub sender_mac: MacAddr,
    pub sender_ip: Ipv4Addr,
    pub target_mac: MacAddr,
    pub target_ip: Ipv4Addr,
}

fn ip_at(buffer: &[u8], offset: usize) -> Ipv4Addr {
    Ipv4Addr::new(
        buffer[offset],
        buffer[offset + 1],
        buffer[offset + 2],
        buffer[offset + 3],
    )
}

fn mac_at(buffer: &[u8], offset: usize) -> MacAddr {
    let mut mac = [0u8; 6];
    mac.copy_from_slice(&buffer[offset..offset + 6]);
    MacAddr(mac)
}

impl ArpPacket {
    /// Parse an ARP record from the Ethernet payload
    pub fn parse(buffer: &[u8]) -> Result<Self> {
        if buffer.len() < ARP_PACKET_SIZE {
            return Err(Error::Parse("ARP packet too short".into()));
        }

        Ok(Self {
            hardware_type: u16::from_be_bytes([buffer[0], buffer[1]]),
            protocol_type: u16::from_be_bytes([buffer[2], buffer[3]]),
            hardware_len: buffer[4],
            protocol_len: buffer[5],
            operation: u16::from_be_bytes([buffer[6], buffer[7]]),
            sender_mac: mac_at(buffer, 8),
            sender_ip: ip_at(buffer, 14),
            target_mac: mac_at(buffer, 18),
            target_ip: ip_at(buffer, 24),
        })
    }

    /// Ethernet hardware, IPv4 protocol, address sizes 6 and 4
    pub fn is_valid(&self) -> bool {
        self.hardware_type == HARDWARE_ETHERNET
            && self.protocol_type == EtherType::Ipv4 as u16
            && self.hardware_len == 6
            && self.protocol_len == 4
    }

    pub fn op(&self) -> Option<ArpOp> {
        ArpOp::from_u16(self.operation)
    }

    pub fn is_request(&self) -> bool {
        self.op() == Some(ArpOp::Request)
    }

    /// Serialize ARP packet to bytes
    pub fn to_bytes(&self) -> [u8; ARP_PACKET_SIZE] {
        let mut buf = [0u8; ARP_PACKET_SIZE];
        buf[0..2].copy_from_slice(&self.hardware_type.to_be_bytes());
        buf[2..4].copy_from_slice(&self.protocol_type.to_be_bytes());
        buf[4] = self.hardware_len;
        buf[5] = self.protocol_len;
        buf[6..8].copy_from_slice(&self.operation.to_be_bytes());
        buf[8..14].copy_from_slice(&self.sender_mac.0);
        buf[14..18].copy_from_slice(&self.sender_ip.octets());
        buf[18..24].copy_from_slice(&self.target_mac.0);
        buf[24..28].copy_from_slice(&self.target_ip.octets());
        buf
    }

    fn ethernet_ipv4(
        op: ArpOp,
        sender_mac: MacAddr,
        sender_ip: Ipv4Addr,
        target_mac: MacAddr,
        target_ip: Ipv4Addr,
    ) -> Self {
        Self {
            hardware_type: HARDWARE_ETHERNET,
            protocol_type: EtherType::Ipv4 as u16,
            hardware_len: 6,
            protocol_len: 4,
            operation: op as u16,
            sender_mac,
            sender_ip,
            target_mac,
            target_ip,
        }
    }

    /// Create an ARP request (target MAC left zero)
    pub fn request(sender_mac: MacAddr, sender_ip: Ipv4Addr, target_ip: Ipv4Addr) -> Self {
        Self::ethernet_ipv4(ArpOp::Request, sender_mac, sender_ip, MacAddr::ZERO, target_ip)
    }

    /// Create an ARP reply
    pub fn reply(
        sender_mac: MacAddr,
        sender_ip: Ipv4Addr,
        target_mac: MacAddr,
        target_ip: Ipv4Addr,
    ) -> Self {
        Self::ethernet_ipv4(ArpOp::Reply, sender_mac, sender_ip, target_mac, target_ip)
    }

    /// Sender announcing its own binding (target IP == sender IP)
    pub fn is_gratuitous(&self) -> bool {
        self.sender_ip == self.target_ip
    }

    /// Duplicate address probe (sender IP 0.0.0.0)
    pub fn is_probe(&self) -> bool {
        self.sender_ip.is_unspecified()
    }
}
