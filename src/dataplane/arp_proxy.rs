//! Proxy ARP for the virtual subnet
//!
//! Answers requests for addresses no real host has claimed, so the console
//! sees every member of the subnet as reachable through us.

use crate::dataplane::ArpCache;
use crate::protocol::arp::{ArpOp, ArpPacket};
use crate::protocol::ethernet::{Frame, FrameBuilder};
use crate::protocol::{EtherType, Ipv4Subnet, MacAddr};
use std::net::Ipv4Addr;
use tracing::{debug, trace};

/// Result of processing an ARP packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArpAction {
    /// Not a usable Ethernet/IPv4 ARP packet
    Ignored,
    /// Sender binding learned, nothing to send
    Learned,
    /// Ethernet frame carrying our reply
    Reply(Vec<u8>),
}

impl ArpAction {
    pub fn into_reply(self) -> Option<Vec<u8>> {
        match self {
            ArpAction::Reply(frame) => Some(frame),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ArpProxy {
    subnet: Ipv4Subnet,
}

impl ArpProxy {
    pub fn new(subnet: Ipv4Subnet) -> Self {
        Self { subnet }
    }

    /// Process an ARP frame.
    ///
    /// The sender binding is always learned. A request gets a reply only when
    /// the target is inside the subnet, is not a probe or an announcement,
    /// and is not a live cache entry (that host answers for itself).
    pub fn process(&self, frame: &Frame<'_>, cache: &ArpCache, local_mac: MacAddr) -> ArpAction {
        let packet = match ArpPacket::parse(frame.payload()) {
            Ok(packet) if packet.is_valid() => packet,
            Ok(_) => {
                trace!("ARP for non Ethernet/IPv4 ignored");
                return ArpAction::Ignored;
            }
            Err(e) => {
                trace!("ARP parse failed: {}", e);
                return ArpAction::Ignored;
            }
        };

        cache.set(packet.sender_mac, packet.sender_ip);

        if packet.op() != Some(ArpOp::Request) {
            return ArpAction::Learned;
        }

        if !self.subnet.contains(packet.target_ip) {
            trace!(target = %packet.target_ip, "ARP target outside subnet");
            return ArpAction::Learned;
        }
        if packet.is_probe() || packet.is_gratuitous() {
            trace!(target = %packet.target_ip, "ARP probe/announcement not answered");
            return ArpAction::Learned;
        }
        if cache.has_ip(packet.target_ip) {
            trace!(target = %packet.target_ip, "ARP target is a known host");
            return ArpAction::Learned;
        }

        debug!(
            "Proxy ARP: {} is-at {} (asked by {} / {})",
            packet.target_ip, local_mac, packet.sender_ip, packet.sender_mac
        );

        let reply = ArpPacket::reply(
            local_mac,
            packet.target_ip,
            packet.sender_mac,
            packet.sender_ip,
        );
        ArpAction::Reply(
            FrameBuilder::new()
                .dst_mac(packet.sender_mac)
                .src_mac(local_mac)
                .ethertype(EtherType::Arp as u16)
                .payload(&reply.to_bytes())
                .build(),
        )
    }

    pub fn subnet(&self) -> Ipv4Subnet {
        self.subnet
    }
}

/// Broadcast ARP request asking who has `target_ip`
pub fn build_request(local_mac: MacAddr, local_ip: Ipv4Addr, target_ip: Ipv4Addr) -> Vec<u8> {
    let request = ArpPacket::request(local_mac, local_ip, target_ip);
    FrameBuilder::new()
        .dst_mac(MacAddr::BROADCAST)
        .src_mac(local_mac)
        .ethertype(EtherType::Arp as u16)
        .payload(&request.to_bytes())
        .build()
}
