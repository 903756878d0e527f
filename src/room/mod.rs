//! Simulator room side of the bridge
//!
//! The room transport itself lives outside this crate; it is reached through
//! [`RoomTransport`] and delivers inbound messages on a channel.

mod bridge;
mod channel;

pub use bridge::LdnBridge;
pub use channel::ChannelRoom;

use crate::ldn::RoomPacketType;
use crate::Result;
use std::future::Future;
use std::net::Ipv4Addr;

/// LDN message as exchanged with the room
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomLdnPacket {
    pub kind: RoomPacketType,
    pub local_ip: Ipv4Addr,
    pub remote_ip: Ipv4Addr,
    pub broadcast: bool,
    pub payload: Vec<u8>,
}

/// Outbound half of the room connection
pub trait RoomTransport: Send + Sync {
    fn send_ldn_frame(&self, packet: RoomLdnPacket) -> impl Future<Output = Result<()>> + Send;
}
