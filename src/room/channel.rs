//! Room transport backed by an mpsc channel

use super::{RoomLdnPacket, RoomTransport};
use crate::{Error, Result};
use tokio::sync::mpsc;

/// Hands outbound room messages to whoever holds the receiver
#[derive(Debug, Clone)]
pub struct ChannelRoom {
    tx: mpsc::Sender<RoomLdnPacket>,
}

impl ChannelRoom {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<RoomLdnPacket>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }
}

impl RoomTransport for ChannelRoom {
    async fn send_ldn_frame(&self, packet: RoomLdnPacket) -> Result<()> {
        self.tx.send(packet).await.map_err(|_| Error::Shutdown)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ldn::RoomPacketType;
    use std::net::Ipv4Addr;

    fn packet() -> RoomLdnPacket {
        RoomLdnPacket {
            kind: RoomPacketType::Scan,
            local_ip: Ipv4Addr::new(10, 13, 0, 2),
            remote_ip: Ipv4Addr::new(10, 13, 255, 255),
            broadcast: true,
            payload: vec![1, 2, 3],
        }
    }

    #[tokio::test]
    async fn test_send_reaches_receiver() {
        let (room, mut rx) = ChannelRoom::new(4);
        room.send_ldn_frame(packet()).await.unwrap();
        assert_eq!(rx.recv().await, Some(packet()));
    }

    #[tokio::test]
    async fn test_send_after_receiver_dropped() {
        let (room, rx) = ChannelRoom::new(4);
        drop(rx);
        assert!(matches!(
            room.send_ldn_frame(packet()).await,
            Err(Error::Shutdown)
        ));
    }
}
