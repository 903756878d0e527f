//! Translation between LDN frames on the emulated subnet and room messages

use super::{RoomLdnPacket, RoomTransport};
use crate::capture::Capture;
use crate::config::Config;
use crate::dataplane::{EngineEvent, PacketForwardEngine, UdpDatagram};
use crate::ldn::network_info::NODE_INFO_SIZE;
use crate::ldn::{frame, to_console, to_room, LdnFrame, LdnPacketType, NetworkInfo, NodeInfo};
use crate::{Error, Result};
use std::net::Ipv4Addr;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, trace, warn};

/// Moves LDN traffic between the console and the room
#[derive(Debug, Clone)]
pub struct LdnBridge {
    gateway: Ipv4Addr,
    broadcast: Ipv4Addr,
    port: u16,
}

impl LdnBridge {
    pub fn new(gateway: Ipv4Addr, broadcast: Ipv4Addr, port: u16) -> Self {
        Self {
            gateway,
            broadcast,
            port,
        }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    fn is_broadcast(&self, ip: Ipv4Addr) -> bool {
        ip == self.broadcast || ip == Ipv4Addr::BROADCAST
    }

    /// Room message for an LDN datagram sent by the console, if any.
    /// Either port may carry the LDN port.
    pub fn console_to_room(&self, datagram: &UdpDatagram) -> Option<RoomLdnPacket> {
        if datagram.src_port != self.port && datagram.dst_port != self.port {
            return None;
        }

        let ldn = match LdnFrame::parse(&datagram.payload) {
            Ok(ldn) => ldn,
            Err(e) => {
                warn!(src = %datagram.src_ip, "Dropping LDN frame: {}", e);
                return None;
            }
        };

        let Some(kind) = ldn.packet_type() else {
            warn!(src = %datagram.src_ip, kind = ldn.kind, "Unknown LDN packet type");
            return None;
        };
        trace!(src = %datagram.src_ip, dst = %datagram.dst_ip, %kind, len = ldn.payload.len(), "LDN from console");

        let (remote_ip, broadcast) = match kind {
            LdnPacketType::Scan => {
                info!(src = %datagram.src_ip, "Console scanning");
                (self.broadcast, true)
            }
            LdnPacketType::Connect => {
                if ldn.payload.len() < NODE_INFO_SIZE {
                    warn!(
                        src = %datagram.src_ip,
                        len = ldn.payload.len(),
                        "Connect payload shorter than NodeInfo"
                    );
                    return None;
                }
                if let Ok(node) = NodeInfo::decode(&ldn.payload) {
                    info!(
                        node_id = node.node_id,
                        ip = %node.ipv4_address,
                        mac = %node.mac_address,
                        connected = node.is_connected,
                        user = %node.user_name(),
                        "Console connecting"
                    );
                }
                (datagram.dst_ip, false)
            }
            LdnPacketType::ScanResponse | LdnPacketType::SyncNetwork => {
                if let Ok(network) = NetworkInfo::decode(&ldn.payload) {
                    debug!(
                        ssid = %network.ssid(),
                        nodes = network.node_count,
                        %kind,
                        "Network info from console"
                    );
                }
                (datagram.dst_ip, self.is_broadcast(datagram.dst_ip))
            }
            LdnPacketType::Disconnect => (datagram.dst_ip, self.is_broadcast(datagram.dst_ip)),
        };

        Some(RoomLdnPacket {
            kind: to_room(kind),
            local_ip: datagram.src_ip,
            remote_ip,
            broadcast,
            payload: ldn.payload,
        })
    }

    /// Destination and UDP payload for a room message, if it has a console
    /// counterpart
    pub fn room_to_console(&self, packet: &RoomLdnPacket) -> Option<(Ipv4Addr, Vec<u8>)> {
        let Some(kind) = to_console(packet.kind) else {
            warn!(kind = %packet.kind, "Room packet type has no console counterpart");
            return None;
        };

        let dst = if packet.broadcast {
            self.broadcast
        } else {
            packet.remote_ip
        };
        Some((dst, frame::build(kind, &packet.payload)))
    }

    async fn deliver<C: Capture>(&self, engine: &PacketForwardEngine<C>, packet: &RoomLdnPacket) {
        let Some((dst, payload)) = self.room_to_console(packet) else {
            return;
        };

        match engine
            .send_udp(self.gateway, self.port, dst, self.port, &payload)
            .await
        {
            Ok(frames) => trace!(kind = %packet.kind, %dst, frames, "LDN to console"),
            Err(e) => debug!(kind = %packet.kind, %dst, "LDN to console failed: {}", e),
        }
    }

    /// Pump messages until shutdown, the room side closes, or the engine
    /// goes away
    pub async fn run<C: Capture, R: RoomTransport>(
        &self,
        engine: &PacketForwardEngine<C>,
        room: &R,
        mut inbound: mpsc::Receiver<RoomLdnPacket>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<()> {
        let mut events = engine.subscribe();
        info!(port = self.port, "LDN bridge running");

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }

                event = events.recv() => match event {
                    Ok(EngineEvent::Udp(datagram)) => {
                        let Some(packet) = self.console_to_room(&datagram) else {
                            continue;
                        };
                        match room.send_ldn_frame(packet).await {
                            Ok(()) => {}
                            Err(Error::Shutdown) => {
                                warn!("Room transport closed");
                                return Err(Error::Shutdown);
                            }
                            Err(e) => warn!("Room send failed: {}", e),
                        }
                    }
                    Ok(EngineEvent::Tcp(_)) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "LDN bridge fell behind engine events");
                    }
                    Err(RecvError::Closed) => break,
                },

                packet = inbound.recv() => match packet {
                    Some(packet) => self.deliver(engine, &packet).await,
                    None => {
                        info!("Room inbound channel closed");
                        break;
                    }
                },
            }
        }

        info!("LDN bridge stopped");
        Ok(())
    }
}

impl From<&Config> for LdnBridge {
    fn from(config: &Config) -> Self {
        Self::new(config.subnet.gateway, config.broadcast(), config.ldn.port)
    }
}
