//! LDN traffic between the emulated subnet and the room

use super::harness::*;
use ldn_bridge::ldn::{frame, LdnFrame, LdnPacketType, NetworkInfo, RoomPacketType, LDN_PORT};
use ldn_bridge::protocol::udp::UdpHeader;
use ldn_bridge::room::{ChannelRoom, LdnBridge, RoomLdnPacket};
use std::time::Duration;
use tokio::sync::{mpsc, watch};

fn bridge() -> LdnBridge {
    LdnBridge::new(GATEWAY, BROADCAST, LDN_PORT)
}

fn network_info() -> NetworkInfo {
    let mut network = NetworkInfo {
        local_communication_id: 0x0100_0000_0000_1234,
        channel: 6,
        node_count: 1,
        ..NetworkInfo::default()
    };
    let ssid = b"ldn-room";
    network.ssid_length = ssid.len() as u8;
    network.ssid_name[..ssid.len()].copy_from_slice(ssid);
    network.nodes[0].ipv4_address = CONSOLE_IP;
    network.nodes[0].is_connected = true;
    network
}

#[tokio::test]
async fn test_console_scan_reaches_room() {
    let (engine, link) = start(engine_config());
    let (room, mut outbound) = ChannelRoom::new(8);
    let (_inbound_tx, inbound_rx) = mpsc::channel(8);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let bridge = bridge();

    let run = bridge.run(&engine, &room, inbound_rx, shutdown_rx);
    let console = async {
        let scan = Udp {
            src_mac: CONSOLE_MAC,
            src: CONSOLE_IP,
            src_port: LDN_PORT,
            dst: BROADCAST,
            dst_port: LDN_PORT,
        };
        link.inject(scan.frame(&frame::build(LdnPacketType::Scan, &[0u8; 48])))
            .unwrap();

        let packet = tokio::time::timeout(Duration::from_secs(2), outbound.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(packet.kind, RoomPacketType::Scan);
        assert_eq!(packet.local_ip, CONSOLE_IP);
        assert_eq!(packet.remote_ip, BROADCAST);
        assert!(packet.broadcast);
        assert_eq!(packet.payload, vec![0u8; 48]);

        shutdown_tx.send(true).unwrap();
    };

    let (result, ()) = tokio::join!(run, console);
    result.unwrap();
    engine.stop().await;
}

#[tokio::test]
async fn test_room_response_reaches_console() {
    let (engine, mut link) = start(engine_config());
    engine.arp_cache().set(CONSOLE_MAC, CONSOLE_IP);
    let (room, _outbound) = ChannelRoom::new(8);
    let (inbound_tx, inbound_rx) = mpsc::channel(8);
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    let bridge = bridge();
    let network = network_info();

    let run = bridge.run(&engine, &room, inbound_rx, shutdown_rx);
    let relay = async {
        inbound_tx
            .send(RoomLdnPacket {
                kind: RoomPacketType::ScanResp,
                local_ip: REMOTE_IP,
                remote_ip: CONSOLE_IP,
                broadcast: false,
                payload: network.to_bytes(),
            })
            .await
            .unwrap();

        let emitted = Emitted::ipv4(&next_frame(&mut link).await);
        assert_eq!(emitted.dst_mac, CONSOLE_MAC);
        assert_eq!(emitted.src_ip, GATEWAY);
        assert_eq!(emitted.dst_ip, CONSOLE_IP);
        let udp = UdpHeader::parse(&emitted.l4).unwrap();
        assert_eq!(udp.src_port(), LDN_PORT);
        assert_eq!(udp.dst_port(), LDN_PORT);

        let ldn = LdnFrame::parse(&emitted.udp_payload()).unwrap();
        assert_eq!(ldn.packet_type(), Some(LdnPacketType::ScanResponse));
        assert!(ldn.compressed);
        let decoded = NetworkInfo::decode(&ldn.payload).unwrap();
        assert_eq!(decoded, network);
        assert_eq!(decoded.ssid(), "ldn-room");

        // Closing the room side ends the bridge
        drop(inbound_tx);
    };

    let (result, ()) = tokio::join!(run, relay);
    result.unwrap();
    engine.stop().await;
}

#[tokio::test]
async fn test_room_broadcast_fans_out() {
    let (engine, mut link) = start(engine_config());
    engine.arp_cache().set(CONSOLE_MAC, CONSOLE_IP);
    engine.arp_cache().set(PEER_MAC, PEER_IP);
    let (room, _outbound) = ChannelRoom::new(8);
    let (inbound_tx, inbound_rx) = mpsc::channel(8);
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    let bridge = bridge();

    let run = bridge.run(&engine, &room, inbound_rx, shutdown_rx);
    let relay = async {
        inbound_tx
            .send(RoomLdnPacket {
                kind: RoomPacketType::SyncNetwork,
                local_ip: REMOTE_IP,
                remote_ip: CONSOLE_IP,
                broadcast: true,
                payload: vec![7u8; 20],
            })
            .await
            .unwrap();

        let mut targets = Vec::new();
        for _ in 0..2 {
            let emitted = Emitted::ipv4(&next_frame(&mut link).await);
            assert_eq!(emitted.dst_ip, BROADCAST);
            let ldn = LdnFrame::parse(&emitted.udp_payload()).unwrap();
            assert_eq!(ldn.packet_type(), Some(LdnPacketType::SyncNetwork));
            assert_eq!(ldn.payload, vec![7u8; 20]);
            targets.push(emitted.dst_mac);
        }
        targets.sort();
        assert_eq!(targets, vec![CONSOLE_MAC, PEER_MAC]);

        drop(inbound_tx);
    };

    let (result, ()) = tokio::join!(run, relay);
    result.unwrap();
    engine.stop().await;
}

#[tokio::test]
async fn test_room_without_console_kind_dropped() {
    let (engine, mut link) = start(engine_config());
    engine.arp_cache().set(CONSOLE_MAC, CONSOLE_IP);
    let (room, _outbound) = ChannelRoom::new(8);
    let (inbound_tx, inbound_rx) = mpsc::channel(8);
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    let bridge = bridge();

    let run = bridge.run(&engine, &room, inbound_rx, shutdown_rx);
    let relay = async {
        inbound_tx
            .send(RoomLdnPacket {
                kind: RoomPacketType::DestroyNetwork,
                local_ip: REMOTE_IP,
                remote_ip: CONSOLE_IP,
                broadcast: false,
                payload: Vec::new(),
            })
            .await
            .unwrap();
        drop(inbound_tx);
    };

    let (result, ()) = tokio::join!(run, relay);
    result.unwrap();
    assert!(link.try_next_frame().is_none());
    engine.stop().await;
}
