//! UDP publication and subnet broadcast fan-out

use super::harness::*;
use ldn_bridge::dataplane::EngineEvent;
use ldn_bridge::protocol::MacAddr;
use std::net::Ipv4Addr;
use std::time::Duration;

const THIRD_MAC: MacAddr = MacAddr([0x98, 0xb6, 0xe9, 0x00, 0x00, 0x04]);
const THIRD_IP: Ipv4Addr = Ipv4Addr::new(10, 13, 0, 4);

fn from_console(dst: Ipv4Addr) -> Udp {
    Udp {
        src_mac: CONSOLE_MAC,
        src: CONSOLE_IP,
        src_port: 11452,
        dst,
        dst_port: 11452,
    }
}

#[tokio::test]
async fn test_broadcast_copied_to_every_other_host() {
    let (engine, mut link) = start(engine_config());
    let mut events = engine.subscribe();
    engine.arp_cache().set(PEER_MAC, PEER_IP);
    engine.arp_cache().set(THIRD_MAC, THIRD_IP);

    link.inject(from_console(BROADCAST).frame(b"anyone?"))
        .unwrap();

    let mut copies = vec![
        Emitted::ipv4(&next_frame(&mut link).await),
        Emitted::ipv4(&next_frame(&mut link).await),
    ];
    copies.sort_by_key(|copy| copy.dst_mac);

    assert_eq!(copies[0].dst_mac, PEER_MAC);
    assert_eq!(copies[1].dst_mac, THIRD_MAC);
    for copy in &copies {
        assert_eq!(copy.src_mac, LOCAL_MAC);
        assert_eq!(copy.src_ip, CONSOLE_IP);
        assert_eq!(copy.dst_ip, BROADCAST);
        assert_eq!(copy.udp_payload(), b"anyone?");
    }

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(link.try_next_frame().is_none());
    assert_eq!(engine.metrics().broadcast_fanout.get(), 2);

    match events.recv().await.unwrap() {
        EngineEvent::Udp(datagram) => {
            assert_eq!(datagram.src_ip, CONSOLE_IP);
            assert_eq!(datagram.dst_ip, BROADCAST);
            assert_eq!(datagram.payload, b"anyone?");
        }
        other => panic!("unexpected event {:?}", other),
    }
    engine.stop().await;
}

#[tokio::test]
async fn test_unicast_only_published() {
    let (engine, mut link) = start(engine_config());
    let mut events = engine.subscribe();
    engine.arp_cache().set(PEER_MAC, PEER_IP);

    link.inject(from_console(PEER_IP).frame(b"direct")).unwrap();

    let event = tokio::time::timeout(Duration::from_secs(2), events.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(event, EngineEvent::Udp(ref d) if d.dst_ip == PEER_IP));
    assert!(link.try_next_frame().is_none());
    assert_eq!(engine.metrics().udp_delivered.get(), 1);
    assert_eq!(engine.metrics().broadcast_fanout.get(), 0);
    engine.stop().await;
}

#[tokio::test]
async fn test_corrupted_checksum_dropped() {
    let (engine, link) = start(engine_config());
    let mut events = engine.subscribe();

    let mut frame = from_console(PEER_IP).frame(b"garbled");
    // Ethernet 14 + IPv4 20 + UDP checksum at 6
    frame[41] ^= 0x01;
    link.inject(frame).unwrap();

    eventually(|| engine.metrics().checksum_failures.get() == 1).await;
    assert!(events.try_recv().is_err());
    engine.stop().await;
}
