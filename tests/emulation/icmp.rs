//! Echo handling for the gateway address

use super::harness::*;
use ldn_bridge::protocol::icmp::IcmpPacket;
use ldn_bridge::protocol::ipv4::Protocol;
use std::time::Duration;

#[tokio::test]
async fn test_gateway_answers_ping() {
    let (engine, mut link) = start(engine_config());

    link.inject(echo_request(GATEWAY, 0x1234, 7, b"ping")).unwrap();

    let emitted = Emitted::ipv4(&next_frame(&mut link).await);
    assert_eq!(emitted.dst_mac, CONSOLE_MAC);
    assert_eq!(emitted.src_ip, GATEWAY);
    assert_eq!(emitted.dst_ip, CONSOLE_IP);
    assert_eq!(emitted.protocol, Protocol::Icmp as u8);

    let reply = IcmpPacket::parse(&emitted.l4).unwrap();
    assert!(reply.is_echo_reply());
    assert!(reply.validate_checksum());
    assert_eq!(reply.identifier(), 0x1234);
    assert_eq!(reply.sequence(), 7);
    assert_eq!(reply.payload(), b"ping");
    assert_eq!(engine.metrics().icmp_echo_replies.get(), 1);
    engine.stop().await;
}

#[tokio::test]
async fn test_ping_to_other_address_ignored() {
    let (engine, mut link) = start(engine_config());

    link.inject(echo_request(PEER_IP, 1, 1, b"ping")).unwrap();
    eventually(|| engine.metrics().rx_frames.get() == 1).await;
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert!(link.try_next_frame().is_none());
    assert_eq!(engine.metrics().icmp_echo_replies.get(), 0);
    engine.stop().await;
}
