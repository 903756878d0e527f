//! Proxy ARP and address resolution

use super::harness::*;
use ldn_bridge::protocol::arp::{ArpOp, ArpPacket};
use ldn_bridge::protocol::ethernet::Frame;
use ldn_bridge::protocol::{EtherType, MacAddr};
use ldn_bridge::Error;
use std::time::Duration;

fn parse_arp(bytes: &[u8]) -> (MacAddr, ArpPacket) {
    let frame = Frame::parse(bytes).unwrap();
    assert_eq!(frame.ethertype(), EtherType::Arp as u16);
    (frame.dst_mac(), ArpPacket::parse(frame.payload()).unwrap())
}

#[tokio::test]
async fn test_proxy_answers_for_absent_host() {
    let (engine, mut link) = start(engine_config());

    link.inject(arp_request(CONSOLE_MAC, CONSOLE_IP, REMOTE_IP))
        .unwrap();

    let (dst_mac, reply) = parse_arp(&next_frame(&mut link).await);
    assert_eq!(dst_mac, CONSOLE_MAC);
    assert_eq!(reply.op(), Some(ArpOp::Reply));
    assert_eq!(reply.sender_mac, LOCAL_MAC);
    assert_eq!(reply.sender_ip, REMOTE_IP);
    assert_eq!(reply.target_mac, CONSOLE_MAC);
    assert_eq!(reply.target_ip, CONSOLE_IP);

    assert_eq!(engine.known_hosts(), vec![(CONSOLE_IP, CONSOLE_MAC)]);
    assert_eq!(engine.metrics().arp_replies.get(), 1);
    engine.stop().await;
}

#[tokio::test]
async fn test_gateway_is_answered_but_not_listed() {
    let (engine, mut link) = start(engine_config());

    link.inject(arp_request(CONSOLE_MAC, CONSOLE_IP, GATEWAY))
        .unwrap();

    let (_, reply) = parse_arp(&next_frame(&mut link).await);
    assert_eq!(reply.sender_ip, GATEWAY);
    assert_eq!(reply.sender_mac, LOCAL_MAC);
    assert!(engine
        .known_hosts()
        .iter()
        .all(|(ip, _)| *ip != GATEWAY));
    engine.stop().await;
}

#[tokio::test]
async fn test_live_host_answers_for_itself() {
    let (engine, mut link) = start(engine_config());
    engine.arp_cache().set(CONSOLE_MAC, CONSOLE_IP);

    link.inject(arp_request(PEER_MAC, PEER_IP, CONSOLE_IP)).unwrap();
    eventually(|| engine.metrics().rx_frames.get() == 1).await;
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert!(link.try_next_frame().is_none());
    assert_eq!(engine.arp_cache().try_get_mac(PEER_IP), Some(PEER_MAC));
    engine.stop().await;
}

#[tokio::test]
async fn test_send_resolves_through_arp() {
    let mut config = engine_config();
    config.resolve_timeout = Duration::from_millis(300);
    let (engine, mut link) = start(config);

    let send = engine.send_udp(GATEWAY, 11452, PEER_IP, 11452, b"hello");
    let respond = async {
        let (dst_mac, request) = parse_arp(&next_frame(&mut link).await);
        assert_eq!(dst_mac, MacAddr::BROADCAST);
        assert_eq!(request.op(), Some(ArpOp::Request));
        assert_eq!(request.sender_ip, GATEWAY);
        assert_eq!(request.target_ip, PEER_IP);
        link.inject(arp_reply(PEER_MAC, PEER_IP, GATEWAY)).unwrap();
    };
    let (sent, ()) = tokio::join!(send, respond);
    assert_eq!(sent.unwrap(), 1);

    let emitted = Emitted::ipv4(&next_frame(&mut link).await);
    assert_eq!(emitted.dst_mac, PEER_MAC);
    assert_eq!(emitted.src_ip, GATEWAY);
    assert_eq!(emitted.dst_ip, PEER_IP);
    assert_eq!(emitted.udp_payload(), b"hello");
    assert_eq!(engine.metrics().arp_requests.get(), 1);
    engine.stop().await;
}

#[tokio::test]
async fn test_unanswered_resolution_fails() {
    let (engine, mut link) = start(engine_config());

    let result = engine
        .send_udp(GATEWAY, 11452, REMOTE_IP, 11452, b"lost")
        .await;
    assert!(matches!(result, Err(Error::Unresolved(ip)) if ip == REMOTE_IP));

    let (_, request) = parse_arp(&next_frame(&mut link).await);
    assert_eq!(request.target_ip, REMOTE_IP);
    assert!(link.try_next_frame().is_none());
    assert_eq!(engine.metrics().unresolved_drops.get(), 1);
    engine.stop().await;
}
