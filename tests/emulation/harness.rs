//! Engine-over-memory helpers shared by the scenarios

use ldn_bridge::capture::{MemoryCapture, MemoryLink};
use ldn_bridge::dataplane::{EngineConfig, PacketForwardEngine};
use ldn_bridge::protocol::arp::ArpPacket;
use ldn_bridge::protocol::ethernet::{Frame, FrameBuilder};
use ldn_bridge::protocol::icmp::{self, IcmpType};
use ldn_bridge::protocol::ipv4::{Ipv4Builder, Ipv4Header, Protocol};
use ldn_bridge::protocol::tcp::{TcpBuilder, TcpFlags, TcpHeader};
use ldn_bridge::protocol::udp::{UdpBuilder, UdpHeader};
use ldn_bridge::protocol::{EtherType, Ipv4Subnet, MacAddr};
use std::net::Ipv4Addr;
use std::time::Duration;

pub const LOCAL_MAC: MacAddr = MacAddr([0x02, 0x00, 0x00, 0x00, 0x00, 0x01]);
pub const CONSOLE_MAC: MacAddr = MacAddr([0x98, 0xb6, 0xe9, 0x00, 0x00, 0x02]);
pub const PEER_MAC: MacAddr = MacAddr([0x98, 0xb6, 0xe9, 0x00, 0x00, 0x03]);

pub const CONSOLE_IP: Ipv4Addr = Ipv4Addr::new(10, 13, 0, 2);
pub const PEER_IP: Ipv4Addr = Ipv4Addr::new(10, 13, 0, 3);
pub const REMOTE_IP: Ipv4Addr = Ipv4Addr::new(10, 13, 0, 50);
pub const GATEWAY: Ipv4Addr = Ipv4Addr::new(10, 13, 37, 1);
pub const BROADCAST: Ipv4Addr = Ipv4Addr::new(10, 13, 255, 255);

const WAIT: Duration = Duration::from_secs(2);

pub fn engine_config() -> EngineConfig {
    let mut config = EngineConfig::new(Ipv4Subnet::new(Ipv4Addr::new(10, 13, 0, 0), 16), GATEWAY);
    config.rng_seed = Some(7);
    config.resolve_timeout = Duration::from_millis(20);
    config.connect_timeout = Duration::from_millis(500);
    config.verify_checksums = true;
    config
}

/// Started engine plus the console's end of the link
pub fn start(config: EngineConfig) -> (PacketForwardEngine<MemoryCapture>, MemoryLink) {
    let (capture, link) = MemoryCapture::pair(LOCAL_MAC);
    let engine = PacketForwardEngine::new(capture, config);
    engine.start().unwrap();
    (engine, link)
}

/// Next frame the engine puts on the link
pub async fn next_frame(link: &mut MemoryLink) -> Vec<u8> {
    tokio::time::timeout(WAIT, link.next_frame())
        .await
        .expect("engine sent nothing")
        .expect("link closed")
}

/// Wait until `check` holds, polling the engine state
pub async fn eventually(mut check: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + WAIT;
    while !check() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not reached in time"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

fn ethernet(src_mac: MacAddr, dst_mac: MacAddr, ethertype: EtherType, payload: &[u8]) -> Vec<u8> {
    FrameBuilder::new()
        .dst_mac(dst_mac)
        .src_mac(src_mac)
        .ethertype(ethertype as u16)
        .payload(payload)
        .build()
}

fn ipv4(src: Ipv4Addr, dst: Ipv4Addr, protocol: Protocol, l4: &[u8]) -> Vec<u8> {
    Ipv4Builder::new()
        .protocol(protocol)
        .src_addr(src)
        .dst_addr(dst)
        .payload(l4)
        .build()
}

pub fn arp_request(sender_mac: MacAddr, sender_ip: Ipv4Addr, target_ip: Ipv4Addr) -> Vec<u8> {
    let request = ArpPacket::request(sender_mac, sender_ip, target_ip);
    ethernet(sender_mac, MacAddr::BROADCAST, EtherType::Arp, &request.to_bytes())
}

pub fn arp_reply(sender_mac: MacAddr, sender_ip: Ipv4Addr, target_ip: Ipv4Addr) -> Vec<u8> {
    let reply = ArpPacket::reply(sender_mac, sender_ip, LOCAL_MAC, target_ip);
    ethernet(sender_mac, LOCAL_MAC, EtherType::Arp, &reply.to_bytes())
}

pub struct Udp {
    pub src_mac: MacAddr,
    pub src: Ipv4Addr,
    pub src_port: u16,
    pub dst: Ipv4Addr,
    pub dst_port: u16,
}

impl Udp {
    pub fn frame(&self, payload: &[u8]) -> Vec<u8> {
        let datagram = UdpBuilder::new()
            .src_port(self.src_port)
            .dst_port(self.dst_port)
            .payload(payload)
            .build(self.src, self.dst);
        let dst_mac = if self.dst == BROADCAST {
            MacAddr::BROADCAST
        } else {
            LOCAL_MAC
        };
        ethernet(
            self.src_mac,
            dst_mac,
            EtherType::Ipv4,
            &ipv4(self.src, self.dst, Protocol::Udp, &datagram),
        )
    }
}

/// Console side of one TCP connection
pub struct TcpClient {
    pub src: Ipv4Addr,
    pub src_port: u16,
    pub dst: Ipv4Addr,
    pub dst_port: u16,
}

impl TcpClient {
    pub fn segment(&self, flags: TcpFlags, seq: u32, ack: u32, payload: &[u8]) -> Vec<u8> {
        let tcp = TcpBuilder::new()
            .src_port(self.src_port)
            .dst_port(self.dst_port)
            .seq_num(seq)
            .ack_num(ack)
            .flags(flags)
            .payload(payload)
            .build(self.src, self.dst);
        ethernet(
            CONSOLE_MAC,
            LOCAL_MAC,
            EtherType::Ipv4,
            &ipv4(self.src, self.dst, Protocol::Tcp, &tcp),
        )
    }
}

pub fn echo_request(dst: Ipv4Addr, identifier: u16, sequence: u16, payload: &[u8]) -> Vec<u8> {
    let message = icmp::build_echo(IcmpType::EchoRequest, identifier, sequence, payload);
    ethernet(
        CONSOLE_MAC,
        LOCAL_MAC,
        EtherType::Ipv4,
        &ipv4(CONSOLE_IP, dst, Protocol::Icmp, &message),
    )
}

/// Owned view of a frame the engine emitted
#[derive(Debug)]
pub struct Emitted {
    pub dst_mac: MacAddr,
    pub src_mac: MacAddr,
    pub src_ip: Ipv4Addr,
    pub dst_ip: Ipv4Addr,
    pub protocol: u8,
    pub l4: Vec<u8>,
}

impl Emitted {
    /// Parse an emitted IPv4 frame, checking the header checksum
    pub fn ipv4(bytes: &[u8]) -> Self {
        let frame = Frame::parse(bytes).unwrap();
        assert_eq!(frame.ethertype(), EtherType::Ipv4 as u16);
        let ip = Ipv4Header::parse(frame.payload()).unwrap();
        assert!(ip.validate_checksum(), "bad IPv4 checksum");
        Self {
            dst_mac: frame.dst_mac(),
            src_mac: frame.src_mac(),
            src_ip: ip.src_addr(),
            dst_ip: ip.dst_addr(),
            protocol: ip.protocol(),
            l4: ip.payload().to_vec(),
        }
    }

    pub fn udp_payload(&self) -> Vec<u8> {
        assert_eq!(self.protocol, Protocol::Udp as u8);
        let udp = UdpHeader::parse(&self.l4).unwrap();
        assert!(udp.validate_checksum(self.src_ip, self.dst_ip), "bad UDP checksum");
        udp.payload().to_vec()
    }
}

/// TCP segment the engine sent to the console
#[derive(Debug)]
pub struct SeenSegment {
    pub src_ip: Ipv4Addr,
    pub dst_ip: Ipv4Addr,
    pub src_port: u16,
    pub dst_port: u16,
    pub flags: TcpFlags,
    pub seq: u32,
    pub ack: u32,
    pub payload: Vec<u8>,
}

pub async fn next_segment(link: &mut MemoryLink) -> SeenSegment {
    let emitted = Emitted::ipv4(&next_frame(link).await);
    assert_eq!(emitted.protocol, Protocol::Tcp as u8);
    let tcp = TcpHeader::parse(&emitted.l4).unwrap();
    assert!(tcp.validate_checksum(emitted.src_ip, emitted.dst_ip), "bad TCP checksum");
    SeenSegment {
        src_ip: emitted.src_ip,
        dst_ip: emitted.dst_ip,
        src_port: tcp.src_port(),
        dst_port: tcp.dst_port(),
        flags: tcp.flags(),
        seq: tcp.seq_num(),
        ack: tcp.ack_num(),
        payload: tcp.payload().to_vec(),
    }
}
