//! TCP termination and relay to the forward target

use super::harness::*;
use ldn_bridge::dataplane::EngineEvent;
use ldn_bridge::protocol::tcp::TcpFlags;
use std::net::{SocketAddr, SocketAddrV4};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

fn client() -> TcpClient {
    TcpClient {
        src: CONSOLE_IP,
        src_port: 40000,
        dst: REMOTE_IP,
        dst_port: 8080,
    }
}

async fn listener() -> (TcpListener, SocketAddrV4) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = match listener.local_addr().unwrap() {
        SocketAddr::V4(addr) => addr,
        SocketAddr::V6(_) => unreachable!(),
    };
    (listener, addr)
}

#[tokio::test]
async fn test_relay_round_trip() {
    let (upstream_listener, target) = listener().await;
    let mut config = engine_config();
    config.forward_target = Some(target);
    let (engine, mut link) = start(config);
    let client = client();

    link.inject(client.segment(TcpFlags::SYN, 499, 0, &[])).unwrap();
    let syn_ack = next_segment(&mut link).await;
    assert_eq!(syn_ack.flags, TcpFlags::SYN_ACK);
    assert_eq!(syn_ack.ack, 500);
    assert_eq!(syn_ack.src_ip, REMOTE_IP);
    assert_eq!(syn_ack.src_port, 8080);
    assert_eq!(syn_ack.dst_ip, CONSOLE_IP);
    assert_eq!(syn_ack.dst_port, 40000);
    let isn = syn_ack.seq;

    let (mut upstream, _) = tokio::time::timeout(Duration::from_secs(2), upstream_listener.accept())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(engine.session_count(), 1);

    // Handshake ACK carrying the first bytes
    link.inject(client.segment(TcpFlags::PSH_ACK, 500, isn.wrapping_add(1), b"hello"))
        .unwrap();
    let ack = next_segment(&mut link).await;
    assert_eq!(ack.flags, TcpFlags::ACK);
    assert_eq!(ack.seq, isn.wrapping_add(1));
    assert_eq!(ack.ack, 505);

    let mut buf = [0u8; 5];
    upstream.read_exact(&mut buf).await.unwrap();
    assert_eq!(&buf, b"hello");

    upstream.write_all(b"world").await.unwrap();
    let data = next_segment(&mut link).await;
    assert_eq!(data.flags, TcpFlags::PSH_ACK);
    assert_eq!(data.seq, isn.wrapping_add(1));
    assert_eq!(data.ack, 505);
    assert_eq!(data.payload, b"world");

    drop(upstream);
    let fin = next_segment(&mut link).await;
    assert_eq!(fin.flags, TcpFlags::FIN_ACK);
    assert_eq!(fin.seq, isn.wrapping_add(6));

    link.inject(client.segment(TcpFlags::FIN_ACK, 505, isn.wrapping_add(7), &[]))
        .unwrap();
    let last = next_segment(&mut link).await;
    assert_eq!(last.flags, TcpFlags::ACK);
    assert_eq!(last.seq, isn.wrapping_add(7));
    assert_eq!(last.ack, 506);

    eventually(|| engine.session_count() == 0).await;
    assert_eq!(engine.metrics().sessions_opened.get(), 1);
    assert_eq!(engine.metrics().sessions_closed.get(), 1);
    engine.stop().await;
}

#[tokio::test]
async fn test_console_close_ends_session() {
    let (upstream_listener, target) = listener().await;
    let mut config = engine_config();
    config.forward_target = Some(target);
    let (engine, mut link) = start(config);
    let client = client();

    link.inject(client.segment(TcpFlags::SYN, 1000, 0, &[])).unwrap();
    let isn = next_segment(&mut link).await.seq;
    let (mut upstream, _) = upstream_listener.accept().await.unwrap();

    link.inject(client.segment(TcpFlags::ACK, 1001, isn.wrapping_add(1), &[]))
        .unwrap();
    link.inject(client.segment(TcpFlags::FIN_ACK, 1001, isn.wrapping_add(1), &[]))
        .unwrap();

    let fin = next_segment(&mut link).await;
    assert_eq!(fin.flags, TcpFlags::FIN_ACK);
    assert_eq!(fin.ack, 1002);

    link.inject(client.segment(TcpFlags::ACK, 1002, isn.wrapping_add(2), &[]))
        .unwrap();
    eventually(|| engine.session_count() == 0).await;

    // Relay is torn down with the session, so upstream sees the close
    let mut buf = [0u8; 16];
    let read = tokio::time::timeout(Duration::from_secs(2), upstream.read(&mut buf))
        .await
        .unwrap();
    assert!(matches!(read, Ok(0) | Err(_)));
    engine.stop().await;
}

#[tokio::test]
async fn test_request_then_close_reaches_upstream() {
    let (upstream_listener, target) = listener().await;
    let mut config = engine_config();
    config.forward_target = Some(target);
    let (engine, mut link) = start(config);
    let client = client();

    link.inject(client.segment(TcpFlags::SYN, 100, 0, &[])).unwrap();
    let isn = next_segment(&mut link).await.seq;

    // Request, close and the last ACK all land before the upstream is accepted
    let psh_fin_ack = TcpFlags {
        fin: true,
        ..TcpFlags::PSH_ACK
    };
    link.inject(client.segment(psh_fin_ack, 101, isn.wrapping_add(1), b"request"))
        .unwrap();
    let fin = next_segment(&mut link).await;
    assert_eq!(fin.flags, TcpFlags::FIN_ACK);
    assert_eq!(fin.ack, 109);
    link.inject(client.segment(TcpFlags::ACK, 109, isn.wrapping_add(2), &[]))
        .unwrap();
    eventually(|| engine.session_count() == 0).await;

    let (mut upstream, _) = tokio::time::timeout(Duration::from_secs(2), upstream_listener.accept())
        .await
        .unwrap()
        .unwrap();
    let mut received = Vec::new();
    tokio::time::timeout(Duration::from_secs(2), upstream.read_to_end(&mut received))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(received, b"request");
    assert_eq!(engine.metrics().sessions_closed.get(), 1);
    engine.stop().await;
}

#[tokio::test]
async fn test_connect_failure_resets_console() {
    let (closed, target) = listener().await;
    drop(closed);

    let mut config = engine_config();
    config.forward_target = Some(target);
    let (engine, mut link) = start(config);
    let client = client();

    link.inject(client.segment(TcpFlags::SYN, 77, 0, &[])).unwrap();
    let syn_ack = next_segment(&mut link).await;
    assert_eq!(syn_ack.flags, TcpFlags::SYN_ACK);

    let rst = next_segment(&mut link).await;
    assert_eq!(rst.flags, TcpFlags::RST_ACK);
    assert_eq!(rst.ack, 78);

    eventually(|| engine.session_count() == 0).await;
    engine.stop().await;
}

#[tokio::test]
async fn test_segment_without_session_dropped() {
    let (_upstream_listener, target) = listener().await;
    let mut config = engine_config();
    config.forward_target = Some(target);
    let (engine, mut link) = start(config);

    link.inject(client().segment(TcpFlags::ACK, 5, 6, b"stray"))
        .unwrap();
    eventually(|| engine.metrics().tcp_segments.get() == 1).await;
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert!(link.try_next_frame().is_none());
    assert_eq!(engine.session_count(), 0);
    engine.stop().await;
}

#[tokio::test]
async fn test_without_target_segments_only_published() {
    let (engine, mut link) = start(engine_config());
    let mut events = engine.subscribe();

    link.inject(client().segment(TcpFlags::SYN, 1, 0, &[])).unwrap();

    let event = tokio::time::timeout(Duration::from_secs(2), events.recv())
        .await
        .unwrap()
        .unwrap();
    match event {
        EngineEvent::Tcp(segment) => {
            assert_eq!(segment.src_ip, CONSOLE_IP);
            assert_eq!(segment.dst_ip, REMOTE_IP);
            assert_eq!(segment.dst_port, 8080);
            assert_eq!(segment.flags, TcpFlags::SYN);
            assert_eq!(segment.seq, 1);
        }
        other => panic!("unexpected event {:?}", other),
    }
    assert!(link.try_next_frame().is_none());
    assert_eq!(engine.session_count(), 0);
    assert!(engine.config().forward_target.is_none());
    engine.stop().await;
}
