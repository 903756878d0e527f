//! Packet forward engine
//!
//! Impersonates the gateway and every absent host of the virtual subnet on
//! the console's link. Captured frames go through [`PacketForwardEngine::handle_frame`]:
//! ARP is answered by the proxy, UDP and TCP are published as
//! [`EngineEvent`]s, subnet broadcasts are copied to every known host, TCP
//! is terminated and relayed to the forward target, and pings to the
//! gateway are answered.

use crate::capture::Capture;
use crate::config::Config;
use crate::dataplane::arp_proxy::{self, ArpAction, ArpProxy};
use crate::dataplane::tcp_session::{
    InboundSegment, OutboundSegment, TcpForwardSession, TcpSessionKey, TcpState,
};
use crate::dataplane::upstream::{self, UpstreamEvent};
use crate::dataplane::ArpCache;
use crate::protocol::ethernet::{Frame, FrameBuilder};
use crate::protocol::icmp::{self, IcmpPacket};
use crate::protocol::ipv4::{Ipv4Builder, Ipv4Header, Protocol};
use crate::protocol::tcp::{TcpBuilder, TcpFlags, TcpHeader};
use crate::protocol::udp::{UdpBuilder, UdpHeader};
use crate::protocol::{EtherType, Ipv4Subnet, MacAddr};
use crate::telemetry::EngineMetrics;
use crate::{Error, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::sync::atomic::{AtomicBool, AtomicU16, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

/// Receive buffer; large enough for frames merged by offloads
const RECV_BUFFER_SIZE: usize = 65536;

/// Engine settings, usually derived from [`Config`]
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub subnet: Ipv4Subnet,
    pub gateway: Ipv4Addr,
    pub arp_ttl: Duration,
    pub arp_capacity: usize,
    pub resolve_timeout: Duration,
    pub forward_target: Option<SocketAddrV4>,
    pub connect_timeout: Duration,
    pub gc_interval: Duration,
    pub event_capacity: usize,
    pub rng_seed: Option<u64>,
    pub verify_checksums: bool,
}

impl EngineConfig {
    /// Defaults for everything but the addressing
    pub fn new(subnet: Ipv4Subnet, gateway: Ipv4Addr) -> Self {
        let config = Config::default();
        Self {
            subnet,
            gateway,
            ..EngineConfig::from(&config)
        }
    }

    pub fn broadcast(&self) -> Ipv4Addr {
        self.subnet.broadcast()
    }
}

impl From<&Config> for EngineConfig {
    fn from(config: &Config) -> Self {
        Self {
            subnet: config.subnet(),
            gateway: config.subnet.gateway,
            arp_ttl: config.arp.ttl(),
            arp_capacity: config.arp.capacity,
            resolve_timeout: config.arp.resolve_timeout(),
            forward_target: config.tcp.forward_target,
            connect_timeout: config.tcp.connect_timeout(),
            gc_interval: config.engine.gc_interval(),
            event_capacity: config.engine.event_capacity,
            rng_seed: config.engine.rng_seed,
            verify_checksums: config.engine.verify_checksums,
        }
    }
}

/// UDP datagram seen on the link
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UdpDatagram {
    pub src_mac: MacAddr,
    pub src_ip: Ipv4Addr,
    pub src_port: u16,
    pub dst_ip: Ipv4Addr,
    pub dst_port: u16,
    pub payload: Vec<u8>,
}

/// TCP segment seen on the link
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TcpSegment {
    pub src_ip: Ipv4Addr,
    pub src_port: u16,
    pub dst_ip: Ipv4Addr,
    pub dst_port: u16,
    pub flags: TcpFlags,
    pub seq: u32,
    pub ack: u32,
    pub payload: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    Udp(UdpDatagram),
    Tcp(TcpSegment),
}

struct SessionEntry {
    session: tokio::sync::Mutex<TcpForwardSession>,
    client_mac: MacAddr,
    /// Taken on close; the relay then drains what is queued and shuts the
    /// upstream write half
    to_upstream: Mutex<Option<mpsc::UnboundedSender<Vec<u8>>>>,
    relay: Mutex<Option<JoinHandle<()>>>,
}

impl SessionEntry {
    /// Queue console bytes for the relay; false once the relay is gone or
    /// the session released it
    fn forward(&self, data: Vec<u8>) -> bool {
        lock(&self.to_upstream)
            .as_ref()
            .is_some_and(|tx| tx.send(data).is_ok())
    }

    fn release_upstream(&self) {
        lock(&self.to_upstream).take();
    }

    fn abort_relay(&self) {
        if let Some(handle) = lock(&self.relay).take() {
            handle.abort();
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct Inner<C> {
    capture: C,
    local_mac: MacAddr,
    config: EngineConfig,
    arp: ArpCache,
    proxy: ArpProxy,
    sessions: Mutex<HashMap<TcpSessionKey, Arc<SessionEntry>>>,
    /// Relays of removed sessions still flushing to the forward target
    draining: Mutex<Vec<JoinHandle<()>>>,
    events: broadcast::Sender<EngineEvent>,
    ip_id: AtomicU16,
    rng: Mutex<StdRng>,
    metrics: EngineMetrics,
}

/// Software subnet emulator bound to one capture backend
pub struct PacketForwardEngine<C: Capture> {
    inner: Arc<Inner<C>>,
    shutdown: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    running: AtomicBool,
}

impl<C: Capture> PacketForwardEngine<C> {
    pub fn new(capture: C, config: EngineConfig) -> Self {
        let mut rng = match config.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let ip_id = AtomicU16::new(rng.gen());
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        let (shutdown, _) = watch::channel(false);

        let inner = Inner {
            local_mac: capture.local_mac(),
            capture,
            arp: ArpCache::new(config.arp_ttl, config.arp_capacity),
            proxy: ArpProxy::new(config.subnet),
            sessions: Mutex::new(HashMap::new()),
            draining: Mutex::new(Vec::new()),
            events,
            ip_id,
            rng: Mutex::new(rng),
            metrics: EngineMetrics::new(),
            config,
        };

        Self {
            inner: Arc::new(inner),
            shutdown,
            tasks: Mutex::new(Vec::new()),
            running: AtomicBool::new(false),
        }
    }

    /// Spawn the receive loop and the sweep timer
    pub fn start(&self) -> Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(Error::Config("engine already started".to_string()));
        }
        self.shutdown.send_replace(false);

        let receive = tokio::spawn(receive_loop(
            Arc::clone(&self.inner),
            self.shutdown.subscribe(),
        ));
        let sweep = tokio::spawn(sweep_loop(
            Arc::clone(&self.inner),
            self.shutdown.subscribe(),
        ));
        lock(&self.tasks).extend([receive, sweep]);

        info!(
            mac = %self.inner.local_mac,
            subnet = %self.inner.config.subnet,
            gateway = %self.inner.config.gateway,
            "Packet forward engine started"
        );
        Ok(())
    }

    /// Stop the background tasks and drop every relayed connection
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        self.shutdown.send_replace(true);

        let tasks: Vec<_> = lock(&self.tasks).drain(..).collect();
        for task in tasks {
            if let Err(e) = task.await {
                if !e.is_cancelled() {
                    warn!("Engine task failed: {}", e);
                }
            }
        }

        let closed = self.inner.clear_sessions();
        info!(closed, "Packet forward engine stopped");
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.inner.events.subscribe()
    }

    /// Process one captured frame
    pub async fn handle_frame(&self, data: &[u8]) {
        self.inner.handle_frame(data).await;
    }

    /// Send a UDP datagram onto the link, returning the number of frames
    /// emitted
    pub async fn send_udp(
        &self,
        src_ip: Ipv4Addr,
        src_port: u16,
        dst_ip: Ipv4Addr,
        dst_port: u16,
        payload: &[u8],
    ) -> Result<usize> {
        self.inner
            .send_udp(src_ip, src_port, dst_ip, dst_port, payload)
            .await
    }

    /// Hosts of the subnet learned from the link, gateway excluded
    pub fn known_hosts(&self) -> Vec<(Ipv4Addr, MacAddr)> {
        let config = &self.inner.config;
        self.inner
            .arp
            .entries()
            .into_iter()
            .filter(|(ip, _)| config.subnet.contains(*ip) && *ip != config.gateway)
            .collect()
    }

    pub fn session_count(&self) -> usize {
        lock(&self.inner.sessions).len()
    }

    pub fn metrics(&self) -> &EngineMetrics {
        &self.inner.metrics
    }

    pub fn arp_cache(&self) -> &ArpCache {
        &self.inner.arp
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    pub fn local_mac(&self) -> MacAddr {
        self.inner.local_mac
    }
}

impl<C: Capture> Drop for PacketForwardEngine<C> {
    fn drop(&mut self) {
        for task in lock(&self.tasks).drain(..) {
            task.abort();
        }
        self.inner.clear_sessions();
    }
}

async fn receive_loop<C: Capture>(inner: Arc<Inner<C>>, mut shutdown: watch::Receiver<bool>) {
    let mut buf = vec![0u8; RECV_BUFFER_SIZE];

    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            result = inner.capture.recv(&mut buf) => match result {
                Ok(len) => inner.handle_frame(&buf[..len]).await,
                Err(Error::Shutdown) => {
                    info!("Capture closed, receive loop exiting");
                    break;
                }
                Err(e) => {
                    warn!("Receive error: {}", e);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
            }
        }
    }
    debug!("Receive loop stopped");
}

async fn sweep_loop<C: Capture>(inner: Arc<Inner<C>>, mut shutdown: watch::Receiver<bool>) {
    let period = inner.config.gc_interval.max(Duration::from_millis(1));
    let mut timer = tokio::time::interval_at(tokio::time::Instant::now() + period, period);

    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            _ = timer.tick() => inner.sweep(),
        }
    }
    debug!("Sweep loop stopped");
}

impl<C: Capture> Inner<C> {
    async fn transmit(&self, frame: &[u8]) -> Result<usize> {
        match self.capture.send_raw(frame).await {
            Ok(sent) => {
                self.metrics.record_tx(frame.len());
                Ok(sent)
            }
            Err(e) => {
                self.metrics.tx_errors.inc();
                debug!("Transmit failed: {}", e);
                Err(e)
            }
        }
    }

    fn next_ip_id(&self) -> u16 {
        self.ip_id.fetch_add(1, Ordering::Relaxed)
    }

    fn ipv4_packet(&self, src: Ipv4Addr, dst: Ipv4Addr, protocol: Protocol, l4: &[u8]) -> Vec<u8> {
        Ipv4Builder::new()
            .identification(self.next_ip_id())
            .protocol(protocol)
            .src_addr(src)
            .dst_addr(dst)
            .payload(l4)
            .build()
    }

    async fn send_ipv4(&self, dst_mac: MacAddr, packet: &[u8]) -> Result<usize> {
        let frame = FrameBuilder::new()
            .dst_mac(dst_mac)
            .src_mac(self.local_mac)
            .ethertype(EtherType::Ipv4 as u16)
            .payload(packet)
            .build();
        self.transmit(&frame).await
    }

    fn is_broadcast(&self, ip: Ipv4Addr) -> bool {
        ip == self.config.broadcast() || ip == Ipv4Addr::BROADCAST
    }

    /// Unicast `packet` to every known MAC except `exclude`
    async fn fan_out(&self, packet: &[u8], exclude: Option<MacAddr>) -> usize {
        let mut macs: Vec<MacAddr> = self.arp.entries().into_iter().map(|(_, mac)| mac).collect();
        macs.sort();
        macs.dedup();

        let mut sent = 0;
        for mac in macs {
            if Some(mac) == exclude || mac == self.local_mac {
                continue;
            }
            if self.send_ipv4(mac, packet).await.is_ok() {
                sent += 1;
            }
        }
        self.metrics.broadcast_fanout.add(sent as u64);
        sent
    }

    async fn handle_frame(self: &Arc<Self>, data: &[u8]) {
        self.metrics.record_rx(data.len());

        let frame = match Frame::parse(data) {
            Ok(frame) => frame,
            Err(e) => {
                trace!("Failed to parse Ethernet frame: {}", e);
                self.metrics.dropped_malformed.inc();
                return;
            }
        };

        if frame.src_mac() == self.local_mac {
            self.metrics.dropped_own_mac.inc();
            return;
        }

        match EtherType::from_u16(frame.ethertype()) {
            Some(EtherType::Arp) => self.handle_arp(&frame).await,
            Some(EtherType::Ipv4) => self.handle_ipv4(&frame).await,
            None => trace!("Unsupported EtherType: 0x{:04x}", frame.ethertype()),
        }
    }

    async fn handle_arp(&self, frame: &Frame<'_>) {
        match self.proxy.process(frame, &self.arp, self.local_mac) {
            ArpAction::Reply(reply) => {
                self.metrics.arp_replies.inc();
                let _ = self.transmit(&reply).await;
            }
            ArpAction::Learned => {}
            ArpAction::Ignored => self.metrics.dropped_malformed.inc(),
        }
    }

    async fn handle_ipv4(self: &Arc<Self>, frame: &Frame<'_>) {
        let ip = match Ipv4Header::parse(frame.payload()) {
            Ok(ip) => ip,
            Err(e) => {
                trace!("Failed to parse IPv4: {}", e);
                self.metrics.dropped_malformed.inc();
                return;
            }
        };

        if self.config.verify_checksums && !ip.validate_checksum() {
            trace!(src = %ip.src_addr(), "Bad IPv4 header checksum");
            self.metrics.checksum_failures.inc();
            return;
        }

        let src_ip = ip.src_addr();
        self.arp.set(frame.src_mac(), src_ip);

        if !self.config.subnet.contains(src_ip) {
            trace!(src = %src_ip, "Source outside the virtual subnet");
            self.metrics.dropped_foreign_subnet.inc();
            return;
        }

        match Protocol::from_u8(ip.protocol()) {
            Some(Protocol::Udp) => self.handle_udp(frame, &ip).await,
            Some(Protocol::Tcp) => self.handle_tcp(frame, &ip).await,
            Some(Protocol::Icmp) => self.handle_icmp(frame, &ip).await,
            None => trace!("Unsupported IP protocol: {}", ip.protocol()),
        }
    }

    async fn handle_udp(&self, frame: &Frame<'_>, ip: &Ipv4Header<'_>) {
        let udp = match UdpHeader::parse(ip.payload()) {
            Ok(udp) => udp,
            Err(e) => {
                trace!("Failed to parse UDP: {}", e);
                self.metrics.dropped_malformed.inc();
                return;
            }
        };

        let (src_ip, dst_ip) = (ip.src_addr(), ip.dst_addr());
        if self.config.verify_checksums && !udp.validate_checksum(src_ip, dst_ip) {
            trace!(src = %src_ip, "Bad UDP checksum");
            self.metrics.checksum_failures.inc();
            return;
        }

        self.metrics.udp_delivered.inc();
        let _ = self.events.send(EngineEvent::Udp(UdpDatagram {
            src_mac: frame.src_mac(),
            src_ip,
            src_port: udp.src_port(),
            dst_ip,
            dst_port: udp.dst_port(),
            payload: udp.payload().to_vec(),
        }));

        if self.is_broadcast(dst_ip) {
            let copies = self.fan_out(ip.datagram(), Some(frame.src_mac())).await;
            trace!(src = %src_ip, copies, "Broadcast copied to known hosts");
        }
    }

    async fn handle_icmp(&self, frame: &Frame<'_>, ip: &Ipv4Header<'_>) {
        if ip.dst_addr() != self.config.gateway {
            return;
        }

        let request = match IcmpPacket::parse(ip.payload()) {
            Ok(packet) => packet,
            Err(e) => {
                trace!("Failed to parse ICMP: {}", e);
                self.metrics.dropped_malformed.inc();
                return;
            }
        };

        if self.config.verify_checksums && !request.validate_checksum() {
            self.metrics.checksum_failures.inc();
            return;
        }

        let Ok(reply) = icmp::build_echo_reply(&request) else {
            return;
        };

        let src_ip = ip.src_addr();
        let dst_mac = self.arp.try_get_mac(src_ip).unwrap_or(frame.src_mac());
        let packet = self.ipv4_packet(self.config.gateway, src_ip, Protocol::Icmp, &reply);
        if self.send_ipv4(dst_mac, &packet).await.is_ok() {
            self.metrics.icmp_echo_replies.inc();
            trace!(to = %src_ip, seq = request.sequence(), "Echo reply sent");
        }
    }

    async fn handle_tcp(self: &Arc<Self>, frame: &Frame<'_>, ip: &Ipv4Header<'_>) {
        let tcp = match TcpHeader::parse(ip.payload()) {
            Ok(tcp) => tcp,
            Err(e) => {
                trace!("Failed to parse TCP: {}", e);
                self.metrics.dropped_malformed.inc();
                return;
            }
        };

        let (src_ip, dst_ip) = (ip.src_addr(), ip.dst_addr());
        if self.config.verify_checksums && !tcp.validate_checksum(src_ip, dst_ip) {
            trace!(src = %src_ip, "Bad TCP checksum");
            self.metrics.checksum_failures.inc();
            return;
        }

        self.metrics.tcp_segments.inc();
        let flags = tcp.flags();
        let _ = self.events.send(EngineEvent::Tcp(TcpSegment {
            src_ip,
            src_port: tcp.src_port(),
            dst_ip,
            dst_port: tcp.dst_port(),
            flags,
            seq: tcp.seq_num(),
            ack: tcp.ack_num(),
            payload: tcp.payload().to_vec(),
        }));

        let Some(target) = self.config.forward_target else {
            return;
        };

        let key = TcpSessionKey {
            src_ip,
            src_port: tcp.src_port(),
            dst_ip,
            dst_port: tcp.dst_port(),
        };

        let existing = lock(&self.sessions).get(&key).cloned();
        let entry = match existing {
            Some(entry) if !flags.is_syn_only() => entry,
            Some(entry) => {
                let state = entry.session.lock().await.state();
                if state == TcpState::SynReceived {
                    entry
                } else {
                    debug!(%key, ?state, "New SYN replaces existing session");
                    entry.abort_relay();
                    self.remove_session(&key, &entry);
                    self.open_session(key, frame.src_mac(), target)
                }
            }
            None if flags.is_syn_only() => self.open_session(key, frame.src_mac(), target),
            None => {
                warn!(%key, ?flags, "TCP segment without session dropped");
                return;
            }
        };

        let segment = InboundSegment {
            flags,
            seq: tcp.seq_num(),
            ack: tcp.ack_num(),
            payload: tcp.payload(),
        };

        let closed = {
            let mut session = entry.session.lock().await;
            let output = session.handle(&segment);
            if let Some(reply) = output.reply {
                let _ = self.send_segment(&key, entry.client_mac, &reply).await;
            }
            if let Some(data) = output.upstream {
                if !entry.forward(data) {
                    debug!(%key, "Upstream relay gone, payload discarded");
                }
            }
            session.is_closed()
        };

        if closed {
            debug!(%key, "TCP session closed by console");
            self.remove_session(&key, &entry);
        }
    }

    fn open_session(
        self: &Arc<Self>,
        key: TcpSessionKey,
        client_mac: MacAddr,
        target: SocketAddrV4,
    ) -> Arc<SessionEntry> {
        let isn: u32 = lock(&self.rng).gen();
        let (to_upstream, from_console) = mpsc::unbounded_channel();
        let entry = Arc::new(SessionEntry {
            session: tokio::sync::Mutex::new(TcpForwardSession::new(key, isn)),
            client_mac,
            to_upstream: Mutex::new(Some(to_upstream)),
            relay: Mutex::new(None),
        });

        lock(&self.sessions).insert(key, Arc::clone(&entry));
        self.metrics.sessions_opened.inc();
        debug!(%key, %target, "TCP session opened");

        let relay = tokio::spawn(Arc::clone(self).run_relay(
            key,
            Arc::clone(&entry),
            from_console,
            target,
        ));
        *lock(&entry.relay) = Some(relay);
        entry
    }

    /// Remove `entry` if it is still the session stored under `key`. Its
    /// relay keeps running until queued console bytes are written upstream.
    fn remove_session(&self, key: &TcpSessionKey, entry: &Arc<SessionEntry>) {
        let removed = {
            let mut sessions = lock(&self.sessions);
            match sessions.get(key) {
                Some(current) if Arc::ptr_eq(current, entry) => sessions.remove(key),
                _ => None,
            }
        };
        if removed.is_some() {
            self.metrics.sessions_closed.inc();
        }
        entry.release_upstream();
        if let Some(relay) = lock(&entry.relay).take() {
            let mut draining = lock(&self.draining);
            draining.retain(|handle| !handle.is_finished());
            draining.push(relay);
        }
    }

    /// Drop every session and hard-stop all relays, draining ones included
    fn clear_sessions(&self) -> usize {
        let drained: Vec<_> = lock(&self.sessions).drain().collect();
        for (_, entry) in &drained {
            entry.release_upstream();
            entry.abort_relay();
        }
        for relay in lock(&self.draining).drain(..) {
            relay.abort();
        }
        self.metrics.sessions_closed.add(drained.len() as u64);
        drained.len()
    }

    async fn send_segment(
        &self,
        key: &TcpSessionKey,
        fallback_mac: MacAddr,
        segment: &OutboundSegment,
    ) -> Result<usize> {
        let tcp = TcpBuilder::new()
            .src_port(key.dst_port)
            .dst_port(key.src_port)
            .seq_num(segment.seq)
            .ack_num(segment.ack)
            .flags(segment.flags)
            .payload(&segment.payload)
            .build(key.dst_ip, key.src_ip);
        let packet = self.ipv4_packet(key.dst_ip, key.src_ip, Protocol::Tcp, &tcp);
        let dst_mac = self.arp.try_get_mac(key.src_ip).unwrap_or(fallback_mac);
        trace!(%key, flags = ?segment.flags, seq = segment.seq, ack = segment.ack, len = segment.payload.len(), "TCP segment out");
        self.send_ipv4(dst_mac, &packet).await
    }

    async fn run_relay(
        self: Arc<Self>,
        key: TcpSessionKey,
        entry: Arc<SessionEntry>,
        from_console: mpsc::UnboundedReceiver<Vec<u8>>,
        target: SocketAddrV4,
    ) {
        let stream = match upstream::connect(target, self.config.connect_timeout).await {
            Ok(stream) => stream,
            Err(e) => {
                warn!(%key, %target, "Upstream connect failed: {}", e);
                self.abort_session(&key, &entry).await;
                return;
            }
        };
        debug!(%key, %target, "Upstream connected");

        let (events_tx, mut events) = mpsc::channel(16);
        let io = upstream::relay(stream, from_console, events_tx);
        tokio::pin!(io);
        let mut io_done = false;
        let mut finished = false;

        // Runs until the relay returns and its events are consumed, so
        // console bytes queued before a close still reach the target
        loop {
            tokio::select! {
                _ = &mut io, if !io_done => io_done = true,
                event = events.recv() => {
                    let Some(event) = event else { break };
                    if finished {
                        trace!(%key, "Upstream event after close ignored");
                    } else if !self.on_upstream_event(&key, &entry, event).await {
                        finished = true;
                    }
                }
            }
        }
        debug!(%key, "Upstream relay finished");
    }

    /// Apply one upstream event; false once the session is finished
    async fn on_upstream_event(
        &self,
        key: &TcpSessionKey,
        entry: &Arc<SessionEntry>,
        event: UpstreamEvent,
    ) -> bool {
        let mut session = entry.session.lock().await;
        match event {
            UpstreamEvent::Data(data) => match session.send(&data) {
                Ok(segment) => {
                    let _ = self.send_segment(key, entry.client_mac, &segment).await;
                }
                Err(_) => {
                    debug!(%key, state = ?session.state(), len = data.len(), "Upstream data outside established state dropped");
                }
            },
            UpstreamEvent::Eof => {
                if let Some(fin) = session.close_from_upstream() {
                    let _ = self.send_segment(key, entry.client_mac, &fin).await;
                }
            }
            UpstreamEvent::Failed(e) => {
                warn!(%key, "Upstream failed: {}", e);
                if let Some(rst) = session.abort() {
                    let _ = self.send_segment(key, entry.client_mac, &rst).await;
                }
            }
        }

        if session.is_closed() {
            drop(session);
            self.remove_session(key, entry);
            return false;
        }
        true
    }

    async fn abort_session(&self, key: &TcpSessionKey, entry: &Arc<SessionEntry>) {
        let rst = entry.session.lock().await.abort();
        if let Some(rst) = rst {
            let _ = self.send_segment(key, entry.client_mac, &rst).await;
        }
        self.remove_session(key, entry);
    }

    async fn send_udp(
        &self,
        src_ip: Ipv4Addr,
        src_port: u16,
        dst_ip: Ipv4Addr,
        dst_port: u16,
        payload: &[u8],
    ) -> Result<usize> {
        let datagram = UdpBuilder::new()
            .src_port(src_port)
            .dst_port(dst_port)
            .payload(payload)
            .build(src_ip, dst_ip);
        let packet = self.ipv4_packet(src_ip, dst_ip, Protocol::Udp, &datagram);

        if let Some(mac) = self.arp.try_get_mac(dst_ip) {
            self.send_ipv4(mac, &packet).await?;
            return Ok(1);
        }

        if self.is_broadcast(dst_ip) {
            return Ok(self.fan_out(&packet, None).await);
        }

        debug!("Sending ARP request for {}", dst_ip);
        let request = arp_proxy::build_request(self.local_mac, src_ip, dst_ip);
        self.metrics.arp_requests.inc();
        self.transmit(&request).await?;

        tokio::time::sleep(self.config.resolve_timeout).await;

        match self.arp.try_get_mac(dst_ip) {
            Some(mac) => {
                self.send_ipv4(mac, &packet).await?;
                Ok(1)
            }
            None => {
                warn!(%dst_ip, dst_port, "No ARP reply, datagram dropped");
                self.metrics.unresolved_drops.inc();
                Err(Error::Unresolved(dst_ip))
            }
        }
    }

    /// Periodic cleanup of closed sessions and expired ARP entries
    fn sweep(&self) {
        let closed: Vec<(TcpSessionKey, Arc<SessionEntry>)> = lock(&self.sessions)
            .iter()
            .filter(|(_, entry)| {
                entry
                    .session
                    .try_lock()
                    .map(|session| session.is_closed())
                    .unwrap_or(false)
            })
            .map(|(key, entry)| (*key, Arc::clone(entry)))
            .collect();

        for (key, entry) in &closed {
            self.remove_session(key, entry);
        }

        let expired = self.arp.cleanup_expired();
        if !closed.is_empty() || expired > 0 {
            debug!(sessions = closed.len(), arp = expired, "Sweep");
        }
    }
}
