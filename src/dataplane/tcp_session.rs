//! TCP termination for one relayed connection
//!
//! The session plays the server side of a connection opened by the console.
//! It is a pure state machine: it consumes inbound segments and returns the
//! segment to emit plus any payload for the upstream side. No retransmission,
//! reordering or window management.

use crate::protocol::tcp::TcpFlags;
use crate::{Error, Result};
use std::fmt;
use std::net::Ipv4Addr;

/// Identity of a relayed connection, as seen on inbound segments
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TcpSessionKey {
    pub src_ip: Ipv4Addr,
    pub src_port: u16,
    pub dst_ip: Ipv4Addr,
    pub dst_port: u16,
}

impl fmt::Display for TcpSessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{} -> {}:{}",
            self.src_ip, self.src_port, self.dst_ip, self.dst_port
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TcpState {
    Listen,
    SynReceived,
    Established,
    /// Upstream finished and our FIN is out; the console may still send
    CloseWait,
    LastAck,
    Closed,
}

/// Fields of an inbound segment the session looks at
#[derive(Debug, Clone, Copy)]
pub struct InboundSegment<'a> {
    pub flags: TcpFlags,
    pub seq: u32,
    pub ack: u32,
    pub payload: &'a [u8],
}

/// Segment to send back to the console (addresses/ports come from the key)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundSegment {
    pub flags: TcpFlags,
    pub seq: u32,
    pub ack: u32,
    pub payload: Vec<u8>,
}

/// What the caller has to do after feeding a segment
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionOutput {
    pub reply: Option<OutboundSegment>,
    pub upstream: Option<Vec<u8>>,
}

impl SessionOutput {
    fn reply(segment: OutboundSegment) -> Self {
        Self {
            reply: Some(segment),
            upstream: None,
        }
    }
}

#[derive(Debug)]
pub struct TcpForwardSession {
    key: TcpSessionKey,
    state: TcpState,
    initial_seq: u32,
    /// Next sequence number we send
    server_seq: u32,
    /// Next sequence number expected from the console
    client_ack: u32,
    /// Sequence number of the console's SYN
    client_isn: u32,
}

impl TcpForwardSession {
    /// New session in `Listen`; `initial_seq` is our ISN
    pub fn new(key: TcpSessionKey, initial_seq: u32) -> Self {
        Self {
            key,
            state: TcpState::Listen,
            initial_seq,
            server_seq: initial_seq,
            client_ack: 0,
            client_isn: 0,
        }
    }

    pub fn key(&self) -> TcpSessionKey {
        self.key
    }

    pub fn state(&self) -> TcpState {
        self.state
    }

    pub fn server_seq(&self) -> u32 {
        self.server_seq
    }

    pub fn client_ack(&self) -> u32 {
        self.client_ack
    }

    pub fn is_closed(&self) -> bool {
        self.state == TcpState::Closed
    }

    fn segment(&self, flags: TcpFlags, payload: Vec<u8>) -> OutboundSegment {
        OutboundSegment {
            flags,
            seq: self.server_seq,
            ack: self.client_ack,
            payload,
        }
    }

    fn syn_ack(&self) -> OutboundSegment {
        OutboundSegment {
            flags: TcpFlags::SYN_ACK,
            seq: self.initial_seq,
            ack: self.client_isn.wrapping_add(1),
            payload: Vec::new(),
        }
    }

    /// Feed one inbound segment
    pub fn handle(&mut self, segment: &InboundSegment<'_>) -> SessionOutput {
        if self.state == TcpState::Closed {
            return SessionOutput::default();
        }

        if segment.flags.rst {
            self.state = TcpState::Closed;
            return SessionOutput::default();
        }

        match self.state {
            TcpState::Listen => self.on_listen(segment),
            TcpState::SynReceived => {
                if segment.flags.is_syn_only() {
                    if segment.seq == self.client_isn {
                        return SessionOutput::reply(self.syn_ack());
                    }
                    return SessionOutput::default();
                }
                if !segment.flags.ack {
                    return SessionOutput::default();
                }
                self.state = TcpState::Established;
                self.on_established(segment)
            }
            TcpState::Established => self.on_established(segment),
            TcpState::CloseWait => self.on_close_wait(segment),
            TcpState::LastAck => {
                if segment.flags.fin {
                    // Our ACK|FIN was lost; repeat it
                    let mut seg = self.segment(TcpFlags::FIN_ACK, Vec::new());
                    seg.seq = self.server_seq.wrapping_sub(1);
                    return SessionOutput::reply(seg);
                }
                if segment.flags.ack {
                    self.state = TcpState::Closed;
                }
                SessionOutput::default()
            }
            TcpState::Closed => SessionOutput::default(),
        }
    }

    fn on_listen(&mut self, segment: &InboundSegment<'_>) -> SessionOutput {
        if !segment.flags.is_syn_only() {
            return SessionOutput::default();
        }

        self.client_isn = segment.seq;
        self.client_ack = segment.seq.wrapping_add(1);
        self.server_seq = self.initial_seq.wrapping_add(1);
        self.state = TcpState::SynReceived;
        SessionOutput::reply(self.syn_ack())
    }

    /// Accept in-order payload. Returns false when the segment is out of
    /// order and must only be re-acknowledged.
    fn accept_payload(&mut self, segment: &InboundSegment<'_>) -> bool {
        if segment.seq != self.client_ack {
            return false;
        }
        self.client_ack = self
            .client_ack
            .wrapping_add(segment.payload.len() as u32);
        true
    }

    /// Take the console's FIN wherever it lands: `client_ack` moves past it
    /// regardless of order. Its payload is forwarded only when in order.
    fn accept_fin(&mut self, segment: &InboundSegment<'_>) -> Option<Vec<u8>> {
        let in_order = segment.seq == self.client_ack;
        self.client_ack = segment
            .seq
            .wrapping_add(segment.payload.len() as u32)
            .wrapping_add(1);
        (in_order && !segment.payload.is_empty()).then(|| segment.payload.to_vec())
    }

    fn on_established(&mut self, segment: &InboundSegment<'_>) -> SessionOutput {
        if segment.flags.fin {
            let upstream = self.accept_fin(segment);
            let reply = self.segment(TcpFlags::FIN_ACK, Vec::new());
            self.server_seq = self.server_seq.wrapping_add(1);
            self.state = TcpState::LastAck;
            return SessionOutput {
                reply: Some(reply),
                upstream,
            };
        }

        if segment.payload.is_empty() {
            return SessionOutput::default();
        }
        if !self.accept_payload(segment) {
            return SessionOutput::reply(self.segment(TcpFlags::ACK, Vec::new()));
        }
        let upstream = Some(segment.payload.to_vec());

        SessionOutput {
            reply: Some(self.segment(TcpFlags::ACK, Vec::new())),
            upstream,
        }
    }

    fn on_close_wait(&mut self, segment: &InboundSegment<'_>) -> SessionOutput {
        let upstream = if segment.flags.fin {
            let upstream = self.accept_fin(segment);
            self.state = TcpState::Closed;
            upstream
        } else if segment.payload.is_empty() {
            return SessionOutput::default();
        } else if self.accept_payload(segment) {
            Some(segment.payload.to_vec())
        } else {
            return SessionOutput::reply(self.segment(TcpFlags::ACK, Vec::new()));
        };

        SessionOutput {
            reply: Some(self.segment(TcpFlags::ACK, Vec::new())),
            upstream,
        }
    }

    /// Wrap upstream bytes in a PSH|ACK segment. Only valid while
    /// established.
    pub fn send(&mut self, payload: &[u8]) -> Result<OutboundSegment> {
        if self.state != TcpState::Established {
            return Err(Error::SessionClosed);
        }
        let segment = self.segment(TcpFlags::PSH_ACK, payload.to_vec());
        self.server_seq = self.server_seq.wrapping_add(payload.len() as u32);
        Ok(segment)
    }

    /// Upstream reached EOF: send our FIN
    pub fn close_from_upstream(&mut self) -> Option<OutboundSegment> {
        match self.state {
            TcpState::Established => {
                let segment = self.segment(TcpFlags::FIN_ACK, Vec::new());
                self.server_seq = self.server_seq.wrapping_add(1);
                self.state = TcpState::CloseWait;
                Some(segment)
            }
            TcpState::SynReceived => self.abort(),
            _ => None,
        }
    }

    /// Tear the connection down with RST|ACK
    pub fn abort(&mut self) -> Option<OutboundSegment> {
        match self.state {
            TcpState::Listen | TcpState::Closed => {
                self.state = TcpState::Closed;
                None
            }
            _ => {
                let segment = self.segment(TcpFlags::RST_ACK, Vec::new());
                self.state = TcpState::Closed;
                Some(segment)
            }
        }
    }
}
