//! TCP protocol - RFC 793
//!
//! Header parsing, segment construction and checksum for the relay.

use super::checksum::pseudo_header_checksum;
use super::ipv4::Protocol;
use crate::{Error, Result};
use std::fmt;
use std::net::Ipv4Addr;

/// Minimum TCP header size (without options)
pub const MIN_HEADER_SIZE: usize = 20;

/// Receive window advertised on every segment we emit
pub const DEFAULT_WINDOW: u16 = 65535;

/// TCP flags
#[derive(Clone, Copy, Default, PartialEq, Eq)]
pub struct TcpFlags {
    pub fin: bool,
    pub syn: bool,
    pub rst: bool,
    pub psh: bool,
    pub ack: bool,
    pub urg: bool,
}

impl TcpFlags {
    pub const NONE: TcpFlags = TcpFlags {
        fin: false,
        syn: false,
        rst: false,
        psh: false,
        ack: false,
        urg: false,
    };
    pub const SYN: TcpFlags = TcpFlags {
        syn: true,
        ..TcpFlags::NONE
    };
    pub const ACK: TcpFlags = TcpFlags {
        ack: true,
        ..TcpFlags::NONE
    };
    pub const SYN_ACK: TcpFlags = TcpFlags {
        syn: true,
        ack: true,
        ..TcpFlags::NONE
    };
    pub const FIN_ACK: TcpFlags = TcpFlags {
        fin: true,
        ack: true,
        ..TcpFlags::NONE
    };
    pub const PSH_ACK: TcpFlags = TcpFlags {
        psh: true,
        ack: true,
        ..TcpFlags::NONE
    };
    pub const RST_ACK: TcpFlags = TcpFlags {
        rst: true,
        ack: true,
        ..TcpFlags::NONE
    };

    /// Parse flags from the 13th byte of TCP header
    pub fn from_byte(byte: u8) -> Self {
        Self {
            fin: byte & 0x01 != 0,
            syn: byte & 0x02 != 0,
            rst: byte & 0x04 != 0,
            psh: byte & 0x08 != 0,
            ack: byte & 0x10 != 0,
            urg: byte & 0x20 != 0,
        }
    }

    pub fn to_byte(&self) -> u8 {
        [
            (self.fin, 0x01),
            (self.syn, 0x02),
            (self.rst, 0x04),
            (self.psh, 0x08),
            (self.ack, 0x10),
            (self.urg, 0x20),
        ]
        .iter()
        .filter(|(set, _)| *set)
        .fold(0, |byte, (_, bit)| byte | bit)
    }

    /// Connection opening segment (SYN without ACK)
    pub fn is_syn_only(&self) -> bool {
        self.syn && !self.ack
    }
}

impl fmt::Debug for TcpFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = [
            (self.syn, "SYN"),
            (self.fin, "FIN"),
            (self.rst, "RST"),
            (self.psh, "PSH"),
            (self.ack, "ACK"),
            (self.urg, "URG"),
        ];
        let set: Vec<&str> = names
            .iter()
            .filter(|(on, _)| *on)
            .map(|(_, name)| *name)
            .collect();
        if set.is_empty() {
            write!(f, "-")
        } else {
            write!(f, "{}", set.join("|"))
        }
    }
}

/// Parsed TCP header (zero-copy reference)
#[derive(Debug, Clone, Copy)]
pub struct TcpHeader<'a> {
    buffer: &'a [u8],
    header_len: usize,
}

impl<'a> TcpHeader<'a> {
    /// Parse TCP header from buffer
    pub fn parse(buffer: &'a [u8]) -> Result<Self> {
        if buffer.len() < MIN_HEADER_SIZE {
            return Err(Error::Parse("TCP header too short".into()));
        }

        let header_len = (buffer[12] >> 4) as usize * 4;
        if header_len < MIN_HEADER_SIZE {
            return Err(Error::Parse("TCP data offset too small".into()));
        }
        if buffer.len() < header_len {
            return Err(Error::Parse("TCP header truncated".into()));
        }

        Ok(Self { buffer, header_len })
    }

    pub fn src_port(&self) -> u16 {
        u16::from_be_bytes([self.buffer[0], self.buffer[1]])
    }

    pub fn dst_port(&self) -> u16 {
        u16::from_be_bytes([self.buffer[2], self.buffer[3]])
    }

    pub fn seq_num(&self) -> u32 {
        u32::from_be_bytes([
            self.buffer[4],
            self.buffer[5],
            self.buffer[6],
            self.buffer[7],
        ])
    }

    pub fn ack_num(&self) -> u32 {
        u32::from_be_bytes([
            self.buffer[8],
            self.buffer[9],
            self.buffer[10],
            self.buffer[11],
        ])
    }

    pub fn flags(&self) -> TcpFlags {
        TcpFlags::from_byte(self.buffer[13])
    }

    pub fn window(&self) -> u16 {
        u16::from_be_bytes([self.buffer[14], self.buffer[15]])
    }

    pub fn checksum(&self) -> u16 {
        u16::from_be_bytes([self.buffer[16], self.buffer[17]])
    }

    /// Header length in bytes (data offset x 4)
    pub fn header_len(&self) -> usize {
        self.header_len
    }

    pub fn payload(&self) -> &'a [u8] {
        &self.buffer[self.header_len..]
    }

    /// Validate checksum with pseudo-header
    pub fn validate_checksum(&self, src_ip: Ipv4Addr, dst_ip: Ipv4Addr) -> bool {
        tcp_checksum(src_ip, dst_ip, self.buffer) == 0
    }
}

/// Builder for TCP segments
#[derive(Debug, Clone)]
pub struct TcpBuilder {
    src_port: u16,
    dst_port: u16,
    seq_num: u32,
    ack_num: u32,
    flags: TcpFlags,
    window: u16,
    options: Vec<u8>,
    payload: Vec<u8>,
}

impl TcpBuilder {
    pub fn new() -> Self {
        Self {
            src_port: 0,
            dst_port: 0,
            seq_num: 0,
            ack_num: 0,
            flags: TcpFlags::NONE,
            window: DEFAULT_WINDOW,
            options: Vec::new(),
            payload: Vec::new(),
        }
    }

    pub fn src_port(mut self, port: u16) -> Self {
        self.src_port = port;
        self
    }

    pub fn dst_port(mut self, port: u16) -> Self {
        self.dst_port = port;
        self
    }

    pub fn seq_num(mut self, seq: u32) -> Self {
        self.seq_num = seq;
        self
    }

    pub fn ack_num(mut self, ack: u32) -> Self {
        self.ack_num = ack;
        self
    }

    pub fn flags(mut self, flags: TcpFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn window(mut self, window: u16) -> Self {
        self.window = window;
        self
    }

    /// Raw option bytes, zero padded to a 4-byte boundary (at most 40 bytes)
    pub fn options(mut self, options: &[u8]) -> Self {
        self.options = options[..options.len().min(40)].to_vec();
        self
    }

    pub fn payload(mut self, data: &[u8]) -> Self {
        self.payload = data.to_vec();
        self
    }

    /// Build the segment with checksum
    pub fn build(self, src_ip: Ipv4Addr, dst_ip: Ipv4Addr) -> Vec<u8> {
        let options_len = self.options.len().div_ceil(4) * 4;
        let header_len = MIN_HEADER_SIZE + options_len;

        let mut buffer = Vec::with_capacity(header_len + self.payload.len());
        buffer.extend_from_slice(&self.src_port.to_be_bytes());
        buffer.extend_from_slice(&self.dst_port.to_be_bytes());
        buffer.extend_from_slice(&self.seq_num.to_be_bytes());
        buffer.extend_from_slice(&self.ack_num.to_be_bytes());
        buffer.push(((header_len / 4) as u8) << 4);
        buffer.push(self.flags.to_byte());
        buffer.extend_from_slice(&self.window.to_be_bytes());
        // Checksum and urgent pointer
        buffer.extend_from_slice(&[0, 0, 0, 0]);
        buffer.extend_from_slice(&self.options);
        buffer.resize(header_len, 0);
        buffer.extend_from_slice(&self.payload);

        let sum = tcp_checksum(src_ip, dst_ip, &buffer);
        buffer[16..18].copy_from_slice(&sum.to_be_bytes());
        buffer
    }
}

impl Default for TcpBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// TCP checksum over the IPv4 pseudo-header and the segment
pub fn tcp_checksum(src_ip: Ipv4Addr, dst_ip: Ipv4Addr, segment: &[u8]) -> u16 {
    pseudo_header_checksum(src_ip, dst_ip, Protocol::Tcp as u8, segment)
}
