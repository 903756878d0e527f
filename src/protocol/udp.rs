//! UDP protocol - RFC 768

use super::checksum::pseudo_header_checksum;
use super::ipv4::Protocol;
use crate::{Error, Result};
use std::net::Ipv4Addr;

/// UDP header size
pub const HEADER_SIZE: usize = 8;

/// Parsed UDP header (zero-copy reference)
#[derive(Debug, Clone, Copy)]
pub struct UdpHeader<'a> {
    buffer: &'a [u8],
    payload_end: usize,
}

impl<'a> UdpHeader<'a> {
    /// Parse UDP header from buffer
    pub fn parse(buffer: &'a [u8]) -> Result<Self> {
        if buffer.len() < HEADER_SIZE {
            return Err(Error::Parse("UDP header too short".into()));
        }
        let length = u16::from_be_bytes([buffer[4], buffer[5]]) as usize;
        let payload_end = length.clamp(HEADER_SIZE, buffer.len());
        Ok(Self {
            buffer,
            payload_end,
        })
    }

    pub fn src_port(&self) -> u16 {
        u16::from_be_bytes([self.buffer[0], self.buffer[1]])
    }

    pub fn dst_port(&self) -> u16 {
        u16::from_be_bytes([self.buffer[2], self.buffer[3]])
    }

    /// Length field (header + payload)
    pub fn length(&self) -> u16 {
        u16::from_be_bytes([self.buffer[4], self.buffer[5]])
    }

    pub fn checksum(&self) -> u16 {
        u16::from_be_bytes([self.buffer[6], self.buffer[7]])
    }

    pub fn payload(&self) -> &'a [u8] {
        &self.buffer[HEADER_SIZE..self.payload_end]
    }

    /// Validate checksum with pseudo-header. A zero checksum means "not
    /// computed" and is accepted.
    pub fn validate_checksum(&self, src_ip: Ipv4Addr, dst_ip: Ipv4Addr) -> bool {
        self.checksum() == 0
            || udp_checksum(src_ip, dst_ip, &self.buffer[..self.payload_end]) == 0
    }
}

/// Builder for UDP datagrams
#[derive(Debug, Clone, Default)]
pub struct UdpBuilder {
    src_port: u16,
    dst_port: u16,
    payload: Vec<u8>,
}

impl UdpBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn src_port(mut self, port: u16) -> Self {
        self.src_port = port;
        self
    }

    pub fn dst_port(mut self, port: u16) -> Self {
        self.dst_port = port;
        self
    }

    pub fn payload(mut self, data: &[u8]) -> Self {
        self.payload = data.to_vec();
        self
    }

    /// Build the UDP datagram with checksum
    pub fn build(self, src_ip: Ipv4Addr, dst_ip: Ipv4Addr) -> Vec<u8> {
        let length = (HEADER_SIZE + self.payload.len()) as u16;
        let mut buffer = Vec::with_capacity(length as usize);
        buffer.extend_from_slice(&self.src_port.to_be_bytes());
        buffer.extend_from_slice(&self.dst_port.to_be_bytes());
        buffer.extend_from_slice(&length.to_be_bytes());
        buffer.extend_from_slice(&[0, 0]);
        buffer.extend_from_slice(&self.payload);

        // 0 on the wire means "no checksum"
        let sum = match udp_checksum(src_ip, dst_ip, &buffer) {
            0 => 0xFFFF,
            sum => sum,
        };
        buffer[6..8].copy_from_slice(&sum.to_be_bytes());
        buffer
    }
}

/// UDP checksum over the IPv4 pseudo-header and the datagram
pub fn udp_checksum(src_ip: Ipv4Addr, dst_ip: Ipv4Addr, datagram: &[u8]) -> u16 {
    pseudo_header_checksum(src_ip, dst_ip, Protocol::Udp as u8, datagram)
}
