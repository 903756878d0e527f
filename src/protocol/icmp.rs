//! ICMP protocol - RFC 792 (echo only)

use super::checksum::checksum;
use crate::{Error, Result};

/// ICMP header size (type, code, checksum, identifier, sequence)
pub const ICMP_HEADER_SIZE: usize = 8;

/// ICMP message types the engine cares about
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum IcmpType {
    EchoReply = 0,
    EchoRequest = 8,
}

/// Parsed ICMP message
#[derive(Debug, Clone, Copy)]
pub struct IcmpPacket<'a> {
    buffer: &'a [u8],
}

impl<'a> IcmpPacket<'a> {
    pub fn parse(buffer: &'a [u8]) -> Result<Self> {
        if buffer.len() < ICMP_HEADER_SIZE {
            return Err(Error::Parse("ICMP packet too short".into()));
        }
        Ok(Self { buffer })
    }

    pub fn icmp_type(&self) -> u8 {
        self.buffer[0]
    }

    pub fn code(&self) -> u8 {
        self.buffer[1]
    }

    pub fn checksum(&self) -> u16 {
        u16::from_be_bytes([self.buffer[2], self.buffer[3]])
    }

    pub fn identifier(&self) -> u16 {
        u16::from_be_bytes([self.buffer[4], self.buffer[5]])
    }

    pub fn sequence(&self) -> u16 {
        u16::from_be_bytes([self.buffer[6], self.buffer[7]])
    }

    pub fn payload(&self) -> &'a [u8] {
        &self.buffer[ICMP_HEADER_SIZE..]
    }

    /// Checksum covers the whole message, no pseudo-header
    pub fn validate_checksum(&self) -> bool {
        checksum(self.buffer) == 0
    }

    pub fn is_echo_request(&self) -> bool {
        self.icmp_type() == IcmpType::EchoRequest as u8
    }

    pub fn is_echo_reply(&self) -> bool {
        self.icmp_type() == IcmpType::EchoReply as u8
    }
}

/// Build an echo message
pub fn build_echo(kind: IcmpType, identifier: u16, sequence: u16, payload: &[u8]) -> Vec<u8> {
    let mut message = Vec::with_capacity(ICMP_HEADER_SIZE + payload.len());
    message.push(kind as u8);
    message.push(0);
    message.extend_from_slice(&[0, 0]);
    message.extend_from_slice(&identifier.to_be_bytes());
    message.extend_from_slice(&sequence.to_be_bytes());
    message.extend_from_slice(payload);

    let sum = checksum(&message);
    message[2..4].copy_from_slice(&sum.to_be_bytes());
    message
}

/// Build an Echo Reply carrying the identifier, sequence and payload of
/// `request`
pub fn build_echo_reply(request: &IcmpPacket<'_>) -> Result<Vec<u8>> {
    if !request.is_echo_request() {
        return Err(Error::InvalidPacket("not an echo request".into()));
    }
    Ok(build_echo(
        IcmpType::EchoReply,
        request.identifier(),
        request.sequence(),
        request.payload(),
    ))
}
