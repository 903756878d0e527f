//! Internet checksum (RFC 1071)
//!
//! IPv4, ICMP, UDP and TCP all share this routine. UDP and TCP additionally
//! cover the IPv4 pseudo-header.

use std::net::Ipv4Addr;

/// Sum 16-bit big-endian words into a 32-bit accumulator.
/// An odd trailing byte is padded with zero.
fn sum_words(mut sum: u32, data: &[u8]) -> u32 {
    let mut chunks = data.chunks_exact(2);
    for chunk in &mut chunks {
        sum = sum.wrapping_add(u16::from_be_bytes([chunk[0], chunk[1]]) as u32);
    }
    if let [last] = chunks.remainder() {
        sum = sum.wrapping_add(u16::from_be_bytes([*last, 0]) as u32);
    }
    sum
}

fn fold(mut sum: u32) -> u16 {
    while sum >> 16 != 0 {
        sum = (sum & 0xFFFF) + (sum >> 16);
    }
    !(sum as u16)
}

/// One's-complement checksum over `data`.
///
/// When `data` already contains a correct checksum the result is 0, which is
/// how the verifying form works.
pub fn checksum(data: &[u8]) -> u16 {
    fold(sum_words(0, data))
}

/// One's-complement checksum over the 12-byte IPv4 pseudo-header followed by
/// `segment` (transport header + payload).
pub fn pseudo_header_checksum(
    src_ip: Ipv4Addr,
    dst_ip: Ipv4Addr,
    protocol: u8,
    segment: &[u8],
) -> u16 {
    let mut pseudo = [0u8; 12];
    pseudo[0..4].copy_from_slice(&src_ip.octets());
    pseudo[4..8].copy_from_slice(&dst_ip.octets());
    pseudo[9] = protocol;
    pseudo[10..12].copy_from_slice(&(segment.len() as u16).to_be_bytes());

    fold(sum_words(sum_words(0, &pseudo), segment))
}
