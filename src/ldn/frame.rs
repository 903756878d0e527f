//! LDN frame header codec
//!
//! Layout (little-endian):
//! ```text
//! 0..4   magic
//! 4      kind
//! 5      compressed flag (0/1)
//! 6..8   payload length on the wire
//! 8..10  payload length before compression
//! 10..12 reserved (zero)
//! ```

use super::kind::LdnPacketType;
use super::rle;
use crate::{Error, Result};
use tracing::{trace, warn};

/// Fixed magic at the start of every frame
pub const MAGIC: u32 = 0x1145_1400;

/// Header size in bytes
pub const HEADER_SIZE: usize = 12;

/// Decoded LDN frame. `payload` is always the expanded form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LdnFrame {
    pub magic: u32,
    pub kind: u8,
    pub compressed: bool,
    /// Payload length as carried on the wire
    pub length: u16,
    /// Original length declared by the sender (0 when not compressed)
    pub decompressed_length: u16,
    pub payload: Vec<u8>,
}

impl LdnFrame {
    /// Parse a frame from UDP payload bytes.
    ///
    /// Fails on a short buffer, wrong magic, a declared length past the end
    /// of the buffer, or a payload that does not decompress.
    pub fn parse(buffer: &[u8]) -> Result<Self> {
        if buffer.len() < HEADER_SIZE {
            return Err(Error::Parse(format!(
                "LDN frame too short: {} bytes",
                buffer.len()
            )));
        }

        let magic = u32::from_le_bytes([buffer[0], buffer[1], buffer[2], buffer[3]]);
        if magic != MAGIC {
            return Err(Error::Parse(format!("LDN magic mismatch: {magic:#010x}")));
        }

        let kind = buffer[4];
        let compressed = buffer[5] == 1;
        let length = u16::from_le_bytes([buffer[6], buffer[7]]);
        let decompressed_length = u16::from_le_bytes([buffer[8], buffer[9]]);

        let end = HEADER_SIZE + length as usize;
        if end > buffer.len() {
            return Err(Error::Parse(format!(
                "LDN length {} exceeds {} available bytes",
                length,
                buffer.len() - HEADER_SIZE
            )));
        }

        let raw = &buffer[HEADER_SIZE..end];
        let payload = if compressed && !raw.is_empty() {
            let expanded = rle::decompress(raw)?;
            if expanded.len() != decompressed_length as usize {
                warn!(
                    expected = decompressed_length,
                    actual = expanded.len(),
                    "LDN decompressed length mismatch"
                );
            }
            trace!(from = raw.len(), to = expanded.len(), "LDN payload expanded");
            expanded
        } else {
            raw.to_vec()
        };

        Ok(Self {
            magic,
            kind,
            compressed,
            length,
            decompressed_length,
            payload,
        })
    }

    /// Console kind, if the header carries a known value
    pub fn packet_type(&self) -> Option<LdnPacketType> {
        LdnPacketType::from_u8(self.kind)
    }
}

/// Build a frame around `payload`.
///
/// The payload is compressed only when that makes it strictly smaller;
/// otherwise it is sent as-is.
pub fn build(kind: LdnPacketType, payload: &[u8]) -> Vec<u8> {
    let (body, compressed, decompressed_length) = match rle::compress(payload) {
        Ok(packed) if !payload.is_empty() && packed.len() < payload.len() => {
            (packed, true, payload.len() as u16)
        }
        _ => (payload.to_vec(), false, 0),
    };

    let mut frame = Vec::with_capacity(HEADER_SIZE + body.len());
    frame.extend_from_slice(&MAGIC.to_le_bytes());
    frame.push(kind as u8);
    frame.push(compressed as u8);
    frame.extend_from_slice(&(body.len() as u16).to_le_bytes());
    frame.extend_from_slice(&decompressed_length.to_le_bytes());
    frame.extend_from_slice(&[0, 0]);
    frame.extend_from_slice(&body);
    frame
}
