//! Zero-run length encoding used by LDN frames
//!
//! Non-zero bytes are copied verbatim. A run of N zero bytes (1..=255) is
//! written as `0x00, N - 1`; longer runs are split.

use crate::{Error, Result};

/// Scratch ceiling on either side of the codec
pub const MAX_BUFFER_SIZE: usize = 2048;

const MAX_RUN: usize = 255;

/// Compress `input`. Fails if the encoded form would exceed
/// [`MAX_BUFFER_SIZE`].
pub fn compress(input: &[u8]) -> Result<Vec<u8>> {
    let mut output = Vec::with_capacity(input.len().min(MAX_BUFFER_SIZE));
    let mut i = 0;

    while i < input.len() {
        let byte = input[i];
        let needed = if byte == 0 { 2 } else { 1 };
        if output.len() + needed > MAX_BUFFER_SIZE {
            return Err(Error::Rle(format!(
                "compressed output exceeds {} bytes",
                MAX_BUFFER_SIZE
            )));
        }

        if byte == 0 {
            let run = input[i..]
                .iter()
                .take(MAX_RUN)
                .take_while(|b| **b == 0)
                .count();
            output.push(0);
            output.push((run - 1) as u8);
            i += run;
        } else {
            output.push(byte);
            i += 1;
        }
    }

    Ok(output)
}

/// Expand `input`. Fails on a zero marker without a count byte or when the
/// expansion would exceed [`MAX_BUFFER_SIZE`].
pub fn decompress(input: &[u8]) -> Result<Vec<u8>> {
    let mut output = Vec::with_capacity(MAX_BUFFER_SIZE.min(input.len() * 2));
    let mut bytes = input.iter();

    while let Some(&byte) = bytes.next() {
        let run = if byte == 0 {
            let count = bytes
                .next()
                .ok_or_else(|| Error::Rle("zero marker without count".into()))?;
            *count as usize + 1
        } else {
            1
        };

        if output.len() + run > MAX_BUFFER_SIZE {
            return Err(Error::Rle(format!(
                "decompressed output exceeds {} bytes",
                MAX_BUFFER_SIZE
            )));
        }

        if byte == 0 {
            output.resize(output.len() + run, 0);
        } else {
            output.push(byte);
        }
    }

    Ok(output)
}
