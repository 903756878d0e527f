//! In-process link backed by channels

use super::Capture;
use crate::protocol::MacAddr;
use crate::{Error, Result};
use std::io;
use tokio::sync::{mpsc, Mutex};

/// Engine side of an in-memory link
pub struct MemoryCapture {
    local_mac: MacAddr,
    inbound: Mutex<mpsc::UnboundedReceiver<Vec<u8>>>,
    outbound: mpsc::UnboundedSender<Vec<u8>>,
}

/// Peer side of an in-memory link: plays the console
pub struct MemoryLink {
    inbound: mpsc::UnboundedSender<Vec<u8>>,
    outbound: mpsc::UnboundedReceiver<Vec<u8>>,
}

impl MemoryCapture {
    pub fn pair(local_mac: MacAddr) -> (MemoryCapture, MemoryLink) {
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        (
            MemoryCapture {
                local_mac,
                inbound: Mutex::new(in_rx),
                outbound: out_tx,
            },
            MemoryLink {
                inbound: in_tx,
                outbound: out_rx,
            },
        )
    }
}

impl Capture for MemoryCapture {
    fn local_mac(&self) -> MacAddr {
        self.local_mac
    }

    /// Frames longer than `buf` are truncated, as on a raw socket.
    /// Fails with [`Error::Shutdown`] once the link is dropped.
    async fn recv(&self, buf: &mut [u8]) -> Result<usize> {
        let frame = self.inbound.lock().await.recv().await.ok_or(Error::Shutdown)?;
        let len = frame.len().min(buf.len());
        buf[..len].copy_from_slice(&frame[..len]);
        Ok(len)
    }

    async fn send_raw(&self, frame: &[u8]) -> Result<usize> {
        self.outbound
            .send(frame.to_vec())
            .map_err(|_| Error::Io(io::Error::new(io::ErrorKind::BrokenPipe, "link closed")))?;
        Ok(frame.len())
    }
}

impl MemoryLink {
    /// Deliver a frame to the engine
    pub fn inject(&self, frame: impl Into<Vec<u8>>) -> Result<()> {
        self.inbound
            .send(frame.into())
            .map_err(|_| Error::Io(io::Error::new(io::ErrorKind::BrokenPipe, "engine side closed")))
    }

    /// Next frame the engine sent; `None` once the engine side is gone
    pub async fn next_frame(&mut self) -> Option<Vec<u8>> {
        self.outbound.recv().await
    }

    pub fn try_next_frame(&mut self) -> Option<Vec<u8>> {
        self.outbound.try_recv().ok()
    }

    /// Every frame sent so far
    pub fn drain(&mut self) -> Vec<Vec<u8>> {
        std::iter::from_fn(|| self.try_next_frame()).collect()
    }
}
