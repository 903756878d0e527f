//! Link-layer capture backends
//!
//! - AF_PACKET: raw socket on a real interface
//! - Memory: in-process link for tests and dry runs

mod af_packet;
mod memory;

pub use af_packet::{interface_mac, AfPacketSocket};
pub use memory::{MemoryCapture, MemoryLink};

use crate::protocol::MacAddr;
use crate::Result;
use std::future::Future;

/// Frame capture and injection on the console's link
///
/// Receive and send take `&self` so the receive loop and any number of
/// senders can share one backend.
pub trait Capture: Send + Sync + 'static {
    /// Hardware address frames are sent from
    fn local_mac(&self) -> MacAddr;

    /// Receive one frame into `buf`, returning its length
    fn recv(&self, buf: &mut [u8]) -> impl Future<Output = Result<usize>> + Send;

    /// Inject one complete Ethernet frame
    fn send_raw(&self, frame: &[u8]) -> impl Future<Output = Result<usize>> + Send;
}
