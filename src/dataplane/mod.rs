//! Data plane components
//!
//! The emulated subnet: ARP cache and proxy, TCP termination and relay, and
//! the engine that dispatches captured frames between them.

mod arp_cache;
pub mod arp_proxy;
mod engine;
pub mod tcp_session;
pub mod upstream;

pub use arp_cache::ArpCache;
pub use arp_proxy::{ArpAction, ArpProxy};
pub use engine::{EngineConfig, EngineEvent, PacketForwardEngine, TcpSegment, UdpDatagram};
pub use tcp_session::{TcpForwardSession, TcpSessionKey, TcpState};
