//! Wire codecs for the emulated subnet
//!
//! Views borrow the receive buffer; builders produce owned byte vectors with
//! every length and checksum field filled in.

pub mod arp;
pub mod checksum;
pub mod ethernet;
pub mod icmp;
pub mod ipv4;
pub mod tcp;
pub mod types;
pub mod udp;

pub use types::*;
