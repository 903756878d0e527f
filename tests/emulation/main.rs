//! Emulated-subnet scenarios over an in-memory link
//!
//! Each test starts a real engine on a `MemoryCapture` and plays the
//! console's side of the wire. No privileges needed.
//!
//! Run with: cargo test --test emulation

mod harness;

mod arp;
mod bridge;
mod icmp;
mod tcp;
mod udp;
