//! ldn-bridge - LDN local play over a simulator room
//!
//! Emulates a small IPv4 subnet on a captured Ethernet link so a console can
//! run its local-wireless (LDN) session against a remote room. L2+ protocols
//! are implemented from scratch in userspace.

pub mod capture;
pub mod config;
pub mod dataplane;
pub mod error;
pub mod ldn;
pub mod protocol;
pub mod room;
pub mod telemetry;

pub use error::{Error, Result};
