//! Telemetry module for logging and metrics.
//!
//! Provides:
//! - Logging configuration and initialization
//! - Engine counters

mod logging;
mod metrics;

pub use logging::{init_logging, is_known_format, is_known_level, is_valid_directive, LogConfig};
pub use metrics::{Counter, EngineMetrics};
