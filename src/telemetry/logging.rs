//! `tracing` subscriber setup.
//!
//! The filter comes from `RUST_LOG` when it is set, otherwise from the
//! `[logging]` section: a base level plus optional per-module directives
//! such as `ldn_bridge::dataplane=trace` for packet-level output.

use serde::{Deserialize, Serialize};
use tracing::Level;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

/// `[logging]` section of the config file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct LogConfig {
    /// Base level: error, warn, info, debug, trace
    pub level: String,
    /// Output format: pretty, compact, json
    pub format: String,
    /// Extra `target=level` directives layered over `level`
    pub directives: Vec<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            directives: Vec::new(),
        }
    }
}

impl LogConfig {
    /// Filter string handed to [`EnvFilter`]. Unknown levels fall back to
    /// info and directives that do not parse are skipped.
    pub fn filter(&self) -> String {
        let mut filter = parse_level(&self.level).as_str().to_lowercase();
        for directive in self.directives.iter().filter(|d| is_valid_directive(d)) {
            filter.push(',');
            filter.push_str(directive.trim());
        }
        filter
    }
}

/// Installs the global subscriber. Later calls are no-ops.
pub fn init_logging(config: Option<&LogConfig>) {
    let filter = match std::env::var("RUST_LOG") {
        Ok(_) => EnvFilter::from_default_env(),
        Err(_) => EnvFilter::new(config.map(LogConfig::filter).unwrap_or_else(|| "info".into())),
    };
    let registry = tracing_subscriber::registry().with(filter);

    let installed = match config.map(|c| c.format.as_str()) {
        Some("json") => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(false)
                    .with_span_events(FmtSpan::CLOSE),
            )
            .try_init(),
        Some("compact") => registry
            .with(tracing_subscriber::fmt::layer().compact().with_target(false))
            .try_init(),
        _ => registry.with(tracing_subscriber::fmt::layer()).try_init(),
    };
    // A subscriber may already be installed, e.g. by a test harness.
    let _ = installed;
}

fn parse_level(level: &str) -> Level {
    level.trim().parse().unwrap_or(Level::INFO)
}

/// True for the formats [`init_logging`] understands.
pub fn is_known_format(format: &str) -> bool {
    matches!(format, "pretty" | "compact" | "json")
}

/// True for the levels [`init_logging`] understands.
pub fn is_known_level(level: &str) -> bool {
    level.trim().parse::<Level>().is_ok()
}

/// True if `directive` is a single `target=level` pair.
pub fn is_valid_directive(directive: &str) -> bool {
    let directive = directive.trim();
    !directive.is_empty() && !directive.contains(',') && directive.parse::<tracing_subscriber::filter::Directive>().is_ok()
}
