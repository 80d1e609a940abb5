//! Logging initialization for QuillClaw.
//!
//! Two formats:
//! - compact: default tracing text output with targets, grep-friendly
//! - json: structured JSON lines for log aggregators
//!
//! Hosts that already install their own subscriber should skip this and
//! just let the crate's `tracing` events flow into it.

use crate::config::LoggingConfig;

/// Initialize the global tracing subscriber from config.
///
/// Call once at startup before any tracing events are emitted.
/// Falls back to the `RUST_LOG` env var; if unset, uses `cfg.level`.
pub fn init(cfg: &LoggingConfig) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cfg.level));

    if cfg.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .compact()
            .init();
    }
}
