//! Tracing subscriber setup for binaries.
//!
//! The library itself only emits `tracing` events; installing a subscriber is
//! left to the executable.

use tracing_subscriber::EnvFilter;

/// Installs a global `fmt` subscriber.
///
/// # Arguments
///
/// - `log_level` - Fallback filter when `RUST_LOG` is not set (e.g. `"info"`)
/// - `log_format` - `"json"` for structured output, anything else for text
pub fn init_tracing(log_level: &str, log_format: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    if log_format == "json" {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
}
