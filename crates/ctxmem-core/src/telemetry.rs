//! Tracing subscriber setup for processes embedding the context memory.
//!
//! Library code only emits `tracing` events; installing a subscriber is the
//! host's job. [`init_tracing`] is a convenience for hosts and tests.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Variable selecting the output format when using [`init_tracing_from_env`].
pub const LOG_FORMAT_ENV: &str = "CTXMEM_LOG_FORMAT";

/// Install a global subscriber filtered by `RUST_LOG`, falling back to
/// `level`. With `json` set, events are written as newline-delimited JSON.
///
/// Only the first call in a process takes effect.
pub fn init_tracing(json: bool, level: Level) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));
    let registry = tracing_subscriber::registry().with(filter);

    let installed = if json {
        registry
            .with(fmt::layer().with_target(false).json())
            .try_init()
    } else {
        registry.with(fmt::layer().with_target(false)).try_init()
    };
    if installed.is_err() {
        tracing::debug!("global subscriber already installed");
    }
}

/// [`init_tracing`] at `INFO`, using JSON when `CTXMEM_LOG_FORMAT=json`.
pub fn init_tracing_from_env() {
    let json = std::env::var(LOG_FORMAT_ENV)
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    init_tracing(json, Level::INFO);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_init_is_harmless() {
        init_tracing(false, Level::DEBUG);
        init_tracing(true, Level::INFO);
        init_tracing_from_env();
        tracing::info!("subscriber installed");
    }
}
