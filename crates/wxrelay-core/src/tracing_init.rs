//! Shared tracing/logging initialization.
//!
//! Both binaries use an env-filter with an optional JSON formatter, so log
//! lines from the consumer and producer can go to the same aggregator.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialise the global tracing subscriber.
///
/// * `default_filter` -- used when `RUST_LOG` is unset or unparsable
///   (e.g. `"wxrelay_consumer=info"`).
/// * `log_json` -- emit structured JSON lines instead of the human-readable
///   format.
///
/// A second call is a no-op.
pub fn init_tracing(default_filter: &str, log_json: bool) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let (json, plain) = if log_json {
        (Some(fmt::layer().json()), None)
    } else {
        (None, Some(fmt::layer()))
    };
    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(json)
        .with(plain)
        .try_init();
}

/// Build the default filter for a binary crate at the given level.
pub fn crate_filter(target: &str, level: &str) -> String {
    format!("{target}={level},wxrelay_core={level}")
}
