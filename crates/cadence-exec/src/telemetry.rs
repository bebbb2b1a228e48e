//! `tracing_subscriber` initialisation, grounded on the teacher's
//! workspace-wide `tracing`/`tracing-subscriber` usage: an `EnvFilter`
//! read from `CADENCE_LOG`, falling back to the configured default
//! level, with an optional JSON formatter.

use tracing_subscriber::{fmt, EnvFilter};

use crate::config::ExecutorConfig;

/// Installs the global `tracing` subscriber. Call once, first thing in
/// `main`. Idempotent-safe: a second call is a no-op (the underlying
/// `tracing` global default can only be set once per process).
pub fn init(config: &ExecutorConfig) {
    let filter = EnvFilter::try_from_env("CADENCE_LOG").unwrap_or_else(|_| EnvFilter::new(config.log_level.clone()));

    let subscriber = fmt().with_env_filter(filter);
    let result = if config.log_json {
        subscriber.json().try_init()
    } else {
        subscriber.try_init()
    };
    if result.is_err() {
        tracing::debug!("tracing subscriber already initialised");
    }
}
