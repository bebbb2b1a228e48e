//! Layered executor configuration: built-in defaults, an optional
//! `Cadence.toml` in the working directory, then `CADENCE_*` environment
//! overrides — the same file-over-defaults, env-over-file layering the
//! teacher's configuration crate uses, expressed with the `config` crate
//! instead of a hand-rolled loader.

use serde::Deserialize;

use crate::error::ExecutorError;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Worker thread count for the scheduler pool. Falls back to
    /// hardware concurrency (floor of 4 on detection failure) when the
    /// config layers don't override it.
    pub worker_count: usize,
    /// Capacity of each worker's local queue.
    pub local_queue_capacity: usize,
    /// Default event queue size used when `addPipeline` passes 0.
    pub default_event_queue_size: usize,
    /// `tracing_subscriber` filter directive used by [`crate::telemetry::init`]
    /// when `CADENCE_LOG` is unset.
    pub log_level: String,
    /// Emit JSON-formatted log lines instead of the default text format.
    pub log_json: bool,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            worker_count: cadence_sched::Scheduler::default_worker_count(),
            local_queue_capacity: 256,
            default_event_queue_size: 4096,
            log_level: "info".to_string(),
            log_json: false,
        }
    }
}

impl ExecutorConfig {
    /// Loads defaults, then `./Cadence.toml` if present, then `CADENCE_*`
    /// environment variables, in that precedence order.
    pub fn load() -> Result<Self, ExecutorError> {
        let defaults = Self::default();
        let builder = config::Config::builder()
            .set_default("worker_count", defaults.worker_count as i64)?
            .set_default("local_queue_capacity", defaults.local_queue_capacity as i64)?
            .set_default("default_event_queue_size", defaults.default_event_queue_size as i64)?
            .set_default("log_level", defaults.log_level.clone())?
            .set_default("log_json", defaults.log_json)?
            .add_source(config::File::with_name("Cadence").required(false))
            .add_source(config::Environment::with_prefix("CADENCE").try_parsing(true));
        Ok(builder.build()?.try_deserialize()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_have_a_nonzero_worker_count() {
        let cfg = ExecutorConfig::default();
        assert!(cfg.worker_count >= 1);
        assert_eq!(cfg.default_event_queue_size, 4096);
    }

    #[test]
    fn load_falls_back_to_defaults_without_a_config_file() {
        let cfg = ExecutorConfig::load().expect("layered defaults alone must build");
        assert_eq!(cfg.log_level, "info");
    }
}
