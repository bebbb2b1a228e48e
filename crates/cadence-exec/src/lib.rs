//! The multi-pipeline executor: owns pipelines, builds their task
//! graphs from each system's tick/internal-graph pair, drives them at
//! configured frequencies through a precise-sleep main loop, and pumps
//! cross-pipeline events (spec §4.G).

mod config;
mod dependency;
mod error;
mod executor;
mod pipeline;
pub mod telemetry;
mod timing;

pub use config::ExecutorConfig;
pub use dependency::Dependency;
pub use error::ExecutorError;
pub use executor::{Executor, ExecutorEvent, ShutdownHandle};
pub use pipeline::{BeginPass, Pipeline, TimeMode};
pub use timing::SleepEstimator;

/// Hashes a name the same way everywhere a pipeline or system is
/// looked up by hash (spec §4.G `getPipelineIndex`/`getSystemIndex`).
pub fn hash_name(name: &str) -> u64 {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    name.hash(&mut hasher);
    hasher.finish()
}
