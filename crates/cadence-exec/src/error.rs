//! Errors surfaced by the `Expected`-style lookups on [`crate::Executor`].
//! Every other precondition violation in this crate aborts the process
//! immediately per spec, matching `cadence-task`/`cadence-ecs`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("no pipeline registered with hash {0:#x}")]
    PipelineNotFound(u64),

    #[error("no system registered at pipeline {pipeline} with hash {hash:#x}")]
    SystemNotFound { pipeline: usize, hash: u64 },

    #[error("pipeline index {0} is out of range")]
    InvalidPipelineIndex(usize),

    #[error("event queue for pipeline {0:#x} is full")]
    EventQueueFull(u64),

    #[error("failed to load executor configuration: {0}")]
    Config(#[from] config::ConfigError),
}
