//! Parallel task-graph scheduler and ECS executor for real-time
//! applications: a bucketed allocator, a work-stealing scheduler over
//! a task graph abstraction, sparse/stable ECS component tables, a
//! typed system layer, a multi-pipeline executor, and an embedded
//! resource façade, each in its own `cadence-*` crate.
//!
//! This crate re-exports the pieces most applications need under one
//! `prelude` module; reach into the individual `cadence-*` crates
//! directly for anything not re-exported here.

pub use cadence_alloc as alloc;
pub use cadence_ecs as ecs;
pub use cadence_exec as exec;
pub use cadence_io as io;
pub use cadence_sched as sched;
pub use cadence_system as system;
pub use cadence_task as task;

pub mod prelude {
    pub use cadence_alloc::{BucketAllocator, StaticAllocator, SyncBucketAllocator};
    pub use cadence_ecs::{DenseTable, Entity, EntityAllocator, StableTable};
    pub use cadence_exec::{
        BeginPass, Dependency, Executor, ExecutorConfig, ExecutorError, ExecutorEvent, Pipeline, ShutdownHandle, TimeMode,
    };
    pub use cadence_io::{File, FileError, OpenMode, ResourceManager};
    pub use cadence_sched::Scheduler;
    pub use cadence_system::{ComponentSet, EventRouter, PipelineEvent, PipelineSystem, PipelineTag, System, SystemMeta, Tick};
    pub use cadence_task::{Graph, Task, TaskIndex, Work};
}
