//! The work-stealing scheduler that walks [`cadence_task::Graph`]s in
//! parallel across a fixed worker pool.
//!
//! Submission is `schedule(graph)`; everything else — per-worker
//! queues, stealing, sub-graph draining, sleep — runs on the pool's
//! own threads. See [`Scheduler`].

mod queue;
mod scheduler;
mod semaphore;

pub use scheduler::Scheduler;
