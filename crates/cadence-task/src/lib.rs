//! Task graph primitives: nodes, precedence links, and join counters.
//!
//! A [`Graph`] owns an arena of [`Task`]s linked by precedence edges.
//! Scheduling a graph means walking from its root list (tasks with no
//! predecessors) outward, letting each task's [`Graph::try_join`] gate
//! when its successors become eligible. `cadence-sched` drives that walk
//! across a worker pool; this crate only defines the data it walks.

mod graph;
mod task;
mod work;

pub use graph::{Graph, GraphError};
pub use task::{Task, TaskIndex};
pub use work::{StaticFn, SwitchFn, Work};
