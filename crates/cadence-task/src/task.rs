//! A single node in a [`crate::Graph`]'s task arena.

use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;

use crate::work::Work;

/// Index of a task within its owning graph's arena. Cheap, `Copy`, and
/// only meaningful relative to the `Graph` that produced it (REDESIGN
/// FLAG: precedence links are arena indices, not raw pointers — cycles
/// are a user error, never a memory-safety one).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskIndex(pub(crate) u32);

impl TaskIndex {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// A task node: its work, precedence links (as indices into the owning
/// graph), and a join counter.
///
/// Invariant (spec §3): a task becomes schedulable iff it has never run in
/// the current graph invocation and its join counter equals the number of
/// predecessors.
pub struct Task {
    pub(crate) work: Mutex<Work>,
    pub(crate) predecessors: Mutex<Vec<TaskIndex>>,
    pub(crate) successors: Mutex<Vec<TaskIndex>>,
    join_counter: AtomicUsize,
}

impl Task {
    pub(crate) fn new(work: Work) -> Self {
        Self {
            work: Mutex::new(work),
            predecessors: Mutex::new(Vec::new()),
            successors: Mutex::new(Vec::new()),
            join_counter: AtomicUsize::new(0),
        }
    }

    pub fn predecessor_count(&self) -> usize {
        self.predecessors.lock().len()
    }

    pub fn successors(&self) -> Vec<TaskIndex> {
        self.successors.lock().clone()
    }

    pub fn predecessors(&self) -> Vec<TaskIndex> {
        self.predecessors.lock().clone()
    }

    /// Atomically increments the join counter; returns `true` exactly once
    /// per invocation — when the counter reaches the predecessor count.
    pub(crate) fn try_join(&self) -> bool {
        let predecessor_count = self.predecessor_count();
        let prev = self.join_counter.fetch_add(1, Ordering::AcqRel);
        prev + 1 == predecessor_count
    }

    /// Resets the join counter to zero. Called by the owning graph at the
    /// start of every invocation.
    pub(crate) fn prepare_to_schedule(&self) {
        self.join_counter.store(0, Ordering::Release);
    }

    /// Clears this task's own precedence lists. Does not touch neighbours
    /// — unhooking from them is [`crate::Graph::reset_task`]'s job, since
    /// only the owning graph can reach the neighbour tasks that also need
    /// updating.
    pub(crate) fn clear_own_links(&self) {
        self.predecessors.lock().clear();
        self.successors.lock().clear();
        self.join_counter.store(0, Ordering::Release);
    }
}
