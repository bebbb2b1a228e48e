//! Owned collection of tasks with precomputed root list and running state.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, RwLock};

use crate::task::{Task, TaskIndex};
use crate::work::Work;

/// Logic errors raised by mutating a graph at the wrong time. The default
/// call paths (`add`, `remove`, `clear`) abort immediately per spec §7;
/// [`Graph::try_add`] and friends exist for callers that want the
/// `Result` instead of a process abort.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error("cannot mutate a graph while it is running")]
    MutatingWhileRunning,
    #[error("task index {0:?} does not belong to this graph or was removed")]
    InvalidIndex(TaskIndex),
}

struct Slot {
    task: Task,
    removed: bool,
}

/// A collection of tasks linked by precedence, scheduled together as one
/// unit. Mutating the task list (`add`/`remove`/`clear`) while
/// [`Graph::running`] is `true` is a logic error (spec §4.C invariant).
pub struct Graph {
    slots: RwLock<Vec<Slot>>,
    /// Cached root list (tasks with no predecessors); `None` means it must
    /// be recomputed on the next `prepare_to_schedule`.
    roots_cache: Mutex<Option<Vec<TaskIndex>>>,
    active_task_count: AtomicUsize,
    running: AtomicBool,
    idle: Condvar,
    idle_lock: Mutex<()>,
}

impl Graph {
    pub fn new() -> Self {
        Self {
            slots: RwLock::new(Vec::new()),
            roots_cache: Mutex::new(Some(Vec::new())),
            active_task_count: AtomicUsize::new(0),
            running: AtomicBool::new(false),
            idle: Condvar::new(),
            idle_lock: Mutex::new(()),
        }
    }

    fn abort_if_running(&self) {
        if self.running.load(Ordering::Acquire) {
            tracing::error!("cadence-task: mutated a running graph");
            std::process::abort();
        }
    }

    /// Adds a task carrying `work`, returning its index. Aborts if the
    /// graph is currently running.
    pub fn add(&self, work: Work) -> TaskIndex {
        self.abort_if_running();
        let mut slots = self.slots.write();
        let idx = TaskIndex(slots.len() as u32);
        slots.push(Slot {
            task: Task::new(work),
            removed: false,
        });
        drop(slots);
        *self.roots_cache.lock() = None;
        idx
    }

    /// Adds a precedence link: `before` must complete before `after`
    /// starts. Does not check for cycles — the caller is trusted; a cycle
    /// hangs the graph at run time rather than corrupting memory (spec
    /// §4.B).
    pub fn link(&self, before: TaskIndex, after: TaskIndex) {
        self.abort_if_running();
        let slots = self.slots.read();
        slots[before.index()].task.successors.lock().push(after);
        slots[after.index()].task.predecessors.lock().push(before);
        drop(slots);
        *self.roots_cache.lock() = None;
    }

    /// Unhooks `idx` from every neighbour's precedence lists and clears
    /// its own, without removing the slot. Required before the task's
    /// links are rebuilt or the task is removed.
    pub fn reset_task(&self, idx: TaskIndex) {
        self.abort_if_running();
        let slots = self.slots.read();
        let successors = slots[idx.index()].task.successors();
        let predecessors = slots[idx.index()].task.predecessors();
        for s in successors {
            slots[s.index()]
                .task
                .predecessors
                .lock()
                .retain(|&p| p != idx);
        }
        for p in predecessors {
            slots[p.index()]
                .task
                .successors
                .lock()
                .retain(|&s| s != idx);
        }
        slots[idx.index()].task.clear_own_links();
        drop(slots);
        *self.roots_cache.lock() = None;
    }

    /// Removes a task: unhooks it from neighbours and tombstones its slot
    /// (the slot stays allocated so existing `TaskIndex` values elsewhere
    /// remain meaningful; only this graph's own bookkeeping skips it).
    pub fn remove(&self, idx: TaskIndex) {
        self.reset_task(idx);
        self.slots.write()[idx.index()].removed = true;
        *self.roots_cache.lock() = None;
    }

    /// Drops every task, resetting the graph to empty.
    pub fn clear(&self) {
        self.abort_if_running();
        self.slots.write().clear();
        *self.roots_cache.lock() = Some(Vec::new());
    }

    /// Number of live (non-removed) tasks.
    pub fn count(&self) -> usize {
        self.slots.read().iter().filter(|s| !s.removed).count()
    }

    pub fn running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Called by the scheduler when it begins executing this graph.
    /// Rejects re-entry (returns `false`) if the graph is already running;
    /// otherwise resets every task's join counter and returns the
    /// (possibly cached) root list.
    pub fn prepare_to_schedule(&self) -> Option<Vec<TaskIndex>> {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return None;
        }
        let slots = self.slots.read();
        let live = slots.iter().filter(|s| !s.removed).count();
        for slot in slots.iter() {
            if !slot.removed {
                slot.task.prepare_to_schedule();
            }
        }
        self.active_task_count.store(live, Ordering::Release);

        if live == 0 {
            // No tasks to join later, so nothing will ever flip `running`
            // back to false on our behalf — do it now or an empty graph
            // (every freshly-`System::new()`-built one, until it gets
            // tasks added) would hang its scheduling caller forever.
            drop(slots);
            self.running.store(false, Ordering::Release);
            let _g = self.idle_lock.lock();
            self.idle.notify_all();
            return Some(Vec::new());
        }

        let mut cache = self.roots_cache.lock();
        if cache.is_none() {
            let roots = slots
                .iter()
                .enumerate()
                .filter(|(_, s)| !s.removed && s.task.predecessor_count() == 0)
                .map(|(i, _)| TaskIndex(i as u32))
                .collect();
            *cache = Some(roots);
        }
        Some(cache.clone().unwrap_or_default())
    }

    /// Attempts to mark `idx` joined (a predecessor completed). Returns
    /// `true` exactly once per invocation, when the join counter reaches
    /// the predecessor count.
    pub fn try_join(&self, idx: TaskIndex) -> bool {
        self.slots.read()[idx.index()].task.try_join()
    }

    pub fn successors_of(&self, idx: TaskIndex) -> Vec<TaskIndex> {
        self.slots.read()[idx.index()].task.successors()
    }

    pub fn predecessor_count(&self, idx: TaskIndex) -> usize {
        self.slots.read()[idx.index()].task.predecessor_count()
    }

    pub fn with_work<R>(&self, idx: TaskIndex, f: impl FnOnce(&mut Work) -> R) -> R {
        let slots = self.slots.read();
        let mut guard = slots[idx.index()].task.work.lock();
        f(&mut guard)
    }

    /// Decreases `active_task_count` by `n`; when it reaches zero, flips
    /// `running` to false and wakes any waiters.
    pub fn join_tasks(&self, n: usize) {
        let prev = self.active_task_count.fetch_sub(n, Ordering::AcqRel);
        if prev == n {
            self.running.store(false, Ordering::Release);
            let _g = self.idle_lock.lock();
            self.idle.notify_all();
        }
    }

    /// Polls with a bounded sleep interval until the graph stops running.
    pub fn wait_sleep(&self, poll_interval: Duration) {
        while self.running() {
            let mut g = self.idle_lock.lock();
            if self.running() {
                self.idle.wait_for(&mut g, poll_interval);
            }
        }
    }

    /// Yields in a tight loop until the graph stops running.
    pub fn wait_spin(&self) {
        while self.running() {
            thread::yield_now();
        }
    }

    /// Combines a deadline with sleeping: polls until either the graph
    /// stops running or `deadline` passes.
    pub fn wait_until(&self, deadline: Instant, poll_interval: Duration) -> bool {
        while self.running() {
            let now = Instant::now();
            if now >= deadline {
                return !self.running();
            }
            let remaining = deadline - now;
            let mut g = self.idle_lock.lock();
            if self.running() {
                self.idle.wait_for(&mut g, remaining.min(poll_interval));
            }
        }
        true
    }
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::work::Work;

    #[test]
    fn add_and_link_produce_a_root_list() {
        let g = Graph::new();
        let a = g.add(Work::Static(Box::new(|| {})));
        let b = g.add(Work::Static(Box::new(|| {})));
        g.link(a, b);
        let roots = g.prepare_to_schedule().unwrap();
        assert_eq!(roots, vec![a]);
        g.join_tasks(2);
        assert!(!g.running());
    }

    #[test]
    fn reentry_is_rejected() {
        let g = Graph::new();
        g.add(Work::Static(Box::new(|| {})));
        assert!(g.prepare_to_schedule().is_some());
        assert!(g.prepare_to_schedule().is_none());
    }

    #[test]
    fn remove_unhooks_neighbours() {
        let g = Graph::new();
        let a = g.add(Work::Static(Box::new(|| {})));
        let b = g.add(Work::Static(Box::new(|| {})));
        let c = g.add(Work::Static(Box::new(|| {})));
        g.link(a, b);
        g.link(b, c);
        g.remove(b);
        assert_eq!(g.predecessor_count(c), 0);
        assert_eq!(g.count(), 2);
    }
}
