//! The worker pool: a fixed set of threads draining per-worker SPMC
//! queues and a shared MPMC submission queue, with random-victim
//! stealing and semaphore-based sleep.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use crossbeam_utils::CachePadded;
use parking_lot::Mutex;

use cadence_task::{Graph, TaskIndex, Work};

use crate::queue::Queue;
use crate::semaphore::Semaphore;

/// After this many consecutive failed steal attempts, a worker yields
/// the CPU before trying again (spec §4.D).
const STEAL_BOUND_FACTOR: usize = 2;
/// After this many yields with still no work, a worker gives up the
/// stealing phase and sleeps on the semaphore.
const YIELD_BOUND: usize = 100;

/// Default capacity for a worker's local queue and a multiple of that
/// for the shared global queue.
const DEFAULT_LOCAL_CAPACITY: usize = 256;

struct ScheduledTask {
    graph: Arc<Graph>,
    task: TaskIndex,
}

/// A child graph dispatched from a `SubGraph` task, parked on its
/// owning worker until the child finishes running.
struct PendingSubGraph {
    outer_graph: Arc<Graph>,
    outer_task: TaskIndex,
    child: Arc<Graph>,
}

struct Inner {
    global: Queue<ScheduledTask>,
    locals: Vec<Queue<ScheduledTask>>,
    pending: Vec<Mutex<Vec<PendingSubGraph>>>,
    semaphore: Semaphore,
    running: AtomicBool,
    active_worker_count: CachePadded<AtomicUsize>,
    stealing_worker_count: CachePadded<AtomicUsize>,
    worker_count: usize,
}

/// A fixed-size work-stealing scheduler. Graphs are submitted with
/// [`Scheduler::schedule`]; workers run until the scheduler is dropped.
pub struct Scheduler {
    inner: Arc<Inner>,
    handles: Mutex<Vec<thread::JoinHandle<()>>>,
}

impl Scheduler {
    /// Spawns `worker_count` worker threads, each with a local queue of
    /// `local_capacity` slots (rounded up to a power of two).
    pub fn new(worker_count: usize, local_capacity: usize) -> Self {
        let worker_count = worker_count.max(1);
        let locals = (0..worker_count)
            .map(|_| Queue::with_capacity(local_capacity))
            .collect();
        let pending = (0..worker_count).map(|_| Mutex::new(Vec::new())).collect();

        let inner = Arc::new(Inner {
            global: Queue::with_capacity(local_capacity * worker_count),
            locals,
            pending,
            semaphore: Semaphore::new(0),
            running: AtomicBool::new(true),
            active_worker_count: CachePadded::new(AtomicUsize::new(0)),
            stealing_worker_count: CachePadded::new(AtomicUsize::new(0)),
            worker_count,
        });

        let handles = (0..worker_count)
            .map(|id| {
                let inner = inner.clone();
                thread::Builder::new()
                    .name(format!("cadence-worker-{id}"))
                    .spawn(move || worker_loop(inner, id))
                    .expect("failed to spawn cadence worker thread")
            })
            .collect();

        Self {
            inner,
            handles: Mutex::new(handles),
        }
    }

    /// Worker count used when the caller does not care: hardware
    /// concurrency, with a floor of 4 if detection fails (spec §5).
    pub fn default_worker_count() -> usize {
        thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4)
    }

    pub fn with_default_workers() -> Self {
        Self::new(Self::default_worker_count(), DEFAULT_LOCAL_CAPACITY)
    }

    pub fn worker_count(&self) -> usize {
        self.inner.worker_count
    }

    /// Prepares `graph` for a run and submits its root tasks to the
    /// global queue. Returns `false` if the graph was already running.
    pub fn schedule(&self, graph: Arc<Graph>) -> bool {
        let Some(roots) = graph.prepare_to_schedule() else {
            return false;
        };
        if roots.is_empty() {
            return true;
        }
        let span = tracing::trace_span!("schedule_graph", roots = roots.len());
        let _enter = span.enter();
        for root in roots {
            let mut item = ScheduledTask {
                graph: graph.clone(),
                task: root,
            };
            loop {
                match self.inner.global.push(item) {
                    Ok(()) => break,
                    Err(back) => {
                        item = back;
                        thread::yield_now();
                    }
                }
            }
        }
        self.inner.semaphore.release(1);
        true
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.inner.running.store(false, Ordering::Release);
        self.inner.semaphore.release(self.inner.worker_count);
        for handle in self.handles.lock().drain(..) {
            let _ = handle.join();
        }
    }
}

fn worker_loop(inner: Arc<Inner>, id: usize) {
    loop {
        if !inner.running.load(Ordering::Acquire) {
            return;
        }

        match inner.locals[id].pop().or_else(|| inner.global.pop()) {
            Some(ScheduledTask { graph, task }) => {
                enter_active(&inner);
                let span = tracing::trace_span!("worker_active", worker = id);
                let _enter = span.enter();
                execute(&inner, id, graph, task);
                while let Some(ScheduledTask { graph, task }) = inner.locals[id].pop() {
                    execute(&inner, id, graph, task);
                }
                drop(_enter);
                leave_active(&inner);
            }
            None => {
                if !stealing_phase(&inner, id) {
                    inner.semaphore.acquire();
                }
            }
        }
    }
}

fn enter_active(inner: &Inner) {
    let prev = inner.active_worker_count.fetch_add(1, Ordering::AcqRel);
    if prev == 0 && inner.stealing_worker_count.load(Ordering::Acquire) == 0 {
        inner.semaphore.release(1);
    }
}

fn leave_active(inner: &Inner) {
    inner.active_worker_count.fetch_sub(1, Ordering::AcqRel);
}

/// Returns `true` if work was found and run (the caller should retry
/// the main loop rather than sleep), `false` if the phase gave up.
fn stealing_phase(inner: &Inner, id: usize) -> bool {
    inner.stealing_worker_count.fetch_add(1, Ordering::AcqRel);
    let steal_bound = STEAL_BOUND_FACTOR * (inner.worker_count + 1);
    let mut consecutive_failures = 0usize;
    let mut yields = 0usize;

    let found = loop {
        if drain_one_pending(inner, id) {
            break true;
        }

        let victim = fastrand::usize(..inner.worker_count);
        // The source's literal stealing loop samples the global MPMC
        // queue for every victim but its own SPMC queue; all overflow
        // beyond a worker's local capacity already lands on the global
        // queue, so sampling it for every non-self victim is sufficient
        // to reach work parked anywhere in the pool.
        let popped = if victim == id {
            inner.locals[id].pop()
        } else {
            inner.global.pop()
        };

        if let Some(ScheduledTask { graph, task }) = popped {
            execute(inner, id, graph, task);
            break true;
        }

        consecutive_failures += 1;
        if consecutive_failures >= steal_bound {
            thread::yield_now();
            consecutive_failures = 0;
            yields += 1;
            if yields >= YIELD_BOUND {
                break false;
            }
        }
    };

    inner.stealing_worker_count.fetch_sub(1, Ordering::AcqRel);
    found
}

/// Scans this worker's pending sub-graph list for an entry whose child
/// graph finished running, joins the outer task, and schedules its
/// successors. Returns whether an entry was resolved.
fn drain_one_pending(inner: &Inner, id: usize) -> bool {
    let mut pending = inner.pending[id].lock();
    let Some(pos) = pending.iter().position(|p| !p.child.running()) else {
        return false;
    };
    let entry = pending.remove(pos);
    drop(pending);

    entry.outer_graph.join_tasks(1);
    let successors = entry.outer_graph.successors_of(entry.outer_task);
    join_ready_successors(inner, id, &entry.outer_graph, &successors);
    true
}

fn execute(inner: &Inner, id: usize, graph: Arc<Graph>, idx: TaskIndex) {
    enum Outcome {
        Static,
        Switch(usize),
        SubGraph(Arc<Graph>),
    }

    let outcome = graph.with_work(idx, |work| match work {
        Work::Static(f) => {
            f();
            Outcome::Static
        }
        Work::Switch(f) => Outcome::Switch(f()),
        Work::SubGraph(child) => Outcome::SubGraph(child.clone()),
    });

    match outcome {
        Outcome::Static => {
            let successors = graph.successors_of(idx);
            join_ready_successors(inner, id, &graph, &successors);
            graph.join_tasks(1);
        }
        Outcome::Switch(selected) => {
            let successors = graph.successors_of(idx);
            let mut drained = 0usize;
            if selected < successors.len() {
                schedule_on(inner, id, graph.clone(), &[successors[selected]]);
                for (i, &s) in successors.iter().enumerate() {
                    if i != selected {
                        drained += drain_branch(&graph, s);
                    }
                }
            } else {
                for &s in &successors {
                    drained += drain_branch(&graph, s);
                }
            }
            graph.join_tasks(1 + drained);
        }
        Outcome::SubGraph(child) => {
            if let Some(roots) = child.prepare_to_schedule() {
                if !roots.is_empty() {
                    schedule_on(inner, id, child.clone(), &roots);
                }
            }
            inner.pending[id].lock().push(PendingSubGraph {
                outer_graph: graph,
                outer_task: idx,
                child,
            });
        }
    }
}

/// Calls `tryJoin` on each candidate successor and schedules the ones
/// that become eligible.
fn join_ready_successors(inner: &Inner, owner: usize, graph: &Arc<Graph>, candidates: &[TaskIndex]) {
    let ready: Vec<TaskIndex> = candidates
        .iter()
        .copied()
        .filter(|&c| graph.try_join(c))
        .collect();
    if !ready.is_empty() {
        schedule_on(inner, owner, graph.clone(), &ready);
    }
}

/// Recursively joins a branch that a switch task did not select,
/// counting every task it passes through so the caller can release
/// that many joins on the owning graph in one call.
fn drain_branch(graph: &Arc<Graph>, idx: TaskIndex) -> usize {
    if !graph.try_join(idx) {
        return 0;
    }
    let mut count = 1;
    for s in graph.successors_of(idx) {
        count += drain_branch(graph, s);
    }
    count
}

/// Pushes each task onto `owner`'s local queue; anything that does not
/// fit overflows to the global queue. If the global queue is also
/// momentarily full, the owner makes forward progress by draining its
/// own local queue before retrying, guaranteeing the push eventually
/// succeeds.
fn schedule_on(inner: &Inner, owner: usize, graph: Arc<Graph>, tasks: &[TaskIndex]) {
    let local = &inner.locals[owner];
    for &t in tasks {
        let item = ScheduledTask {
            graph: graph.clone(),
            task: t,
        };
        let mut item = match local.push(item) {
            Ok(()) => continue,
            Err(back) => back,
        };
        loop {
            match inner.global.push(item) {
                Ok(()) => {
                    inner.semaphore.release(1);
                    break;
                }
                Err(back) => {
                    item = back;
                    if let Some(ScheduledTask { graph: g, task: t2 }) = local.pop() {
                        execute(inner, owner, g, t2);
                    } else {
                        thread::yield_now();
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize as StdAtomicUsize;
    use std::time::{Duration, Instant};

    #[test]
    fn linear_chain_completes_in_order() {
        let scheduler = Scheduler::new(4, 16);
        let graph = Arc::new(Graph::new());
        let order = Arc::new(Mutex::new(Vec::new()));

        let mut prev = None;
        for i in 0..8 {
            let order = order.clone();
            let idx = graph.add(Work::Static(Box::new(move || {
                order.lock().push(i);
            })));
            if let Some(p) = prev {
                graph.link(p, idx);
            }
            prev = Some(idx);
        }

        assert!(scheduler.schedule(graph.clone()));
        let deadline = Instant::now() + Duration::from_secs(2);
        while graph.running() && Instant::now() < deadline {
            thread::yield_now();
        }
        assert!(!graph.running());
        assert_eq!(*order.lock(), (0..8).collect::<Vec<_>>());
    }

    #[test]
    fn wide_fan_out_all_run_exactly_once() {
        let scheduler = Scheduler::new(4, 4); // small queues to force overflow handling
        let graph = Arc::new(Graph::new());
        let count = Arc::new(StdAtomicUsize::new(0));

        let root = graph.add(Work::Static(Box::new(|| {})));
        for _ in 0..64 {
            let count = count.clone();
            let leaf = graph.add(Work::Static(Box::new(move || {
                count.fetch_add(1, Ordering::Relaxed);
            })));
            graph.link(root, leaf);
        }

        assert!(scheduler.schedule(graph.clone()));
        let deadline = Instant::now() + Duration::from_secs(2);
        while graph.running() && Instant::now() < deadline {
            thread::yield_now();
        }
        assert!(!graph.running());
        assert_eq!(count.load(Ordering::Relaxed), 64);
    }

    #[test]
    fn switch_drains_unselected_branches() {
        let scheduler = Scheduler::new(2, 16);
        let graph = Arc::new(Graph::new());
        let ran = Arc::new(Mutex::new(Vec::new()));

        let switch = graph.add(Work::Switch(Box::new(|| 0)));
        for branch in 0..3 {
            let ran = ran.clone();
            let leaf = graph.add(Work::Static(Box::new(move || {
                ran.lock().push(branch);
            })));
            graph.link(switch, leaf);
        }

        assert!(scheduler.schedule(graph.clone()));
        let deadline = Instant::now() + Duration::from_secs(2);
        while graph.running() && Instant::now() < deadline {
            thread::yield_now();
        }
        assert!(!graph.running());
        assert_eq!(*ran.lock(), vec![0]);
    }

    #[test]
    fn sub_graph_successors_wait_for_child_completion() {
        let scheduler = Scheduler::new(4, 16);
        let child = Arc::new(Graph::new());
        let child_ran = Arc::new(StdAtomicUsize::new(0));
        {
            let child_ran = child_ran.clone();
            child.add(Work::Static(Box::new(move || {
                child_ran.fetch_add(1, Ordering::Relaxed);
            })));
        }

        let outer = Arc::new(Graph::new());
        let outer_done = Arc::new(StdAtomicUsize::new(0));
        let sub_task = outer.add(Work::SubGraph(child));
        {
            let outer_done = outer_done.clone();
            let after = outer.add(Work::Static(Box::new(move || {
                outer_done.fetch_add(1, Ordering::Relaxed);
            })));
            outer.link(sub_task, after);
        }

        assert!(scheduler.schedule(outer.clone()));
        let deadline = Instant::now() + Duration::from_secs(2);
        while outer.running() && Instant::now() < deadline {
            thread::yield_now();
        }
        assert!(!outer.running());
        assert_eq!(child_ran.load(Ordering::Relaxed), 1);
        assert_eq!(outer_done.load(Ordering::Relaxed), 1);
    }
}
