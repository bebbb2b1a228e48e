//! The multi-pipeline driver (spec §4.G): owns pipelines, builds each
//! one's task graph once, ticks them at their configured frequencies,
//! and pumps its own shutdown-event queue between ticks.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use cadence_sched::Scheduler;
use cadence_system::{EventRouter, PipelineEvent, PipelineSystem, PipelineTag};
use cadence_task::{Graph, TaskIndex, Work};

use crate::config::ExecutorConfig;
use crate::dependency::{resolve_order, Dependency};
use crate::error::ExecutorError;
use crate::pipeline::{BeginPass, Pipeline, RegisteredSystem, TimeMode};
use crate::timing::SleepEstimator;

/// A closure pumped on the executor's own queue once per main-loop
/// iteration; returning `false` requests shutdown (spec §4.G "Pump
/// events on the executor's own queue; one event returning false
/// requests shutdown").
pub type ExecutorEvent = Box<dyn FnOnce() -> bool + Send>;

/// Lets a caller outside the run loop's own thread request shutdown,
/// without handing out access to the rest of [`Executor`].
#[derive(Clone)]
pub struct ShutdownHandle(Sender<ExecutorEvent>);

impl ShutdownHandle {
    pub fn request_shutdown(&self) {
        let _ = self.0.send(Box::new(|| false));
    }
}

pub struct Executor {
    config: ExecutorConfig,
    pipelines: Vec<Pipeline>,
    senders: Vec<Sender<PipelineEvent>>,
    router: EventRouter,
    scheduler: Scheduler,
    running: Arc<AtomicBool>,
    event_tx: Sender<ExecutorEvent>,
    event_rx: Receiver<ExecutorEvent>,
}

impl Executor {
    pub fn new(config: ExecutorConfig) -> Self {
        let scheduler = Scheduler::new(config.worker_count.max(1), config.local_queue_capacity);
        let (event_tx, event_rx) = mpsc::channel();
        Self {
            config,
            pipelines: Vec::new(),
            senders: Vec::new(),
            router: EventRouter::default(),
            scheduler,
            running: Arc::new(AtomicBool::new(false)),
            event_tx,
            event_rx,
        }
    }

    /// Loads [`ExecutorConfig`] from its layered sources and builds an
    /// executor from it.
    pub fn with_default_config() -> Result<Self, ExecutorError> {
        Ok(Self::new(ExecutorConfig::load()?))
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Registers a pipeline; must precede any `add_system` targeting it
    /// (spec §4.G `addPipeline`). `event_queue_size == 0` falls back to
    /// the configured default.
    pub fn add_pipeline<P: PipelineTag>(
        &mut self,
        frequency_hz: f64,
        time_mode: TimeMode,
        begin_pass: Option<BeginPass>,
        event_queue_size: usize,
    ) -> usize {
        let size = if event_queue_size == 0 {
            self.config.default_event_queue_size
        } else {
            event_queue_size
        };
        let (tx, rx) = mpsc::channel();
        self.senders.push(tx);
        self.router = EventRouter::new(self.senders.clone());

        let index = self.pipelines.len();
        tracing::info!(pipeline = P::NAME, frequency_hz, index, "pipeline registered");
        self.pipelines
            .push(Pipeline::new(P::NAME, frequency_hz, time_mode, begin_pass, size, rx));
        index
    }

    /// Resolves `SystemT::Pipeline` to its index, appends the system to
    /// that pipeline's declared order, and eagerly re-resolves
    /// `RunBefore`/`RunAfter` to fail fast on a circular declaration
    /// (spec §4.G `addSystem`).
    pub fn add_system(
        &mut self,
        system: Box<dyn PipelineSystem>,
        dependencies: Vec<Dependency>,
    ) -> Result<usize, ExecutorError> {
        let pipeline_hash = crate::hash_name(system.pipeline_name());
        let pipeline_index = self.pipeline_index(pipeline_hash)?;
        let name = system.system_name();

        let pipeline = &mut self.pipelines[pipeline_index];
        pipeline.systems.push(RegisteredSystem {
            name,
            deps: dependencies,
            system: Arc::new(Mutex::new(system)),
        });

        let names: Vec<&'static str> = pipeline.systems.iter().map(|s| s.name).collect();
        let deps: Vec<Vec<Dependency>> = pipeline.systems.iter().map(|s| s.deps.clone()).collect();
        if resolve_order(&names, &deps).len() != names.len() {
            tracing::error!(pipeline = pipeline.name, system = name, "circular RunBefore/RunAfter declaration");
            std::process::abort();
        }
        tracing::debug!(pipeline = pipeline.name, system = name, "system registered");
        Ok(pipeline_index)
    }

    pub fn pipeline_index(&self, hash: u64) -> Result<usize, ExecutorError> {
        self.pipelines
            .iter()
            .position(|p| p.hash() == hash)
            .ok_or(ExecutorError::PipelineNotFound(hash))
    }

    pub fn system_index(&self, pipeline_index: usize, system_hash: u64) -> Result<usize, ExecutorError> {
        let pipeline = self
            .pipelines
            .get(pipeline_index)
            .ok_or(ExecutorError::InvalidPipelineIndex(pipeline_index))?;
        pipeline
            .system_index(system_hash)
            .ok_or(ExecutorError::SystemNotFound { pipeline: pipeline_index, hash: system_hash })
    }

    /// Racy by design (spec §4.G).
    pub fn pipeline_tick_rate(&self, index: usize) -> Option<f64> {
        self.pipelines.get(index).map(|p| p.tick_rate_hz())
    }

    pub fn set_pipeline_tick_rate(&self, index: usize, hz: f64) {
        if let Some(p) = self.pipelines.get(index) {
            p.set_tick_rate_hz(hz);
        }
    }

    /// `sendEvent<Pipeline, RetryOnFailure>`: enqueues `callback` onto
    /// `pipeline_hash`'s event queue. The underlying channel never
    /// blocks, so this crate tracks the configured capacity itself and
    /// applies the configured capacity as a soft admission limit: full
    /// plus `retry_on_failure == false` returns
    /// [`ExecutorError::EventQueueFull`] rather than aborting the
    /// process, since backpressure on an application event queue is
    /// ordinary caller-recoverable behavior, unlike the structural
    /// invariant violations the rest of the workspace aborts on.
    pub fn send_event(
        &self,
        pipeline_hash: u64,
        retry_on_failure: bool,
        callback: PipelineEvent,
    ) -> Result<(), ExecutorError> {
        let index = self.pipeline_index(pipeline_hash)?;
        let pipeline = &self.pipelines[index];
        let queue_len = pipeline.queue_len.clone();
        let capacity = pipeline.event_queue_size;
        let mut callback = Some(callback);

        loop {
            if queue_len.load(Ordering::Relaxed) < capacity {
                queue_len.fetch_add(1, Ordering::Relaxed);
                let decrement = queue_len.clone();
                let cb = callback.take().expect("sendEvent retries only on queue-full, not after admission");
                let wrapped: PipelineEvent = Box::new(move || {
                    cb();
                    decrement.fetch_sub(1, Ordering::Relaxed);
                });
                if self.router.send(index, wrapped) {
                    return Ok(());
                }
                queue_len.fetch_sub(1, Ordering::Relaxed);
                return Err(ExecutorError::PipelineNotFound(pipeline_hash));
            }
            if !retry_on_failure {
                return Err(ExecutorError::EventQueueFull(pipeline_hash));
            }
            std::thread::yield_now();
        }
    }

    /// Posts an event onto the executor's own control queue, pumped
    /// once per main-loop iteration.
    pub fn send_executor_event(&self, event: ExecutorEvent) {
        let _ = self.event_tx.send(event);
    }

    /// Convenience wrapper around [`Executor::send_executor_event`] that
    /// requests shutdown on the next pump.
    pub fn request_shutdown(&self) {
        self.send_executor_event(Box::new(|| false));
    }

    /// A cheap, cloneable handle for requesting shutdown from a thread
    /// other than the one blocked inside [`Executor::run`].
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle(self.event_tx.clone())
    }

    /// Builds `pipelines[index]`'s task graph exactly once: a begin-task
    /// draining its event queue, then a tick/graph-subtask pair per
    /// system in `RunBefore`/`RunAfter`-resolved order, each tick also
    /// ordered after the previous tick and the previous graph sub-task
    /// (spec §4.G run-loop build step).
    fn build_pipeline_graph(&mut self, index: usize) {
        let router = self.router.clone();
        let pipeline = &mut self.pipelines[index];

        let names: Vec<&'static str> = pipeline.systems.iter().map(|s| s.name).collect();
        let deps: Vec<Vec<Dependency>> = pipeline.systems.iter().map(|s| s.deps.clone()).collect();
        let order = resolve_order(&names, &deps);
        if order.len() != names.len() {
            tracing::error!(pipeline = pipeline.name, "circular RunBefore/RunAfter declaration");
            std::process::abort();
        }

        let tick_rate_hz = pipeline.tick_rate_hz();
        for &i in &order {
            pipeline.systems[i].system.lock().bind(index, tick_rate_hz, router.clone());
        }

        let graph = Arc::new(Graph::new());
        let receiver = pipeline.receiver.take().expect("a pipeline's graph is built exactly once");
        let begin_pass = pipeline.begin_pass.take();
        let begin = graph.add(Work::Switch(Box::new(move || {
            while let Ok(event) = receiver.try_recv() {
                event();
            }
            match &begin_pass {
                Some(f) if !f() => 1,
                _ => 0,
            }
        })));

        let mut prev_tick: Option<TaskIndex> = None;
        let mut prev_graph: Option<TaskIndex> = None;
        let mut first_tick: Option<TaskIndex> = None;

        for &i in &order {
            let handle = pipeline.systems[i].system.clone();
            let tick_fn: Box<dyn FnMut() -> usize + Send> = Box::new(move || if handle.lock().tick() { 0 } else { 1 });
            let tick_idx = graph.add(Work::Switch(tick_fn));
            let task_graph = pipeline.systems[i].system.lock().task_graph();
            let graph_idx = graph.add(Work::SubGraph(task_graph));
            graph.link(tick_idx, graph_idx);

            if let Some(pg) = prev_graph {
                graph.link(pg, tick_idx);
            }
            if let Some(pt) = prev_tick {
                graph.link(pt, tick_idx);
            }
            if first_tick.is_none() {
                first_tick = Some(tick_idx);
            }
            prev_tick = Some(tick_idx);
            prev_graph = Some(graph_idx);
        }

        if let Some(first) = first_tick {
            graph.link(begin, first);
        }

        pipeline.graph = Some(graph);
    }

    /// The run loop (spec §4.G): builds every pipeline's graph once,
    /// then observes/schedules/pumps/sleeps until shutdown.
    ///
    /// `main_pipeline_hash`, if given, names the pipeline whose tick
    /// gates an `inline_tick` return; `inline_tick` runs a single
    /// iteration of the loop (after that pipeline has ticked, or after
    /// one iteration if no pipeline is named) and returns instead of
    /// looping until shutdown — useful for demos and tests that want to
    /// drive the executor deterministically rather than run forever.
    pub fn run(&mut self, main_pipeline_hash: Option<u64>, inline_tick: bool) -> Result<(), ExecutorError> {
        for i in 0..self.pipelines.len() {
            self.build_pipeline_graph(i);
        }

        self.running.store(true, Ordering::Release);
        tracing::info!(pipelines = self.pipelines.len(), "executor run loop starting");

        let mut last_observed = Instant::now();
        let mut estimator = SleepEstimator::new();

        while self.running.load(Ordering::Acquire) {
            let now = Instant::now();
            let mut main_pipeline_ticked = false;
            let mut next_deadline = now + Duration::from_millis(250);

            for pipeline in &mut self.pipelines {
                pipeline.elapsed += now.duration_since(last_observed);
                let period = pipeline.tick_period();
                if pipeline.elapsed >= period && !pipeline.running() {
                    if let Some(graph) = pipeline.graph.clone() {
                        self.scheduler.schedule(graph);
                    }
                    match pipeline.time_mode {
                        TimeMode::Bound => pipeline.elapsed = pipeline.elapsed.saturating_sub(period),
                        TimeMode::Free => pipeline.elapsed = Duration::ZERO,
                    }
                    if Some(pipeline.hash) == main_pipeline_hash {
                        main_pipeline_ticked = true;
                    }
                }
                let deadline = now + period.saturating_sub(pipeline.elapsed);
                if deadline < next_deadline {
                    next_deadline = deadline;
                }
            }
            last_observed = now;

            let mut shutdown_requested = false;
            while let Ok(event) = self.event_rx.try_recv() {
                if !event() {
                    shutdown_requested = true;
                }
            }
            if shutdown_requested {
                break;
            }

            estimator.sleep_until(next_deadline);

            if inline_tick && (main_pipeline_hash.is_none() || main_pipeline_ticked) {
                break;
            }
        }

        self.running.store(false, Ordering::Release);
        for pipeline in &self.pipelines {
            if let Some(graph) = &pipeline.graph {
                graph.wait_spin();
            }
        }
        tracing::info!("executor run loop stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize as StdAtomicUsize;

    use cadence_system::{PipelineTag, System, SystemMeta, Tick};

    struct Countdown;
    impl SystemMeta for Countdown {
        const NAME: &'static str = "countdown";
    }
    struct Demo;
    impl PipelineTag for Demo {
        const NAME: &'static str = "demo";
    }

    struct CountdownSystem {
        base: System<Countdown, Demo, (u32,)>,
        ticks: Arc<StdAtomicUsize>,
        remaining: usize,
    }

    impl Tick for CountdownSystem {
        fn tick(&mut self) -> bool {
            self.ticks.fetch_add(1, Ordering::Relaxed);
            if self.remaining == 0 {
                return false;
            }
            self.remaining -= 1;
            true
        }
    }

    impl PipelineSystem for CountdownSystem {
        fn system_name(&self) -> &'static str {
            self.base.name()
        }
        fn pipeline_name(&self) -> &'static str {
            self.base.pipeline_name()
        }
        fn task_graph(&self) -> Arc<Graph> {
            self.base.graph()
        }
        fn bind(&mut self, pipeline_index: usize, hz: f64, router: EventRouter) {
            self.base.bind(pipeline_index, hz, router)
        }
    }

    #[test]
    fn a_single_pipeline_ticks_its_system_inline() {
        let mut executor = Executor::new(ExecutorConfig {
            worker_count: 2,
            local_queue_capacity: 16,
            ..ExecutorConfig::default()
        });
        let pipeline_hash = crate::hash_name(Demo::NAME);
        executor.add_pipeline::<Demo>(1000.0, TimeMode::Free, None, 0);

        let ticks = Arc::new(StdAtomicUsize::new(0));
        let system = CountdownSystem {
            base: System::new(),
            ticks: ticks.clone(),
            remaining: 3,
        };
        executor.add_system(Box::new(system), Vec::new()).unwrap();

        executor.run(Some(pipeline_hash), true).unwrap();
        assert!(ticks.load(Ordering::Relaxed) >= 1);
    }
}
