//! The two demo systems wired together by `main`: an emitter on a fast
//! pipeline sending one event per tick into a slow pipeline's queue,
//! and a receiver counting what arrives.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use cadence_system::{EventRouter, PipelineSystem, PipelineTag, System, SystemMeta, Tick};
use cadence_task::Graph;

pub struct FastPipeline;
impl PipelineTag for FastPipeline {
    const NAME: &'static str = "fast-pipeline";
}

pub struct SlowPipeline;
impl PipelineTag for SlowPipeline {
    const NAME: &'static str = "slow-pipeline";
}

struct EmitterMeta;
impl SystemMeta for EmitterMeta {
    const NAME: &'static str = "emitter";
}

struct ReceiverMeta;
impl SystemMeta for ReceiverMeta {
    const NAME: &'static str = "receiver";
}

/// Runs on [`FastPipeline`]; every tick sends an event to the slow
/// pipeline's queue that bumps a shared counter when drained.
pub struct Emitter {
    base: System<EmitterMeta, FastPipeline, (u32,)>,
    dest_pipeline_index: usize,
    received: Arc<AtomicUsize>,
}

impl Emitter {
    pub fn new(dest_pipeline_index: usize, received: Arc<AtomicUsize>) -> Self {
        Self { base: System::new(), dest_pipeline_index, received }
    }
}

impl Tick for Emitter {
    fn tick(&mut self) -> bool {
        let counter = self.received.clone();
        self.base.interact(self.dest_pipeline_index, move || {
            counter.fetch_add(1, Ordering::Relaxed);
        });
        true
    }
}

impl PipelineSystem for Emitter {
    fn system_name(&self) -> &'static str {
        self.base.name()
    }
    fn pipeline_name(&self) -> &'static str {
        self.base.pipeline_name()
    }
    fn task_graph(&self) -> Arc<Graph> {
        self.base.graph()
    }
    fn bind(&mut self, pipeline_index: usize, tick_rate_hz: f64, router: EventRouter) {
        self.base.bind(pipeline_index, tick_rate_hz, router)
    }
}

/// Runs on [`SlowPipeline`]; holds no state of its own beyond what
/// demonstrates a second pipeline ticking independently of the first.
pub struct Receiver {
    base: System<ReceiverMeta, SlowPipeline, (u32,)>,
}

impl Receiver {
    pub fn new() -> Self {
        Self { base: System::new() }
    }
}

impl Tick for Receiver {
    fn tick(&mut self) -> bool {
        true
    }
}

impl PipelineSystem for Receiver {
    fn system_name(&self) -> &'static str {
        self.base.name()
    }
    fn pipeline_name(&self) -> &'static str {
        self.base.pipeline_name()
    }
    fn task_graph(&self) -> Arc<Graph> {
        self.base.graph()
    }
    fn bind(&mut self, pipeline_index: usize, tick_rate_hz: f64, router: EventRouter) {
        self.base.bind(pipeline_index, tick_rate_hz, router)
    }
}
