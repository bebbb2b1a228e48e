//! A registered pipeline: hashed name, tick rate, time-binding mode,
//! event queue, and ordered system list (spec §4.G "Pipeline": a named
//! period-driven container).

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use cadence_system::{PipelineEvent, PipelineSystem};
use cadence_task::Graph;

use crate::dependency::Dependency;

/// Whether a pipeline catches up after falling behind (`Bound`) or
/// discards the lag (`Free`) — spec §4.G / §9.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeMode {
    Free,
    Bound,
}

/// User hook run at the start of every tick via the begin-task;
/// returning `false` skips this tick's systems entirely.
pub type BeginPass = Box<dyn Fn() -> bool + Send + Sync>;

pub(crate) struct RegisteredSystem {
    pub(crate) name: &'static str,
    pub(crate) deps: Vec<Dependency>,
    pub(crate) system: Arc<Mutex<Box<dyn PipelineSystem>>>,
}

/// One entry in the executor's pipeline vector. Exclusively owned by
/// the executor (spec §4.F invariant "each pipeline exclusively owns
/// its event queue, systems, and graph").
pub struct Pipeline {
    pub(crate) name: &'static str,
    pub(crate) hash: u64,
    tick_rate_bits: AtomicU64,
    pub(crate) time_mode: TimeMode,
    pub(crate) begin_pass: Option<BeginPass>,
    pub(crate) event_queue_size: usize,
    pub(crate) queue_len: Arc<AtomicUsize>,
    pub(crate) receiver: Option<Receiver<PipelineEvent>>,
    pub(crate) systems: Vec<RegisteredSystem>,
    pub(crate) graph: Option<Arc<Graph>>,
    pub(crate) elapsed: Duration,
}

impl Pipeline {
    pub(crate) fn new(
        name: &'static str,
        frequency_hz: f64,
        time_mode: TimeMode,
        begin_pass: Option<BeginPass>,
        event_queue_size: usize,
        receiver: Receiver<PipelineEvent>,
    ) -> Self {
        Self {
            name,
            hash: crate::hash_name(name),
            tick_rate_bits: AtomicU64::new(frequency_hz.to_bits()),
            time_mode,
            begin_pass,
            event_queue_size,
            queue_len: Arc::new(AtomicUsize::new(0)),
            receiver: Some(receiver),
            systems: Vec::new(),
            graph: None,
            elapsed: Duration::ZERO,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn hash(&self) -> u64 {
        self.hash
    }

    /// Racy by design (spec §4.G: "reads are racy by design — producers
    /// observe within a tick").
    pub fn tick_rate_hz(&self) -> f64 {
        f64::from_bits(self.tick_rate_bits.load(Ordering::Relaxed))
    }

    pub fn set_tick_rate_hz(&self, hz: f64) {
        self.tick_rate_bits.store(hz.to_bits(), Ordering::Relaxed);
    }

    pub(crate) fn tick_period(&self) -> Duration {
        let hz = self.tick_rate_hz();
        if hz <= 0.0 {
            Duration::from_secs(u64::MAX / 2)
        } else {
            Duration::from_secs_f64(1.0 / hz)
        }
    }

    pub(crate) fn system_index(&self, hash: u64) -> Option<usize> {
        self.systems.iter().position(|s| crate::hash_name(s.name) == hash)
    }

    pub(crate) fn running(&self) -> bool {
        self.graph.as_ref().map(|g| g.running()).unwrap_or(false)
    }
}
