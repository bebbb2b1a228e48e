//! The `System` base type: a typed aggregation of component tables
//! bound to one pipeline. Application code composes its own system
//! struct around a `System<...>` field and implements [`Tick`] on it —
//! composition stands in for the source's CRTP base class (REDESIGN
//! FLAGS: "CRTP and intrusive base classes").

use std::marker::PhantomData;
use std::sync::Arc;

use cadence_ecs::{Entity, EntityAllocator};
use cadence_task::Graph;

use crate::meta::{PipelineTag, SystemMeta};
use crate::router::EventRouter;
use crate::set::ComponentSet;

/// Returning `false` from [`Tick::tick`] tells the executor to skip
/// this system's graph for the current tick.
pub trait Tick {
    fn tick(&mut self) -> bool;
}

/// What `cadence-exec` needs from a system to wire it into a pipeline's
/// graph: a name for diagnostics, its own internal task graph, and the
/// pipeline-assignment callback the executor invokes once per
/// `addSystem`. Application systems implement this by delegating to
/// their embedded `System<M, P, C>` field alongside their own [`Tick`]:
///
/// ```ignore
/// impl PipelineSystem for Movement {
///     fn system_name(&self) -> &'static str { self.base.name() }
///     fn pipeline_name(&self) -> &'static str { self.base.pipeline_name() }
///     fn task_graph(&self) -> Arc<Graph> { self.base.graph() }
///     fn bind(&mut self, idx: usize, hz: f64, router: EventRouter) {
///         self.base.bind(idx, hz, router)
///     }
/// }
/// ```
pub trait PipelineSystem: Tick + Send {
    fn system_name(&self) -> &'static str;
    fn pipeline_name(&self) -> &'static str;
    fn task_graph(&self) -> Arc<Graph>;
    fn bind(&mut self, pipeline_index: usize, tick_rate_hz: f64, router: EventRouter);
}

/// Typed over a marker naming the system (`M`), a marker naming its
/// pipeline (`P`), and the tuple of component types it owns (`C`).
pub struct System<M: SystemMeta, P: PipelineTag, C: ComponentSet> {
    pipeline_index: Option<usize>,
    tick_rate_hz: f64,
    entities: EntityAllocator,
    tables: C::Tables,
    router: Option<EventRouter>,
    /// This system's own internal task graph — distinct from the
    /// pipeline-level graph the executor builds to sequence systems
    /// against each other (spec §4.G: "a graph sub-task holding the
    /// system's internal Graph").
    graph: Arc<Graph>,
    _marker: PhantomData<(M, P)>,
}

impl<M: SystemMeta, P: PipelineTag, C: ComponentSet> System<M, P, C> {
    pub fn new() -> Self {
        Self {
            pipeline_index: None,
            tick_rate_hz: 0.0,
            entities: EntityAllocator::new(),
            tables: C::Tables::default(),
            router: None,
            graph: Arc::new(Graph::new()),
            _marker: PhantomData,
        }
    }

    /// This system's internal task graph, scheduled as a sub-graph
    /// under the pipeline's own graph every tick it runs.
    pub fn graph(&self) -> Arc<Graph> {
        self.graph.clone()
    }

    pub fn name(&self) -> &'static str {
        M::NAME
    }

    pub fn pipeline_name(&self) -> &'static str {
        P::NAME
    }

    /// Called by the executor once, at `addSystem` time: resolves and
    /// caches this system's pipeline index and tick rate (spec §4.F:
    /// "at construction it looks up its pipeline index ... and caches
    /// its tick rate").
    pub fn bind(&mut self, pipeline_index: usize, tick_rate_hz: f64, router: EventRouter) {
        tracing::debug!(system = M::NAME, pipeline = P::NAME, pipeline_index, tick_rate_hz, "system bound");
        self.pipeline_index = Some(pipeline_index);
        self.tick_rate_hz = tick_rate_hz;
        self.router = Some(router);
    }

    pub fn pipeline_index(&self) -> Option<usize> {
        self.pipeline_index
    }

    pub fn tick_rate_hz(&self) -> f64 {
        self.tick_rate_hz
    }

    pub fn tables(&self) -> &C::Tables {
        &self.tables
    }

    pub fn tables_mut(&mut self) -> &mut C::Tables {
        &mut self.tables
    }

    /// Mints an entity and attaches one component per parameter.
    pub fn add(&mut self, components: C) -> Entity {
        let e = self.entities.mint();
        C::add_all(&mut self.tables, e, components);
        e
    }

    /// Attaches components to an entity already known to this system.
    /// A component this entity already holds in one of the target
    /// tables is a precondition violation (abort), mirroring `add`.
    pub fn attach(&mut self, e: Entity, components: C) {
        C::add_all(&mut self.tables, e, components);
    }

    /// Attaches or replaces components on an entity.
    pub fn try_attach(&mut self, e: Entity, components: C) {
        C::try_add_all(&mut self.tables, e, components);
    }

    pub fn dettach(&mut self, e: Entity) {
        C::remove_all(&mut self.tables, e);
    }

    pub fn try_dettach(&mut self, e: Entity) {
        C::remove_all(&mut self.tables, e);
    }

    /// Drops `e` from every table this system owns and returns its id
    /// to the free list.
    pub fn remove(&mut self, e: Entity) {
        C::remove_all(&mut self.tables, e);
        self.entities.release(e);
    }

    pub fn has_all(&self, e: Entity) -> bool {
        C::contains_all(&self.tables, e)
    }

    /// `interact<DestPipeline>`: runs `callback` inline if
    /// `dest_pipeline_index` is this system's own pipeline, otherwise
    /// routes it through the destination pipeline's event queue.
    /// Static `DestPipeline`-tag dispatch degrades to a runtime index
    /// comparison here since pipelines are registered at run time
    /// (`addPipeline`), not known at compile time.
    pub fn interact(&self, dest_pipeline_index: usize, callback: impl FnOnce() + Send + 'static) -> bool {
        match self.pipeline_index {
            Some(own) if own == dest_pipeline_index => {
                callback();
                true
            }
            _ => self
                .router
                .as_ref()
                .map(|r| r.send(dest_pipeline_index, Box::new(callback)))
                .unwrap_or(false),
        }
    }
}

impl<M: SystemMeta, P: PipelineTag, C: ComponentSet> Default for System<M, P, C> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct MoveMeta;
    impl SystemMeta for MoveMeta {
        const NAME: &'static str = "movement";
    }
    struct SimPipeline;
    impl PipelineTag for SimPipeline {
        const NAME: &'static str = "sim";
    }

    type Movement = System<MoveMeta, SimPipeline, (f32, f32)>;

    #[test]
    fn add_then_remove_round_trips_through_tables() {
        let mut sys = Movement::new();
        let e = sys.add((1.0, 2.0));
        assert_eq!(sys.tables().0.get(e), Some(&1.0));
        assert_eq!(sys.tables().1.get(e), Some(&2.0));
        assert!(sys.has_all(e));
        sys.remove(e);
        assert!(!sys.has_all(e));
    }

    #[test]
    fn interact_with_own_pipeline_runs_inline() {
        use std::sync::atomic::{AtomicBool, Ordering};
        use std::sync::Arc;

        let mut sys = Movement::new();
        sys.bind(0, 60.0, EventRouter::default());
        let ran = Arc::new(AtomicBool::new(false));
        let flag = ran.clone();
        assert!(sys.interact(0, move || flag.store(true, Ordering::Relaxed)));
        assert!(ran.load(Ordering::Relaxed));
    }
}
