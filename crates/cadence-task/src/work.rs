//! The three work variants a [`crate::Task`] can carry.

use std::sync::Arc;

use crate::Graph;

/// Zero-argument work returning nothing. On return, all successors become
/// eligible to run.
pub type StaticFn = Box<dyn FnMut() + Send>;

/// Zero-argument work returning an index in `[0, successor_count]`. The
/// returned index selects which single successor is scheduled; the value
/// `successor_count` means "none". Every other successor (and its
/// transitive-only descendants) is drained instead of run.
pub type SwitchFn = Box<dyn FnMut() -> usize + Send>;

/// A task's unit of work.
pub enum Work {
    /// Plain function; all successors run after it returns.
    Static(StaticFn),
    /// Function that picks at most one successor branch.
    Switch(SwitchFn),
    /// Schedules another graph as a nested unit and joins the owning task
    /// only once that graph finishes. The referenced graph is not owned by
    /// this task — it must outlive every invocation that might schedule it,
    /// which is why it is held by `Arc` rather than a raw pointer (spec's
    /// "non-owning" reference, expressed safely).
    SubGraph(Arc<Graph>),
}

impl Work {
    pub fn is_sub_graph(&self) -> bool {
        matches!(self, Work::SubGraph(_))
    }
}
