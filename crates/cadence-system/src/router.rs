//! Cross-pipeline event routing. Each pipeline owns the receiving end
//! of an MPSC channel; an [`EventRouter`] holds a clone of every
//! sending end so any system can reach any pipeline by index.

use std::sync::mpsc::Sender;

/// A closure captured by `interact`/`sendEvent`, resolved and run on
/// the destination pipeline's own thread when its begin-task drains
/// the queue.
pub type PipelineEvent = Box<dyn FnOnce() + Send>;

#[derive(Clone, Default)]
pub struct EventRouter {
    senders: Vec<Sender<PipelineEvent>>,
}

impl EventRouter {
    pub fn new(senders: Vec<Sender<PipelineEvent>>) -> Self {
        Self { senders }
    }

    /// Enqueues `event` on pipeline `index`'s queue. Returns `false` if
    /// the index is out of range or the pipeline's receiver was
    /// dropped (the pipeline is gone).
    pub fn send(&self, index: usize, event: PipelineEvent) -> bool {
        self.senders
            .get(index)
            .map(|s| s.send(event).is_ok())
            .unwrap_or(false)
    }
}
