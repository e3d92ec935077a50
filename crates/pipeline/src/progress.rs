//! Batch progress events.

use crate::BatchReport;
use crate::item::Outcome;
use tokio::sync::mpsc::UnboundedSender;

/// Progress events emitted by [`BatchRunner::run`](crate::BatchRunner::run).
///
/// Events follow a strict ordering:
/// 1. [`Started`](Self::Started) - exactly once.
/// 2. [`Planned`](Self::Planned) - at most once, when scanning and planning
///    succeeded.
/// 3. [`ItemStarted`](Self::ItemStarted) then
///    [`ItemFinished`](Self::ItemFinished) - once each per attempted item.
/// 4. [`Complete`](Self::Complete) - exactly once, also after a batch-fatal
///    error (with an all-zero report).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchEvent {
    Started,
    Planned { found: usize, to_convert: usize, skipped: usize },
    /// `index` counts from 1 up to `total`.
    ItemStarted { index: usize, total: usize, name: String },
    ItemFinished(Progress),
    Complete(BatchReport),
}

/// Emitted once an item has been fully resolved, cleanup included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Progress {
    /// Number of items processed so far, this one included.
    pub index: usize,
    pub total: usize,
    pub name: String,
    pub outcome: Outcome,
}

/// Receives [`BatchEvent`]s from the worker.
///
/// Emitting must not block: the worker does not wait on whoever presents
/// progress.
pub trait ProgressSink: Send + Sync {
    fn emit(&self, event: BatchEvent);
}

impl ProgressSink for UnboundedSender<BatchEvent> {
    fn emit(&self, event: BatchEvent) {
        // A dropped receiver just means nobody is watching any more.
        if self.send(event).is_err() {
            tracing::trace!("Progress receiver dropped");
        }
    }
}

impl<F> ProgressSink for F
where
    F: Fn(BatchEvent) + Send + Sync,
{
    fn emit(&self, event: BatchEvent) {
        self(event)
    }
}
