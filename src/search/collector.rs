//! The hit collector: drives the query and feeds the hand-off queue.

use std::sync::Arc;

use log::{debug, trace};

use crate::error::{Result, SalixError};
use crate::index::query::Query;
use crate::index::reader::IndexReader;
use crate::search::queue::DocIdQueue;
use crate::search::task::SearchTaskContext;

/// How a collector run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectorOutcome {
    /// The query iterated all matches.
    Finished,
    /// Cancellation was observed and the collector stopped early.
    Terminated,
}

/// Guarantees queue completion on every exit path of the collector
/// (normal completion, cancellation, or an unexpected error) so the
/// consumer is never left blocked.
pub struct CompletionGuard {
    queue: Arc<DocIdQueue>,
}

impl CompletionGuard {
    pub fn new(queue: Arc<DocIdQueue>) -> Self {
        CompletionGuard { queue }
    }
}

impl Drop for CompletionGuard {
    fn drop(&mut self) {
        self.queue.complete();
    }
}

/// Pushes matched doc ordinals into the queue, observing cancellation at
/// every callback.
pub struct HitCollector {
    queue: Arc<DocIdQueue>,
    task: Arc<SearchTaskContext>,
    pushed: u64,
}

impl HitCollector {
    pub fn new(queue: Arc<DocIdQueue>, task: Arc<SearchTaskContext>) -> Self {
        HitCollector {
            queue,
            task,
            pushed: 0,
        }
    }

    /// Forward one matched ordinal downstream.
    ///
    /// Blocks while the queue is full (backpressure into the query
    /// iteration). Fails with [`SalixError::SearchTerminated`] when
    /// cancellation has been requested or the consumer has completed the
    /// queue from its side.
    pub fn collect(&mut self, doc_id: u64) -> Result<()> {
        if self.task.is_terminated() {
            return Err(SalixError::SearchTerminated);
        }
        if !self.queue.put(doc_id) {
            // Completed from the consumer side; stop producing.
            return Err(SalixError::SearchTerminated);
        }
        self.pushed += 1;
        trace!("collected doc {doc_id}");
        Ok(())
    }

    /// Number of ordinals pushed so far.
    pub fn pushed(&self) -> u64 {
        self.pushed
    }
}

/// Run a query to completion, streaming matches into the queue.
///
/// The queue is completed on every exit path via [`CompletionGuard`].
/// Cancellation surfaces as `Ok(CollectorOutcome::Terminated)`, not an
/// error; only genuine failures (for example an invalid query) are
/// propagated.
pub fn collect_matches(
    reader: &IndexReader,
    query: &dyn Query,
    queue: &Arc<DocIdQueue>,
    task: &Arc<SearchTaskContext>,
) -> Result<CollectorOutcome> {
    let _guard = CompletionGuard::new(queue.clone());
    let mut collector = HitCollector::new(queue.clone(), task.clone());

    let mut matcher = query.matcher(reader)?;
    while !matcher.is_exhausted() {
        match collector.collect(matcher.doc_id()) {
            Ok(()) => {}
            Err(e) if e.is_terminated() => {
                debug!("collector terminated after {} matches", collector.pushed());
                return Ok(CollectorOutcome::Terminated);
            }
            Err(e) => return Err(e),
        }
        matcher.next();
    }

    debug!("collector finished with {} matches", collector.pushed());
    Ok(CollectorOutcome::Finished)
}
