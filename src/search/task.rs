//! Cooperative cancellation for searches.

use std::sync::atomic::{AtomicBool, Ordering};

/// Task context for one search, carrying the cooperative termination flag.
///
/// The context is passed explicitly to everything participating in the
/// search (no ambient task-local state). `terminate` may be called from any
/// thread; the collector observes it at every matched-document callback and
/// exits early. Termination is a normal outcome, not a failure.
#[derive(Debug, Default)]
pub struct SearchTaskContext {
    terminated: AtomicBool,
}

impl SearchTaskContext {
    pub fn new() -> Self {
        SearchTaskContext {
            terminated: AtomicBool::new(false),
        }
    }

    /// Request cooperative termination. Idempotent.
    pub fn terminate(&self) {
        self.terminated.store(true, Ordering::SeqCst);
    }

    /// True once termination has been requested.
    pub fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::SeqCst)
    }
}
