//! Search execution: bounded result streaming with cooperative
//! cancellation.
//!
//! A search runs two units of work joined by a [`DocIdQueue`]: a collector
//! pushing matched doc ordinals as the query iterates, and a consumer
//! resolving stored fields and emitting rows. The queue is bounded, so a
//! slow consumer applies backpressure all the way into the query iteration.

pub mod collector;
pub mod executor;
pub mod queue;
pub mod task;

pub use collector::{CollectorOutcome, CompletionGuard, HitCollector};
pub use executor::{RowSink, SearchExecutor, SearchOutcome, SearchRow, SearchSummary};
pub use queue::DocIdQueue;
pub use task::SearchTaskContext;
