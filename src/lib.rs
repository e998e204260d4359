//! # Salix
//!
//! A concurrent sharded indexing and search core.
//!
//! Salix manages a pool of per-shard index writers shared by ingest and
//! search: an ingest pipeline obtains writers from a [`ShardWriterCache`]
//! keyed by [`ShardKey`] and adds documents until a shard rolls over, while
//! searches open [`ShardSearcher`] snapshots over the same shards and stream
//! matched documents through a bounded [`DocIdQueue`] hand-off.
//!
//! ## Features
//!
//! - Pure Rust implementation
//! - Writer pooling with capacity-driven shard rollover
//! - Near-real-time snapshots over open writers
//! - Bounded, cancellable search result streaming
//! - Pluggable storage backends
// Core modules
pub mod analysis;
pub mod config;
mod data;
mod error;
pub mod index;
pub mod search;
pub mod shard;
pub mod storage;

// Re-exports for the public API
pub use analysis::{Analyzer, KeywordAnalyzer, PerFieldAnalyzers, StandardAnalyzer};
pub use config::{IndexConfig, IndexConfigBuilder, IndexDefinition};
pub use data::{DataValue, Document};
pub use error::{Result, SalixError};
pub use search::executor::{RowSink, SearchExecutor, SearchOutcome, SearchRow, SearchSummary};
pub use search::queue::DocIdQueue;
pub use search::task::SearchTaskContext;
pub use shard::cache::{ShardAction, ShardWriterCache};
pub use shard::descriptor::{ShardDescriptor, ShardStatus};
pub use shard::key::ShardKey;
pub use shard::searcher::{ShardSearcher, ShardSnapshot};
pub use shard::store::{FindShardCriteria, ShardStore};
pub use shard::writer::ShardWriter;
pub use storage::{Storage, StorageConfig, StorageFactory};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
