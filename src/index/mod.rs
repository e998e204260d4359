//! The per-shard index engine.
//!
//! Each shard is one independent index: an [`IndexWriter`] buffers analyzed
//! documents in memory and commits them as immutable segments, and an
//! [`IndexReader`] provides a point-in-time view over the committed segment
//! set, optionally combined with a live writer's buffer for near-real-time
//! reads.

pub mod query;
pub mod reader;
pub mod segment;
pub mod writer;

pub use query::{AllDocsQuery, BooleanQuery, Matcher, Query, TermQuery};
pub use reader::IndexReader;
pub use segment::{SegmentInfo, SegmentReader};
pub use writer::{IndexWriter, IndexWriterConfig, MemoryView, WriterStats};
