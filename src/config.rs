//! Index and core configuration.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::analysis::PerFieldAnalyzers;
use crate::error::{Result, SalixError};

/// Identity of a logical index that shards belong to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDefinition {
    /// Stable identifier used in shard keys and shard paths.
    pub uuid: String,
    /// Human-readable name.
    pub name: String,
}

impl IndexDefinition {
    /// Create a definition with a generated uuid.
    pub fn new(name: impl Into<String>) -> Self {
        IndexDefinition {
            uuid: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
        }
    }

    /// Create a definition with an explicit uuid.
    pub fn with_uuid(uuid: impl Into<String>, name: impl Into<String>) -> Self {
        IndexDefinition {
            uuid: uuid.into(),
            name: name.into(),
        }
    }
}

/// Configuration for the shard writer cache and search hand-off.
#[derive(Debug, Clone)]
pub struct IndexConfig {
    /// Maximum number of documents a shard accepts before rolling over.
    pub max_documents_per_shard: u32,

    /// Capacity of the search doc-id hand-off queue.
    pub doc_id_queue_capacity: usize,

    /// Interval for background flushing of open writers. None disables the
    /// flush scheduler.
    pub flush_interval: Option<Duration>,

    /// Number of documents the underlying index writer buffers in memory
    /// before writing an intermediate segment.
    pub ram_buffer_docs: usize,

    /// Per-field analyzer selection shared by writers and term queries.
    pub analyzers: Arc<PerFieldAnalyzers>,
}

impl IndexConfig {
    /// Start building a configuration.
    pub fn builder() -> IndexConfigBuilder {
        IndexConfigBuilder::default()
    }
}

impl Default for IndexConfig {
    fn default() -> Self {
        IndexConfig {
            max_documents_per_shard: 1_000_000,
            doc_id_queue_capacity: 1_000,
            flush_interval: None,
            ram_buffer_docs: 10_000,
            analyzers: Arc::new(PerFieldAnalyzers::default()),
        }
    }
}

/// Builder for [`IndexConfig`].
#[derive(Debug, Default)]
pub struct IndexConfigBuilder {
    max_documents_per_shard: Option<u32>,
    doc_id_queue_capacity: Option<usize>,
    flush_interval: Option<Duration>,
    ram_buffer_docs: Option<usize>,
    analyzers: Option<Arc<PerFieldAnalyzers>>,
}

impl IndexConfigBuilder {
    /// Maximum number of documents per shard before rollover.
    pub fn max_documents_per_shard(mut self, max: u32) -> Self {
        self.max_documents_per_shard = Some(max);
        self
    }

    /// Capacity of the search doc-id hand-off queue.
    pub fn doc_id_queue_capacity(mut self, capacity: usize) -> Self {
        self.doc_id_queue_capacity = Some(capacity);
        self
    }

    /// Enable background flushing at the given interval.
    pub fn flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval = Some(interval);
        self
    }

    /// Number of documents buffered in memory before an intermediate
    /// segment is written.
    pub fn ram_buffer_docs(mut self, docs: usize) -> Self {
        self.ram_buffer_docs = Some(docs);
        self
    }

    /// Per-field analyzers.
    pub fn analyzers(mut self, analyzers: Arc<PerFieldAnalyzers>) -> Self {
        self.analyzers = Some(analyzers);
        self
    }

    /// Validate and build the configuration.
    pub fn build(self) -> Result<IndexConfig> {
        let defaults = IndexConfig::default();

        let max_documents_per_shard = self
            .max_documents_per_shard
            .unwrap_or(defaults.max_documents_per_shard);
        if max_documents_per_shard == 0 {
            return Err(SalixError::invalid_config(
                "max_documents_per_shard must be greater than zero",
            ));
        }

        let doc_id_queue_capacity = self
            .doc_id_queue_capacity
            .unwrap_or(defaults.doc_id_queue_capacity);
        if doc_id_queue_capacity == 0 {
            return Err(SalixError::invalid_config(
                "doc_id_queue_capacity must be greater than zero",
            ));
        }

        let ram_buffer_docs = self.ram_buffer_docs.unwrap_or(defaults.ram_buffer_docs);
        if ram_buffer_docs == 0 {
            return Err(SalixError::invalid_config(
                "ram_buffer_docs must be greater than zero",
            ));
        }

        Ok(IndexConfig {
            max_documents_per_shard,
            doc_id_queue_capacity,
            flush_interval: self.flush_interval,
            ram_buffer_docs,
            analyzers: self.analyzers.unwrap_or(defaults.analyzers),
        })
    }
}
