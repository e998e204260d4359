//! Index writer for one shard.
//!
//! The writer buffers analyzed documents in memory and turns them into
//! immutable segments. Segments become visible to readers only when the
//! buffer is committed: an intermediate segment written because the RAM
//! buffer filled up stays pending (invisible) until the next `commit`.

use std::sync::Arc;

use ahash::AHashMap;
use log::debug;

use crate::config::IndexConfig;
use crate::data::{DataValue, Document};
use crate::error::{Result, SalixError};
use crate::index::segment::{
    IndexManifest, SegmentInfo, SegmentWriter, read_index_manifest, read_segment_meta,
    write_index_manifest,
};
use crate::storage::Storage;

/// Configuration for an [`IndexWriter`].
#[derive(Debug, Clone)]
pub struct IndexWriterConfig {
    /// Number of documents buffered in memory before an intermediate
    /// segment is written.
    pub ram_buffer_docs: usize,

    /// Per-field analyzer selection.
    pub analyzers: Arc<crate::analysis::PerFieldAnalyzers>,
}

impl From<&IndexConfig> for IndexWriterConfig {
    fn from(config: &IndexConfig) -> Self {
        IndexWriterConfig {
            ram_buffer_docs: config.ram_buffer_docs,
            analyzers: config.analyzers.clone(),
        }
    }
}

/// Statistics about the writing process.
#[derive(Debug, Clone, Default)]
pub struct WriterStats {
    /// Number of documents added since the writer was opened.
    pub docs_added: u64,
    /// Number of segments written (pending and committed).
    pub segments_created: u32,
}

/// A point-in-time copy of a writer's uncommitted state, used for
/// near-real-time reads.
#[derive(Debug, Clone, Default)]
pub struct MemoryView {
    /// Segments written but not yet committed.
    pub pending_segments: Vec<SegmentInfo>,
    /// In-memory postings of the current buffer.
    pub postings: AHashMap<String, Vec<u64>>,
    /// In-memory stored documents of the current buffer.
    pub docs: AHashMap<u64, Document>,
    /// Buffered ordinals in ascending order.
    pub ordinals: Vec<u64>,
}

/// Index writer over one shard's storage.
pub struct IndexWriter {
    storage: Arc<dyn Storage>,
    config: IndexWriterConfig,

    /// In-memory postings being built.
    postings: AHashMap<String, Vec<u64>>,
    /// Buffered documents with their assigned ordinals, in insertion order.
    buffered_docs: Vec<(u64, Document)>,

    /// Segments flushed from the buffer but not yet committed.
    pending_segments: Vec<SegmentInfo>,
    /// The committed segment set.
    manifest: IndexManifest,

    next_ordinal: u64,
    next_generation: u32,
    closed: bool,
    stats: WriterStats,
}

impl std::fmt::Debug for IndexWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexWriter")
            .field("next_ordinal", &self.next_ordinal)
            .field("next_generation", &self.next_generation)
            .field("buffered_docs", &self.buffered_docs.len())
            .field("pending_segments", &self.pending_segments.len())
            .field("committed_segments", &self.manifest.segments.len())
            .field("closed", &self.closed)
            .finish()
    }
}

impl IndexWriter {
    /// Open a writer over the shard's storage, recovering the committed
    /// state from the segment manifest. Segment files that were written but
    /// never committed (a previous writer died before its commit) are
    /// removed.
    pub fn open(storage: Arc<dyn Storage>, config: IndexWriterConfig) -> Result<Self> {
        let manifest = read_index_manifest(&storage)?;
        Self::remove_stray_segments(&storage, &manifest)?;

        let next_ordinal = manifest
            .segments
            .iter()
            .map(|segment| segment.max_ordinal + 1)
            .max()
            .unwrap_or(0);
        let next_generation = manifest
            .segments
            .iter()
            .map(|segment| segment.generation + 1)
            .max()
            .unwrap_or(0);

        Ok(IndexWriter {
            storage,
            config,
            postings: AHashMap::new(),
            buffered_docs: Vec::new(),
            pending_segments: Vec::new(),
            manifest,
            next_ordinal,
            next_generation,
            closed: false,
            stats: WriterStats::default(),
        })
    }

    /// Delete segment files that are not listed in the manifest.
    fn remove_stray_segments(storage: &Arc<dyn Storage>, manifest: &IndexManifest) -> Result<()> {
        for file in storage.list_files()? {
            if !file.ends_with(".meta") {
                continue;
            }
            let Ok(info) = read_segment_meta(storage, &file) else {
                continue;
            };
            if manifest
                .segments
                .iter()
                .any(|segment| segment.generation == info.generation)
            {
                continue;
            }
            debug!("removing uncommitted segment {}", info.name);
            for stray in [info.postings_file(), info.stored_file(), info.meta_file()] {
                if storage.file_exists(&stray) {
                    storage.delete_file(&stray)?;
                }
            }
        }
        Ok(())
    }

    fn check_closed(&self) -> Result<()> {
        if self.closed {
            Err(SalixError::illegal_state("index writer is closed"))
        } else {
            Ok(())
        }
    }

    /// Add a document, assigning and returning its ordinal.
    pub fn add_document(&mut self, doc: Document) -> Result<u64> {
        self.check_closed()?;

        let ordinal = self.next_ordinal;
        self.next_ordinal += 1;

        for term in self.analyze_document(&doc) {
            self.postings.entry(term).or_default().push(ordinal);
        }
        self.buffered_docs.push((ordinal, doc));
        self.stats.docs_added += 1;

        if self.buffered_docs.len() >= self.config.ram_buffer_docs {
            self.flush_buffer_segment()?;
        }

        Ok(ordinal)
    }

    /// Analyze a document into deduplicated index terms.
    fn analyze_document(&self, doc: &Document) -> Vec<String> {
        let mut terms = Vec::new();

        if let Some(id) = &doc.id {
            let trimmed = id.trim();
            if !trimmed.is_empty() {
                terms.push(format!("_id:{trimmed}"));
            }
        }

        for (field_name, value) in &doc.fields {
            match value {
                DataValue::Text(text) => {
                    for token in self.config.analyzers.analyze_field(field_name, text) {
                        terms.push(format!("{field_name}:{token}"));
                    }
                }
                DataValue::String(keyword) => {
                    let trimmed = keyword.trim();
                    if !trimmed.is_empty() {
                        terms.push(format!("{field_name}:{trimmed}"));
                    }
                }
                DataValue::Int64(num) => terms.push(format!("{field_name}:{num}")),
                DataValue::Float64(num) => terms.push(format!("{field_name}:{num}")),
                DataValue::Bool(boolean) => terms.push(format!("{field_name}:{boolean}")),
                DataValue::DateTime(dt) => {
                    terms.push(format!("{field_name}:{}", dt.to_rfc3339()));
                }
                DataValue::Null => {}
            }
        }

        // One posting per (term, document) regardless of term frequency.
        terms.sort();
        terms.dedup();
        terms
    }

    /// Write the in-memory buffer as a pending segment.
    fn flush_buffer_segment(&mut self) -> Result<()> {
        if self.buffered_docs.is_empty() {
            return Ok(());
        }

        let generation = self.next_generation;
        let writer = SegmentWriter::new(self.storage.clone());
        let info = writer.write(generation, &self.postings, &self.buffered_docs)?;
        debug!(
            "flushed buffer as pending segment {} ({} docs)",
            info.name, info.doc_count
        );

        self.pending_segments.push(info);
        self.next_generation += 1;
        self.postings.clear();
        self.buffered_docs.clear();
        self.stats.segments_created += 1;
        Ok(())
    }

    /// Commit all buffered and pending documents, making them visible to
    /// readers. Returns the total committed document count.
    pub fn commit(&mut self) -> Result<u32> {
        self.check_closed()?;

        self.flush_buffer_segment()?;
        if !self.pending_segments.is_empty() {
            self.manifest
                .segments
                .append(&mut self.pending_segments);
            write_index_manifest(&self.storage, &self.manifest)?;
            debug!(
                "committed manifest with {} segments ({} docs)",
                self.manifest.segments.len(),
                self.manifest.doc_count()
            );
        }

        Ok(self.manifest.doc_count())
    }

    /// Commit and seal the writer. Idempotent.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.commit()?;
        self.closed = true;
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Number of committed documents.
    pub fn committed_doc_count(&self) -> u32 {
        self.manifest.doc_count()
    }

    /// Number of accepted but uncommitted documents (pending segments plus
    /// the in-memory buffer).
    pub fn buffered_doc_count(&self) -> u32 {
        let pending: u32 = self
            .pending_segments
            .iter()
            .map(|segment| segment.doc_count)
            .sum();
        pending + self.buffered_docs.len() as u32
    }

    /// The ordinal the next added document will receive.
    pub fn next_ordinal(&self) -> u64 {
        self.next_ordinal
    }

    pub fn stats(&self) -> &WriterStats {
        &self.stats
    }

    /// Snapshot the uncommitted state for near-real-time reads.
    pub fn memory_view(&self) -> MemoryView {
        let mut docs = AHashMap::with_capacity(self.buffered_docs.len());
        let mut ordinals = Vec::with_capacity(self.buffered_docs.len());
        for (ordinal, doc) in &self.buffered_docs {
            docs.insert(*ordinal, doc.clone());
            ordinals.push(*ordinal);
        }
        MemoryView {
            pending_segments: self.pending_segments.clone(),
            postings: self.postings.clone(),
            docs,
            ordinals,
        }
    }
}
