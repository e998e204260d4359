//! Point-in-time read view over one shard's index.

use std::sync::Arc;

use crate::analysis::PerFieldAnalyzers;
use crate::data::Document;
use crate::error::Result;
use crate::index::segment::{SegmentReader, read_index_manifest};
use crate::index::writer::MemoryView;
use crate::storage::Storage;

/// An immutable reader over the committed segment set, optionally extended
/// with a live writer's uncommitted state for near-real-time reads.
///
/// A reader reflects the index as it was when the reader was opened;
/// commits and rollovers that happen afterwards are not visible through it.
#[derive(Debug)]
pub struct IndexReader {
    segments: Vec<SegmentReader>,
    memory: Option<MemoryView>,
    analyzers: Arc<PerFieldAnalyzers>,
}

impl IndexReader {
    /// Open a reader over the committed segments only.
    pub fn open(storage: &Arc<dyn Storage>, analyzers: Arc<PerFieldAnalyzers>) -> Result<Self> {
        Self::open_inner(storage, analyzers, None)
    }

    /// Open a reader over the committed segments plus a live writer's
    /// uncommitted state.
    pub fn open_with_view(
        storage: &Arc<dyn Storage>,
        analyzers: Arc<PerFieldAnalyzers>,
        view: MemoryView,
    ) -> Result<Self> {
        Self::open_inner(storage, analyzers, Some(view))
    }

    fn open_inner(
        storage: &Arc<dyn Storage>,
        analyzers: Arc<PerFieldAnalyzers>,
        view: Option<MemoryView>,
    ) -> Result<Self> {
        let manifest = read_index_manifest(storage)?;

        let mut segments = Vec::with_capacity(manifest.segments.len());
        for info in manifest.segments {
            segments.push(SegmentReader::open(storage, info)?);
        }

        // Pending segments from the writer's view are readable files too;
        // they come after the committed set in ordinal order.
        let memory = if let Some(mut view) = view {
            for info in std::mem::take(&mut view.pending_segments) {
                segments.push(SegmentReader::open(storage, info)?);
            }
            Some(view)
        } else {
            None
        };

        Ok(IndexReader {
            segments,
            memory,
            analyzers,
        })
    }

    /// The analyzers used when the index was written; queries analyze their
    /// terms through these so lookups line up with indexed terms.
    pub fn analyzers(&self) -> &Arc<PerFieldAnalyzers> {
        &self.analyzers
    }

    /// Postings for a term across all visible documents, in ascending
    /// ordinal order.
    pub fn postings(&self, term: &str) -> Vec<u64> {
        let mut ordinals = Vec::new();
        for segment in &self.segments {
            if let Some(segment_postings) = segment.term_postings(term) {
                ordinals.extend_from_slice(segment_postings);
            }
        }
        if let Some(memory) = &self.memory {
            if let Some(memory_postings) = memory.postings.get(term) {
                ordinals.extend_from_slice(memory_postings);
            }
        }
        ordinals
    }

    /// All visible ordinals in ascending order.
    pub fn all_ordinals(&self) -> Vec<u64> {
        let mut ordinals = Vec::new();
        for segment in &self.segments {
            ordinals.extend_from_slice(segment.ordinals());
        }
        if let Some(memory) = &self.memory {
            ordinals.extend_from_slice(&memory.ordinals);
        }
        ordinals
    }

    /// Resolve a stored document by ordinal.
    pub fn doc(&self, ordinal: u64) -> Option<&Document> {
        for segment in &self.segments {
            if segment.info().contains(ordinal) {
                if let Some(doc) = segment.doc(ordinal) {
                    return Some(doc);
                }
            }
        }
        self.memory.as_ref().and_then(|memory| memory.docs.get(&ordinal))
    }

    /// Number of documents visible through this reader.
    pub fn doc_count(&self) -> u32 {
        let segment_docs: u32 = self.segments.iter().map(|s| s.doc_count()).sum();
        let memory_docs = self
            .memory
            .as_ref()
            .map(|memory| memory.ordinals.len() as u32)
            .unwrap_or(0);
        segment_docs + memory_docs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IndexConfig;
    use crate::index::writer::{IndexWriter, IndexWriterConfig};
    use crate::storage::memory::{MemoryStorage, MemoryStorageConfig};

    fn make_storage() -> Arc<dyn Storage> {
        Arc::new(MemoryStorage::new(MemoryStorageConfig::default()))
    }

    fn default_analyzers() -> Arc<PerFieldAnalyzers> {
        IndexConfig::default().analyzers.clone()
    }

    fn make_writer(storage: &Arc<dyn Storage>) -> IndexWriter {
        let config = IndexWriterConfig::from(&IndexConfig::default());
        IndexWriter::open(storage.clone(), config).unwrap()
    }

    #[test]
    fn test_committed_only_view() {
        let storage = make_storage();
        let mut writer = make_writer(&storage);

        writer
            .add_document(Document::new().add_field("body", "hello world"))
            .unwrap();
        writer.commit().unwrap();
        writer
            .add_document(Document::new().add_field("body", "hello again"))
            .unwrap();

        let reader = IndexReader::open(&storage, default_analyzers()).unwrap();
        assert_eq!(reader.doc_count(), 1);
        assert_eq!(reader.postings("body:hello"), vec![0]);
        assert!(reader.doc(0).is_some());
        assert!(reader.doc(1).is_none());
    }

    #[test]
    fn test_near_real_time_view() {
        let storage = make_storage();
        let mut writer = make_writer(&storage);

        writer
            .add_document(Document::new().add_field("body", "hello world"))
            .unwrap();
        writer.commit().unwrap();
        writer
            .add_document(Document::new().add_field("body", "hello again"))
            .unwrap();

        let reader =
            IndexReader::open_with_view(&storage, default_analyzers(), writer.memory_view())
                .unwrap();
        assert_eq!(reader.doc_count(), 2);
        assert_eq!(reader.postings("body:hello"), vec![0, 1]);
        assert_eq!(
            reader.doc(1).unwrap().get("body").and_then(|v| v.as_text()),
            Some("hello again")
        );
    }

    #[test]
    fn test_snapshot_isolation_from_later_commits() {
        let storage = make_storage();
        let mut writer = make_writer(&storage);

        writer
            .add_document(Document::new().add_field("body", "first"))
            .unwrap();
        writer.commit().unwrap();

        let reader = IndexReader::open(&storage, default_analyzers()).unwrap();

        writer
            .add_document(Document::new().add_field("body", "second"))
            .unwrap();
        writer.commit().unwrap();

        // The reader still reflects the state at open time.
        assert_eq!(reader.doc_count(), 1);
        assert!(reader.postings("body:second").is_empty());
    }

    #[test]
    fn test_empty_index() {
        let storage = make_storage();
        let reader = IndexReader::open(&storage, default_analyzers()).unwrap();
        assert_eq!(reader.doc_count(), 0);
        assert!(reader.all_ordinals().is_empty());
        assert!(reader.postings("a:b").is_empty());
    }
}
