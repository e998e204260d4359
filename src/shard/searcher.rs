//! Read access to a shard, independent of the write-side lifecycle.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use log::debug;
use parking_lot::RwLock;

use crate::analysis::PerFieldAnalyzers;
use crate::error::{Result, SalixError};
use crate::index::reader::IndexReader;
use crate::shard::descriptor::ShardStatus;
use crate::shard::store::ShardStore;
use crate::shard::writer::ShardWriter;
use crate::storage::Storage;

/// A refreshable, thread-safe read view over one shard.
///
/// Searchers work over open and closed shards alike. When constructed with
/// a live [`ShardWriter`], the view is near-real-time: refreshing picks up
/// documents buffered in the writer but not yet committed. Each search
/// acquires its own immutable [`ShardSnapshot`]; inflight commits and
/// rollovers never invalidate an acquired snapshot.
pub struct ShardSearcher {
    shard_id: u64,
    storage: Arc<dyn Storage>,
    analyzers: Arc<PerFieldAnalyzers>,
    live_writer: Option<Arc<ShardWriter>>,
    current: RwLock<Option<Arc<IndexReader>>>,
    outstanding: Arc<AtomicUsize>,
}

impl std::fmt::Debug for ShardSearcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShardSearcher")
            .field("shard_id", &self.shard_id)
            .field("near_real_time", &self.live_writer.is_some())
            .field("outstanding", &self.outstanding.load(Ordering::SeqCst))
            .finish()
    }
}

impl ShardSearcher {
    /// Open a searcher over a shard's committed content.
    pub fn open(
        store: &ShardStore,
        shard_id: u64,
        analyzers: Arc<PerFieldAnalyzers>,
    ) -> Result<Self> {
        Self::open_inner(store, shard_id, analyzers, None)
    }

    /// Open a near-real-time searcher paired with the shard's live writer.
    pub fn open_with_writer(
        store: &ShardStore,
        writer: Arc<ShardWriter>,
        analyzers: Arc<PerFieldAnalyzers>,
    ) -> Result<Self> {
        let shard_id = writer.shard_id();
        Self::open_inner(store, shard_id, analyzers, Some(writer))
    }

    fn open_inner(
        store: &ShardStore,
        shard_id: u64,
        analyzers: Arc<PerFieldAnalyzers>,
        live_writer: Option<Arc<ShardWriter>>,
    ) -> Result<Self> {
        let descriptor = store
            .get(shard_id)
            .ok_or_else(|| SalixError::not_found(format!("shard {shard_id}")))?;
        if descriptor.status == ShardStatus::Deleted {
            return Err(SalixError::not_found(format!(
                "shard {shard_id} is deleted"
            )));
        }

        let searcher = ShardSearcher {
            shard_id,
            storage: store.storage_for(&descriptor),
            analyzers,
            live_writer,
            current: RwLock::new(None),
            outstanding: Arc::new(AtomicUsize::new(0)),
        };
        searcher.refresh()?;
        Ok(searcher)
    }

    fn build_reader(&self) -> Result<Arc<IndexReader>> {
        let view = self
            .live_writer
            .as_ref()
            .and_then(|writer| writer.memory_view());

        let reader = match view {
            Some(view) => {
                IndexReader::open_with_view(&self.storage, self.analyzers.clone(), view)?
            }
            None => IndexReader::open(&self.storage, self.analyzers.clone())?,
        };
        Ok(Arc::new(reader))
    }

    /// Rebuild the read view so newly committed (and, when paired with a
    /// writer, newly buffered) documents become visible to snapshots
    /// acquired afterwards. Already-acquired snapshots are unaffected.
    pub fn refresh(&self) -> Result<()> {
        let reader = self.build_reader()?;
        debug!(
            "shard {}: refreshed reader ({} docs visible)",
            self.shard_id,
            reader.doc_count()
        );
        *self.current.write() = Some(reader);
        Ok(())
    }

    /// Acquire an immutable snapshot for query execution.
    pub fn acquire(&self) -> Result<ShardSnapshot> {
        let current = self.current.read();
        let reader = current
            .as_ref()
            .ok_or_else(|| {
                SalixError::illegal_state(format!("shard searcher {} is destroyed", self.shard_id))
            })?
            .clone();
        self.outstanding.fetch_add(1, Ordering::SeqCst);
        Ok(ShardSnapshot {
            shard_id: self.shard_id,
            reader,
            outstanding: self.outstanding.clone(),
        })
    }

    /// Return a snapshot. Equivalent to dropping it.
    pub fn release(&self, snapshot: ShardSnapshot) {
        drop(snapshot);
    }

    /// Number of snapshots currently outstanding.
    pub fn outstanding_snapshots(&self) -> usize {
        self.outstanding.load(Ordering::SeqCst)
    }

    /// Release the searcher's resources.
    ///
    /// All snapshots must have been released first; destroying a searcher
    /// that is still in use is an error.
    pub fn destroy(&self) -> Result<()> {
        let mut current = self.current.write();
        let outstanding = self.outstanding.load(Ordering::SeqCst);
        if outstanding > 0 {
            return Err(SalixError::illegal_state(format!(
                "shard searcher {} destroyed with {outstanding} outstanding snapshots",
                self.shard_id
            )));
        }
        *current = None;
        Ok(())
    }

    pub fn shard_id(&self) -> u64 {
        self.shard_id
    }
}

/// An immutable point-in-time view of a shard, safe to read for the
/// duration of one search.
pub struct ShardSnapshot {
    shard_id: u64,
    reader: Arc<IndexReader>,
    outstanding: Arc<AtomicUsize>,
}

impl std::fmt::Debug for ShardSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShardSnapshot")
            .field("shard_id", &self.shard_id)
            .field("doc_count", &self.reader.doc_count())
            .finish()
    }
}

impl ShardSnapshot {
    pub fn shard_id(&self) -> u64 {
        self.shard_id
    }

    pub fn reader(&self) -> &IndexReader {
        &self.reader
    }
}

impl Drop for ShardSnapshot {
    fn drop(&mut self) {
        self.outstanding.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IndexConfig;
    use crate::data::Document;
    use crate::shard::key::ShardKey;
    use crate::storage::memory::{MemoryStorage, MemoryStorageConfig};

    fn make_storage() -> Arc<dyn Storage> {
        Arc::new(MemoryStorage::new(MemoryStorageConfig::default()))
    }

    fn make_store() -> Arc<ShardStore> {
        Arc::new(ShardStore::open(make_storage(), vec![make_storage()]).unwrap())
    }

    fn make_writer(store: &Arc<ShardStore>) -> Arc<ShardWriter> {
        let key = ShardKey::new("IDX1", "P0", 0);
        let descriptor = store.create_shard(&key).unwrap();
        let config = IndexConfig::default();
        Arc::new(ShardWriter::open(store.clone(), &descriptor, &config).unwrap())
    }

    fn analyzers() -> Arc<PerFieldAnalyzers> {
        IndexConfig::default().analyzers.clone()
    }

    fn sample_doc() -> Document {
        Document::new().add_field("body", "hello world")
    }

    #[test]
    fn test_committed_only_searcher() {
        let store = make_store();
        let writer = make_writer(&store);

        writer.add_document(sample_doc()).unwrap();
        writer.flush().unwrap();
        writer.add_document(sample_doc()).unwrap();

        let searcher = ShardSearcher::open(&store, writer.shard_id(), analyzers()).unwrap();
        let snapshot = searcher.acquire().unwrap();

        // Only the flushed document is visible without writer pairing.
        assert_eq!(snapshot.reader().doc_count(), 1);
        searcher.release(snapshot);
    }

    #[test]
    fn test_near_real_time_searcher() {
        let store = make_store();
        let writer = make_writer(&store);

        writer.add_document(sample_doc()).unwrap();
        writer.flush().unwrap();
        writer.add_document(sample_doc()).unwrap();

        let searcher =
            ShardSearcher::open_with_writer(&store, writer.clone(), analyzers()).unwrap();
        let snapshot = searcher.acquire().unwrap();
        assert_eq!(snapshot.reader().doc_count(), 2);
        searcher.release(snapshot);
    }

    #[test]
    fn test_snapshot_stable_across_refresh() {
        let store = make_store();
        let writer = make_writer(&store);

        writer.add_document(sample_doc()).unwrap();
        writer.flush().unwrap();

        let searcher = ShardSearcher::open(&store, writer.shard_id(), analyzers()).unwrap();
        let snapshot = searcher.acquire().unwrap();

        // Commit more documents and refresh the searcher.
        writer.add_document(sample_doc()).unwrap();
        writer.flush().unwrap();
        searcher.refresh().unwrap();

        // The old snapshot still reflects acquire-time state.
        assert_eq!(snapshot.reader().doc_count(), 1);

        // A newly acquired snapshot sees the fresh commit.
        let fresh = searcher.acquire().unwrap();
        assert_eq!(fresh.reader().doc_count(), 2);

        searcher.release(snapshot);
        searcher.release(fresh);
    }

    #[test]
    fn test_destroy_refuses_outstanding_snapshots() {
        let store = make_store();
        let writer = make_writer(&store);
        writer.flush().unwrap();

        let searcher = ShardSearcher::open(&store, writer.shard_id(), analyzers()).unwrap();
        let snapshot = searcher.acquire().unwrap();

        assert!(searcher.destroy().is_err());
        searcher.release(snapshot);
        searcher.destroy().unwrap();

        // Acquire after destroy fails.
        assert!(searcher.acquire().is_err());
    }

    #[test]
    fn test_searcher_over_closed_shard() {
        let store = make_store();
        let writer = make_writer(&store);
        writer.add_document(sample_doc()).unwrap();
        writer.close().unwrap();

        let searcher = ShardSearcher::open(&store, writer.shard_id(), analyzers()).unwrap();
        let snapshot = searcher.acquire().unwrap();
        assert_eq!(snapshot.reader().doc_count(), 1);
    }

    #[test]
    fn test_missing_shard() {
        let store = make_store();
        assert!(ShardSearcher::open(&store, 99, analyzers()).is_err());
    }
}
