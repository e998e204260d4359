//! The writer slot for one open shard.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Instant;

use log::{debug, error, warn};
use parking_lot::Mutex;

use crate::config::IndexConfig;
use crate::data::Document;
use crate::error::{Result, SalixError};
use crate::index::writer::{IndexWriter, IndexWriterConfig, MemoryView};
use crate::shard::descriptor::{ShardDescriptor, ShardStatus};
use crate::shard::key::ShardKey;
use crate::shard::store::ShardStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SlotState {
    Open,
    Full,
    Closed,
}

#[derive(Debug)]
struct WriterInner {
    index: IndexWriter,
    state: SlotState,
    corrupt: bool,
}

/// Owns the open index writer for one shard.
///
/// Exactly one live `ShardWriter` exists per open shard; the cache owns its
/// lifecycle. The writer is shared by concurrent ingest threads, so all
/// engine access is serialized through an internal mutex, while capacity
/// and lifecycle flags are readable without it.
///
/// State machine: Open -> Full -> Closed, or Open -> Closed directly. Full
/// and Open both permit flushing; Closed is terminal and further writes
/// fail with an illegal-state error. Reaching capacity fails the add with
/// [`SalixError::ShardFull`]; the caller resolves it by re-acquiring a
/// writer from the cache, which rolls the key over.
#[derive(Debug)]
pub struct ShardWriter {
    shard_id: u64,
    key: ShardKey,
    max_documents: u32,
    store: Arc<ShardStore>,
    inner: Mutex<WriterInner>,
    /// Documents accepted over the shard's lifetime (committed + buffered).
    accepted: AtomicU32,
    closed: AtomicBool,
}

impl ShardWriter {
    /// Open a writer for the shard described by `descriptor`, marking the
    /// shard open in the store.
    pub fn open(
        store: Arc<ShardStore>,
        descriptor: &ShardDescriptor,
        config: &IndexConfig,
    ) -> Result<Self> {
        let start = Instant::now();
        let storage = store.storage_for(descriptor);

        let index = IndexWriter::open(storage, IndexWriterConfig::from(config)).map_err(|e| {
            SalixError::shard_open(format!("shard {}: {e}", descriptor.id))
        })?;

        let committed = index.committed_doc_count();
        if committed != descriptor.document_count {
            warn!(
                "shard {}: index has {committed} committed docs but descriptor says {}",
                descriptor.id, descriptor.document_count
            );
        }

        store.set_status(descriptor.id, ShardStatus::Open)?;

        let max_documents = config.max_documents_per_shard;
        let state = if committed >= max_documents {
            SlotState::Full
        } else {
            SlotState::Open
        };

        debug!(
            "opened shard {} ({committed} committed docs) in {:?}",
            descriptor.id,
            start.elapsed()
        );

        Ok(ShardWriter {
            shard_id: descriptor.id,
            key: descriptor.key(),
            max_documents,
            store,
            inner: Mutex::new(WriterInner {
                index,
                state,
                corrupt: false,
            }),
            accepted: AtomicU32::new(committed),
            closed: AtomicBool::new(false),
        })
    }

    /// Add a document to the shard.
    ///
    /// Fails with [`SalixError::ShardFull`] once the shard has accepted its
    /// configured maximum; the document is not buffered in that case.
    pub fn add_document(&self, doc: Document) -> Result<()> {
        let mut inner = self.inner.lock();

        match inner.state {
            SlotState::Closed => {
                return Err(SalixError::illegal_state(format!(
                    "shard {} is closed",
                    self.shard_id
                )));
            }
            SlotState::Full => {
                return Err(SalixError::ShardFull {
                    shard_id: self.shard_id,
                });
            }
            SlotState::Open => {}
        }
        if inner.corrupt {
            return Err(SalixError::illegal_state(format!(
                "shard {} is corrupt",
                self.shard_id
            )));
        }

        if self.accepted.load(Ordering::SeqCst) >= self.max_documents {
            inner.state = SlotState::Full;
            return Err(SalixError::ShardFull {
                shard_id: self.shard_id,
            });
        }

        match inner.index.add_document(doc) {
            Ok(_ordinal) => {
                let accepted = self.accepted.fetch_add(1, Ordering::SeqCst) + 1;
                if accepted >= self.max_documents {
                    inner.state = SlotState::Full;
                    debug!(
                        "shard {} reached capacity ({accepted} docs)",
                        self.shard_id
                    );
                }
                Ok(())
            }
            Err(e) => {
                // An unexpected engine failure means the shard's data can no
                // longer be trusted.
                inner.corrupt = true;
                error!(
                    "shard {}: failed to add document, marking corrupt: {e}",
                    self.shard_id
                );
                if let Err(status_err) =
                    self.store.set_status(self.shard_id, ShardStatus::Corrupt)
                {
                    error!(
                        "shard {}: failed to record corrupt status: {status_err}",
                        self.shard_id
                    );
                }
                Err(e)
            }
        }
    }

    /// Commit buffered documents, making them visible to readers and
    /// synchronizing the descriptor's committed document count.
    pub fn flush(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.state == SlotState::Closed {
            return Err(SalixError::illegal_state(format!(
                "shard {} is closed",
                self.shard_id
            )));
        }

        let start = Instant::now();
        let committed = inner.index.commit()?;
        self.store.record_commit(self.shard_id, committed)?;
        debug!(
            "shard {}: flushed, {committed} committed docs in {:?}",
            self.shard_id,
            start.elapsed()
        );
        Ok(())
    }

    /// Commit and close the writer, marking the shard closed. Idempotent:
    /// closing an already-closed writer is a no-op.
    pub fn close(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.state == SlotState::Closed {
            return Ok(());
        }

        let result = inner.index.close();
        inner.state = SlotState::Closed;
        self.closed.store(true, Ordering::SeqCst);

        match result {
            Ok(()) => {
                let committed = inner.index.committed_doc_count();
                self.store.record_commit(self.shard_id, committed)?;
                self.store.set_status(self.shard_id, ShardStatus::Closed)?;
                debug!("closed shard {} ({committed} committed docs)", self.shard_id);
                Ok(())
            }
            Err(e) => {
                // The commit failed; record the shard as corrupt but still
                // leave the slot closed so the cache can drop it.
                error!("shard {}: close failed: {e}", self.shard_id);
                if let Err(status_err) =
                    self.store.set_status(self.shard_id, ShardStatus::Corrupt)
                {
                    error!(
                        "shard {}: failed to record corrupt status: {status_err}",
                        self.shard_id
                    );
                }
                Err(e)
            }
        }
    }

    /// Snapshot the writer's uncommitted state for near-real-time reads.
    /// Returns None once the writer is closed.
    pub fn memory_view(&self) -> Option<MemoryView> {
        let inner = self.inner.lock();
        if inner.state == SlotState::Closed {
            None
        } else {
            Some(inner.index.memory_view())
        }
    }

    pub fn shard_id(&self) -> u64 {
        self.shard_id
    }

    pub fn key(&self) -> &ShardKey {
        &self.key
    }

    pub fn max_documents(&self) -> u32 {
        self.max_documents
    }

    /// Documents accepted over the shard's lifetime.
    pub fn document_count(&self) -> u32 {
        self.accepted.load(Ordering::SeqCst)
    }

    /// Documents accepted but not yet committed.
    pub fn buffered_document_count(&self) -> u32 {
        self.inner.lock().index.buffered_doc_count()
    }

    /// Committed document count.
    pub fn committed_document_count(&self) -> u32 {
        self.inner.lock().index.committed_doc_count()
    }

    /// True once the shard has accepted its maximum document count.
    pub fn is_full(&self) -> bool {
        self.accepted.load(Ordering::SeqCst) >= self.max_documents
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Storage;
    use crate::storage::memory::{MemoryStorage, MemoryStorageConfig};

    fn make_storage() -> Arc<dyn Storage> {
        Arc::new(MemoryStorage::new(MemoryStorageConfig::default()))
    }

    fn make_store() -> Arc<ShardStore> {
        Arc::new(ShardStore::open(make_storage(), vec![make_storage()]).unwrap())
    }

    fn make_writer(store: &Arc<ShardStore>, max_documents: u32) -> ShardWriter {
        let key = ShardKey::new("IDX1", "P0", 0);
        let descriptor = store.create_shard(&key).unwrap();
        let config = IndexConfig::builder()
            .max_documents_per_shard(max_documents)
            .build()
            .unwrap();
        ShardWriter::open(store.clone(), &descriptor, &config).unwrap()
    }

    fn sample_doc() -> Document {
        Document::new().add_field("body", "hello world")
    }

    #[test]
    fn test_capacity_gate() {
        let store = make_store();
        let writer = make_writer(&store, 3);

        for _ in 0..3 {
            writer.add_document(sample_doc()).unwrap();
        }
        assert!(writer.is_full());

        let err = writer.add_document(sample_doc()).unwrap_err();
        assert!(matches!(err, SalixError::ShardFull { shard_id: 1 }));
        // The rejected document was not buffered.
        assert_eq!(writer.document_count(), 3);
    }

    #[test]
    fn test_flush_synchronizes_descriptor_count() {
        let store = make_store();
        let writer = make_writer(&store, 100);

        for _ in 0..5 {
            writer.add_document(sample_doc()).unwrap();
        }

        // Buffered documents are not visible in the descriptor.
        assert_eq!(store.get(1).unwrap().document_count, 0);
        assert_eq!(writer.buffered_document_count(), 5);

        writer.flush().unwrap();

        let descriptor = store.get(1).unwrap();
        assert_eq!(descriptor.document_count, 5);
        assert!(descriptor.committed_at.is_some());
        assert_eq!(writer.committed_document_count(), 5);
        assert_eq!(writer.buffered_document_count(), 0);

        // The shard stays open and writable after a flush.
        writer.add_document(sample_doc()).unwrap();
    }

    #[test]
    fn test_close_idempotent() {
        let store = make_store();
        let writer = make_writer(&store, 100);
        writer.add_document(sample_doc()).unwrap();

        writer.close().unwrap();
        assert!(writer.is_closed());
        assert_eq!(store.get(1).unwrap().status, ShardStatus::Closed);
        assert_eq!(store.get(1).unwrap().document_count, 1);

        // Second close is a no-op.
        writer.close().unwrap();
        assert_eq!(store.get(1).unwrap().document_count, 1);
    }

    #[test]
    fn test_closed_writer_rejects_operations() {
        let store = make_store();
        let writer = make_writer(&store, 100);
        writer.close().unwrap();

        assert!(matches!(
            writer.add_document(sample_doc()).unwrap_err(),
            SalixError::IllegalState(_)
        ));
        assert!(matches!(writer.flush().unwrap_err(), SalixError::IllegalState(_)));
        assert!(writer.memory_view().is_none());
    }

    #[test]
    fn test_full_shard_still_flushes() {
        let store = make_store();
        let writer = make_writer(&store, 2);

        writer.add_document(sample_doc()).unwrap();
        writer.add_document(sample_doc()).unwrap();
        assert!(writer.is_full());

        writer.flush().unwrap();
        assert_eq!(store.get(1).unwrap().document_count, 2);
    }

    #[test]
    fn test_reopen_closed_shard_keeps_counts() {
        let store = make_store();
        let key = ShardKey::new("IDX1", "P0", 0);
        let descriptor = store.create_shard(&key).unwrap();
        let config = IndexConfig::builder()
            .max_documents_per_shard(10)
            .build()
            .unwrap();

        {
            let writer = ShardWriter::open(store.clone(), &descriptor, &config).unwrap();
            for _ in 0..4 {
                writer.add_document(sample_doc()).unwrap();
            }
            writer.close().unwrap();
        }

        let descriptor = store.get(descriptor.id).unwrap();
        let writer = ShardWriter::open(store.clone(), &descriptor, &config).unwrap();
        assert_eq!(writer.document_count(), 4);
        assert!(!writer.is_full());
        assert_eq!(store.get(descriptor.id).unwrap().status, ShardStatus::Open);
    }
}
