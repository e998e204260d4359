//! The shard writer cache.
//!
//! Pool API into open shard writers. The cache keeps two indices over the
//! live slots, by [`ShardKey`] and by shard id, that always agree: any
//! operation removing one entry removes the other in the same critical
//! section. Get-or-create is atomic per key via striped key locks, so
//! concurrent callers of the same key never observe a half-constructed
//! slot while callers of different keys do not contend.

use std::hash::{Hash, Hasher};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use ahash::AHashMap;
use crossbeam_channel::{Sender, select, tick};
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use rayon::prelude::*;

use crate::config::IndexConfig;
use crate::data::Document;
use crate::error::{Result, SalixError};
use crate::shard::key::ShardKey;
use crate::shard::store::{FindShardCriteria, ShardStore};
use crate::shard::writer::ShardWriter;

const KEY_LOCK_STRIPES: usize = 64;
const MAX_ADD_ATTEMPTS: u32 = 100;

/// Bulk operation applied by [`ShardWriterCache::perform_action`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShardAction {
    /// Commit without closing; the shard stays open and writable.
    Flush,
    /// Commit, close and evict the slot.
    Close,
}

/// Striped locks keyed by hash, serializing creators of the same shard key
/// without a single global creation lock.
#[derive(Debug)]
struct StripedLock {
    stripes: Vec<Mutex<()>>,
}

impl StripedLock {
    fn new(count: usize) -> Self {
        StripedLock {
            stripes: (0..count).map(|_| Mutex::new(())).collect(),
        }
    }

    fn lock<K: Hash>(&self, key: &K) -> parking_lot::MutexGuard<'_, ()> {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        key.hash(&mut hasher);
        let index = (hasher.finish() as usize) % self.stripes.len();
        self.stripes[index].lock()
    }
}

#[derive(Debug, Default)]
struct CacheState {
    by_key: AHashMap<ShardKey, Arc<ShardWriter>>,
    by_id: AHashMap<u64, Arc<ShardWriter>>,
}

/// Concurrent registry of open shard writers.
pub struct ShardWriterCache {
    config: IndexConfig,
    store: Arc<ShardStore>,
    state: Mutex<CacheState>,
    key_locks: StripedLock,
    scheduler: Mutex<Option<FlushScheduler>>,
}

impl std::fmt::Debug for ShardWriterCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("ShardWriterCache")
            .field("open_by_key", &state.by_key.len())
            .field("open_by_id", &state.by_id.len())
            .finish()
    }
}

impl ShardWriterCache {
    /// Create the cache. When the config sets a flush interval, a background
    /// scheduler thread flushes all open writers on that interval until
    /// shutdown.
    pub fn new(store: Arc<ShardStore>, config: IndexConfig) -> Result<Arc<Self>> {
        let cache = Arc::new(ShardWriterCache {
            config: config.clone(),
            store,
            state: Mutex::new(CacheState::default()),
            key_locks: StripedLock::new(KEY_LOCK_STRIPES),
            scheduler: Mutex::new(None),
        });

        if let Some(interval) = config.flush_interval {
            let scheduler = FlushScheduler::start(interval, Arc::downgrade(&cache))?;
            *cache.scheduler.lock() = Some(scheduler);
        }

        Ok(cache)
    }

    /// The shard registry this cache persists through.
    pub fn store(&self) -> &Arc<ShardStore> {
        &self.store
    }

    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    /// Number of currently open slots.
    pub fn open_writer_count(&self) -> usize {
        self.state.lock().by_id.len()
    }

    /// The open writer registered under `key`, if it is still usable.
    fn lookup_usable(&self, key: &ShardKey) -> Option<Arc<ShardWriter>> {
        let state = self.state.lock();
        state
            .by_key
            .get(key)
            .filter(|writer| !writer.is_full() && !writer.is_closed())
            .cloned()
    }

    /// Get the open writer for `key`, creating (or reopening) a shard when
    /// none with spare capacity exists.
    ///
    /// When the current slot is full its key mapping is evicted, but the
    /// slot stays resolvable by id until it is closed; the next call for
    /// the key transparently creates a fresh shard.
    pub fn writer_by_shard_key(&self, key: &ShardKey) -> Result<Arc<ShardWriter>> {
        // Fast path without the key lock.
        if let Some(writer) = self.lookup_usable(key) {
            return Ok(writer);
        }

        // Serialize creators of the same key; creators of other keys use
        // other stripes.
        let _guard = self.key_locks.lock(key);

        // Another thread may have finished creating while we waited.
        if let Some(writer) = self.lookup_usable(key) {
            return Ok(writer);
        }

        // Roll over: drop the key mapping of a full or stale slot, keeping
        // the id mapping alive until the slot is closed.
        {
            let mut state = self.state.lock();
            if let Some(existing) = state.by_key.get(key) {
                if existing.is_full() || existing.is_closed() {
                    let shard_id = existing.shard_id();
                    state.by_key.remove(key);
                    debug!("rolled key {key} off full shard {shard_id}");
                }
            }
        }

        // Prefer reopening a closed shard with spare capacity over creating
        // a new one.
        if let Some(descriptor) = self
            .store
            .find_reopenable(key, self.config.max_documents_per_shard)
        {
            match ShardWriter::open(self.store.clone(), &descriptor, &self.config) {
                Ok(writer) => {
                    debug!("reopened shard {} for key {key}", descriptor.id);
                    return Ok(self.register(key, writer));
                }
                Err(e) => {
                    warn!(
                        "failed to reopen shard {} for key {key}: {e}",
                        descriptor.id
                    );
                }
            }
        }

        // Create a new shard. The descriptor is persisted before the writer
        // opens; if the open fails the descriptor is removed again so no
        // partial shard stays registered.
        let descriptor = self.store.create_shard(key)?;
        match ShardWriter::open(self.store.clone(), &descriptor, &self.config) {
            Ok(writer) => Ok(self.register(key, writer)),
            Err(e) => {
                error!("failed to open new shard {} for key {key}: {e}", descriptor.id);
                if let Err(purge_err) = self.store.purge(descriptor.id) {
                    warn!(
                        "failed to remove unopened shard {}: {purge_err}",
                        descriptor.id
                    );
                }
                Err(e)
            }
        }
    }

    /// Publish a fully-constructed slot under both indices.
    fn register(&self, key: &ShardKey, writer: ShardWriter) -> Arc<ShardWriter> {
        let writer = Arc::new(writer);
        let mut state = self.state.lock();
        state.by_key.insert(key.clone(), writer.clone());
        state.by_id.insert(writer.shard_id(), writer.clone());
        writer
    }

    /// The open writer for a shard id, or None if the shard is not
    /// currently open.
    pub fn writer_by_shard_id(&self, shard_id: u64) -> Option<Arc<ShardWriter>> {
        self.state.lock().by_id.get(&shard_id).cloned()
    }

    /// Add a document under a key, re-acquiring the writer on rollover.
    ///
    /// Returns the id of the shard that accepted the document.
    pub fn add_document(&self, key: &ShardKey, doc: &Document) -> Result<u64> {
        for _attempt in 0..MAX_ADD_ATTEMPTS {
            let writer = self.writer_by_shard_key(key)?;
            match writer.add_document(doc.clone()) {
                Ok(()) => return Ok(writer.shard_id()),
                Err(e) if e.is_shard_full() => {
                    debug!("shard {} full, re-acquiring for key {key}", writer.shard_id());
                    continue;
                }
                Err(e) => return Err(e),
            }
        }
        Err(SalixError::internal(format!(
            "failed to place document for key {key} after {MAX_ADD_ATTEMPTS} attempts"
        )))
    }

    /// Close a slot: commit, release the writer and remove both index
    /// entries atomically. Idempotent: closing an already-closed slot is a
    /// no-op.
    pub fn close(&self, writer: &Arc<ShardWriter>) -> Result<()> {
        let close_result = writer.close();

        // Remove both entries in one critical section so the indices never
        // disagree, even when the close itself failed.
        let mut state = self.state.lock();
        state.by_id.remove(&writer.shard_id());
        if let Some(current) = state.by_key.get(writer.key()) {
            if Arc::ptr_eq(current, writer) {
                state.by_key.remove(writer.key());
            }
        }
        drop(state);

        close_result
    }

    /// Apply a bulk action to all open slots matching the criteria.
    ///
    /// Failures are logged per shard and skipped; the remaining shards are
    /// still processed. Returns the number of slots the action succeeded
    /// on.
    pub fn perform_action(&self, criteria: &FindShardCriteria, action: ShardAction) -> usize {
        let writers: Vec<Arc<ShardWriter>> = {
            let state = self.state.lock();
            state
                .by_id
                .values()
                .filter(|writer| criteria.matches_key(writer.key(), writer.shard_id()))
                .cloned()
                .collect()
        };

        writers
            .par_iter()
            .filter(|writer| {
                let result = match action {
                    ShardAction::Flush => writer.flush(),
                    ShardAction::Close => self.close(writer),
                };
                match result {
                    Ok(()) => true,
                    Err(e) => {
                        warn!(
                            "{action:?} failed for shard {}: {e}",
                            writer.shard_id()
                        );
                        false
                    }
                }
            })
            .count()
    }

    /// Close every open slot and stop the flush scheduler, blocking until
    /// all writers have finished closing.
    pub fn shutdown(&self) {
        if let Some(scheduler) = self.scheduler.lock().take() {
            scheduler.stop();
        }

        let start = Instant::now();
        let writers: Vec<Arc<ShardWriter>> = {
            let state = self.state.lock();
            state.by_id.values().cloned().collect()
        };

        writers.par_iter().for_each(|writer| {
            if let Err(e) = writer.close() {
                error!("shutdown: failed to close shard {}: {e}", writer.shard_id());
            }
        });

        let mut state = self.state.lock();
        state.by_key.clear();
        state.by_id.clear();
        drop(state);

        info!(
            "shut down writer cache, closed {} writers in {:?}",
            writers.len(),
            start.elapsed()
        );
    }
}

/// Background thread flushing all open writers on a fixed interval.
struct FlushScheduler {
    shutdown_tx: Sender<()>,
    handle: Option<std::thread::JoinHandle<()>>,
}

impl FlushScheduler {
    fn start(interval: Duration, cache: Weak<ShardWriterCache>) -> Result<Self> {
        let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded::<()>(1);
        let ticker = tick(interval);

        let handle = std::thread::Builder::new()
            .name("shard-flush-scheduler".to_string())
            .spawn(move || {
                loop {
                    select! {
                        recv(ticker) -> _ => {
                            let Some(cache) = cache.upgrade() else { break };
                            let flushed = cache.perform_action(
                                &FindShardCriteria::all(),
                                ShardAction::Flush,
                            );
                            debug!("scheduled flush covered {flushed} shards");
                        }
                        recv(shutdown_rx) -> _ => break,
                    }
                }
            })?;

        Ok(FlushScheduler {
            shutdown_tx,
            handle: Some(handle),
        })
    }

    fn stop(mut self) {
        let _ = self.shutdown_tx.send(());
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for FlushScheduler {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(());
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
