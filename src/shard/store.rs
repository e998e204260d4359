//! Persisted shard registry.
//!
//! The store owns the `shards.json` manifest: shard id assignment, volume
//! placement, status transitions and committed document counts. Writers and
//! searchers resolve a shard's data storage through it. The manifest is
//! rewritten atomically (tmp file + rename) on every mutation.

use std::io::Write;
use std::sync::Arc;

use chrono::Utc;
use log::{debug, info, warn};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SalixError};
use crate::shard::descriptor::{ShardDescriptor, ShardStatus};
use crate::shard::key::ShardKey;
use crate::storage::prefixed::PrefixedStorage;
use crate::storage::Storage;

const MANIFEST_FILE: &str = "shards.json";

/// Criteria selecting shards for lookups and bulk actions.
///
/// Empty criteria match everything; each populated field narrows the match.
#[derive(Debug, Clone, Default)]
pub struct FindShardCriteria {
    pub index_uuid: Option<String>,
    pub partition_label: Option<String>,
    pub shard_ids: Option<Vec<u64>>,
}

impl FindShardCriteria {
    /// Criteria matching every shard.
    pub fn all() -> Self {
        FindShardCriteria::default()
    }

    /// Criteria matching one index.
    pub fn for_index(index_uuid: impl Into<String>) -> Self {
        FindShardCriteria {
            index_uuid: Some(index_uuid.into()),
            ..Default::default()
        }
    }

    pub fn partition_label(mut self, label: impl Into<String>) -> Self {
        self.partition_label = Some(label.into());
        self
    }

    pub fn shard_ids(mut self, ids: Vec<u64>) -> Self {
        self.shard_ids = Some(ids);
        self
    }

    /// True if an open slot with the given key and id matches all
    /// populated fields.
    pub fn matches_key(&self, key: &ShardKey, shard_id: u64) -> bool {
        if let Some(uuid) = &self.index_uuid {
            if &key.index_uuid != uuid {
                return false;
            }
        }
        if let Some(label) = &self.partition_label {
            if &key.partition_label != label {
                return false;
            }
        }
        if let Some(ids) = &self.shard_ids {
            if !ids.contains(&shard_id) {
                return false;
            }
        }
        true
    }

    /// True if the descriptor matches all populated fields.
    pub fn matches(&self, descriptor: &ShardDescriptor) -> bool {
        if let Some(uuid) = &self.index_uuid {
            if &descriptor.index_uuid != uuid {
                return false;
            }
        }
        if let Some(label) = &self.partition_label {
            if &descriptor.partition_label != label {
                return false;
            }
        }
        if let Some(ids) = &self.shard_ids {
            if !ids.contains(&descriptor.id) {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct ShardManifest {
    version: u32,
    next_shard_id: u64,
    shards: Vec<ShardDescriptor>,
}

#[derive(Debug)]
struct StoreState {
    next_shard_id: u64,
    shards: Vec<ShardDescriptor>,
}

/// Registry of shard descriptors shared by the writer cache and searchers.
#[derive(Debug)]
pub struct ShardStore {
    meta_storage: Arc<dyn Storage>,
    volumes: Vec<Arc<dyn Storage>>,
    state: Mutex<StoreState>,
}

impl ShardStore {
    /// Open the registry, loading any persisted manifest.
    ///
    /// `volumes` are the storage backends shards are placed on; at least one
    /// is required.
    pub fn open(meta_storage: Arc<dyn Storage>, volumes: Vec<Arc<dyn Storage>>) -> Result<Self> {
        if volumes.is_empty() {
            return Err(SalixError::invalid_config(
                "at least one volume is required",
            ));
        }

        let state = if meta_storage.file_exists(MANIFEST_FILE) {
            let input = meta_storage.open_input(MANIFEST_FILE)?;
            let manifest: ShardManifest = serde_json::from_reader(input)?;
            StoreState {
                next_shard_id: manifest.next_shard_id,
                shards: manifest.shards,
            }
        } else {
            StoreState {
                next_shard_id: 1,
                shards: Vec::new(),
            }
        };

        Ok(ShardStore {
            meta_storage,
            volumes,
            state: Mutex::new(state),
        })
    }

    fn persist(&self, state: &StoreState) -> Result<()> {
        let manifest = ShardManifest {
            version: 1,
            next_shard_id: state.next_shard_id,
            shards: state.shards.clone(),
        };
        let json = serde_json::to_vec(&manifest)?;

        let tmp_file = format!("{MANIFEST_FILE}.tmp");
        let mut output = self.meta_storage.create_output(&tmp_file)?;
        output.write_all(&json)?;
        output.flush_and_sync()?;
        drop(output);

        self.meta_storage.rename_file(&tmp_file, MANIFEST_FILE)?;
        Ok(())
    }

    /// Create and persist a new shard for the given key, assigning the next
    /// id and a volume (round-robin).
    pub fn create_shard(&self, key: &ShardKey) -> Result<ShardDescriptor> {
        let mut state = self.state.lock();

        let id = state.next_shard_id;
        state.next_shard_id += 1;

        let volume = (id as usize - 1) % self.volumes.len();
        let descriptor = ShardDescriptor {
            id,
            index_uuid: key.index_uuid.clone(),
            partition_label: key.partition_label.clone(),
            partition_number: key.partition_number,
            path: format!("{}/{}/shard_{id}", key.index_uuid, key.partition_label),
            volume,
            status: ShardStatus::Open,
            document_count: 0,
            created_at: Utc::now(),
            committed_at: None,
        };

        state.shards.push(descriptor.clone());
        self.persist(&state)?;

        info!("created shard {id} for key {key} on volume {volume}");
        Ok(descriptor)
    }

    /// Look up a shard by id.
    pub fn get(&self, shard_id: u64) -> Option<ShardDescriptor> {
        self.state
            .lock()
            .shards
            .iter()
            .find(|shard| shard.id == shard_id)
            .cloned()
    }

    /// All shards matching the criteria.
    pub fn find(&self, criteria: &FindShardCriteria) -> Vec<ShardDescriptor> {
        self.state
            .lock()
            .shards
            .iter()
            .filter(|shard| criteria.matches(shard))
            .cloned()
            .collect()
    }

    /// A closed shard under the key with spare capacity, if any exists.
    ///
    /// Deleted and corrupt shards are never candidates.
    pub fn find_reopenable(&self, key: &ShardKey, max_documents: u32) -> Option<ShardDescriptor> {
        self.state
            .lock()
            .shards
            .iter()
            .find(|shard| {
                shard.status == ShardStatus::Closed
                    && shard.document_count < max_documents
                    && shard.key() == *key
            })
            .cloned()
    }

    /// Transition a shard's status, validating the transition.
    pub fn set_status(&self, shard_id: u64, status: ShardStatus) -> Result<()> {
        let mut state = self.state.lock();
        let shard = state
            .shards
            .iter_mut()
            .find(|shard| shard.id == shard_id)
            .ok_or_else(|| SalixError::not_found(format!("shard {shard_id}")))?;

        if !shard.status.can_transition_to(status) {
            return Err(SalixError::illegal_state(format!(
                "shard {shard_id}: cannot transition from {} to {status}",
                shard.status
            )));
        }
        if shard.status != status {
            debug!("shard {shard_id}: {} -> {status}", shard.status);
            shard.status = status;
            self.persist(&state)?;
        }
        Ok(())
    }

    /// Record a commit: committed document count and commit time.
    pub fn record_commit(&self, shard_id: u64, document_count: u32) -> Result<()> {
        let mut state = self.state.lock();
        let shard = state
            .shards
            .iter_mut()
            .find(|shard| shard.id == shard_id)
            .ok_or_else(|| SalixError::not_found(format!("shard {shard_id}")))?;

        shard.document_count = document_count;
        shard.committed_at = Some(Utc::now());
        self.persist(&state)
    }

    /// The data storage namespace for a shard.
    pub fn storage_for(&self, descriptor: &ShardDescriptor) -> Arc<dyn Storage> {
        Arc::new(PrefixedStorage::new(
            descriptor.path.clone(),
            self.volumes[descriptor.volume % self.volumes.len()].clone(),
        ))
    }

    /// Logically delete a shard. Terminal; cleanup happens in [`Self::purge`].
    pub fn mark_deleted(&self, shard_id: u64) -> Result<()> {
        self.set_status(shard_id, ShardStatus::Deleted)
    }

    /// Physically remove a shard's files and drop it from the registry.
    ///
    /// The shard must not have an open writer; callers go through the cache
    /// to guarantee that.
    pub fn purge(&self, shard_id: u64) -> Result<()> {
        let descriptor = self
            .get(shard_id)
            .ok_or_else(|| SalixError::not_found(format!("shard {shard_id}")))?;

        let storage = self.storage_for(&descriptor);
        for file in storage.list_files()? {
            if let Err(e) = storage.delete_file(&file) {
                warn!("shard {shard_id}: failed to delete {file}: {e}");
            }
        }

        let mut state = self.state.lock();
        state.shards.retain(|shard| shard.id != shard_id);
        self.persist(&state)?;
        info!("purged shard {shard_id}");
        Ok(())
    }
}
