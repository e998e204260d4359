//! Persisted shard metadata.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::shard::key::ShardKey;

/// Lifecycle status of a shard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShardStatus {
    /// A writer is (or may be) open for the shard.
    Open,
    /// The shard is committed and sealed; it may be reopened for writing if
    /// it has spare capacity.
    Closed,
    /// The shard's data failed validation; it refuses further writes.
    Corrupt,
    /// Logically deleted, awaiting physical cleanup. Terminal.
    Deleted,
}

impl ShardStatus {
    /// True if a transition from `self` to `next` is legal.
    pub fn can_transition_to(self, next: ShardStatus) -> bool {
        use ShardStatus::*;
        match (self, next) {
            // Deleted is terminal.
            (Deleted, _) => false,
            (from, to) if from == to => true,
            (Open, Closed) | (Closed, Open) => true,
            (_, Corrupt) | (_, Deleted) => true,
            (Corrupt, _) => false,
            _ => false,
        }
    }
}

impl std::fmt::Display for ShardStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ShardStatus::Open => "open",
            ShardStatus::Closed => "closed",
            ShardStatus::Corrupt => "corrupt",
            ShardStatus::Deleted => "deleted",
        };
        write!(f, "{s}")
    }
}

/// Persisted metadata for one shard.
///
/// Created by the shard store when a new shard is needed; mutated only by
/// the writer cache and explicit shard actions, never by searchers.
/// `document_count` reflects committed documents only; documents buffered
/// in an open writer are invisible here until a flush.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShardDescriptor {
    /// Numeric shard id, assigned on first persistence.
    pub id: u64,
    pub index_uuid: String,
    pub partition_label: String,
    pub partition_number: u32,
    /// Namespace of the shard's files within its volume.
    pub path: String,
    /// Index of the volume the shard was assigned to.
    pub volume: usize,
    pub status: ShardStatus,
    /// Committed document count.
    pub document_count: u32,
    pub created_at: DateTime<Utc>,
    /// Time of the most recent commit, if any.
    pub committed_at: Option<DateTime<Utc>>,
}

impl ShardDescriptor {
    /// The key this shard was created under.
    pub fn key(&self) -> ShardKey {
        ShardKey::new(
            self.index_uuid.clone(),
            self.partition_label.clone(),
            self.partition_number,
        )
    }
}
