//! Shard addressing.

use serde::{Deserialize, Serialize};

use crate::config::IndexDefinition;

/// Identifies the target shard for a document: which index, which partition
/// (typically a time bucket), and which parallel writer slot within the
/// partition.
///
/// Keys are pure values; equality and hashing are structural so they can be
/// used directly as cache map keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ShardKey {
    /// Identity of the owning index.
    pub index_uuid: String,
    /// Partition label, e.g. a time bucket like `2026-08`.
    pub partition_label: String,
    /// Parallel writer slot number within the partition.
    pub partition_number: u32,
}

impl ShardKey {
    pub fn new(
        index_uuid: impl Into<String>,
        partition_label: impl Into<String>,
        partition_number: u32,
    ) -> Self {
        ShardKey {
            index_uuid: index_uuid.into(),
            partition_label: partition_label.into(),
            partition_number,
        }
    }

    /// Key for a partition of a defined index.
    pub fn for_index(
        index: &IndexDefinition,
        partition_label: impl Into<String>,
        partition_number: u32,
    ) -> Self {
        ShardKey::new(index.uuid.clone(), partition_label, partition_number)
    }
}

impl std::fmt::Display for ShardKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{}#{}",
            self.index_uuid, self.partition_label, self.partition_number
        )
    }
}
