//! Pluggable storage backends.
//!
//! All index data (segments, manifests, shard registry) is written through
//! the [`Storage`] abstraction so that shards behave identically on disk and
//! in memory. Names are flat, `/`-separated paths within a backend;
//! [`PrefixedStorage`] carves per-shard namespaces out of a shared backend.

pub mod file;
pub mod memory;
pub mod prefixed;
pub mod structured;

use std::fmt::Debug;
use std::io::{Read, Write};
use std::sync::Arc;

use crate::error::Result;

pub use file::{FileStorage, FileStorageConfig};
pub use memory::{MemoryStorage, MemoryStorageConfig};
pub use prefixed::PrefixedStorage;

/// A writable stream into a storage backend.
pub trait StorageOutput: Write + Send {
    /// Flush buffered bytes and make the file durable.
    fn flush_and_sync(&mut self) -> Result<()>;
}

/// A readable stream out of a storage backend.
pub trait StorageInput: Read + Send {
    /// Total size of the underlying file in bytes.
    fn size(&self) -> Result<u64>;
}

/// Trait for storage backends.
pub trait Storage: Send + Sync + Debug {
    /// Create (or truncate) a file and return a writer for it.
    fn create_output(&self, name: &str) -> Result<Box<dyn StorageOutput>>;

    /// Open an existing file for reading.
    fn open_input(&self, name: &str) -> Result<Box<dyn StorageInput>>;

    /// True if the named file exists.
    fn file_exists(&self, name: &str) -> bool;

    /// Delete a file. Deleting a missing file is an error.
    fn delete_file(&self, name: &str) -> Result<()>;

    /// Atomically rename a file, replacing any existing target.
    fn rename_file(&self, from: &str, to: &str) -> Result<()>;

    /// List all file names in this backend.
    fn list_files(&self) -> Result<Vec<String>>;
}

/// Configuration selecting a storage backend.
#[derive(Debug, Clone)]
pub enum StorageConfig {
    Memory(MemoryStorageConfig),
    File(FileStorageConfig),
}

/// Factory constructing storage backends from configuration.
pub struct StorageFactory;

impl StorageFactory {
    /// Create a storage backend for the given configuration.
    pub fn create(config: StorageConfig) -> Result<Arc<dyn Storage>> {
        match config {
            StorageConfig::Memory(config) => Ok(Arc::new(MemoryStorage::new(config))),
            StorageConfig::File(config) => Ok(Arc::new(FileStorage::new(config)?)),
        }
    }
}
