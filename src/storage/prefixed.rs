//! Namespaced view over another storage backend.

use std::sync::Arc;

use crate::error::Result;
use crate::storage::{Storage, StorageInput, StorageOutput};

/// A storage wrapper that prefixes all file names, carving an isolated
/// namespace (for example one shard's files) out of a shared backend.
#[derive(Debug)]
pub struct PrefixedStorage {
    prefix: String,
    inner: Arc<dyn Storage>,
}

impl PrefixedStorage {
    pub fn new(prefix: impl Into<String>, inner: Arc<dyn Storage>) -> Self {
        PrefixedStorage {
            prefix: prefix.into(),
            inner,
        }
    }

    fn full_name(&self, name: &str) -> String {
        format!("{}/{}", self.prefix, name)
    }
}

impl Storage for PrefixedStorage {
    fn create_output(&self, name: &str) -> Result<Box<dyn StorageOutput>> {
        self.inner.create_output(&self.full_name(name))
    }

    fn open_input(&self, name: &str) -> Result<Box<dyn StorageInput>> {
        self.inner.open_input(&self.full_name(name))
    }

    fn file_exists(&self, name: &str) -> bool {
        self.inner.file_exists(&self.full_name(name))
    }

    fn delete_file(&self, name: &str) -> Result<()> {
        self.inner.delete_file(&self.full_name(name))
    }

    fn rename_file(&self, from: &str, to: &str) -> Result<()> {
        self.inner
            .rename_file(&self.full_name(from), &self.full_name(to))
    }

    fn list_files(&self) -> Result<Vec<String>> {
        let prefix = format!("{}/", self.prefix);
        Ok(self
            .inner
            .list_files()?
            .into_iter()
            .filter_map(|name| name.strip_prefix(&prefix).map(|s| s.to_string()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::{MemoryStorage, MemoryStorageConfig};
    use std::io::Read;

    #[test]
    fn test_namespacing() {
        let root: Arc<dyn Storage> = Arc::new(MemoryStorage::new(MemoryStorageConfig::default()));
        let a = PrefixedStorage::new("shard_1", root.clone());
        let b = PrefixedStorage::new("shard_2", root.clone());

        a.create_output("seg.bin").unwrap().flush_and_sync().unwrap();

        assert!(a.file_exists("seg.bin"));
        assert!(!b.file_exists("seg.bin"));
        assert!(root.file_exists("shard_1/seg.bin"));

        assert_eq!(a.list_files().unwrap(), vec!["seg.bin"]);
        assert!(b.list_files().unwrap().is_empty());
    }

    #[test]
    fn test_read_through_prefix() {
        let root: Arc<dyn Storage> = Arc::new(MemoryStorage::new(MemoryStorageConfig::default()));
        let prefixed = PrefixedStorage::new("ns", root);

        use std::io::Write;
        let mut output = prefixed.create_output("f").unwrap();
        output.write_all(b"xyz").unwrap();
        output.flush_and_sync().unwrap();
        drop(output);

        let mut buf = Vec::new();
        prefixed.open_input("f").unwrap().read_to_end(&mut buf).unwrap();
        assert_eq!(buf, b"xyz");
    }
}
