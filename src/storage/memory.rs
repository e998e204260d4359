//! In-memory storage backend, primarily for tests and ephemeral indexes.

use std::io::{Read, Write};
use std::sync::Arc;

use ahash::AHashMap;
use parking_lot::RwLock;

use crate::error::{Result, SalixError};
use crate::storage::{Storage, StorageInput, StorageOutput};

/// Configuration for [`MemoryStorage`].
#[derive(Debug, Clone, Default)]
pub struct MemoryStorageConfig;

type FileMap = Arc<RwLock<AHashMap<String, Arc<Vec<u8>>>>>;

/// Storage backend keeping all files in process memory.
#[derive(Debug)]
pub struct MemoryStorage {
    files: FileMap,
}

impl MemoryStorage {
    pub fn new(_config: MemoryStorageConfig) -> Self {
        MemoryStorage {
            files: Arc::new(RwLock::new(AHashMap::new())),
        }
    }
}

impl Storage for MemoryStorage {
    fn create_output(&self, name: &str) -> Result<Box<dyn StorageOutput>> {
        Ok(Box::new(MemoryOutput {
            name: name.to_string(),
            buf: Vec::new(),
            files: self.files.clone(),
            committed: false,
        }))
    }

    fn open_input(&self, name: &str) -> Result<Box<dyn StorageInput>> {
        let data = self
            .files
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| SalixError::not_found(format!("file not found: {name}")))?;
        Ok(Box::new(MemoryInput { data, position: 0 }))
    }

    fn file_exists(&self, name: &str) -> bool {
        self.files.read().contains_key(name)
    }

    fn delete_file(&self, name: &str) -> Result<()> {
        self.files
            .write()
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| SalixError::not_found(format!("file not found: {name}")))
    }

    fn rename_file(&self, from: &str, to: &str) -> Result<()> {
        let mut files = self.files.write();
        let data = files
            .remove(from)
            .ok_or_else(|| SalixError::not_found(format!("file not found: {from}")))?;
        files.insert(to.to_string(), data);
        Ok(())
    }

    fn list_files(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self.files.read().keys().cloned().collect();
        names.sort();
        Ok(names)
    }
}

struct MemoryOutput {
    name: String,
    buf: Vec<u8>,
    files: FileMap,
    committed: bool,
}

impl MemoryOutput {
    fn commit(&mut self) {
        self.files
            .write()
            .insert(self.name.clone(), Arc::new(self.buf.clone()));
        self.committed = true;
    }
}

impl Write for MemoryOutput {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.buf.extend_from_slice(buf);
        self.committed = false;
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl StorageOutput for MemoryOutput {
    fn flush_and_sync(&mut self) -> Result<()> {
        self.commit();
        Ok(())
    }
}

impl Drop for MemoryOutput {
    fn drop(&mut self) {
        if !self.committed {
            self.commit();
        }
    }
}

struct MemoryInput {
    data: Arc<Vec<u8>>,
    position: usize,
}

impl Read for MemoryInput {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let remaining = &self.data[self.position.min(self.data.len())..];
        let n = remaining.len().min(buf.len());
        buf[..n].copy_from_slice(&remaining[..n]);
        self.position += n;
        Ok(n)
    }
}

impl StorageInput for MemoryInput {
    fn size(&self) -> Result<u64> {
        Ok(self.data.len() as u64)
    }
}
