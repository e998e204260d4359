//! Filesystem storage backend.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use crate::error::{Result, SalixError};
use crate::storage::{Storage, StorageInput, StorageOutput};

/// Configuration for [`FileStorage`].
#[derive(Debug, Clone)]
pub struct FileStorageConfig {
    /// Root directory all file names are resolved under.
    pub path: PathBuf,
}

impl FileStorageConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        FileStorageConfig { path: path.into() }
    }
}

/// Storage backend rooted at a directory on the local filesystem.
///
/// File names may contain `/` separators; intermediate directories are
/// created on demand.
#[derive(Debug)]
pub struct FileStorage {
    root: PathBuf,
}

impl FileStorage {
    pub fn new(config: FileStorageConfig) -> Result<Self> {
        fs::create_dir_all(&config.path)?;
        Ok(FileStorage { root: config.path })
    }

    fn resolve(&self, name: &str) -> Result<PathBuf> {
        if name.is_empty() || name.split('/').any(|part| part.is_empty() || part == "..") {
            return Err(SalixError::invalid_argument(format!(
                "invalid file name: {name}"
            )));
        }
        Ok(self.root.join(name))
    }

    fn collect_files(&self, dir: &Path, prefix: &str, out: &mut Vec<String>) -> Result<()> {
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let file_name = entry.file_name().to_string_lossy().to_string();
            let relative = if prefix.is_empty() {
                file_name
            } else {
                format!("{prefix}/{file_name}")
            };
            if entry.file_type()?.is_dir() {
                self.collect_files(&entry.path(), &relative, out)?;
            } else {
                out.push(relative);
            }
        }
        Ok(())
    }
}

impl Storage for FileStorage {
    fn create_output(&self, name: &str) -> Result<Box<dyn StorageOutput>> {
        let path = self.resolve(name)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = File::create(&path)?;
        Ok(Box::new(FileOutput {
            writer: BufWriter::new(file),
        }))
    }

    fn open_input(&self, name: &str) -> Result<Box<dyn StorageInput>> {
        let path = self.resolve(name)?;
        let file = File::open(&path)?;
        let size = file.metadata()?.len();
        Ok(Box::new(FileInput {
            reader: BufReader::new(file),
            size,
        }))
    }

    fn file_exists(&self, name: &str) -> bool {
        self.resolve(name).map(|path| path.is_file()).unwrap_or(false)
    }

    fn delete_file(&self, name: &str) -> Result<()> {
        let path = self.resolve(name)?;
        fs::remove_file(&path)?;
        Ok(())
    }

    fn rename_file(&self, from: &str, to: &str) -> Result<()> {
        let from_path = self.resolve(from)?;
        let to_path = self.resolve(to)?;
        if let Some(parent) = to_path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::rename(&from_path, &to_path)?;
        Ok(())
    }

    fn list_files(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        self.collect_files(&self.root, "", &mut names)?;
        names.sort();
        Ok(names)
    }
}

struct FileOutput {
    writer: BufWriter<File>,
}

impl Write for FileOutput {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.writer.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.writer.flush()
    }
}

impl StorageOutput for FileOutput {
    fn flush_and_sync(&mut self) -> Result<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_all()?;
        Ok(())
    }
}

struct FileInput {
    reader: BufReader<File>,
    size: u64,
}

impl Read for FileInput {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.reader.read(buf)
    }
}

impl StorageInput for FileInput {
    fn size(&self) -> Result<u64> {
        Ok(self.size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn make_storage(dir: &TempDir) -> FileStorage {
        FileStorage::new(FileStorageConfig::new(dir.path())).unwrap()
    }

    #[test]
    fn test_write_and_read_nested() {
        let dir = TempDir::new().unwrap();
        let storage = make_storage(&dir);

        let mut output = storage.create_output("shard_1/seg.bin").unwrap();
        output.write_all(b"payload").unwrap();
        output.flush_and_sync().unwrap();
        drop(output);

        assert!(storage.file_exists("shard_1/seg.bin"));

        let mut input = storage.open_input("shard_1/seg.bin").unwrap();
        assert_eq!(input.size().unwrap(), 7);
        let mut buf = Vec::new();
        input.read_to_end(&mut buf).unwrap();
        assert_eq!(buf, b"payload");
    }

    #[test]
    fn test_rejects_traversal() {
        let dir = TempDir::new().unwrap();
        let storage = make_storage(&dir);
        assert!(storage.create_output("../escape").is_err());
        assert!(storage.create_output("").is_err());
    }

    #[test]
    fn test_list_files_recursive() {
        let dir = TempDir::new().unwrap();
        let storage = make_storage(&dir);
        for name in ["a/1.bin", "a/2.bin", "b.bin"] {
            storage.create_output(name).unwrap().flush_and_sync().unwrap();
        }
        assert_eq!(
            storage.list_files().unwrap(),
            vec!["a/1.bin", "a/2.bin", "b.bin"]
        );
    }

    #[test]
    fn test_rename_replaces_target() {
        let dir = TempDir::new().unwrap();
        let storage = make_storage(&dir);

        let mut output = storage.create_output("m.tmp").unwrap();
        output.write_all(b"new").unwrap();
        output.flush_and_sync().unwrap();
        drop(output);

        storage.create_output("m.json").unwrap().flush_and_sync().unwrap();
        storage.rename_file("m.tmp", "m.json").unwrap();

        let mut input = storage.open_input("m.json").unwrap();
        let mut buf = Vec::new();
        input.read_to_end(&mut buf).unwrap();
        assert_eq!(buf, b"new");
        assert!(!storage.file_exists("m.tmp"));
    }
}
