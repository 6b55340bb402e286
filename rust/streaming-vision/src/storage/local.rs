// rust/streaming-vision/src/storage/local.rs

//! Local filesystem storage backend.
//!
//! Small files are read with buffered positional reads; files at or above
//! the mmap threshold are memory-mapped once and sliced on every read, which
//! suits shards that serve many random-access sample reads.

use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use memmap2::Mmap;

use super::traits::{StorageBackend, StorageReader, StorageWriter};
use crate::error::{Result, StreamingError};

/// Default I/O buffer size.
pub const DEFAULT_BUFFER_SIZE: usize = 64 * 1024; // 64 KB

/// Default size above which files are memory-mapped.
pub const DEFAULT_MMAP_THRESHOLD: u64 = 1024 * 1024; // 1 MB

/// Local filesystem storage rooted at a directory.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    root: PathBuf,
    buffer_size: usize,
    use_mmap: bool,
    mmap_threshold: u64,
}

impl LocalStorage {
    /// Creates storage rooted at `root`, creating the directory if missing.
    ///
    /// # Errors
    ///
    /// Returns an error if the root directory cannot be created.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        if !root.exists() {
            fs::create_dir_all(&root).map_err(|e| {
                StreamingError::storage_with_source(&root, "failed to create root directory", e)
            })?;
        }

        Ok(Self {
            root,
            buffer_size: DEFAULT_BUFFER_SIZE,
            use_mmap: true,
            mmap_threshold: DEFAULT_MMAP_THRESHOLD,
        })
    }

    /// Creates storage over an existing directory without creating it.
    /// Used for read-only remotes.
    ///
    /// # Errors
    ///
    /// Returns an error if `root` is not an existing directory.
    pub fn open_existing(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        if !root.is_dir() {
            return Err(StreamingError::storage(&root, "directory does not exist"));
        }
        Ok(Self {
            root,
            buffer_size: DEFAULT_BUFFER_SIZE,
            use_mmap: true,
            mmap_threshold: DEFAULT_MMAP_THRESHOLD,
        })
    }

    /// Sets the size above which files are memory-mapped.
    #[must_use]
    pub fn with_mmap_threshold(mut self, threshold: u64) -> Self {
        self.mmap_threshold = threshold;
        self
    }

    /// Disables memory mapping.
    #[must_use]
    pub fn without_mmap(mut self) -> Self {
        self.use_mmap = false;
        self
    }

    fn create_parent(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent).map_err(|e| {
                    StreamingError::storage_with_source(
                        parent,
                        "failed to create parent directories",
                        e,
                    )
                })?;
            }
        }
        Ok(())
    }
}

impl StorageBackend for LocalStorage {
    fn root(&self) -> &Path {
        &self.root
    }

    fn exists(&self, path: &Path) -> Result<bool> {
        Ok(self.resolve(path).exists())
    }

    fn size(&self, path: &Path) -> Result<u64> {
        let full_path = self.resolve(path);
        let meta = fs::metadata(&full_path).map_err(|e| {
            StreamingError::storage_with_source(&full_path, "failed to read metadata", e)
        })?;
        Ok(meta.len())
    }

    fn open_read(&self, path: &Path) -> Result<Box<dyn StorageReader>> {
        let full_path = self.resolve(path);
        let file = File::open(&full_path).map_err(|e| {
            StreamingError::storage_with_source(&full_path, "failed to open file", e)
        })?;

        let size = file
            .metadata()
            .map_err(|e| {
                StreamingError::storage_with_source(&full_path, "failed to read file metadata", e)
            })?
            .len();

        // An empty file cannot be mapped on every platform
        if self.use_mmap && size > 0 && size >= self.mmap_threshold {
            // SAFETY: the file is opened read-only and the map lives as long
            // as the reader. Cache files are only ever replaced by rename,
            // never rewritten in place.
            let mmap = unsafe { Mmap::map(&file) }.map_err(|e| {
                StreamingError::storage_with_source(&full_path, "failed to memory-map file", e)
            })?;
            Ok(Box::new(MmapReader {
                path: full_path,
                mmap,
            }))
        } else {
            Ok(Box::new(LocalReader {
                path: full_path,
                reader: BufReader::with_capacity(self.buffer_size, file),
                size,
            }))
        }
    }

    fn open_write(&self, path: &Path) -> Result<Box<dyn StorageWriter>> {
        let full_path = self.resolve(path);
        Self::create_parent(&full_path)?;

        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&full_path)
            .map_err(|e| {
                StreamingError::storage_with_source(&full_path, "failed to create file", e)
            })?;

        Ok(Box::new(LocalWriter {
            path: full_path,
            writer: BufWriter::with_capacity(self.buffer_size, file),
        }))
    }

    fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        let from_path = self.resolve(from);
        let to_path = self.resolve(to);
        Self::create_parent(&to_path)?;

        fs::rename(&from_path, &to_path).map_err(|e| {
            StreamingError::storage_with_source(
                &from_path,
                format!("failed to rename to {}", to_path.display()),
                e,
            )
        })
    }

    fn delete(&self, path: &Path) -> Result<()> {
        let full_path = self.resolve(path);
        fs::remove_file(&full_path)
            .map_err(|e| StreamingError::storage_with_source(&full_path, "failed to delete file", e))
    }

    fn create_dir_all(&self, path: &Path) -> Result<()> {
        let full_path = self.resolve(path);
        fs::create_dir_all(&full_path).map_err(|e| {
            StreamingError::storage_with_source(&full_path, "failed to create directories", e)
        })
    }
}

/// Buffered file reader.
struct LocalReader {
    path: PathBuf,
    reader: BufReader<File>,
    size: u64,
}

impl StorageReader for LocalReader {
    fn size(&self) -> u64 {
        self.size
    }

    fn read_range(&mut self, start: u64, length: usize) -> Result<Vec<u8>> {
        self.reader.seek(SeekFrom::Start(start)).map_err(|e| {
            StreamingError::storage_with_source(
                &self.path,
                format!("failed to seek to position {start}"),
                e,
            )
        })?;

        let mut buf = vec![0u8; length];
        self.reader.read_exact(&mut buf).map_err(|e| {
            StreamingError::storage_with_source(
                &self.path,
                format!("failed to read {length} bytes at position {start}"),
                e,
            )
        })?;

        Ok(buf)
    }
}

/// Memory-mapped file reader.
struct MmapReader {
    path: PathBuf,
    mmap: Mmap,
}

impl StorageReader for MmapReader {
    fn size(&self) -> u64 {
        self.mmap.len() as u64
    }

    fn read_range(&mut self, start: u64, length: usize) -> Result<Vec<u8>> {
        let start = start as usize;
        let end = start.saturating_add(length);

        if end > self.mmap.len() {
            return Err(StreamingError::storage(
                &self.path,
                format!(
                    "read range {}..{} exceeds file size {}",
                    start,
                    end,
                    self.mmap.len()
                ),
            ));
        }

        Ok(self.mmap[start..end].to_vec())
    }
}

/// Buffered file writer.
struct LocalWriter {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl Write for LocalWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.writer.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.writer.flush()
    }
}

impl StorageWriter for LocalWriter {
    fn finish(mut self: Box<Self>) -> Result<()> {
        self.writer.flush().map_err(|e| {
            StreamingError::storage_with_source(&self.path, "failed to flush writer", e)
        })?;

        self.writer.get_ref().sync_all().map_err(|e| {
            StreamingError::storage_with_source(&self.path, "failed to sync file to disk", e)
        })?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_storage() -> (LocalStorage, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let storage = LocalStorage::new(temp_dir.path()).unwrap();
        (storage, temp_dir)
    }

    fn write_file(storage: &LocalStorage, path: &str, data: &[u8]) {
        let mut writer = storage.open_write(Path::new(path)).unwrap();
        writer.write_all(data).unwrap();
        writer.finish().unwrap();
    }

    #[test]
    fn test_new_creates_root() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("nested/cache");

        let storage = LocalStorage::new(&root).unwrap();
        assert!(root.is_dir());
        assert_eq!(storage.root(), root.as_path());
    }

    #[test]
    fn test_open_existing_missing_dir() {
        let temp_dir = TempDir::new().unwrap();
        let result = LocalStorage::open_existing(temp_dir.path().join("absent"));
        assert!(result.is_err());
    }

    #[test]
    fn test_write_and_read_small_file() {
        let (storage, _temp) = create_test_storage();
        write_file(&storage, "shards/shard.00000.svd", b"hello shard");

        assert!(storage.exists(Path::new("shards/shard.00000.svd")).unwrap());
        assert_eq!(storage.size(Path::new("shards/shard.00000.svd")).unwrap(), 11);

        let mut reader = storage.open_read(Path::new("shards/shard.00000.svd")).unwrap();
        assert_eq!(reader.read_all().unwrap(), b"hello shard");
        assert_eq!(reader.read_range(6, 5).unwrap(), b"shard");
    }

    #[test]
    fn test_read_range_mmap() {
        let (storage, _temp) = create_test_storage();
        let storage = storage.with_mmap_threshold(16);
        let data: Vec<u8> = (0..=255u8).cycle().take(4096).collect();
        write_file(&storage, "big.bin", &data);

        let mut reader = storage.open_read(Path::new("big.bin")).unwrap();
        assert_eq!(reader.size(), 4096);
        assert_eq!(reader.read_range(1000, 24).unwrap(), &data[1000..1024]);
        assert_eq!(reader.read_all().unwrap(), data);
    }

    #[test]
    fn test_read_range_out_of_bounds() {
        let (storage, _temp) = create_test_storage();
        write_file(&storage, "small.bin", b"0123456789");

        let mut reader = storage.open_read(Path::new("small.bin")).unwrap();
        assert!(reader.read_range(8, 10).is_err());

        let storage = storage.with_mmap_threshold(1);
        let mut reader = storage.open_read(Path::new("small.bin")).unwrap();
        assert!(reader.read_range(8, 10).is_err());
    }

    #[test]
    fn test_read_empty_file() {
        let (storage, _temp) = create_test_storage();
        let storage = storage.with_mmap_threshold(0);
        write_file(&storage, "empty.bin", b"");

        let mut reader = storage.open_read(Path::new("empty.bin")).unwrap();
        assert_eq!(reader.size(), 0);
        assert!(reader.read_all().unwrap().is_empty());
    }

    #[test]
    fn test_open_read_missing() {
        let (storage, _temp) = create_test_storage();
        let result = storage.open_read(Path::new("missing.bin"));
        assert!(matches!(result, Err(StreamingError::Storage { .. })));
    }

    #[test]
    fn test_rename_and_delete() {
        let (storage, _temp) = create_test_storage();
        write_file(&storage, ".shard.tmp", b"data");

        storage
            .rename(Path::new(".shard.tmp"), Path::new("sub/shard.bin"))
            .unwrap();
        assert!(!storage.exists(Path::new(".shard.tmp")).unwrap());
        assert!(storage.exists(Path::new("sub/shard.bin")).unwrap());

        storage.delete(Path::new("sub/shard.bin")).unwrap();
        assert!(!storage.exists(Path::new("sub/shard.bin")).unwrap());
        assert!(storage.delete(Path::new("sub/shard.bin")).is_err());
    }

    #[test]
    fn test_absolute_path_bypasses_root() {
        let (storage, _temp) = create_test_storage();
        let other = TempDir::new().unwrap();
        let absolute = other.path().join("outside.bin");
        std::fs::write(&absolute, b"abc").unwrap();

        assert!(storage.exists(&absolute).unwrap());
        assert_eq!(storage.resolve(&absolute), absolute);
    }
}
