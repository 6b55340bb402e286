// rust/streaming-vision/src/storage/traits.rs

//! Storage traits used by the shard engine.
//!
//! Both sides of a download (the remote a shard comes from and the local
//! cache it lands in) go through [`StorageBackend`], so the engine never
//! touches `std::fs` directly.

use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::Result;

/// A handle for random-access reads of a stored object.
pub trait StorageReader: Send {
    /// Returns the total size of the object in bytes.
    fn size(&self) -> u64;

    /// Reads `length` bytes starting at byte offset `start`.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails or the range is out of bounds.
    fn read_range(&mut self, start: u64, length: usize) -> Result<Vec<u8>>;

    /// Reads the whole object.
    fn read_all(&mut self) -> Result<Vec<u8>> {
        let size = self.size() as usize;
        self.read_range(0, size)
    }
}

/// A handle for writing to storage.
pub trait StorageWriter: Write + Send {
    /// Flushes and syncs the written data. Must be called to complete the
    /// write; the writer is consumed.
    ///
    /// # Errors
    ///
    /// Returns an error if flushing or syncing fails.
    fn finish(self: Box<Self>) -> Result<()>;
}

/// Operations the shard engine needs from a storage location.
///
/// Paths are relative to the backend root unless absolute.
pub trait StorageBackend: Send + Sync {
    /// Root directory every relative path is resolved against.
    fn root(&self) -> &Path;

    /// Resolves `path` against the root.
    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root().join(path)
        }
    }

    /// Checks if an object exists at the given path.
    fn exists(&self, path: &Path) -> Result<bool>;

    /// Size of the object in bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the object doesn't exist.
    fn size(&self, path: &Path) -> Result<u64>;

    /// Opens an object for reading.
    ///
    /// # Errors
    ///
    /// Returns an error if the object doesn't exist or cannot be opened.
    fn open_read(&self, path: &Path) -> Result<Box<dyn StorageReader>>;

    /// Opens an object for writing, truncating it and creating parent
    /// directories as needed.
    fn open_write(&self, path: &Path) -> Result<Box<dyn StorageWriter>>;

    /// Renames an object. Used to publish a fully written file atomically.
    fn rename(&self, from: &Path, to: &Path) -> Result<()>;

    /// Deletes an object.
    fn delete(&self, path: &Path) -> Result<()>;

    /// Creates a directory and all parent directories.
    fn create_dir_all(&self, path: &Path) -> Result<()>;
}
