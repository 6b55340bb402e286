// rust/streaming-vision/src/storage/mod.rs

//! Storage abstraction for shard remotes and local caches.
//!
//! # Example
//!
//! ```no_run
//! use streaming_vision::storage::{LocalStorage, StorageBackend};
//! use std::io::Write;
//! use std::path::Path;
//!
//! let storage = LocalStorage::new("/tmp/cache").unwrap();
//!
//! let mut writer = storage.open_write(Path::new("shard.00000.svd")).unwrap();
//! writer.write_all(b"...").unwrap();
//! writer.finish().unwrap();
//!
//! let mut reader = storage.open_read(Path::new("shard.00000.svd")).unwrap();
//! let head = reader.read_range(0, 3).unwrap();
//! ```

mod local;
mod traits;

pub use local::{LocalStorage, DEFAULT_BUFFER_SIZE, DEFAULT_MMAP_THRESHOLD};
pub use traits::{StorageBackend, StorageReader, StorageWriter};
