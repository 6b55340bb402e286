// rust/streaming-vision/src/lib.rs

//! Streaming Vision - Core Library
//!
//! Paired (image, label) samples served from a shard-based streaming
//! dataset. The [`StreamingDataset`] engine downloads, validates and caches
//! shards; [`StreamingVisionDataset`] sits on top of it and applies the
//! caller's transforms to every retrieved sample.

pub mod compression;
pub mod config;
pub mod download;
pub mod error;
pub mod index;
pub mod record;
pub mod storage;
pub mod value;

// Re-export commonly used types for convenience
pub use compression::Compression;
pub use config::{PartitionAlgorithm, ShuffleAlgorithm, StreamingConfig};
pub use download::{HashAlgorithm, RetryConfig};
pub use error::{Result, StreamingError};
pub use index::{DatasetIndex, FileInfo, ShardInfo};
pub use record::Record;
pub use storage::{LocalStorage, StorageBackend, StorageReader, StorageWriter};
pub use value::{to_tensor, ColorMode, Image, Tensor, Value};

pub mod engine;
pub use engine::{StreamingDataset, StreamingEngine};

pub mod writer;
pub use writer::ShardWriter;

pub mod transform;
pub use transform::{JointTransform, TransformOptions, TransformPolicy, ValueTransform};

pub mod vision;
pub use vision::{Sample, StreamingVisionDataset, VisionDataset};
