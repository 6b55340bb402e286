// rust/streaming-vision/src/writer.rs

//! Writes records into shards plus an `index.json` that
//! [`StreamingDataset`](crate::StreamingDataset) can read.

use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::compression::Compression;
use crate::download::{discard_temp, publish, temp_path_for, HashAlgorithm};
use crate::error::{Result, StreamingError};
use crate::index::{DatasetIndex, FileInfo, ShardInfo, INDEX_FILENAME};
use crate::record::Record;
use crate::storage::{LocalStorage, StorageBackend};

/// Default upper bound on the raw size of one shard.
pub const DEFAULT_SIZE_LIMIT: usize = 1 << 26; // 64 MB

/// Accumulates encoded records and cuts them into shards.
///
/// A shard is closed once the next record would push it past the size
/// limit; a single record larger than the limit gets a shard of its own.
/// Every file is written to a temporary name and renamed into place.
pub struct ShardWriter {
    storage: LocalStorage,
    size_limit: usize,
    compression: Option<Compression>,
    hashes: Vec<HashAlgorithm>,
    buffer: Vec<u8>,
    buffered: u64,
    shards: Vec<ShardInfo>,
}

impl ShardWriter {
    /// Creates a writer for `dir`, creating the directory if needed.
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        Ok(Self {
            storage: LocalStorage::new(dir.as_ref())?,
            size_limit: DEFAULT_SIZE_LIMIT,
            compression: None,
            hashes: Vec::new(),
            buffer: Vec::new(),
            buffered: 0,
            shards: Vec::new(),
        })
    }

    #[must_use]
    pub fn with_size_limit(mut self, size_limit: usize) -> Self {
        self.size_limit = size_limit;
        self
    }

    /// Also store each shard compressed with `compression`.
    #[must_use]
    pub fn with_compression(mut self, compression: Compression) -> Self {
        self.compression = Some(compression);
        self
    }

    /// Digests to record in the index for every file.
    #[must_use]
    pub fn with_hashes(mut self, hashes: Vec<HashAlgorithm>) -> Self {
        self.hashes = hashes;
        self
    }

    pub fn dir(&self) -> &Path {
        self.storage.root()
    }

    /// Appends a record, flushing the current shard first if it is full.
    pub fn write(&mut self, record: &Record) -> Result<()> {
        let framed = record.encode()?;
        if !self.buffer.is_empty() && self.buffer.len() + framed.len() > self.size_limit {
            self.flush_shard()?;
        }
        self.buffer.extend_from_slice(&framed);
        self.buffered += 1;
        Ok(())
    }

    /// Flushes the last shard and writes the index.
    pub fn finish(mut self) -> Result<DatasetIndex> {
        if !self.buffer.is_empty() {
            self.flush_shard()?;
        }

        let index = DatasetIndex::new(std::mem::take(&mut self.shards));
        self.write_file(Path::new(INDEX_FILENAME), &index.to_json()?)?;

        info!(
            dir = %self.storage.root().display(),
            shards = index.shards.len(),
            samples = index.num_samples(),
            "wrote dataset index"
        );
        Ok(index)
    }

    fn flush_shard(&mut self) -> Result<()> {
        let raw = std::mem::take(&mut self.buffer);
        let samples = std::mem::take(&mut self.buffered);
        let basename = format!("shard.{:05}.svd", self.shards.len());

        self.write_file(Path::new(&basename), &raw)?;
        let raw_data = self.file_info(basename, &raw);

        let zip_data = match self.compression {
            Some(compression) => {
                let packed = compression.compress(&raw)?;
                let zip_name = format!("{}.{}", raw_data.basename, compression.extension());
                self.write_file(Path::new(&zip_name), &packed)?;
                Some(self.file_info(zip_name, &packed))
            }
            None => None,
        };

        debug!(shard = %raw_data.basename, samples, bytes = raw.len(), "wrote shard");

        self.shards.push(ShardInfo {
            samples,
            compression: self.compression,
            raw_data,
            zip_data,
        });
        Ok(())
    }

    fn file_info(&self, basename: String, data: &[u8]) -> FileInfo {
        FileInfo {
            basename,
            bytes: data.len() as u64,
            hashes: self
                .hashes
                .iter()
                .map(|algo| (algo.as_str().to_string(), algo.digest(data)))
                .collect(),
        }
    }

    fn write_file(&self, path: &Path, data: &[u8]) -> Result<PathBuf> {
        let temp = temp_path_for(path);
        let written = self.storage.open_write(&temp).and_then(|mut writer| {
            writer.write_all(data).map_err(|e| {
                StreamingError::storage_with_source(self.storage.resolve(&temp), "failed to write", e)
            })?;
            writer.finish()
        });
        if let Err(e) = written {
            discard_temp(&self.storage, &temp);
            return Err(e);
        }
        publish(&self.storage, &temp, path)?;
        Ok(self.storage.resolve(path))
    }
}
