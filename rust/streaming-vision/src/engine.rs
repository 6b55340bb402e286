// rust/streaming-vision/src/engine.rs

//! The streaming engine: random access to samples stored in shards.
//!
//! [`StreamingEngine`] is the retrieval contract the vision adapter depends
//! on. [`StreamingDataset`] implements it over a directory of shards
//! described by an `index.json`, downloading each shard from the remote on
//! first use and caching it locally.
//!
//! # Example
//!
//! ```no_run
//! use streaming_vision::{StreamingConfig, StreamingDataset, StreamingEngine};
//!
//! let config = StreamingConfig::new("/mnt/datasets/cifar10", "/tmp/cifar10");
//! let dataset = StreamingDataset::new(config).unwrap();
//! let record = dataset.get_item(0).unwrap();
//! ```

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::{debug, info};

use crate::compression::Compression;
use crate::config::StreamingConfig;
use crate::download::{discard_temp, fetch, publish, temp_path_for, HashAlgorithm, RetryConfig};
use crate::error::{Result, StreamingError};
use crate::index::{DatasetIndex, FileInfo, SampleLocator, ShardInfo, INDEX_FILENAME};
use crate::record::{decode_framed, record_offsets, Record};
use crate::storage::{LocalStorage, StorageBackend};

/// Random access to the samples of a dataset.
///
/// `get_item` may block while the owning shard is made resident.
/// Implementations must be safe to call from several threads at once.
pub trait StreamingEngine: Send + Sync {
    /// Number of samples addressable by global index.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Retrieves the sample at zero-based global `index`.
    ///
    /// # Errors
    ///
    /// Returns an error if the index is out of range or the shard holding
    /// it cannot be downloaded, validated or decoded.
    fn get_item(&self, index: usize) -> Result<Record>;
}

/// Residency of one shard in the local cache.
#[derive(Debug, Default)]
enum ShardState {
    #[default]
    Unloaded,
    /// Raw shard is present locally; record boundaries are known.
    Resident { offsets: Arc<Vec<u64>> },
}

/// Shard engine reading from a local cache fed by a filesystem remote.
pub struct StreamingDataset {
    config: StreamingConfig,
    cache: LocalStorage,
    remote: Option<LocalStorage>,
    index: DatasetIndex,
    locator: SampleLocator,
    shards: Vec<Mutex<ShardState>>,
    retry: RetryConfig,
    download_timeout: Duration,
}

impl std::fmt::Debug for StreamingDataset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamingDataset")
            .field("local", &self.cache.root())
            .field("remote", &self.remote.as_ref().map(|r| r.root().to_path_buf()))
            .field("num_shards", &self.shards.len())
            .field("num_samples", &self.locator.len())
            .finish()
    }
}

impl StreamingDataset {
    /// Creates the engine: validates `config`, prepares the local cache and
    /// loads the index, downloading it from the remote if it is not cached.
    ///
    /// Shards themselves are fetched lazily by [`StreamingEngine::get_item`].
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid, the remote does not
    /// exist, or the index cannot be obtained or parsed.
    pub fn new(config: StreamingConfig) -> Result<Self> {
        config.validate()?;

        let local_dir = local_dir(&config);
        let cache = LocalStorage::new(&local_dir)?;

        let remote = if config.remote_is_local() {
            None
        } else {
            config
                .remote_dir()
                .map(LocalStorage::open_existing)
                .transpose()?
        };

        let retry = RetryConfig::from(&config);
        let download_timeout = Duration::from_millis(config.download_timeout_ms);

        let index_path = Path::new(INDEX_FILENAME);
        if !cache.exists(index_path)? {
            match &remote {
                Some(remote) => fetch(remote, &cache, index_path, download_timeout, &retry)?,
                None => {
                    return Err(StreamingError::storage(
                        cache.resolve(index_path),
                        "index not found locally and no remote is configured",
                    ));
                }
            }
        }
        let index = DatasetIndex::load(&cache, index_path)?;
        let locator = SampleLocator::new(&index);
        let shards = index.shards.iter().map(|_| Mutex::default()).collect();

        info!(
            local = %local_dir.display(),
            remote = ?config.remote,
            shards = index.shards.len(),
            samples = locator.len(),
            "opened streaming dataset"
        );

        Ok(Self {
            config,
            cache,
            remote,
            index,
            locator,
            shards,
            retry,
            download_timeout,
        })
    }

    /// The configuration this engine was built from.
    pub fn config(&self) -> &StreamingConfig {
        &self.config
    }

    /// Directory holding the cached shards of the configured split.
    pub fn local_dir(&self) -> &Path {
        self.cache.root()
    }

    pub fn index(&self) -> &DatasetIndex {
        &self.index
    }

    pub fn num_shards(&self) -> usize {
        self.shards.len()
    }

    /// Whether shard `shard_id` has been made resident by this engine.
    pub fn is_resident(&self, shard_id: usize) -> bool {
        self.shards
            .get(shard_id)
            .and_then(|state| state.lock().ok().map(|s| matches!(*s, ShardState::Resident { .. })))
            .unwrap_or(false)
    }

    /// Returns the record boundaries of a shard, materializing it first if
    /// needed. Concurrent callers for the same shard wait on its lock, so a
    /// shard is downloaded at most once.
    fn ensure_resident(&self, shard_id: usize) -> Result<Arc<Vec<u64>>> {
        let info = &self.index.shards[shard_id];
        let mut state = self.shards[shard_id].lock().map_err(|_| {
            StreamingError::shard(&info.raw_data.basename, "shard state lock poisoned")
        })?;

        if let ShardState::Resident { offsets } = &*state {
            return Ok(offsets.clone());
        }

        let offsets = Arc::new(self.materialize(info)?);
        *state = ShardState::Resident {
            offsets: offsets.clone(),
        };
        Ok(offsets)
    }

    /// Brings the raw form of a shard into the cache and scans it.
    fn materialize(&self, info: &ShardInfo) -> Result<Vec<u64>> {
        let raw_path = Path::new(&info.raw_data.basename);

        if !self.cache.exists(raw_path)? {
            match (&info.zip_data, info.compression) {
                (Some(zip), Some(compression)) => {
                    // Another worker on the same cache may have unpacked it first
                    if let Err(e) = self.unpack(info, zip, compression) {
                        if !self.cache.exists(raw_path)? {
                            return Err(e);
                        }
                        debug!(shard = %info.raw_data.basename, error = %e, "shard unpacked concurrently");
                    }
                }
                _ => self.download(raw_path)?,
            }
        }

        let raw = self.cache.open_read(raw_path)?.read_all()?;
        self.validate(raw_path, &info.raw_data, &raw)?;

        let offsets = record_offsets(&info.raw_data.basename, &raw)?;
        let found = (offsets.len() - 1) as u64;
        if found != info.samples {
            return Err(StreamingError::shard(
                &info.raw_data.basename,
                format!("index lists {} samples but shard holds {found}", info.samples),
            ));
        }

        debug!(shard = %info.raw_data.basename, samples = found, "shard resident");
        Ok(offsets)
    }

    /// Fetches the zip form if needed, decompresses it into the raw form
    /// and drops the zip unless it is kept.
    fn unpack(&self, info: &ShardInfo, zip: &FileInfo, compression: Compression) -> Result<()> {
        let raw_path = Path::new(&info.raw_data.basename);
        let zip_path = Path::new(&zip.basename);
        if !self.cache.exists(zip_path)? {
            self.download(zip_path)?;
        }
        let packed = self.cache.open_read(zip_path)?.read_all()?;
        self.validate(zip_path, zip, &packed)?;

        debug!(shard = %info.raw_data.basename, %compression, "decompressing shard");
        let raw = compression.decompress(&packed)?;
        self.write_atomic(raw_path, &raw)?;

        if !self.keep_zip() {
            debug!(zip = %zip.basename, "removing compressed shard");
            self.cache.delete(zip_path)?;
        }
        Ok(())
    }

    fn download(&self, path: &Path) -> Result<()> {
        match &self.remote {
            Some(remote) => fetch(remote, &self.cache, path, self.download_timeout, &self.retry),
            None => Err(StreamingError::storage(
                self.cache.resolve(path),
                "shard not found locally and no remote is configured",
            )),
        }
    }

    fn validate(&self, path: &Path, file: &FileInfo, data: &[u8]) -> Result<()> {
        let Some(algo) = self.config.validate_hash else {
            return Ok(());
        };
        let expected = file.hash(algo).ok_or_else(|| {
            StreamingError::shard(
                &file.basename,
                format!("index has no {algo} digest to validate against"),
            )
        })?;
        algo.verify(&self.cache.resolve(path), data, expected)
    }

    fn write_atomic(&self, path: &Path, data: &[u8]) -> Result<()> {
        let temp = temp_path_for(path);
        let written = self.cache.open_write(&temp).and_then(|mut writer| {
            writer.write_all(data).map_err(|e| {
                StreamingError::storage_with_source(self.cache.resolve(&temp), "failed to write", e)
            })?;
            writer.finish()
        });
        if let Err(e) = written {
            discard_temp(&self.cache, &temp);
            return Err(e);
        }
        publish(&self.cache, &temp, path)
    }

    /// The compressed form is kept when asked to, or when it never left
    /// the machine.
    fn keep_zip(&self) -> bool {
        self.config.keep_zip || self.remote.is_none()
    }
}

impl StreamingEngine for StreamingDataset {
    fn len(&self) -> usize {
        self.locator.len() as usize
    }

    fn get_item(&self, index: usize) -> Result<Record> {
        let (shard_id, local_index) = self
            .locator
            .locate(index as u64)
            .ok_or_else(|| StreamingError::index_out_of_range(index, self.len()))?;

        let offsets = self.ensure_resident(shard_id)?;
        let start = offsets[local_index as usize];
        let end = offsets[local_index as usize + 1];

        let raw_path = Path::new(&self.index.shards[shard_id].raw_data.basename);
        let framed = self
            .cache
            .open_read(raw_path)?
            .read_range(start, (end - start) as usize)?;
        decode_framed(&framed)
    }
}

/// Local cache directory for the configured split. Without an explicit
/// `local`, a directory under the system temp dir keyed by the remote is
/// used, so workers streaming the same remote share one cache.
fn local_dir(config: &StreamingConfig) -> PathBuf {
    let root = match (&config.local, &config.remote) {
        (Some(local), _) => local.clone(),
        (None, remote) => {
            let key = HashAlgorithm::Xxh64.digest(remote.as_deref().unwrap_or_default().as_bytes());
            std::env::temp_dir().join("streaming-vision").join(key)
        }
    };
    match &config.split {
        Some(split) => root.join(split),
        None => root,
    }
}
