// rust/streaming-vision/src/config.rs

//! Configuration for the streaming engine.
//!
//! [`StreamingConfig`] enumerates every option the shard engine understands.
//! It can be built in code, parsed from TOML, and overridden from `SVD_`
//! prefixed environment variables. The vision adapter hands it to the engine
//! untouched; only the engine calls [`StreamingConfig::validate`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::download::HashAlgorithm;
use crate::error::{Result, StreamingError};

/// Default number of download re-attempts.
pub const DEFAULT_DOWNLOAD_RETRY: u32 = 2;
/// Default per-attempt download timeout.
pub const DEFAULT_DOWNLOAD_TIMEOUT_MS: u64 = 60_000;
/// Default predownload window, in samples.
pub const DEFAULT_PREDOWNLOAD: u64 = 100_000;
/// Default shuffle seed.
pub const DEFAULT_SHUFFLE_SEED: u64 = 9176;
/// Default shuffle block size, in samples.
pub const DEFAULT_SHUFFLE_BLOCK_SIZE: u64 = 1 << 18;

/// How samples are partitioned over nodes, ranks and workers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartitionAlgorithm {
    #[default]
    Orig,
    Relaxed,
}

impl PartitionAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Orig => "orig",
            Self::Relaxed => "relaxed",
        }
    }
}

impl FromStr for PartitionAlgorithm {
    type Err = StreamingError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "orig" => Ok(Self::Orig),
            "relaxed" => Ok(Self::Relaxed),
            other => Err(StreamingError::config(format!(
                "unknown partition algorithm: '{other}'. Expected 'orig' or 'relaxed'"
            ))),
        }
    }
}

impl fmt::Display for PartitionAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which shuffle algorithm orders samples within an epoch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShuffleAlgorithm {
    Naive,
    #[default]
    Py1b,
    Py1br,
    Py1e,
    Py1s,
    Py2s,
}

impl ShuffleAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Naive => "naive",
            Self::Py1b => "py1b",
            Self::Py1br => "py1br",
            Self::Py1e => "py1e",
            Self::Py1s => "py1s",
            Self::Py2s => "py2s",
        }
    }
}

impl FromStr for ShuffleAlgorithm {
    type Err = StreamingError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "naive" => Ok(Self::Naive),
            "py1b" => Ok(Self::Py1b),
            "py1br" => Ok(Self::Py1br),
            "py1e" => Ok(Self::Py1e),
            "py1s" => Ok(Self::Py1s),
            "py2s" => Ok(Self::Py2s),
            other => Err(StreamingError::config(format!(
                "unknown shuffle algorithm: '{other}'"
            ))),
        }
    }
}

impl fmt::Display for ShuffleAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Options for constructing the streaming engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamingConfig {
    /// Remote directory (plain path or `file://` URL) to download shards from.
    /// When unset, the data must already exist under `local`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote: Option<String>,
    /// Local working directory that caches shards. A directory under the
    /// system temp dir is derived from `remote` when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local: Option<PathBuf>,
    /// Dataset split; selects the `split` subdirectory of `remote` and `local`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub split: Option<String>,
    /// Number of download re-attempts before giving up.
    pub download_retry: u32,
    /// Time allowed for a single download attempt.
    pub download_timeout_ms: u64,
    /// Hash algorithm used to validate shards, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validate_hash: Option<HashAlgorithm>,
    // Keep the compressed form of a shard after decompressing it. When false,
    // it is kept only if the remote is local or absent.
    pub keep_zip: bool,
    // Keep the decompressed form of a shard once its samples are consumed.
    pub keep_raw: bool,
    /// Samples drawn per epoch; the dataset size when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub choose: Option<u64>,
    /// Samples ahead to download shards for while iterating.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub predownload: Option<u64>,
    pub partition_algo: PartitionAlgorithm,
    /// Canonical node count for shuffling with resumption.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_canonical_nodes: Option<u32>,
    /// Loader batch size, which affects partitioning over workers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_size: Option<u32>,
    pub shuffle: bool,
    pub shuffle_algo: ShuffleAlgorithm,
    pub shuffle_seed: u64,
    pub shuffle_block_size: u64,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            remote: None,
            local: None,
            split: None,
            download_retry: DEFAULT_DOWNLOAD_RETRY,
            download_timeout_ms: DEFAULT_DOWNLOAD_TIMEOUT_MS,
            validate_hash: None,
            keep_zip: false,
            keep_raw: true,
            choose: None,
            predownload: Some(DEFAULT_PREDOWNLOAD),
            partition_algo: PartitionAlgorithm::Orig,
            num_canonical_nodes: None,
            batch_size: None,
            shuffle: false,
            shuffle_algo: ShuffleAlgorithm::Py1b,
            shuffle_seed: DEFAULT_SHUFFLE_SEED,
            shuffle_block_size: DEFAULT_SHUFFLE_BLOCK_SIZE,
        }
    }
}

impl FromStr for StreamingConfig {
    type Err = StreamingError;

    /// Parse configuration from a TOML string.
    fn from_str(s: &str) -> Result<Self> {
        toml::from_str(s)
            .map_err(|e| StreamingError::config_with_source("failed to parse TOML config", e))
    }
}

impl StreamingConfig {
    /// Configuration streaming from `remote` into `local`.
    pub fn new(remote: impl Into<String>, local: impl Into<PathBuf>) -> Self {
        Self {
            remote: Some(remote.into()),
            local: Some(local.into()),
            ..Self::default()
        }
    }

    /// Configuration reading an already materialized dataset under `local`.
    pub fn local_only(local: impl Into<PathBuf>) -> Self {
        Self {
            local: Some(local.into()),
            ..Self::default()
        }
    }

    // Load configuration from a TOML file.
    //
    // # Errors
    //
    // Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            StreamingError::storage_with_source(path, "failed to read config file", e)
        })?;
        content.parse()
    }

    // Apply environment variable overrides.
    //
    // Variables are the upper-cased field names prefixed with `SVD_`, for
    // example `SVD_REMOTE`, `SVD_DOWNLOAD_RETRY` or `SVD_SHUFFLE_SEED`.
    // Values that fail to parse are ignored.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(val) = std::env::var("SVD_REMOTE") {
            self.remote = Some(val);
        }
        if let Ok(val) = std::env::var("SVD_LOCAL") {
            self.local = Some(PathBuf::from(val));
        }
        if let Ok(val) = std::env::var("SVD_SPLIT") {
            self.split = Some(val);
        }
        if let Some(v) = env_parse("SVD_DOWNLOAD_RETRY") {
            self.download_retry = v;
        }
        if let Some(v) = env_parse("SVD_DOWNLOAD_TIMEOUT_MS") {
            self.download_timeout_ms = v;
        }
        if let Some(v) = env_parse("SVD_VALIDATE_HASH") {
            self.validate_hash = Some(v);
        }
        if let Some(v) = env_parse("SVD_KEEP_ZIP") {
            self.keep_zip = v;
        }
        if let Some(v) = env_parse("SVD_KEEP_RAW") {
            self.keep_raw = v;
        }
        if let Some(v) = env_parse("SVD_CHOOSE") {
            self.choose = Some(v);
        }
        if let Some(v) = env_parse("SVD_PREDOWNLOAD") {
            self.predownload = Some(v);
        }
        if let Some(v) = env_parse("SVD_PARTITION_ALGO") {
            self.partition_algo = v;
        }
        if let Some(v) = env_parse("SVD_NUM_CANONICAL_NODES") {
            self.num_canonical_nodes = Some(v);
        }
        if let Some(v) = env_parse("SVD_BATCH_SIZE") {
            self.batch_size = Some(v);
        }
        if let Some(v) = env_parse("SVD_SHUFFLE") {
            self.shuffle = v;
        }
        if let Some(v) = env_parse("SVD_SHUFFLE_ALGO") {
            self.shuffle_algo = v;
        }
        if let Some(v) = env_parse("SVD_SHUFFLE_SEED") {
            self.shuffle_seed = v;
        }
        if let Some(v) = env_parse("SVD_SHUFFLE_BLOCK_SIZE") {
            self.shuffle_block_size = v;
        }
        self
    }

    // Validate all configuration values.
    //
    // # Errors
    //
    // Returns an error if any configuration value is invalid.
    pub fn validate(&self) -> Result<()> {
        if self.remote.is_none() && self.local.is_none() {
            return Err(StreamingError::config(
                "at least one of remote or local must be set",
            ));
        }
        if let Some(remote) = &self.remote {
            if remote.is_empty() {
                return Err(StreamingError::config("remote must not be empty"));
            }
            if remote_path(remote).is_none() {
                return Err(StreamingError::config(format!(
                    "unsupported remote '{remote}': expected a filesystem path or file:// URL"
                )));
            }
        }
        if let Some(split) = &self.split {
            if split.is_empty() || split.contains(|c| c == '/' || c == '\\') || split == ".." {
                return Err(StreamingError::config(format!(
                    "split must be a single directory name, got '{split}'"
                )));
            }
        }
        if self.download_timeout_ms == 0 {
            return Err(StreamingError::config(
                "download_timeout_ms must be greater than 0",
            ));
        }
        if self.choose == Some(0) {
            return Err(StreamingError::config("choose must be greater than 0"));
        }
        if self.num_canonical_nodes == Some(0) {
            return Err(StreamingError::config(
                "num_canonical_nodes must be greater than 0",
            ));
        }
        if self.batch_size == Some(0) {
            return Err(StreamingError::config("batch_size must be greater than 0"));
        }
        if self.shuffle_block_size == 0 {
            return Err(StreamingError::config(
                "shuffle_block_size must be greater than 0",
            ));
        }
        Ok(())
    }

    /// The remote directory of the configured split, as a filesystem path.
    pub fn remote_dir(&self) -> Option<PathBuf> {
        let root = remote_path(self.remote.as_deref()?)?;
        Some(match &self.split {
            Some(split) => root.join(split),
            None => root,
        })
    }

    /// Whether shards never leave the machine: no remote, or a remote that
    /// resolves to the same directory as `local`.
    pub fn remote_is_local(&self) -> bool {
        match (self.remote.as_deref().and_then(remote_path), &self.local) {
            (None, _) => true,
            (Some(remote), Some(local)) => remote == *local,
            (Some(_), None) => false,
        }
    }
}

/// Resolve a remote location to a filesystem path. Object-store URLs are not
/// handled by this engine.
pub(crate) fn remote_path(remote: &str) -> Option<PathBuf> {
    if let Some(path) = remote.strip_prefix("file://") {
        return Some(PathBuf::from(path));
    }
    if remote.contains("://") {
        return None;
    }
    Some(PathBuf::from(remote))
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|val| val.parse().ok())
}
