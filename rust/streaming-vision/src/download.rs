// rust/streaming-vision/src/download.rs

//! Shard download with retries, timeouts and hash validation.
//!
//! A download copies one object from a remote [`StorageBackend`] into the
//! local cache. Every attempt writes to a hidden temporary file and renames
//! it into place once complete, so a reader never observes a partial shard.

use std::fmt;
use std::hash::Hasher;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::str::FromStr;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use twox_hash::{XxHash32, XxHash64};

use crate::config::StreamingConfig;
use crate::error::{Result, StreamingError};
use crate::storage::StorageBackend;

/// Bytes copied between timeout checks.
const COPY_CHUNK_SIZE: usize = 1024 * 1024; // 1 MB

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Hash algorithms available for shard validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    Xxh32,
    Xxh64,
}

impl HashAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Xxh32 => "xxh32",
            Self::Xxh64 => "xxh64",
        }
    }

    /// Hex digest of `data`, seeded with zero.
    pub fn digest(&self, data: &[u8]) -> String {
        match self {
            Self::Xxh32 => {
                let mut hasher = XxHash32::with_seed(0);
                hasher.write(data);
                format!("{:08x}", hasher.finish() as u32)
            }
            Self::Xxh64 => {
                let mut hasher = XxHash64::with_seed(0);
                hasher.write(data);
                format!("{:016x}", hasher.finish())
            }
        }
    }

    /// Checks `data` against an expected hex digest.
    ///
    /// # Errors
    ///
    /// Returns [`StreamingError::HashMismatch`] if the digests differ.
    pub fn verify(&self, path: &Path, data: &[u8], expected: &str) -> Result<()> {
        let actual = self.digest(data);
        if actual.eq_ignore_ascii_case(expected) {
            Ok(())
        } else {
            warn!(path = %path.display(), algorithm = self.as_str(), %expected, %actual, "shard hash mismatch");
            Err(StreamingError::hash_mismatch(path, self.as_str(), expected, actual))
        }
    }
}

impl FromStr for HashAlgorithm {
    type Err = StreamingError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "xxh32" => Ok(Self::Xxh32),
            "xxh64" => Ok(Self::Xxh64),
            other => Err(StreamingError::config(format!(
                "unknown hash algorithm: '{other}'. Expected 'xxh32' or 'xxh64'"
            ))),
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Retry policy for shard downloads.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of re-attempts after the first try.
    pub max_retries: u32,
    /// Initial delay between retries.
    pub initial_delay: Duration,
    /// Maximum delay between retries.
    pub max_delay: Duration,
    /// Backoff multiplier (e.g., 2.0 for exponential backoff).
    pub backoff_multiplier: f64,
    /// Whether to add random jitter to delays.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl From<&StreamingConfig> for RetryConfig {
    fn from(config: &StreamingConfig) -> Self {
        Self {
            max_retries: config.download_retry,
            ..Default::default()
        }
    }
}

impl RetryConfig {
    /// Creates a retry configuration with no retries.
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    /// Calculates the delay before re-attempt `attempt` (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt >= self.max_retries {
            return Duration::ZERO;
        }

        let base_delay =
            self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(attempt as i32);
        let delay_secs = base_delay.min(self.max_delay.as_secs_f64());

        let final_delay = if self.jitter {
            // Up to 25% jitter
            delay_secs * (1.0 + jitter_fraction(attempt) * 0.25)
        } else {
            delay_secs
        };

        Duration::from_secs_f64(final_delay)
    }

    /// Returns true if more retries are allowed after `attempt` failures.
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_retries
    }
}

/// Deterministic value in [0, 1) derived from the attempt number.
fn jitter_fraction(seed: u32) -> f64 {
    let x = seed.wrapping_mul(1103515245).wrapping_add(12345);
    (x as f64) / (u32::MAX as f64 + 1.0)
}

/// Outcome of one attempt of a retryable operation.
#[derive(Debug)]
pub enum RetryResult<T, E> {
    /// Operation succeeded.
    Ok(T),
    /// Operation failed but can be retried.
    Retry(E),
    /// Operation failed and should not be retried.
    Fail(E),
}

impl<T> From<Result<T>> for RetryResult<T, StreamingError> {
    fn from(result: Result<T>) -> Self {
        match result {
            Ok(value) => Self::Ok(value),
            Err(e) if e.is_transient() => Self::Retry(e),
            Err(e) => Self::Fail(e),
        }
    }
}

/// Runs `operation` until it succeeds, fails permanently, or runs out of
/// retries, sleeping the calling thread between attempts.
///
/// The closure receives the 0-indexed attempt number. On exhaustion the last
/// error is returned together with the number of attempts made.
pub fn retry_blocking<T, E, F>(config: &RetryConfig, mut operation: F) -> std::result::Result<T, (E, u32)>
where
    F: FnMut(u32) -> RetryResult<T, E>,
{
    let mut attempt = 0;

    loop {
        match operation(attempt) {
            RetryResult::Ok(value) => return Ok(value),
            RetryResult::Fail(error) => return Err((error, attempt + 1)),
            RetryResult::Retry(error) => {
                if !config.should_retry(attempt) {
                    return Err((error, attempt + 1));
                }

                let delay = config.delay_for_attempt(attempt);
                std::thread::sleep(delay);
                attempt += 1;
            }
        }
    }
}

/// Downloads `path` from `remote` into the same relative path of `local`.
///
/// Each attempt must finish within `timeout`. A missing remote object fails
/// immediately; I/O errors and timeouts are retried per `retry`.
///
/// # Errors
///
/// Returns [`StreamingError::Download`] wrapping the last attempt's error.
pub fn fetch(
    remote: &dyn StorageBackend,
    local: &dyn StorageBackend,
    path: &Path,
    timeout: Duration,
    retry: &RetryConfig,
) -> Result<()> {
    let remote_path = remote.resolve(path);
    let remote_name = remote_path.display().to_string();

    let outcome = retry_blocking(retry, |attempt| {
        debug!(remote = %remote_name, attempt, "downloading shard file");
        match remote.exists(path) {
            Ok(true) => {}
            Ok(false) => {
                return RetryResult::Fail(StreamingError::storage(
                    &remote_path,
                    "remote file not found",
                ));
            }
            Err(e) => {
                warn!(remote = %remote_name, attempt, error = %e, "failed to stat remote file");
                return RetryResult::from(Err::<(), _>(e));
            }
        }
        let result = copy_once(remote, local, path, timeout, &remote_name);
        if let Err(e) = &result {
            warn!(remote = %remote_name, attempt, error = %e, "shard download attempt failed");
        }
        RetryResult::from(result)
    });

    outcome.map_err(|(last, attempts)| StreamingError::download(remote_name, attempts, last))
}

fn copy_once(
    remote: &dyn StorageBackend,
    local: &dyn StorageBackend,
    path: &Path,
    timeout: Duration,
    remote_name: &str,
) -> Result<()> {
    let temp_path = temp_path_for(path);
    if let Err(e) = copy_to_temp(remote, local, path, &temp_path, timeout, remote_name) {
        discard_temp(local, &temp_path);
        return Err(e);
    }
    publish(local, &temp_path, path)
}

fn copy_to_temp(
    remote: &dyn StorageBackend,
    local: &dyn StorageBackend,
    path: &Path,
    temp_path: &Path,
    timeout: Duration,
    remote_name: &str,
) -> Result<()> {
    let started = Instant::now();
    let mut reader = remote.open_read(path)?;
    let mut writer = local.open_write(temp_path)?;
    let size = reader.size();

    let mut offset = 0u64;
    while offset < size {
        if started.elapsed() > timeout {
            return Err(StreamingError::timeout(remote_name, timeout.as_millis() as u64));
        }
        let length = ((size - offset) as usize).min(COPY_CHUNK_SIZE);
        let chunk = reader.read_range(offset, length)?;
        writer.write_all(&chunk).map_err(|e| {
            StreamingError::storage_with_source(local.resolve(temp_path), "failed to write", e)
        })?;
        offset += length as u64;
    }
    writer.finish()?;

    if started.elapsed() > timeout {
        return Err(StreamingError::timeout(remote_name, timeout.as_millis() as u64));
    }
    Ok(())
}

/// Moves a fully written temp file to `path`.
///
/// Another process sharing the cache may publish the same file first; a
/// failed rename with `path` present counts as success.
pub(crate) fn publish(local: &dyn StorageBackend, temp_path: &Path, path: &Path) -> Result<()> {
    match local.rename(temp_path, path) {
        Ok(()) => Ok(()),
        Err(e) => {
            discard_temp(local, temp_path);
            if matches!(local.exists(path), Ok(true)) {
                debug!(path = %local.resolve(path).display(), "file already published concurrently");
                Ok(())
            } else {
                Err(e)
            }
        }
    }
}

/// Removes a leftover temp file, logging rather than failing.
pub(crate) fn discard_temp(local: &dyn StorageBackend, temp_path: &Path) {
    if !matches!(local.exists(temp_path), Ok(true)) {
        return;
    }
    if let Err(e) = local.delete(temp_path) {
        warn!(path = %local.resolve(temp_path).display(), error = %e, "failed to remove temp file");
    }
}

/// Hidden sibling used while a file is being written.
///
/// Names are unique per process and per call, so writers sharing a cache
/// directory never write to the same temp file.
pub(crate) fn temp_path_for(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let nonce = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    path.with_file_name(format!(".{name}.{}.{nonce}.tmp", std::process::id()))
}
