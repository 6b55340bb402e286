// rust/streaming-vision/src/error.rs

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StreamingError {

    #[error("Configuration error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Storage error at '{path}': {message}")]
    Storage {
        path: PathBuf,
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("Download of '{remote}' failed after {attempts} attempt(s): {message}")]
    Download {
        remote: String,
        attempts: u32,
        message: String,
        #[source]
        source: Option<Box<StreamingError>>,
    },

    #[error("Download of '{remote}' exceeded timeout of {timeout_ms} ms")]
    Timeout {
        remote: String,
        timeout_ms: u64,
    },

    #[error("Hash mismatch for '{path}' ({algorithm}): expected {expected}, got {actual}")]
    HashMismatch {
        path: PathBuf,
        algorithm: String,
        expected: String,
        actual: String,
    },

    #[error("Shard '{shard}' error: {message}")]
    Shard {
        shard: String,
        message: String,
    },

    #[error("Decode error: {message}")]
    Decode {
        message: String,
    },

    #[error("Sample index {index} out of range (dataset length: {len})")]
    IndexOutOfRange {
        index: usize,
        len: usize,
    },

    #[error("Sample is missing column '{column}'")]
    MissingColumn {
        column: String,
    },

    #[error("Transform error: {message}")]
    Transform {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

pub type Result<T> = std::result::Result<T, StreamingError>;

// Convenience constructors
impl StreamingError {

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            source: None,
        }
    }

    pub fn config_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Config {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn storage(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Storage {
            path: path.into(),
            message: message.into(),
            source: None,
        }
    }

    pub fn storage_with_source(
        path: impl Into<PathBuf>,
        message: impl Into<String>,
        source: std::io::Error,
    ) -> Self {
        Self::Storage {
            path: path.into(),
            message: message.into(),
            source: Some(source),
        }
    }

    pub fn download(remote: impl Into<String>, attempts: u32, last: StreamingError) -> Self {
        Self::Download {
            remote: remote.into(),
            attempts,
            message: last.to_string(),
            source: Some(Box::new(last)),
        }
    }

    pub fn timeout(remote: impl Into<String>, timeout_ms: u64) -> Self {
        Self::Timeout {
            remote: remote.into(),
            timeout_ms,
        }
    }

    pub fn hash_mismatch(
        path: impl Into<PathBuf>,
        algorithm: impl Into<String>,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Self::HashMismatch {
            path: path.into(),
            algorithm: algorithm.into(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    pub fn shard(shard: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Shard {
            shard: shard.into(),
            message: message.into(),
        }
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    pub fn index_out_of_range(index: usize, len: usize) -> Self {
        Self::IndexOutOfRange { index, len }
    }

    pub fn missing_column(column: impl Into<String>) -> Self {
        Self::MissingColumn {
            column: column.into(),
        }
    }

    pub fn transform(message: impl Into<String>) -> Self {
        Self::Transform {
            message: message.into(),
            source: None,
        }
    }

    pub fn transform_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Transform {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Whether a failed download attempt that produced this error is worth repeating.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Storage { .. } | Self::Timeout { .. })
    }
}
