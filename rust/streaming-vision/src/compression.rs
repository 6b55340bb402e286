// rust/streaming-vision/src/compression.rs

//! Compression of shard files.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, StreamingError};

/// Default zstd level for shard compression.
pub const DEFAULT_ZSTD_LEVEL: i32 = 3;

/// Algorithm used for the compressed ("zip") form of a shard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    Lz4,
    Zstd,
}

impl Compression {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Lz4 => "lz4",
            Self::Zstd => "zstd",
        }
    }

    /// File extension appended to the raw basename of a compressed shard.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Lz4 => "lz4",
            Self::Zstd => "zstd",
        }
    }

    pub fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        match self {
            Self::Lz4 => Ok(lz4_flex::compress_prepend_size(data)),
            Self::Zstd => zstd::encode_all(data, DEFAULT_ZSTD_LEVEL)
                .map_err(|e| StreamingError::decode(format!("zstd compression failed: {e}"))),
        }
    }

    pub fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
        match self {
            Self::Lz4 => lz4_flex::decompress_size_prepended(data)
                .map_err(|e| StreamingError::decode(format!("lz4 decompression failed: {e}"))),
            Self::Zstd => zstd::decode_all(data)
                .map_err(|e| StreamingError::decode(format!("zstd decompression failed: {e}"))),
        }
    }
}

impl FromStr for Compression {
    type Err = StreamingError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "lz4" => Ok(Self::Lz4),
            "zstd" => Ok(Self::Zstd),
            other => Err(StreamingError::config(format!(
                "unknown compression algorithm: '{other}'. Expected 'lz4' or 'zstd'"
            ))),
        }
    }
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compression_shrinks_repetitive_data() {
        let data = b"pixels pixels pixels pixels pixels pixels pixels pixels".repeat(32);
        for algo in [Compression::Lz4, Compression::Zstd] {
            let packed = algo.compress(&data).unwrap();
            assert!(packed.len() < data.len(), "{algo} did not shrink data");
            assert_eq!(algo.decompress(&packed).unwrap(), data);
        }
    }

    #[test]
    fn test_decompress_garbage() {
        assert!(Compression::Zstd.decompress(b"not zstd").is_err());
        assert!(Compression::Lz4.decompress(&[10, 0, 0, 0, 0xff]).is_err());
    }

    #[test]
    fn test_parse() {
        assert_eq!("ZSTD".parse::<Compression>().unwrap(), Compression::Zstd);
        assert!("gzip".parse::<Compression>().is_err());
    }
}
