// rust/streaming-vision/src/index.rs

//! The `index.json` file describing the shards of a dataset split.
//!
//! ```json
//! {
//!   "version": 1,
//!   "shards": [
//!     {
//!       "samples": 512,
//!       "compression": "zstd",
//!       "raw_data": { "basename": "shard.00000.svd", "bytes": 1048576, "hashes": { "xxh64": "…" } },
//!       "zip_data": { "basename": "shard.00000.svd.zstd", "bytes": 204800, "hashes": {} }
//!     }
//!   ]
//! }
//! ```

use std::collections::BTreeMap;
use std::path::{Component, Path};

use serde::{Deserialize, Serialize};

use crate::compression::Compression;
use crate::download::HashAlgorithm;
use crate::error::{Result, StreamingError};
use crate::storage::StorageBackend;

/// Name of the index file at the root of each split directory.
pub const INDEX_FILENAME: &str = "index.json";

/// Current index format version.
pub const INDEX_VERSION: u32 = 1;

/// One physical file of a shard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    pub basename: String,
    pub bytes: u64,
    /// Hex digests keyed by hash algorithm name.
    #[serde(default)]
    pub hashes: BTreeMap<String, String>,
}

impl FileInfo {
    /// Expected digest for `algo`, if the writer recorded one.
    pub fn hash(&self, algo: HashAlgorithm) -> Option<&str> {
        self.hashes.get(algo.as_str()).map(String::as_str)
    }
}

/// Metadata of one shard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardInfo {
    /// Number of samples stored in the shard.
    pub samples: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compression: Option<Compression>,
    pub raw_data: FileInfo,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zip_data: Option<FileInfo>,
}

/// Parsed `index.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetIndex {
    pub version: u32,
    pub shards: Vec<ShardInfo>,
}

impl DatasetIndex {
    pub fn new(shards: Vec<ShardInfo>) -> Self {
        Self {
            version: INDEX_VERSION,
            shards,
        }
    }

    /// Parses and validates an index.
    pub fn from_json(data: &[u8]) -> Result<Self> {
        let index: Self = serde_json::from_slice(data)
            .map_err(|e| StreamingError::decode(format!("invalid {INDEX_FILENAME}: {e}")))?;
        index.validate()?;
        Ok(index)
    }

    pub fn to_json(&self) -> Result<Vec<u8>> {
        serde_json::to_vec_pretty(self)
            .map_err(|e| StreamingError::decode(format!("failed to encode {INDEX_FILENAME}: {e}")))
    }

    /// Reads the index at `path` from `storage`.
    pub fn load(storage: &dyn StorageBackend, path: &Path) -> Result<Self> {
        let mut reader = storage.open_read(path)?;
        Self::from_json(&reader.read_all()?)
    }

    /// Checks the version, that every file name stays inside the split
    /// directory, that compressed shards name their zip file, and that the
    /// total sample count fits in a `u64`.
    pub fn validate(&self) -> Result<()> {
        if self.version != INDEX_VERSION {
            return Err(StreamingError::decode(format!(
                "unsupported index version {} (expected {INDEX_VERSION})",
                self.version
            )));
        }
        let mut total = 0u64;
        for shard in &self.shards {
            check_basename(&shard.raw_data.basename)?;
            if let Some(zip) = &shard.zip_data {
                check_basename(&zip.basename)?;
            }
            if shard.compression.is_some() != shard.zip_data.is_some() {
                return Err(StreamingError::shard(
                    &shard.raw_data.basename,
                    "compression and zip_data must be set together",
                ));
            }
            total = total.checked_add(shard.samples).ok_or_else(|| {
                StreamingError::decode(format!("{INDEX_FILENAME} sample count overflows u64"))
            })?;
        }
        Ok(())
    }

    /// Total number of samples across all shards, saturating at `u64::MAX`.
    pub fn num_samples(&self) -> u64 {
        self.shards
            .iter()
            .fold(0u64, |total, s| total.saturating_add(s.samples))
    }
}

/// A shard file name must be one plain path component, so it resolves
/// inside the split directory.
fn check_basename(basename: &str) -> Result<()> {
    let mut components = Path::new(basename).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(name)), None) if name == basename => Ok(()),
        _ => Err(StreamingError::shard(
            basename,
            "file name must be a single path component",
        )),
    }
}

/// Maps global sample indices to (shard, index within shard).
#[derive(Debug, Clone)]
pub struct SampleLocator {
    /// Exclusive cumulative sample count per shard.
    ends: Vec<u64>,
}

impl SampleLocator {
    pub fn new(index: &DatasetIndex) -> Self {
        let mut total = 0u64;
        let ends = index
            .shards
            .iter()
            .map(|shard| {
                total = total.saturating_add(shard.samples);
                total
            })
            .collect();
        Self { ends }
    }

    pub fn len(&self) -> u64 {
        self.ends.last().copied().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns `(shard_id, local_index)` for a global index, or `None` when
    /// out of range. Empty shards are skipped.
    pub fn locate(&self, index: u64) -> Option<(usize, u64)> {
        if index >= self.len() {
            return None;
        }
        let shard = self.ends.partition_point(|&end| end <= index);
        let start = if shard == 0 { 0 } else { self.ends[shard - 1] };
        Some((shard, index - start))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shard(name: &str, samples: u64) -> ShardInfo {
        ShardInfo {
            samples,
            compression: None,
            raw_data: FileInfo {
                basename: name.to_string(),
                bytes: samples.saturating_mul(10),
                hashes: BTreeMap::new(),
            },
            zip_data: None,
        }
    }

    #[test]
    fn test_json_roundtrip_keeps_optional_fields() {
        let mut zipped = shard("shard.00001.svd", 4);
        zipped.compression = Some(Compression::Lz4);
        zipped.zip_data = Some(FileInfo {
            basename: "shard.00001.svd.lz4".to_string(),
            bytes: 12,
            hashes: BTreeMap::from([("xxh64".to_string(), "abcd".to_string())]),
        });
        let index = DatasetIndex::new(vec![shard("shard.00000.svd", 3), zipped]);

        let parsed = DatasetIndex::from_json(&index.to_json().unwrap()).unwrap();
        assert_eq!(parsed, index);
        assert_eq!(
            parsed.shards[1].zip_data.as_ref().unwrap().hash(HashAlgorithm::Xxh64),
            Some("abcd")
        );
        assert_eq!(parsed.shards[1].raw_data.hash(HashAlgorithm::Xxh64), None);
    }

    #[test]
    fn test_from_json_rejects_version() {
        let json = br#"{"version": 2, "shards": []}"#;
        assert!(DatasetIndex::from_json(json).is_err());
    }

    #[test]
    fn test_from_json_rejects_half_compressed_shard() {
        let json = br#"{
            "version": 1,
            "shards": [{
                "samples": 1,
                "compression": "zstd",
                "raw_data": {"basename": "shard.00000.svd", "bytes": 8}
            }]
        }"#;
        let err = DatasetIndex::from_json(json).unwrap_err();
        assert!(err.to_string().contains("zip_data"));
    }

    #[test]
    fn test_from_json_malformed() {
        assert!(matches!(
            DatasetIndex::from_json(b"{not json"),
            Err(StreamingError::Decode { .. })
        ));
    }

    #[test]
    fn test_from_json_rejects_escaping_basenames() {
        for name in ["/etc/passwd", "../shard.00000.svd", "nested/shard.00000.svd", "..", "", "./x"] {
            let index = DatasetIndex::new(vec![shard(name, 1)]);
            let err = DatasetIndex::from_json(&index.to_json().unwrap()).unwrap_err();
            assert!(matches!(err, StreamingError::Shard { .. }), "{name:?} accepted");
        }

        let mut zipped = shard("shard.00000.svd", 1);
        zipped.compression = Some(Compression::Zstd);
        zipped.zip_data = Some(FileInfo {
            basename: "../shard.00000.svd.zstd".to_string(),
            bytes: 1,
            hashes: BTreeMap::new(),
        });
        let index = DatasetIndex::new(vec![zipped]);
        assert!(DatasetIndex::from_json(&index.to_json().unwrap()).is_err());
    }

    #[test]
    fn test_from_json_rejects_sample_count_overflow() {
        let index = DatasetIndex::new(vec![shard("a", u64::MAX), shard("b", 2)]);
        let err = DatasetIndex::from_json(&index.to_json().unwrap()).unwrap_err();
        assert!(matches!(err, StreamingError::Decode { .. }));

        // Unvalidated indexes still never panic
        assert_eq!(index.num_samples(), u64::MAX);
        assert_eq!(SampleLocator::new(&index).len(), u64::MAX);
    }

    #[test]
    fn test_locate() {
        let index = DatasetIndex::new(vec![
            shard("a", 3),
            shard("b", 0),
            shard("c", 2),
            shard("d", 1),
        ]);
        let locator = SampleLocator::new(&index);

        assert_eq!(index.num_samples(), 6);
        assert_eq!(locator.len(), 6);
        assert_eq!(locator.locate(0), Some((0, 0)));
        assert_eq!(locator.locate(2), Some((0, 2)));
        // Empty shard "b" is skipped
        assert_eq!(locator.locate(3), Some((2, 0)));
        assert_eq!(locator.locate(4), Some((2, 1)));
        assert_eq!(locator.locate(5), Some((3, 0)));
        assert_eq!(locator.locate(6), None);
    }

    #[test]
    fn test_locate_empty_index() {
        let locator = SampleLocator::new(&DatasetIndex::new(vec![]));
        assert!(locator.is_empty());
        assert_eq!(locator.locate(0), None);
    }
}
