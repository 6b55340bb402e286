// rust/streaming-vision/src/record.rs

//! Sample records and their on-disk framing.
//!
//! A shard is a sequence of records, each a 4-byte big-endian length followed
//! by a bincode-encoded [`Record`]:
//!
//! ```text
//! +----------+----------------+----------+----------------+---
//! | len (BE) | record bytes   | len (BE) | record bytes   | ...
//! +----------+----------------+----------+----------------+---
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Result, StreamingError};
use crate::value::Value;

/// Size of the length prefix in front of every record.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// One stored sample: column name to value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Record {
    columns: BTreeMap<String, Value>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a column, replacing any previous value under `name`.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.columns.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.columns.get(name)
    }

    /// Removes and returns column `name`.
    ///
    /// # Errors
    ///
    /// Returns [`StreamingError::MissingColumn`] if the column is absent.
    pub fn take(&mut self, name: &str) -> Result<Value> {
        self.columns
            .remove(name)
            .ok_or_else(|| StreamingError::missing_column(name))
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    /// Encodes the record with its length prefix.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let body = bincode::serialize(self)
            .map_err(|e| StreamingError::decode(format!("failed to encode record: {e}")))?;
        let len = u32::try_from(body.len()).map_err(|_| {
            StreamingError::decode(format!("record of {} bytes exceeds 4 GiB", body.len()))
        })?;

        let mut framed = Vec::with_capacity(LENGTH_PREFIX_SIZE + body.len());
        framed.extend_from_slice(&len.to_be_bytes());
        framed.extend_from_slice(&body);
        Ok(framed)
    }

    /// Decodes a record body (without its length prefix).
    pub fn decode(body: &[u8]) -> Result<Self> {
        bincode::deserialize(body)
            .map_err(|e| StreamingError::decode(format!("failed to decode record: {e}")))
    }
}

/// Finds the end of the length-prefixed record starting at `offset`.
///
/// Returns the byte position after the record, or `None` if `data` does not
/// hold a complete record there.
pub fn find_record_end(data: &[u8], offset: usize) -> Option<usize> {
    let prefix_end = offset.checked_add(LENGTH_PREFIX_SIZE)?;
    if prefix_end > data.len() {
        return None;
    }

    let length_bytes: [u8; 4] = data[offset..prefix_end].try_into().ok()?;
    let length = u32::from_be_bytes(length_bytes) as usize;

    let end = prefix_end.checked_add(length)?;
    (end <= data.len()).then_some(end)
}

/// Computes the boundaries of every record in a raw shard.
///
/// The result has one entry more than the number of records: record `i`
/// spans `offsets[i]..offsets[i + 1]`, prefix included.
///
/// # Errors
///
/// Returns a shard error if the data ends in a truncated record.
pub fn record_offsets(shard: &str, data: &[u8]) -> Result<Vec<u64>> {
    let mut offsets = vec![0u64];
    let mut offset = 0usize;

    while offset < data.len() {
        match find_record_end(data, offset) {
            Some(end) => {
                offsets.push(end as u64);
                offset = end;
            }
            None => {
                return Err(StreamingError::shard(
                    shard,
                    format!("truncated record at byte {offset} of {}", data.len()),
                ));
            }
        }
    }

    Ok(offsets)
}

/// Decodes the framed record occupying `framed` (prefix included).
pub fn decode_framed(framed: &[u8]) -> Result<Record> {
    if framed.len() < LENGTH_PREFIX_SIZE {
        return Err(StreamingError::decode("record shorter than its length prefix"));
    }
    Record::decode(&framed[LENGTH_PREFIX_SIZE..])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{ColorMode, Image};

    fn sample(label: i64) -> Record {
        let image = Image::new(1, 1, ColorMode::L, vec![label as u8]).unwrap();
        Record::new().with("x", image).with("y", label)
    }

    #[test]
    fn test_encode_then_decode_framed() {
        let record = sample(3);
        let framed = record.encode().unwrap();

        let len = u32::from_be_bytes(framed[..4].try_into().unwrap()) as usize;
        assert_eq!(len, framed.len() - LENGTH_PREFIX_SIZE);
        assert_eq!(decode_framed(&framed).unwrap(), record);
    }

    #[test]
    fn test_find_record_end() {
        let mut data = vec![];
        data.extend_from_slice(&5u32.to_be_bytes());
        data.extend_from_slice(b"hello");
        data.extend_from_slice(&3u32.to_be_bytes());
        data.extend_from_slice(b"bye");

        assert_eq!(find_record_end(&data, 0), Some(9));
        assert_eq!(find_record_end(&data, 9), Some(16));
        assert_eq!(find_record_end(&data, 16), None);

        // Not enough data for the prefix
        assert_eq!(find_record_end(&[0u8; 2], 0), None);

        // Prefix claims more data than available
        let mut short = vec![];
        short.extend_from_slice(&100u32.to_be_bytes());
        short.extend_from_slice(b"short");
        assert_eq!(find_record_end(&short, 0), None);

        // Zero-length record
        assert_eq!(find_record_end(&0u32.to_be_bytes(), 0), Some(4));
    }

    #[test]
    fn test_record_offsets() {
        let mut shard = Vec::new();
        let mut expected = vec![0u64];
        for label in 0..4 {
            shard.extend_from_slice(&sample(label).encode().unwrap());
            expected.push(shard.len() as u64);
        }

        let offsets = record_offsets("shard.00000.svd", &shard).unwrap();
        assert_eq!(offsets, expected);

        let third = &shard[offsets[2] as usize..offsets[3] as usize];
        assert_eq!(decode_framed(third).unwrap(), sample(2));
    }

    #[test]
    fn test_record_offsets_empty_shard() {
        assert_eq!(record_offsets("empty", &[]).unwrap(), vec![0]);
    }

    #[test]
    fn test_record_offsets_truncated() {
        let mut shard = sample(1).encode().unwrap();
        shard.extend_from_slice(&10u32.to_be_bytes());
        shard.extend_from_slice(b"abc");

        let err = record_offsets("shard.00003.svd", &shard).unwrap_err();
        assert!(matches!(err, StreamingError::Shard { .. }));
        assert!(err.to_string().contains("shard.00003.svd"));
    }

    #[test]
    fn test_take_missing_column() {
        let mut record = sample(0);
        assert!(record.take("x").is_ok());
        let err = record.take("x").unwrap_err();
        assert!(matches!(err, StreamingError::MissingColumn { ref column } if column == "x"));
    }

    #[test]
    fn test_decode_garbage() {
        assert!(Record::decode(&[0xff; 3]).is_err());
        assert!(decode_framed(&[0, 0]).is_err());
    }
}
