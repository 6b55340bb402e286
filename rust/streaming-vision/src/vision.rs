// rust/streaming-vision/src/vision.rs

//! Vision-style (input, target) access on top of a streaming engine.
//!
//! [`StreamingVisionDataset`] holds a shared [`StreamingEngine`] and a
//! [`TransformPolicy`]. Each retrieval asks the engine for the raw record,
//! takes its `x` (input) and `y` (target) columns and runs them through the
//! policy. Nothing is cached and no error is translated on the way out.
//!
//! # Example
//!
//! ```no_run
//! use streaming_vision::{StreamingConfig, StreamingVisionDataset, TransformOptions, VisionDataset};
//!
//! let config = StreamingConfig::new("/mnt/datasets/cifar10", "/tmp/cifar10");
//! let dataset = StreamingVisionDataset::new(config, TransformOptions::new()).unwrap();
//!
//! let sample = dataset.get_item(0).unwrap();
//! println!("input: {}, target: {:?}", sample.input.kind(), sample.target);
//! ```

use std::fmt;
use std::sync::Arc;

use crate::config::StreamingConfig;
use crate::engine::{StreamingDataset, StreamingEngine};
use crate::error::Result;
use crate::transform::{TransformOptions, TransformPolicy};
use crate::value::Value;

/// Column holding the input of a vision sample.
pub const INPUT_COLUMN: &str = "x";

/// Column holding the target of a vision sample.
pub const TARGET_COLUMN: &str = "y";

/// One transformed sample.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub input: Value,
    pub target: Value,
}

/// Indexed access to transformed (input, target) samples.
pub trait VisionDataset: Send + Sync {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Retrieves and transforms the sample at zero-based `index`.
    fn get_item(&self, index: usize) -> Result<Sample>;
}

/// Vision adapter over a streaming engine.
pub struct StreamingVisionDataset<E: StreamingEngine = StreamingDataset> {
    engine: Arc<E>,
    policy: TransformPolicy,
}

impl StreamingVisionDataset<StreamingDataset> {
    /// Builds the transform policy, then the engine from `config`.
    ///
    /// `config` is handed to [`StreamingDataset::new`] as is.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for contradictory `options` before the
    /// engine is touched, or any error the engine raises while opening.
    pub fn new(config: StreamingConfig, options: TransformOptions) -> Result<Self> {
        let policy = TransformPolicy::new(options)?;
        let engine = StreamingDataset::new(config)?;
        Ok(Self::with_policy(Arc::new(engine), policy))
    }
}

impl<E: StreamingEngine> StreamingVisionDataset<E> {
    /// Wraps an engine owned elsewhere.
    pub fn with_engine(engine: Arc<E>, options: TransformOptions) -> Result<Self> {
        let policy = TransformPolicy::new(options)?;
        Ok(Self::with_policy(engine, policy))
    }

    /// Wraps an engine with an already resolved policy.
    pub fn with_policy(engine: Arc<E>, policy: TransformPolicy) -> Self {
        Self { engine, policy }
    }

    pub fn policy(&self) -> &TransformPolicy {
        &self.policy
    }

    pub fn engine(&self) -> &Arc<E> {
        &self.engine
    }
}

impl<E: StreamingEngine> VisionDataset for StreamingVisionDataset<E> {
    fn len(&self) -> usize {
        self.engine.len()
    }

    fn get_item(&self, index: usize) -> Result<Sample> {
        let mut record = self.engine.get_item(index)?;
        let input = record.take(INPUT_COLUMN)?;
        let target = record.take(TARGET_COLUMN)?;

        let (input, target) = self.policy.apply(input, target)?;
        Ok(Sample { input, target })
    }
}

impl<E: StreamingEngine> fmt::Debug for StreamingVisionDataset<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamingVisionDataset")
            .field("len", &self.engine.len())
            .field("policy", &self.policy)
            .finish()
    }
}
