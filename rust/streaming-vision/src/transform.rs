// rust/streaming-vision/src/transform.rs

//! Transform configuration for (input, target) samples.
//!
//! Callers either supply one joint transform over the pair, or up to two
//! independent transforms for the input and the target. The two conventions
//! are mutually exclusive; [`TransformPolicy::new`] resolves the caller's
//! [`TransformOptions`] once, rejecting a mix of both.
//!
//! With no transform at all, the input goes through [`to_tensor`] and the
//! target is left as is. An explicit `Separate { input: None, target: None }`
//! leaves both untouched instead.

use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::error::{Result, StreamingError};
use crate::value::{to_tensor, Value};

/// A transform over the whole (input, target) pair.
pub type JointTransform = Arc<dyn Fn(Value, Value) -> Result<(Value, Value)> + Send + Sync>;

/// A transform over a single value.
pub type ValueTransform = Arc<dyn Fn(Value) -> Result<Value> + Send + Sync>;

/// The caller's transform configuration, before resolution.
///
/// ```
/// use streaming_vision::{TransformOptions, Value};
///
/// let options = TransformOptions::new()
///     .transform(|x: Value| Ok(x))
///     .target_transform(|y: Value| Ok(y));
/// ```
#[derive(Clone, Default)]
pub struct TransformOptions {
    /// Joint transform over (input, target).
    pub transforms: Option<JointTransform>,
    /// Transform over the input alone.
    pub transform: Option<ValueTransform>,
    /// Transform over the target alone.
    pub target_transform: Option<ValueTransform>,
}

impl TransformOptions {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn transforms<F>(mut self, f: F) -> Self
    where
        F: Fn(Value, Value) -> Result<(Value, Value)> + Send + Sync + 'static,
    {
        self.transforms = Some(Arc::new(f));
        self
    }

    #[must_use]
    pub fn transform<F>(mut self, f: F) -> Self
    where
        F: Fn(Value) -> Result<Value> + Send + Sync + 'static,
    {
        self.transform = Some(Arc::new(f));
        self
    }

    #[must_use]
    pub fn target_transform<F>(mut self, f: F) -> Self
    where
        F: Fn(Value) -> Result<Value> + Send + Sync + 'static,
    {
        self.target_transform = Some(Arc::new(f));
        self
    }
}

impl fmt::Debug for TransformOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransformOptions")
            .field("transforms", &self.transforms.is_some())
            .field("transform", &self.transform.is_some())
            .field("target_transform", &self.target_transform.is_some())
            .finish()
    }
}

/// A resolved transform configuration. Immutable once built.
#[derive(Clone)]
pub enum TransformPolicy {
    /// One function owns both outputs.
    Joint(JointTransform),
    /// Independent per-slot functions; a missing one passes its value through.
    Separate {
        input: Option<ValueTransform>,
        target: Option<ValueTransform>,
    },
    /// Input normalized with [`to_tensor`], target untouched.
    Default,
}

impl TransformPolicy {
    /// Resolves `options` into a policy.
    ///
    /// # Errors
    ///
    /// Returns [`StreamingError::Config`] if a joint transform is combined
    /// with an input or target transform.
    pub fn new(options: TransformOptions) -> Result<Self> {
        let TransformOptions {
            transforms,
            transform,
            target_transform,
        } = options;

        let policy = match (transforms, transform, target_transform) {
            (Some(_), Some(_), _) | (Some(_), _, Some(_)) => {
                return Err(StreamingError::config(
                    "only transforms or transform/target_transform can be passed, not both",
                ));
            }
            (Some(joint), None, None) => Self::Joint(joint),
            (None, None, None) => Self::Default,
            (None, input, target) => Self::Separate { input, target },
        };

        debug!(policy = policy.name(), "resolved transform policy");
        Ok(policy)
    }

    /// A separate-transform policy, including the explicit pass-through
    /// `separate(None, None)`.
    pub fn separate(input: Option<ValueTransform>, target: Option<ValueTransform>) -> Self {
        Self::Separate { input, target }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Joint(_) => "joint",
            Self::Separate { .. } => "separate",
            Self::Default => "default",
        }
    }

    /// Applies the policy to one retrieved pair.
    ///
    /// Errors from the supplied callables are returned as they are.
    pub fn apply(&self, input: Value, target: Value) -> Result<(Value, Value)> {
        match self {
            Self::Joint(f) => f(input, target),
            Self::Separate {
                input: fi,
                target: ft,
            } => {
                let input = match fi {
                    Some(f) => f(input)?,
                    None => input,
                };
                let target = match ft {
                    Some(f) => f(target)?,
                    None => target,
                };
                Ok((input, target))
            }
            Self::Default => Ok((to_tensor(input)?, target)),
        }
    }
}

impl fmt::Debug for TransformPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Joint(_) => f.write_str("Joint(..)"),
            Self::Separate { input, target } => f
                .debug_struct("Separate")
                .field("input", &input.is_some())
                .field("target", &target.is_some())
                .finish(),
            Self::Default => f.write_str("Default"),
        }
    }
}
