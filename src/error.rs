//! Error types for problem validation, instance selection and launches.
//!
//! Every error is raised before any block of a kernel runs. Nothing here is
//! retried: the caller picks a different problem tiling or instance.

use thiserror::Error;

use crate::kernel::OperationFamily;

/// Errors produced while describing, selecting or launching a kernel.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KernelError {
    /// A problem or operand descriptor is malformed (zero/negative extents,
    /// inconsistent strides, mismatched operand shapes).
    #[error("invalid shape: {0}")]
    InvalidShape(String),

    /// An instance's tile shape does not cover the problem under its padding
    /// policy. Disqualifies a single candidate during selection.
    #[error("unsupported shape: {0}")]
    UnsupportedShape(String),

    /// No registered instance serves the requested element types and layouts.
    #[error("no matching `{family}` instance: {reason}")]
    NoMatch {
        /// Family that was searched.
        family: OperationFamily,
        /// Why the search came up empty.
        reason: String,
    },

    /// The staging ring does not fit in the device's shared-memory budget.
    #[error("pipeline capacity exceeded: {required} bytes of staging needed, {available} available")]
    PipelineCapacity {
        /// Bytes required by `prefetch × per-stage` tiles.
        required: usize,
        /// Bytes the device offers per block.
        available: usize,
    },

    /// An instance descriptor is inconsistent with its operation family.
    #[error("invalid instance descriptor: {0}")]
    InvalidInstance(String),

    /// Launch arguments disagree with the problem or the instance.
    #[error("invalid kernel arguments: {0}")]
    InvalidArguments(String),

    /// The GPU backend failed; callers fall back to the host pipeline.
    #[cfg(feature = "wgpu")]
    #[error("GPU failure: {0}")]
    Gpu(String),
}

/// Result alias used throughout the crate.
pub type Result<T> = core::result::Result<T, KernelError>;
