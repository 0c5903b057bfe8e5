//! Error types shared by every fallible operation in the crate.
//!
//! All failures are local and synchronous: shape problems are reported to the
//! immediate caller and never retried. A malformed layer stack aborts training.

use thiserror::Error;

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Everything that can go wrong while building or training a network.
#[derive(Debug, Error)]
pub enum Error {
    /// A tensor could not be reshaped to (or did not match) the declared shape.
    #[error("shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        /// Shape the operation declared.
        expected: Vec<usize>,
        /// Shape it actually received.
        actual: Vec<usize>,
    },

    /// An argument is outside the operation's domain.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Optimizer hyper-parameters failed validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The worker pool could not be started.
    #[error("failed to build worker pool: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),
}

impl Error {
    pub(crate) fn shape(expected: &[usize], actual: &[usize]) -> Self {
        Self::ShapeMismatch {
            expected: expected.to_vec(),
            actual: actual.to_vec(),
        }
    }

    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }
}
