//! Hyper-parameters for [`super::StochasticGradientDescent`].

use crate::error::{Error, Result};
use crate::Real;
use serde::{Deserialize, Serialize};

/// Checks a value before it is trusted by the rest of the crate.
pub trait Validate {
    /// # Errors
    /// [`Error::InvalidConfig`] describing the first offending field.
    fn validate(&self) -> Result<()>;
}

/// Mini-batch SGD settings. Missing fields take their defaults when
/// deserialized.
///
/// ```rust
/// use stride_nn::optim::SgdConfig;
///
/// let config = SgdConfig { eta: 0.1, momentum: 0.9, ..SgdConfig::default() };
/// assert_eq!(config.num_workers, 0);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SgdConfig {
    /// Error signals with at least this norm are rescaled to it.
    /// `Real::MAX` disables clipping.
    pub gradient_clip_norm: Real,
    pub momentum: Real,
    /// Learning rate.
    pub eta: Real,
    /// L2 regularization strength.
    pub lambda: Real,
    /// Worker threads for per-sample backprop; 0 or 1 runs sequentially.
    pub num_workers: usize,
}

impl Default for SgdConfig {
    fn default() -> Self {
        Self {
            gradient_clip_norm: Real::MAX,
            momentum: 0.0,
            eta: 1.0,
            lambda: 0.0,
            num_workers: 0,
        }
    }
}

impl Validate for SgdConfig {
    fn validate(&self) -> Result<()> {
        if self.gradient_clip_norm.is_nan() || self.gradient_clip_norm <= 0.0 {
            return Err(Error::InvalidConfig(format!(
                "gradient_clip_norm must be positive, got {}",
                self.gradient_clip_norm
            )));
        }
        if !self.momentum.is_finite() || self.momentum < 0.0 {
            return Err(Error::InvalidConfig(format!(
                "momentum must be finite and non-negative, got {}",
                self.momentum
            )));
        }
        if !self.eta.is_finite() || self.eta <= 0.0 {
            return Err(Error::InvalidConfig(format!(
                "eta must be finite and positive, got {}",
                self.eta
            )));
        }
        if !self.lambda.is_finite() || self.lambda < 0.0 {
            return Err(Error::InvalidConfig(format!(
                "lambda must be finite and non-negative, got {}",
                self.lambda
            )));
        }
        Ok(())
    }
}
