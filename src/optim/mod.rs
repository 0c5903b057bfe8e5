//! # Optimizers
//!
//! An [`Optimizer`] trains a [`Network`] against a [`Dataset`] and can score
//! it afterwards. [`StochasticGradientDescent`] is the only implementation.
//!
//! Scoring with [`Optimizer::performance`] compares arg-maxes and therefore
//! only makes sense for single-label classification targets.

use crate::dataset::Dataset;
use crate::error::Result;
use crate::network::Network;
use crate::Real;
use std::time::Duration;

mod config;
mod sgd;

pub use config::{SgdConfig, Validate};
pub use sgd::StochasticGradientDescent;

pub trait Optimizer {
    /// Runs `num_epochs` passes of mini-batch updates over `training_set`.
    ///
    /// # Errors
    /// Any shape error from the network, or a worker failure. The mini-batch
    /// that failed is not applied.
    fn optimize(
        &mut self,
        network: &mut Network,
        num_epochs: usize,
        training_set: &Dataset,
    ) -> Result<()>;

    /// Mean per-sample cost plus the L2 penalty, in inference mode.
    ///
    /// # Errors
    /// [`crate::Error::InvalidArgument`] for an empty dataset, or any
    /// network error.
    fn total_cost(&self, dataset: &Dataset, network: &Network) -> Result<Real>;

    /// `(count, fraction)` of samples whose output arg-max equals the
    /// target arg-max.
    ///
    /// # Errors
    /// As [`Optimizer::total_cost`].
    fn performance(&self, dataset: &Dataset, network: &Network) -> Result<(usize, Real)>;

    /// Human-readable summary of the settings.
    fn info(&self) -> String;

    /// Wall time of the last [`Optimizer::optimize`] call.
    fn train_time(&self) -> Duration;

    fn total_train_time(&self) -> Duration;

    fn total_epochs(&self) -> usize;
}
