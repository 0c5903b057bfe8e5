//! Mini-batch stochastic gradient descent with momentum and L2 decay.
//!
//! # Update Rule
//!
//! For every mini-batch of size `m` drawn from a training set of size `N`:
//!
//! ```text
//! ∂b, ∂w  = mean over the batch of per-sample gradients
//! v_b     = v_b·μ − η·∂b
//! v_w     = v_w·μ − η·λ/N·w − η·∂w
//! b, w   += v_b, v_w
//! ```
//!
//! Velocities are created lazily on first use and live as long as the
//! optimizer.
//!
//! # Parallelism
//!
//! With `num_workers > 1` a dedicated `rayon` pool computes per-sample
//! gradients and per-shard forward passes. Workers only read the network;
//! their results are reduced in sample order on the calling thread, so the
//! parameter updates are identical to a sequential run.

use super::config::{SgdConfig, Validate};
use super::Optimizer;
use crate::backprop::{Gradients, backpropagate};
use crate::dataset::Dataset;
use crate::error::{Error, Result};
use crate::network::Network;
use crate::report::{Metric, MetricSink};
use crate::tensors::Tensor;
use crate::Real;
use log::{debug, info};
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::borrow::Cow;
use std::fmt::Write;
use std::time::{Duration, Instant};

#[derive(Debug)]
pub struct StochasticGradientDescent {
    config: SgdConfig,
    workers: Option<ThreadPool>,
    v_biases: Option<Vec<Tensor>>,
    v_weights: Option<Vec<Tensor>>,
    train_time: Duration,
    total_train_time: Duration,
    total_epochs: usize,
}

impl StochasticGradientDescent {
    /// # Errors
    /// [`Error::InvalidConfig`] for bad hyper-parameters;
    /// [`Error::WorkerPool`] if the worker threads cannot start.
    pub fn new(mut config: SgdConfig) -> Result<Self> {
        config.validate()?;
        config.gradient_clip_norm = config.gradient_clip_norm.min(Real::MAX);
        let workers = if config.num_workers > 1 {
            Some(
                ThreadPoolBuilder::new()
                    .num_threads(config.num_workers)
                    .thread_name(|i| format!("sgd-worker-{i}"))
                    .build()?,
            )
        } else {
            None
        };
        let optimizer = Self {
            config,
            workers,
            v_biases: None,
            v_weights: None,
            train_time: Duration::ZERO,
            total_train_time: Duration::ZERO,
            total_epochs: 0,
        };
        info!("{}", optimizer.info().replace('\n', ", "));
        Ok(optimizer)
    }

    #[must_use]
    pub fn config(&self) -> &SgdConfig {
        &self.config
    }

    /// Like [`Optimizer::optimize`], recording cost, performance and epoch
    /// time for the training set (and `evaluation_set`, if any) after every
    /// epoch.
    ///
    /// # Errors
    /// As [`Optimizer::optimize`].
    pub fn optimize_with_report(
        &mut self,
        network: &mut Network,
        num_epochs: usize,
        training_set: &Dataset,
        evaluation_set: Option<&Dataset>,
        sink: &mut dyn MetricSink,
    ) -> Result<()> {
        self.train(network, num_epochs, training_set, |opt, net, epoch, elapsed| {
            sink.record(epoch, Metric::Seconds, elapsed.as_secs_f64());
            sink.record(epoch, Metric::TrainingCost, opt.total_cost(training_set, net)?);
            sink.record(epoch, Metric::TrainingPerformance, opt.performance(training_set, net)?.1);
            if let Some(eval) = evaluation_set {
                sink.record(epoch, Metric::EvaluationCost, opt.total_cost(eval, net)?);
                sink.record(epoch, Metric::EvaluationPerformance, opt.performance(eval, net)?.1);
            }
            Ok(())
        })
    }

    fn train<F>(
        &mut self,
        network: &mut Network,
        num_epochs: usize,
        training_set: &Dataset,
        mut after_epoch: F,
    ) -> Result<()>
    where
        F: FnMut(&Self, &Network, usize, Duration) -> Result<()>,
    {
        let start = Instant::now();
        let num_batches = training_set.num_batches();
        for _ in 0..num_epochs {
            let epoch_start = Instant::now();
            for (bi, (bx, by)) in training_set.batch_iter().enumerate() {
                self.mini_batch_update(network, &bx, &by, training_set.len())?;
                debug!(
                    "mini-batch {}/{num_batches} ({:.2} ms/batch)",
                    bi + 1,
                    epoch_start.elapsed().as_secs_f64() * 1000.0 / (bi + 1) as f64
                );
            }
            self.total_epochs += 1;
            let elapsed = epoch_start.elapsed();
            info!("epoch {} done in {elapsed:?}", self.total_epochs);
            after_epoch(self, network, self.total_epochs, elapsed)?;
        }
        self.train_time = start.elapsed();
        self.total_train_time += self.train_time;
        Ok(())
    }

    fn mini_batch_update(
        &mut self,
        network: &mut Network,
        bx: &Tensor,
        by: &Tensor,
        num_training_samples: usize,
    ) -> Result<()> {
        let gradients = self.mini_batch_gradients(network, bx, by)?;
        self.apply(network, &gradients, num_training_samples)
    }

    /// Mean per-sample gradients over one mini-batch.
    fn mini_batch_gradients(&self, network: &Network, bx: &Tensor, by: &Tensor) -> Result<Gradients> {
        let m = bx.shape().first().copied().unwrap_or(0);
        if by.shape().first().copied() != Some(m) {
            return Err(Error::invalid(format!(
                "batch size mismatch: inputs {:?}, targets {:?}",
                bx.shape(),
                by.shape()
            )));
        }
        let clip = self.config.gradient_clip_norm;
        let per_sample = |i: usize| backpropagate(network, &bx.index_axis0(i)?, &by.index_axis0(i)?, clip);

        let results = match &self.workers {
            Some(pool) => pool.install(|| {
                (0..m)
                    .into_par_iter()
                    .map(per_sample)
                    .collect::<Result<Vec<_>>>()
            })?,
            None => (0..m).map(per_sample).collect::<Result<Vec<_>>>()?,
        };

        let mut total = Gradients::zeros_like(network);
        for g in &results {
            total.accumulate(g)?;
        }
        if m > 0 {
            total.scale((m as Real).recip());
        }
        Ok(total)
    }

    /// Computes the new velocities and parameters, then commits all of them
    /// together. On error neither the network nor the momentum state changes.
    fn apply(
        &mut self,
        network: &mut Network,
        gradients: &Gradients,
        num_training_samples: usize,
    ) -> Result<()> {
        let SgdConfig {
            momentum, eta, lambda, ..
        } = self.config;
        let decay = eta * lambda / num_training_samples.max(1) as Real;
        let (biases, weights) = (network.biases(), network.weights());

        let v_biases = current_velocities(self.v_biases.as_deref(), &biases, "bias")?
            .iter()
            .zip(&gradients.biases)
            .map(|(v, g)| v.zip_map(g, |v, g| v * momentum - eta * g))
            .collect::<Result<Vec<_>>>()?;
        let v_weights = current_velocities(self.v_weights.as_deref(), &weights, "weight")?
            .iter()
            .zip(&weights)
            .zip(&gradients.weights)
            .map(|((v, w), g)| {
                v.zip_map(w, |v, w| v * momentum - decay * w)?
                    .zip_map(g, |v, g| v - eta * g)
            })
            .collect::<Result<Vec<_>>>()?;

        let new_biases = biases
            .iter()
            .zip(&v_biases)
            .map(|(b, v)| b.add(v))
            .collect::<Result<Vec<_>>>()?;
        let new_weights = weights
            .iter()
            .zip(&v_weights)
            .map(|(w, v)| w.add(v))
            .collect::<Result<Vec<_>>>()?;
        network.update_params(new_biases, new_weights)?;
        self.v_biases = Some(v_biases);
        self.v_weights = Some(v_weights);
        Ok(())
    }

    /// Network outputs for every sample, in dataset order.
    fn feedforward_dataset(&self, dataset: &Dataset, network: &Network) -> Result<Vec<Tensor>> {
        match &self.workers {
            Some(pool) => {
                let shards = dataset.split(self.config.num_workers)?;
                let outputs = pool.install(|| {
                    shards
                        .par_iter()
                        .map(|shard| feedforward_samples(shard, network))
                        .collect::<Result<Vec<_>>>()
                })?;
                Ok(outputs.into_iter().flatten().collect())
            }
            None => feedforward_samples(dataset, network),
        }
    }
}

/// The stored velocities after checking they still fit `params`, or zeros
/// on first use.
fn current_velocities<'a>(
    stored: Option<&'a [Tensor]>,
    params: &[&Tensor],
    what: &str,
) -> Result<Cow<'a, [Tensor]>> {
    let Some(v) = stored else {
        debug!("initialising {} {what} velocities", params.len());
        return Ok(Cow::Owned(params.iter().map(|p| p.zeros_like()).collect()));
    };
    if v.len() != params.len() {
        return Err(Error::shape(&[params.len()], &[v.len()]));
    }
    for (v, p) in v.iter().zip(params) {
        if v.shape() != p.shape() {
            return Err(Error::shape(p.shape(), v.shape()));
        }
    }
    Ok(Cow::Borrowed(v))
}

fn feedforward_samples(dataset: &Dataset, network: &Network) -> Result<Vec<Tensor>> {
    let mut out = Vec::with_capacity(dataset.len());
    for (bx, _) in dataset.batch_iter() {
        let batch = network.feedforward_batch(&bx)?;
        for i in 0..bx.shape()[0] {
            out.push(batch.index_axis0(i)?);
        }
    }
    Ok(out)
}

impl Optimizer for StochasticGradientDescent {
    fn optimize(
        &mut self,
        network: &mut Network,
        num_epochs: usize,
        training_set: &Dataset,
    ) -> Result<()> {
        self.train(network, num_epochs, training_set, |_, _, _, _| Ok(()))
    }

    fn total_cost(&self, dataset: &Dataset, network: &Network) -> Result<Real> {
        if dataset.is_empty() {
            return Err(Error::invalid("cannot compute the cost of an empty dataset"));
        }
        let rcp_n = (dataset.len() as Real).recip();
        let outputs = self.feedforward_dataset(dataset, network)?;
        let mut cost = 0.0;
        for (i, y_hat) in outputs.iter().enumerate() {
            cost += network.cost().eval(y_hat, &dataset.ys().index_axis0(i)?)? * rcp_n;
        }
        let sum_w2: Real = network.weights().iter().map(|w| w.sum_squares()).sum();
        Ok(cost + self.config.lambda * rcp_n * 0.5 * sum_w2)
    }

    fn performance(&self, dataset: &Dataset, network: &Network) -> Result<(usize, Real)> {
        if dataset.is_empty() {
            return Err(Error::invalid("cannot score an empty dataset"));
        }
        let outputs = self.feedforward_dataset(dataset, network)?;
        let mut correct = 0;
        for (i, y_hat) in outputs.iter().enumerate() {
            if y_hat.argmax() == dataset.ys().index_axis0(i)?.argmax() {
                correct += 1;
            }
        }
        Ok((correct, correct as Real / dataset.len() as Real))
    }

    fn info(&self) -> String {
        let c = &self.config;
        let mut info = String::from("optimizer: stochastic gradient descent\n");
        let _ = writeln!(info, "workers: {}", c.num_workers);
        let _ = writeln!(info, "gradient clip: {}", c.gradient_clip_norm);
        let _ = writeln!(info, "momentum: {}", c.momentum);
        let _ = writeln!(info, "learning rate: {}", c.eta);
        let _ = write!(info, "L2 regularization: {}", c.lambda);
        info
    }

    fn train_time(&self) -> Duration {
        self.train_time
    }

    fn total_train_time(&self) -> Duration {
        self.total_train_time
    }

    fn total_epochs(&self) -> usize {
        self.total_epochs
    }
}
