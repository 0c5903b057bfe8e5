//! Per-epoch training metrics.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A quantity recorded once per epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    TrainingCost,
    EvaluationCost,
    /// Fraction of correctly classified training samples.
    TrainingPerformance,
    EvaluationPerformance,
    /// Wall time of the epoch, in seconds.
    Seconds,
}

/// Receives metrics as training progresses.
pub trait MetricSink {
    fn record(&mut self, epoch: usize, metric: Metric, value: f64);
}

/// Collected metrics keyed by epoch number.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub training_set_size: usize,
    pub evaluation_set_size: usize,
    pub epoch_to_training_performance: BTreeMap<usize, f64>,
    pub epoch_to_evaluation_performance: BTreeMap<usize, f64>,
    pub epoch_to_training_cost: BTreeMap<usize, f64>,
    pub epoch_to_evaluation_cost: BTreeMap<usize, f64>,
    pub epoch_to_seconds: BTreeMap<usize, f64>,
}

impl Report {
    #[must_use]
    pub fn new(training_set_size: usize, evaluation_set_size: usize) -> Self {
        Self {
            training_set_size,
            evaluation_set_size,
            ..Self::default()
        }
    }

    /// The epoch-keyed series of one metric.
    #[must_use]
    pub fn series(&self, metric: Metric) -> &BTreeMap<usize, f64> {
        match metric {
            Metric::TrainingCost => &self.epoch_to_training_cost,
            Metric::EvaluationCost => &self.epoch_to_evaluation_cost,
            Metric::TrainingPerformance => &self.epoch_to_training_performance,
            Metric::EvaluationPerformance => &self.epoch_to_evaluation_performance,
            Metric::Seconds => &self.epoch_to_seconds,
        }
    }

    fn series_mut(&mut self, metric: Metric) -> &mut BTreeMap<usize, f64> {
        match metric {
            Metric::TrainingCost => &mut self.epoch_to_training_cost,
            Metric::EvaluationCost => &mut self.epoch_to_evaluation_cost,
            Metric::TrainingPerformance => &mut self.epoch_to_training_performance,
            Metric::EvaluationPerformance => &mut self.epoch_to_evaluation_performance,
            Metric::Seconds => &mut self.epoch_to_seconds,
        }
    }

    /// Splits a series into parallel `(xs, ys)` vectors for plotting.
    #[must_use]
    pub fn as_line_series(x_to_y: &BTreeMap<usize, f64>) -> (Vec<f64>, Vec<f64>) {
        x_to_y.iter().map(|(&x, &y)| (x as f64, y)).unzip()
    }
}

impl MetricSink for Report {
    fn record(&mut self, epoch: usize, metric: Metric, value: f64) {
        self.series_mut(metric).insert(epoch, value);
    }
}
