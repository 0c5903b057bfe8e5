use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use stride_nn::activation::{Identity, Softmax, Tanh};
use stride_nn::cost::{CrossEntropy, Quadratic};
use stride_nn::dataset::Dataset;
use stride_nn::error::Error;
use stride_nn::layers::{FullyConnected, Layer};
use stride_nn::network::Network;
use stride_nn::optim::{Optimizer, SgdConfig, StochasticGradientDescent};
use stride_nn::report::{Metric, Report};
use stride_nn::{Real, Tensor};

fn classifier(seed: u64) -> Network {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut layers: Vec<Box<dyn Layer>> = vec![
        Box::new(FullyConnected::new(&[1, 10, 1], &[1, 10, 1], Box::new(Tanh)).unwrap()),
        Box::new(FullyConnected::new(&[1, 10, 1], &[1, 4, 1], Box::new(Softmax)).unwrap()),
    ];
    for layer in &mut layers {
        layer.init_scaled_normal_params(&mut rng);
    }
    Network::new(layers, Box::new(CrossEntropy)).unwrap()
}

fn one_hot_dataset(n: usize, batch_size: usize, seed: u64) -> Dataset {
    let mut rng = StdRng::seed_from_u64(seed);
    let xs: Vec<Real> = (0..n * 10).map(|_| rng.random_range(-1.0..1.0)).collect();
    let mut ys = vec![0.0; n * 4];
    for i in 0..n {
        ys[i * 4 + rng.random_range(0..4)] = 1.0;
    }
    Dataset::new(
        Tensor::new(vec![n, 1, 10, 1], xs),
        Tensor::new(vec![n, 4], ys),
        batch_size,
    )
    .unwrap()
}

fn identity_network() -> Network {
    let mut layer = FullyConnected::new(&[1, 3, 1], &[1, 3, 1], Box::new(Identity)).unwrap();
    let eye = Tensor::new(vec![1, 3, 3], vec![1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0]);
    layer.update_params(Tensor::zeros(&[1, 3, 1]), eye).unwrap();
    let layers: Vec<Box<dyn Layer>> = vec![Box::new(layer)];
    Network::new(layers, Box::new(Quadratic)).unwrap()
}

fn scoring_dataset() -> Dataset {
    let xs = Tensor::new(vec![3, 3], vec![1.0, 0.0, 0.0, 0.0, 2.0, 1.0, 0.0, 0.0, 3.0]);
    let ys = Tensor::new(vec![3, 3], vec![1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 1.0, 0.0, 0.0]);
    Dataset::new(xs, ys, 2).unwrap()
}

#[test]
fn test_single_step_reduces_cost() {
    let mut network = classifier(11);
    let data = one_hot_dataset(8, 8, 12);
    let mut sgd = StochasticGradientDescent::new(SgdConfig {
        eta: 0.05,
        ..SgdConfig::default()
    })
    .unwrap();

    let before = sgd.total_cost(&data, &network).unwrap();
    sgd.optimize(&mut network, 1, &data).unwrap();
    let after = sgd.total_cost(&data, &network).unwrap();
    assert!(after < before, "cost went from {before} to {after}");
    assert_eq!(sgd.total_epochs(), 1);
}

#[test]
fn test_training_lowers_cost_over_epochs() {
    let mut network = classifier(21);
    let data = one_hot_dataset(16, 4, 22);
    let mut sgd = StochasticGradientDescent::new(SgdConfig {
        eta: 0.2,
        momentum: 0.5,
        ..SgdConfig::default()
    })
    .unwrap();
    let start = sgd.total_cost(&data, &network).unwrap();
    sgd.optimize(&mut network, 40, &data).unwrap();
    assert!(sgd.total_cost(&data, &network).unwrap() < start);
    assert_eq!(sgd.total_epochs(), 40);
    assert!(sgd.total_train_time() >= sgd.train_time());
}

#[test]
fn test_parallel_updates_match_sequential() {
    let data = one_hot_dataset(10, 4, 31);
    let config = SgdConfig {
        eta: 0.1,
        momentum: 0.9,
        lambda: 0.01,
        gradient_clip_norm: 0.5,
        num_workers: 0,
    };

    let mut sequential = classifier(32);
    let mut sgd = StochasticGradientDescent::new(config).unwrap();
    sgd.optimize(&mut sequential, 3, &data).unwrap();

    let mut parallel = classifier(32);
    let mut sgd_parallel = StochasticGradientDescent::new(SgdConfig {
        num_workers: 3,
        ..config
    })
    .unwrap();
    sgd_parallel.optimize(&mut parallel, 3, &data).unwrap();

    assert_eq!(sequential.weights(), parallel.weights());
    assert_eq!(sequential.biases(), parallel.biases());
    assert_eq!(
        sgd.total_cost(&data, &sequential).unwrap(),
        sgd_parallel.total_cost(&data, &parallel).unwrap()
    );
}

#[test]
fn test_total_cost_includes_l2_penalty() {
    let network = identity_network();
    let data = scoring_dataset();
    let plain = StochasticGradientDescent::new(SgdConfig::default()).unwrap();
    assert!((plain.total_cost(&data, &network).unwrap() - 2.0).abs() < 1e-12);

    let decayed = StochasticGradientDescent::new(SgdConfig {
        lambda: 0.3,
        num_workers: 2,
        ..SgdConfig::default()
    })
    .unwrap();
    assert!((decayed.total_cost(&data, &network).unwrap() - 2.15).abs() < 1e-12);
}

#[test]
fn test_performance_counts_argmax_hits() {
    let network = identity_network();
    let data = scoring_dataset();
    let sgd = StochasticGradientDescent::new(SgdConfig::default()).unwrap();
    let (count, fraction) = sgd.performance(&data, &network).unwrap();
    assert_eq!(count, 2);
    assert!((fraction - 2.0 / 3.0).abs() < 1e-12);
}

#[test]
fn test_empty_dataset_cannot_be_scored() {
    let network = identity_network();
    let empty = Dataset::new(Tensor::zeros(&[0, 3]), Tensor::zeros(&[0, 3]), 1).unwrap();
    let sgd = StochasticGradientDescent::new(SgdConfig::default()).unwrap();
    assert!(matches!(sgd.total_cost(&empty, &network), Err(Error::InvalidArgument(_))));
    assert!(sgd.performance(&empty, &network).is_err());
}

#[test]
fn test_weight_decay_shrinks_idle_weights() {
    // zero targets and zero inputs leave only the decay term
    let mut network = identity_network();
    let data = Dataset::new(Tensor::zeros(&[4, 3]), Tensor::zeros(&[4, 3]), 4).unwrap();
    let mut sgd = StochasticGradientDescent::new(SgdConfig {
        eta: 0.5,
        lambda: 2.0,
        ..SgdConfig::default()
    })
    .unwrap();
    sgd.optimize(&mut network, 1, &data).unwrap();
    // w -= eta * lambda / n * w = 0.25 * w
    assert!((network.weights()[0].data()[0] - 0.75).abs() < 1e-12);
    assert_eq!(network.weights()[0].data()[1], 0.0);
}

#[test]
fn test_report_collects_every_epoch() {
    let mut network = classifier(41);
    let train = one_hot_dataset(6, 3, 42);
    let eval = one_hot_dataset(4, 4, 43);
    let mut sgd = StochasticGradientDescent::new(SgdConfig {
        eta: 0.1,
        ..SgdConfig::default()
    })
    .unwrap();
    let mut report = Report::new(train.len(), eval.len());
    sgd.optimize_with_report(&mut network, 3, &train, Some(&eval), &mut report)
        .unwrap();

    for metric in [
        Metric::TrainingCost,
        Metric::EvaluationCost,
        Metric::TrainingPerformance,
        Metric::EvaluationPerformance,
        Metric::Seconds,
    ] {
        assert_eq!(report.series(metric).keys().copied().collect::<Vec<_>>(), vec![1, 2, 3]);
    }
    let (epochs, costs) = Report::as_line_series(report.series(Metric::TrainingCost));
    assert_eq!(epochs, vec![1.0, 2.0, 3.0]);
    assert_eq!(costs.len(), 3);

    let json = serde_json::to_string(&report).unwrap();
    let back: Report = serde_json::from_str(&json).unwrap();
    assert_eq!(back, report);
}

#[test]
fn test_config_defaults_fill_missing_fields() {
    let config: SgdConfig = serde_json::from_str(r#"{"eta": 0.5, "num_workers": 4}"#).unwrap();
    assert_eq!(config.eta, 0.5);
    assert_eq!(config.num_workers, 4);
    assert_eq!(config.gradient_clip_norm, Real::MAX);
    assert_eq!(config.momentum, 0.0);
}

#[test]
fn test_invalid_config_is_rejected() {
    for config in [
        SgdConfig { eta: 0.0, ..SgdConfig::default() },
        SgdConfig { momentum: -0.1, ..SgdConfig::default() },
        SgdConfig { lambda: Real::NAN, ..SgdConfig::default() },
        SgdConfig { gradient_clip_norm: 0.0, ..SgdConfig::default() },
    ] {
        assert!(matches!(
            StochasticGradientDescent::new(config),
            Err(Error::InvalidConfig(_))
        ));
    }
}

#[test]
fn test_info_lists_hyper_parameters() {
    let sgd = StochasticGradientDescent::new(SgdConfig {
        eta: 0.25,
        ..SgdConfig::default()
    })
    .unwrap();
    let info = sgd.info();
    assert!(info.starts_with("optimizer: stochastic gradient descent"));
    assert!(info.contains("learning rate: 0.25"));
}

fn linear_network(inputs: usize) -> Network {
    let mut layer = FullyConnected::new(&[1, inputs, 1], &[1, 3, 1], Box::new(Identity)).unwrap();
    layer
        .update_params(Tensor::zeros(&[1, 3, 1]), Tensor::full(&[1, 3, inputs], 0.1))
        .unwrap();
    let layers: Vec<Box<dyn Layer>> = vec![Box::new(layer)];
    Network::new(layers, Box::new(Quadratic)).unwrap()
}

fn constant_dataset(inputs: usize) -> Dataset {
    Dataset::new(Tensor::ones(&[2, inputs]), Tensor::ones(&[2, 3]), 2).unwrap()
}

#[test]
fn test_failed_step_leaves_momentum_untouched() {
    let config = SgdConfig {
        eta: 0.1,
        momentum: 0.9,
        ..SgdConfig::default()
    };
    let (data, other_data) = (constant_dataset(2), constant_dataset(3));

    let mut network = linear_network(2);
    let mut sgd = StochasticGradientDescent::new(config).unwrap();
    sgd.optimize(&mut network, 1, &data).unwrap();

    // same bias shapes, different weight shapes
    let mut other = linear_network(3);
    let err = sgd.optimize(&mut other, 1, &other_data).unwrap_err();
    assert!(matches!(err, Error::ShapeMismatch { .. }));
    assert_eq!(other.biases()[0], &Tensor::zeros(&[1, 3, 1]));
    assert_eq!(other.weights()[0], &Tensor::full(&[1, 3, 3], 0.1));

    sgd.optimize(&mut network, 1, &data).unwrap();

    let mut control_network = linear_network(2);
    let mut control = StochasticGradientDescent::new(config).unwrap();
    control.optimize(&mut control_network, 2, &data).unwrap();
    assert_eq!(network.biases(), control_network.biases());
    assert_eq!(network.weights(), control_network.weights());
}
