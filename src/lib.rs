//! # `stride_nn`
//!
//! A small convolutional-network trainer built on a strided-tensor
//! correlation engine.
//!
//! Designed for clarity over raw speed: every layer spells out its forward
//! pass and its gradients by hand, and every convolution-like operation goes
//! through one zero-copy windowing primitive.
//!
//! # Features
//!
//! - Dense row-major tensors with shape-checked arithmetic.
//! - Strided sliding-window views powering `correlate`, `dilate` and `pool`.
//! - Fully connected, convolution, pooling and reshape layers with manual backprop.
//! - Mini-batch SGD with momentum, L2 decay, per-layer error clipping and an
//!   optional `rayon` worker pool.
//!
//! # Modules
//!
//! - [`tensors`]: Core tensor data structure and the [`tensor!`] literal macro.
//! - [`ops`]: Shape arithmetic, strided views and CPU kernels.
//! - [`activation`] / [`cost`]: Activation and cost functions with derivatives.
//! - [`layers`]: The [`Layer`](layers::Layer) trait and concrete layers.
//! - [`network`]: Ordered layer stack plus a cost.
//! - [`backprop`]: Per-sample backward chain and error-signal clipping.
//! - [`optim`]: The [`Optimizer`](optim::Optimizer) trait and mini-batch SGD.
//! - [`dataset`] / [`report`]: Training data and per-epoch metric collection.
//!
//! # Example
//!
//! ```rust
//! use stride_nn::activation::{Softmax, Tanh};
//! use stride_nn::cost::CrossEntropy;
//! use stride_nn::layers::{FullyConnected, Layer};
//! use stride_nn::network::Network;
//! use stride_nn::tensors::Tensor;
//!
//! let layers: Vec<Box<dyn Layer>> = vec![
//!     Box::new(FullyConnected::new(&[1, 4, 1], &[1, 8, 1], Box::new(Tanh)).unwrap()),
//!     Box::new(FullyConnected::new(&[1, 8, 1], &[1, 3, 1], Box::new(Softmax)).unwrap()),
//! ];
//! let net = Network::new(layers, Box::new(CrossEntropy)).unwrap();
//! let out = net.feedforward(&Tensor::ones(&[1, 4, 1])).unwrap();
//! assert_eq!(out.shape(), &[1, 3, 1]);
//! assert!((out.sum() - 1.0).abs() < 1e-9);
//! ```

#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::many_single_char_names,
    clippy::cast_possible_truncation,
    clippy::similar_names,
    clippy::cast_precision_loss,
    clippy::module_name_repetitions,
    clippy::missing_panics_doc
)]
#![deny(unsafe_code)]
#![forbid(unused_must_use)]

pub mod activation;
pub mod backprop;
pub mod cost;
pub mod dataset;
pub mod error;
pub mod layers;
pub mod network;
pub mod ops;
pub mod optim;
pub mod report;
pub mod tensors;

/// Element type of every tensor in the crate.
pub type Real = f64;

/// Clipping margin for log-based costs.
pub const EPSILON: Real = 1e-7;

pub use error::{Error, Result};
pub use tensors::Tensor;
