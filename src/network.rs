//! An ordered stack of layers evaluated under one cost function.

use crate::cost::Cost;
use crate::error::{Error, Result};
use crate::layers::{Layer, PassContext};
use crate::tensors::Tensor;
use log::debug;
use std::fmt;

/// Layers in evaluation order plus the cost used for training.
///
/// Consecutive layers always agree on shape:
/// `layers[i].output_shape() == layers[i + 1].input_shape()`.
#[derive(Debug)]
pub struct Network {
    layers: Vec<Box<dyn Layer>>,
    cost: Box<dyn Cost>,
}

impl Network {
    /// Assembles a network, checking that neighbouring shapes chain.
    ///
    /// # Errors
    /// [`Error::InvalidArgument`] for an empty stack;
    /// [`Error::ShapeMismatch`] when two neighbours disagree.
    pub fn new(layers: Vec<Box<dyn Layer>>, cost: Box<dyn Cost>) -> Result<Self> {
        if layers.is_empty() {
            return Err(Error::invalid("a network needs at least one layer"));
        }
        for pair in layers.windows(2) {
            if pair[0].output_shape() != pair[1].input_shape() {
                return Err(Error::shape(pair[0].output_shape(), pair[1].input_shape()));
            }
        }
        let network = Self { layers, cost };
        debug!(
            "assembled network: {} layers, {} parameters, {} cost",
            network.layers.len(),
            network.num_params(),
            network.cost.name()
        );
        Ok(network)
    }

    #[must_use]
    pub fn layers(&self) -> &[Box<dyn Layer>] {
        &self.layers
    }

    #[must_use]
    pub fn num_layers(&self) -> usize {
        self.layers.len()
    }

    #[must_use]
    pub fn cost(&self) -> &dyn Cost {
        self.cost.as_ref()
    }

    /// Input shape of the first layer.
    #[must_use]
    pub fn input_shape(&self) -> &[usize] {
        self.layers[0].input_shape()
    }

    /// Output shape of the last layer.
    #[must_use]
    pub fn output_shape(&self) -> &[usize] {
        self.layers[self.layers.len() - 1].output_shape()
    }

    #[must_use]
    pub fn num_params(&self) -> usize {
        self.layers.iter().map(|l| l.num_params()).sum()
    }

    /// Threads one sample through every layer.
    ///
    /// # Errors
    /// Any layer error, typically a [`Error::ShapeMismatch`] for `x`.
    pub fn feedforward(&self, x: &Tensor) -> Result<Tensor> {
        let mut a = x.clone();
        for layer in &self.layers {
            a = layer.feedforward(&a, &mut PassContext::new())?;
        }
        Ok(a)
    }

    /// Feeds every sample along the leading axis of `xs`, stacking outputs.
    ///
    /// # Errors
    /// As [`Network::feedforward`], or [`Error::InvalidArgument`] for a 0-d input.
    pub fn feedforward_batch(&self, xs: &Tensor) -> Result<Tensor> {
        let Some(&n) = xs.shape().first() else {
            return Err(Error::invalid("batched input needs a leading sample axis"));
        };
        if n == 0 {
            let mut shape = vec![0];
            shape.extend(self.layers[self.layers.len() - 1].output_vector_shape());
            return Ok(Tensor::zeros(&shape));
        }
        let outputs = (0..n)
            .map(|i| self.feedforward(&xs.index_axis0(i)?))
            .collect::<Result<Vec<_>>>()?;
        Tensor::stack(&outputs)
    }

    /// Bias tensor of every layer, in layer order.
    #[must_use]
    pub fn biases(&self) -> Vec<&Tensor> {
        self.layers.iter().map(|l| l.bias()).collect()
    }

    /// Weight tensor of every layer, in layer order.
    #[must_use]
    pub fn weights(&self) -> Vec<&Tensor> {
        self.layers.iter().map(|l| l.weight()).collect()
    }

    /// Replaces every layer's parameters. Nothing changes unless all shapes match.
    ///
    /// # Errors
    /// [`Error::InvalidArgument`] for a wrong tensor count;
    /// [`Error::ShapeMismatch`] for any misshapen tensor.
    pub fn update_params(&mut self, biases: Vec<Tensor>, weights: Vec<Tensor>) -> Result<()> {
        let n = self.layers.len();
        if biases.len() != n || weights.len() != n {
            return Err(Error::invalid(format!(
                "expected {n} bias and weight tensors, got {} and {}",
                biases.len(),
                weights.len()
            )));
        }
        for ((layer, b), w) in self.layers.iter().zip(&biases).zip(&weights) {
            if b.shape() != layer.bias().shape() {
                return Err(Error::shape(layer.bias().shape(), b.shape()));
            }
            if w.shape() != layer.weight().shape() {
                return Err(Error::shape(layer.weight().shape(), w.shape()));
            }
        }
        for ((layer, b), w) in self.layers.iter_mut().zip(biases).zip(weights) {
            layer.update_params(b, w)?;
        }
        Ok(())
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, layer) in self.layers.iter().enumerate() {
            writeln!(f, "layer {}: {layer}", i + 1)?;
        }
        write!(f, "cost: {} ({} parameters)", self.cost.name(), self.num_params())
    }
}
