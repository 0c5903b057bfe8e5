//! # Layers
//!
//! A [`Layer`] owns its `bias` and `weight` tensors (empty for parameter-free
//! layers), an activation, and a fixed `(channels, height, width)` input and
//! output shape. Shapes are decided at construction and never change.
//!
//! Layers work on one sample at a time. Inputs may arrive in any shape holding
//! `input_shape`'s element count; outputs are always in vector form
//! `(C, H * W, 1)`, see [`Layer::output_vector_shape`].
//!
//! The forward pass stores what the backward pass needs in a [`PassContext`],
//! created once per sample and threaded through
//! [`Layer::feedforward`], [`Layer::derived_params`] and [`Layer::backpropagate`].
//! Every `delta` argument is the error signal `∂C/∂z` shaped like `z`.

use crate::activation::Activation;
use crate::error::{Error, Result};
use crate::tensors::Tensor;
use crate::Real;
use rand::RngCore;
use rand_distr::{Distribution, StandardNormal};
use std::fmt;

mod conv;
mod dense;
mod pool;
mod reshape;

pub use conv::Convolution;
pub use dense::FullyConnected;
pub use pool::Pool;
pub use reshape::Reshape;

/// Per-sample forward state consumed by the backward pass.
#[derive(Debug, Clone, Default)]
pub struct PassContext {
    z: Option<Tensor>,
    a: Option<Tensor>,
    routes: Option<Vec<usize>>,
}

impl PassContext {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A context carrying a precomputed weighted input; `feedforward` will
    /// skip recomputing it.
    #[must_use]
    pub fn with_z(z: Tensor) -> Self {
        Self {
            z: Some(z),
            ..Self::default()
        }
    }

    /// Weighted input of the last forward pass.
    #[must_use]
    pub fn z(&self) -> Option<&Tensor> {
        self.z.as_ref()
    }

    /// Activation of the last forward pass.
    #[must_use]
    pub fn a(&self) -> Option<&Tensor> {
        self.a.as_ref()
    }

    /// Flat input offsets of every max-pooling window maximum.
    #[must_use]
    pub fn routes(&self) -> Option<&[usize]> {
        self.routes.as_deref()
    }

    pub fn set_routes(&mut self, routes: Vec<usize>) {
        self.routes = Some(routes);
    }
}

/// `(..., C, H, W)` -> `(..., C, H * W, 1)`.
#[must_use]
pub fn vector_shape(shape: &[usize]) -> Vec<usize> {
    let n = shape.len();
    if n < 2 {
        return vec![shape.iter().product(), 1];
    }
    let mut out = shape[..n - 2].to_vec();
    out.push(shape[n - 2] * shape[n - 1]);
    out.push(1);
    out
}

pub(crate) fn check_chw(shape: &[usize], what: &str) -> Result<()> {
    if shape.len() != 3 || shape.contains(&0) {
        return Err(Error::invalid(format!(
            "{what} {shape:?} must be a non-empty (channels, height, width) shape"
        )));
    }
    Ok(())
}

/// A single network layer with hand-written gradients.
pub trait Layer: Send + Sync + fmt::Debug + fmt::Display {
    fn bias(&self) -> &Tensor;

    fn weight(&self) -> &Tensor;

    /// Mutable access to `(bias, weight)`; callers must keep the shapes.
    fn params_mut(&mut self) -> (&mut Tensor, &mut Tensor);

    fn activation(&self) -> &dyn Activation;

    /// `(channels, height, width)` of one input sample.
    fn input_shape(&self) -> &[usize];

    /// `(channels, height, width)` of one output sample.
    fn output_shape(&self) -> &[usize];

    /// Computes `z` for input `x`, recording any routing state in `ctx`.
    ///
    /// # Errors
    /// [`Error::ShapeMismatch`] if `x` does not reshape to `input_shape`.
    fn weighted_input(&self, x: &Tensor, ctx: &mut PassContext) -> Result<Tensor>;

    /// `∂C/∂bias` and `∂C/∂weight` for input `x` and error signal `delta`.
    ///
    /// # Errors
    /// [`Error::ShapeMismatch`] if `x` or `delta` have the wrong element count.
    fn derived_params(
        &self,
        x: &Tensor,
        delta: &Tensor,
        ctx: &PassContext,
    ) -> Result<(Tensor, Tensor)>;

    /// `∂C/∂x`, in `input_vector_shape`.
    ///
    /// # Errors
    /// [`Error::ShapeMismatch`] if `x` or `delta` have the wrong element count.
    fn backpropagate(&self, x: &Tensor, delta: &Tensor, ctx: &PassContext) -> Result<Tensor>;

    /// `activation(z)`, reusing `ctx`'s precomputed `z` when present.
    /// Leaves both `z` and `a` in `ctx`.
    ///
    /// # Errors
    /// Propagates [`Layer::weighted_input`] errors, or
    /// [`Error::ShapeMismatch`] for a precomputed `z` of the wrong shape.
    fn feedforward(&self, x: &Tensor, ctx: &mut PassContext) -> Result<Tensor> {
        let z = match ctx.z.take() {
            Some(z) => {
                let expected = self.output_vector_shape();
                if z.shape() != expected.as_slice() {
                    return Err(Error::shape(&expected, z.shape()));
                }
                z
            }
            None => self.weighted_input(x, ctx)?,
        };
        let a = self.activation().eval(&z);
        ctx.z = Some(z);
        ctx.a = Some(a.clone());
        Ok(a)
    }

    /// Replaces both parameter tensors, or neither.
    ///
    /// # Errors
    /// [`Error::ShapeMismatch`] if either shape differs from the current one.
    fn update_params(&mut self, bias: Tensor, weight: Tensor) -> Result<()> {
        if bias.shape() != self.bias().shape() {
            return Err(Error::shape(self.bias().shape(), bias.shape()));
        }
        if weight.shape() != self.weight().shape() {
            return Err(Error::shape(self.weight().shape(), weight.shape()));
        }
        let (b, w) = self.params_mut();
        b.update(bias)?;
        w.update(weight)
    }

    fn input_vector_shape(&self) -> Vec<usize> {
        vector_shape(self.input_shape())
    }

    fn output_vector_shape(&self) -> Vec<usize> {
        vector_shape(self.output_shape())
    }

    /// Number of learnable parameters.
    fn num_params(&self) -> usize {
        self.bias().len() + self.weight().len()
    }

    /// Draws every parameter from a standard normal distribution.
    fn init_normal_params(&mut self, rng: &mut dyn RngCore) {
        let (b, w) = self.params_mut();
        fill_standard_normal(b, rng, 1.0);
        fill_standard_normal(w, rng, 1.0);
    }

    /// Like [`Layer::init_normal_params`] but with weights divided by
    /// `sqrt(H * W)` of the input. Suits sigmoid and tanh layers.
    fn init_scaled_normal_params(&mut self, rng: &mut dyn RngCore) {
        let shape = self.input_vector_shape();
        let fan_in = shape[shape.len() - 2] as Real;
        let (b, w) = self.params_mut();
        fill_standard_normal(b, rng, 1.0);
        fill_standard_normal(w, rng, fan_in.sqrt().recip());
    }
}

fn fill_standard_normal(t: &mut Tensor, rng: &mut dyn RngCore, scale: Real) {
    for x in t.data_mut() {
        let v: Real = StandardNormal.sample(&mut *rng);
        *x = v * scale;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vector_shape_collapses_trailing_pair() {
        assert_eq!(vector_shape(&[3, 4, 5]), vec![3, 20, 1]);
        assert_eq!(vector_shape(&[2, 7, 3, 4, 5]), vec![2, 7, 3, 20, 1]);
        assert_eq!(vector_shape(&[6]), vec![6, 1]);
    }

    #[test]
    fn context_reports_stored_state() {
        let mut ctx = PassContext::with_z(Tensor::ones(&[1, 2, 1]));
        assert!(ctx.z().is_some() && ctx.a().is_none() && ctx.routes().is_none());
        ctx.set_routes(vec![3, 1]);
        assert_eq!(ctx.routes(), Some(&[3, 1][..]));
    }

    #[test]
    fn update_params_replaces_both_or_neither() {
        let mut layer =
            FullyConnected::new(&[1, 2, 1], &[1, 3, 1], Box::new(crate::activation::Identity))
                .unwrap();
        let (bias, weight) = (layer.bias().clone(), layer.weight().clone());
        let err = layer.update_params(Tensor::ones(&[1, 3, 1]), Tensor::ones(&[1, 2, 3]));
        assert!(matches!(err, Err(Error::ShapeMismatch { .. })));
        assert_eq!((layer.bias(), layer.weight()), (&bias, &weight));

        layer
            .update_params(Tensor::ones(&[1, 3, 1]), Tensor::full(&[1, 3, 2], 2.0))
            .unwrap();
        assert_eq!(layer.bias().sum(), 3.0);
        assert_eq!(layer.weight().sum(), 12.0);
    }
}
