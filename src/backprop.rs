//! Per-sample backpropagation and error-signal clipping.
//!
//! # Backward Chain
//!
//! [`backpropagate`] runs one forward pass, keeping every layer's input and
//! [`PassContext`], then walks the layers in reverse:
//!
//! 1. turn `∂C/∂a` into the error signal `delta = ∂C/∂z` with the layer
//!    activation's Jacobian product,
//! 2. clip `delta` ([`clip_norm_2d`]),
//! 3. ask the layer for `(∂C/∂b, ∂C/∂w)`,
//! 4. hand `∂C/∂x` to the layer below as its `∂C/∂a`.
//!
//! Nothing here mutates the network, so any number of samples may be
//! backpropagated concurrently against one shared `&Network`.

use crate::activation::column_layout;
use crate::error::{Error, Result};
use crate::layers::PassContext;
use crate::network::Network;
use crate::tensors::Tensor;
use crate::Real;
use log::trace;

/// Parameter gradients, one entry per layer in layer order.
#[derive(Debug, Clone, PartialEq)]
pub struct Gradients {
    pub biases: Vec<Tensor>,
    pub weights: Vec<Tensor>,
}

impl Gradients {
    /// Zero gradients shaped like `network`'s parameters.
    #[must_use]
    pub fn zeros_like(network: &Network) -> Self {
        Self {
            biases: network.biases().into_iter().map(Tensor::zeros_like).collect(),
            weights: network.weights().into_iter().map(Tensor::zeros_like).collect(),
        }
    }

    /// `self += other`, tensor by tensor.
    ///
    /// # Errors
    /// [`Error::ShapeMismatch`] if the two come from different networks.
    pub fn accumulate(&mut self, other: &Gradients) -> Result<()> {
        if self.biases.len() != other.biases.len() || self.weights.len() != other.weights.len() {
            return Err(Error::shape(&[self.biases.len()], &[other.biases.len()]));
        }
        for (a, b) in self.biases.iter_mut().zip(&other.biases) {
            a.add_assign(b)?;
        }
        for (a, b) in self.weights.iter_mut().zip(&other.weights) {
            a.add_assign(b)?;
        }
        Ok(())
    }

    pub fn scale(&mut self, factor: Real) {
        for t in self.biases.iter_mut().chain(self.weights.iter_mut()) {
            *t *= factor;
        }
    }
}

/// Rescales every column (axis `-2`) of `delta` whose Euclidean norm is at
/// least `threshold` to have norm exactly `threshold`. Shorter columns are
/// returned unchanged, as is everything when `threshold` is `Real::MAX`.
#[must_use]
pub fn clip_norm_2d(delta: &Tensor, threshold: Real) -> Tensor {
    let mut out = delta.clone();
    if threshold >= Real::MAX {
        return out;
    }
    let (outer, rows, cols) = column_layout(delta.shape());
    let data = out.data_mut();
    for o in 0..outer {
        let plane = o * rows * cols;
        for c in 0..cols {
            // scaled by the largest entry so the squares cannot overflow
            let peak = (0..rows)
                .map(|r| data[plane + r * cols + c].abs())
                .fold(0.0, Real::max);
            if peak <= 0.0 {
                continue;
            }
            let norm = peak
                * (0..rows)
                    .map(|r| (data[plane + r * cols + c] / peak).powi(2))
                    .sum::<Real>()
                    .sqrt();
            if norm >= threshold {
                let scale = threshold / norm;
                for r in 0..rows {
                    data[plane + r * cols + c] *= scale;
                }
            }
        }
    }
    out
}

/// Gradients of `network`'s cost for one `(x, y)` sample, with the error
/// signal clipped to `clip_threshold` at every layer boundary.
///
/// # Errors
/// Any shape error raised by a layer or by the cost.
pub fn backpropagate(
    network: &Network,
    x: &Tensor,
    y: &Tensor,
    clip_threshold: Real,
) -> Result<Gradients> {
    let layers = network.layers();
    let n = layers.len();

    let mut inputs = Vec::with_capacity(n);
    let mut contexts = Vec::with_capacity(n);
    let mut a = x.clone();
    for layer in layers {
        let mut ctx = PassContext::new();
        let next = layer.feedforward(&a, &mut ctx)?;
        inputs.push(a);
        contexts.push(ctx);
        a = next;
    }

    let mut biases = Vec::with_capacity(n);
    let mut weights = Vec::with_capacity(n);
    let mut dcda = network.cost().derivative(&a, y)?;
    for l in (0..n).rev() {
        let layer = &layers[l];
        let ctx = &contexts[l];
        let (Some(z), Some(a)) = (ctx.z(), ctx.a()) else {
            return Err(Error::invalid(format!("layer {l} kept no forward state")));
        };
        let delta = layer
            .activation()
            .jacobian_mul(z, a, &dcda.into_shape(z.shape())?)?;
        let clipped = clip_norm_2d(&delta, clip_threshold);
        if clipped != delta {
            trace!("clipped error signal at layer {l} to norm {clip_threshold}");
        }

        let (db, dw) = layer.derived_params(&inputs[l], &clipped, ctx)?;
        biases.push(db);
        weights.push(dw);
        if l == 0 {
            break;
        }
        dcda = layer.backpropagate(&inputs[l], &clipped, ctx)?;
    }
    biases.reverse();
    weights.reverse();
    Ok(Gradients { biases, weights })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensor;

    #[test]
    fn clipping_preserves_direction_and_hits_threshold() {
        let delta = tensor!([[[3.0], [4.0]], [[0.3], [0.4]]]);
        let clipped = clip_norm_2d(&delta, 1.0);
        assert!((clipped.data()[0] - 0.6).abs() < 1e-12);
        assert!((clipped.data()[1] - 0.8).abs() < 1e-12);
        // second channel is under the threshold
        assert_eq!(&clipped.data()[2..], &[0.3, 0.4]);
    }

    #[test]
    fn clipping_survives_huge_error_signals() {
        let delta = Tensor::new(vec![1, 2, 1], vec![1e200, -1e200]);
        let clipped = clip_norm_2d(&delta, 1.0);
        let half = Real::sqrt(0.5);
        assert!((clipped.data()[0] - half).abs() < 1e-12);
        assert!((clipped.data()[1] + half).abs() < 1e-12);
        assert!((clipped.norm() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn disabled_clipping_is_identity() {
        let delta = tensor!([[1e300], [1e300]]);
        assert_eq!(clip_norm_2d(&delta, Real::MAX), delta);
    }
}
