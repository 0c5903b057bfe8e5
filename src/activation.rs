//! Activation functions and their Jacobian products.
//!
//! Every activation maps the weighted input `z` of a layer to its output `a`.
//! Backpropagation never materialises the Jacobian: it asks for the product
//! `J(z, a) · right` through [`Activation::jacobian_mul`]. The full matrix is
//! available through [`Activation::jacobian`] for inspection and tests.

use crate::error::Result;
use crate::tensors::Tensor;
use crate::Real;
use std::fmt;

/// A differentiable element-wise or column-wise nonlinearity.
pub trait Activation: Send + Sync + fmt::Debug {
    /// Short lowercase name used in layer summaries.
    fn name(&self) -> &'static str;

    /// `a = f(z)`.
    fn eval(&self, z: &Tensor) -> Tensor;

    /// `J(z, a) · right`, where `a = self.eval(z)` is passed in to avoid
    /// recomputing it.
    ///
    /// # Errors
    /// [`crate::Error::ShapeMismatch`] if `right` is not shaped like `z`.
    fn jacobian_mul(&self, z: &Tensor, a: &Tensor, right: &Tensor) -> Result<Tensor>;

    /// The dense `(n, n)` Jacobian with `n = z.len()`, built column by column
    /// from [`Activation::jacobian_mul`].
    ///
    /// # Errors
    /// Propagates errors from [`Activation::jacobian_mul`].
    fn jacobian(&self, z: &Tensor, a: &Tensor) -> Result<Tensor> {
        let n = z.len();
        let mut out = Tensor::zeros(&[n, n]);
        let mut basis = z.zeros_like();
        for j in 0..n {
            basis.data_mut()[j] = 1.0;
            let column = self.jacobian_mul(z, a, &basis)?;
            basis.data_mut()[j] = 0.0;
            for (i, &v) in column.data().iter().enumerate() {
                out.data_mut()[i * n + j] = v;
            }
        }
        Ok(out)
    }
}

/// Logistic function `1 / (1 + e^-z)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sigmoid;

/// Hyperbolic tangent.
#[derive(Debug, Clone, Copy, Default)]
pub struct Tanh;

/// `max(z, 0)`; the derivative at exactly 0 is taken as 0.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReLU;

/// `a = z`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Identity;

/// Softmax over axis `-2` (each column of the trailing two dims).
///
/// For vector-form tensors `(C, L, 1)` this normalises every channel
/// independently.
#[derive(Debug, Clone, Copy, Default)]
pub struct Softmax;

/// Shared instance for parameter-free layers.
pub static IDENTITY: Identity = Identity;

fn sigmoid(z: Real) -> Real {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

impl Activation for Sigmoid {
    fn name(&self) -> &'static str {
        "sigmoid"
    }

    fn eval(&self, z: &Tensor) -> Tensor {
        z.map(sigmoid)
    }

    fn jacobian_mul(&self, _z: &Tensor, a: &Tensor, right: &Tensor) -> Result<Tensor> {
        a.zip_map(right, |a, r| a * (1.0 - a) * r)
    }
}

impl Activation for Tanh {
    fn name(&self) -> &'static str {
        "tanh"
    }

    fn eval(&self, z: &Tensor) -> Tensor {
        z.map(Real::tanh)
    }

    fn jacobian_mul(&self, _z: &Tensor, a: &Tensor, right: &Tensor) -> Result<Tensor> {
        a.zip_map(right, |a, r| (1.0 - a * a) * r)
    }
}

impl Activation for ReLU {
    fn name(&self) -> &'static str {
        "relu"
    }

    fn eval(&self, z: &Tensor) -> Tensor {
        z.map(|x| if x > 0.0 { x } else { 0.0 })
    }

    fn jacobian_mul(&self, z: &Tensor, _a: &Tensor, right: &Tensor) -> Result<Tensor> {
        z.zip_map(right, |z, r| if z > 0.0 { r } else { 0.0 })
    }
}

impl Activation for Identity {
    fn name(&self) -> &'static str {
        "identity"
    }

    fn eval(&self, z: &Tensor) -> Tensor {
        z.clone()
    }

    fn jacobian_mul(&self, z: &Tensor, _a: &Tensor, right: &Tensor) -> Result<Tensor> {
        z.zip_map(right, |_, r| r)
    }
}

/// `(outer, rows, cols)` such that axis -2 has `rows` entries.
pub(crate) fn column_layout(shape: &[usize]) -> (usize, usize, usize) {
    match shape.len() {
        0 => (1, 1, 1),
        1 => (1, shape[0], 1),
        n => (
            shape[..n - 2].iter().product(),
            shape[n - 2],
            shape[n - 1],
        ),
    }
}

impl Activation for Softmax {
    fn name(&self) -> &'static str {
        "softmax"
    }

    fn eval(&self, z: &Tensor) -> Tensor {
        let (outer, rows, cols) = column_layout(z.shape());
        let src = z.data();
        let mut out = z.zeros_like();
        let dst = out.data_mut();
        for o in 0..outer {
            let plane = o * rows * cols;
            for c in 0..cols {
                let at = |r: usize| plane + r * cols + c;
                let max = (0..rows).map(|r| src[at(r)]).fold(Real::NEG_INFINITY, Real::max);
                let mut total = 0.0;
                for r in 0..rows {
                    let e = (src[at(r)] - max).exp();
                    dst[at(r)] = e;
                    total += e;
                }
                for r in 0..rows {
                    dst[at(r)] /= total;
                }
            }
        }
        out
    }

    fn jacobian_mul(&self, _z: &Tensor, a: &Tensor, right: &Tensor) -> Result<Tensor> {
        // J·r = a ⊙ r − a (aᵀ r), per column
        let mut out = a.hadamard(right)?;
        let (outer, rows, cols) = column_layout(a.shape());
        let a = a.data();
        let dst = out.data_mut();
        for o in 0..outer {
            let plane = o * rows * cols;
            for c in 0..cols {
                let dot: Real = (0..rows).map(|r| dst[plane + r * cols + c]).sum();
                for r in 0..rows {
                    let i = plane + r * cols + c;
                    dst[i] -= a[i] * dot;
                }
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensor;

    #[test]
    fn softmax_normalises_each_channel() {
        let z = tensor!([[[1.0], [2.0], [3.0]], [[-5.0], [0.0], [5.0]]]);
        let a = Softmax.eval(&z);
        for channel in 0..2 {
            let s: Real = a.data()[channel * 3..channel * 3 + 3].iter().sum();
            assert!((s - 1.0).abs() < 1e-12);
        }
        assert!(a.data()[2] > a.data()[1]);
    }

    #[test]
    fn softmax_jacobian_is_block_diagonal_and_symmetric() {
        let z = tensor!([[[0.3], [-1.2]], [[2.0], [0.5]]]);
        let a = Softmax.eval(&z);
        let j = Softmax.jacobian(&z, &a).unwrap();
        assert_eq!(j.shape(), &[4, 4]);
        let at = |r: usize, c: usize| j.data()[r * 4 + c];
        assert!(at(0, 2).abs() < 1e-15 && at(3, 1).abs() < 1e-15);
        assert!((at(0, 1) - at(1, 0)).abs() < 1e-15);
        let a0 = a.data()[0];
        assert!((at(0, 0) - a0 * (1.0 - a0)).abs() < 1e-12);
    }

    #[test]
    fn relu_derivative_is_zero_at_origin() {
        let z = tensor!([-1.0, 0.0, 2.0]);
        let a = ReLU.eval(&z);
        let d = ReLU.jacobian_mul(&z, &a, &Tensor::ones(&[3])).unwrap();
        assert_eq!(d.data(), &[0.0, 0.0, 1.0]);
    }

    #[test]
    fn sigmoid_is_stable_for_large_inputs() {
        let a = Sigmoid.eval(&tensor!([-800.0, 0.0, 800.0]));
        assert_eq!(a.data(), &[0.0, 0.5, 1.0]);
    }

    #[test]
    fn jacobian_mul_rejects_mismatched_shapes() {
        let z = Tensor::zeros(&[2, 1]);
        assert!(Tanh.jacobian_mul(&z, &z, &Tensor::zeros(&[3, 1])).is_err());
    }
}
