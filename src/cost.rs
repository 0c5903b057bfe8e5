//! Cost functions comparing a network output `a` with a target `y`.

use crate::error::Result;
use crate::tensors::Tensor;
use crate::{EPSILON, Real};
use std::fmt;

/// A per-sample cost and its derivative with respect to the output.
///
/// `y` may have any shape holding the same number of elements as `a`; it is
/// reshaped to `a`'s shape before use.
pub trait Cost: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;

    /// Scalar cost of one sample.
    ///
    /// # Errors
    /// [`crate::Error::ShapeMismatch`] if `a` and `y` hold different element counts.
    fn eval(&self, a: &Tensor, y: &Tensor) -> Result<Real>;

    /// `∂C/∂a`, shaped like `a`.
    ///
    /// # Errors
    /// [`crate::Error::ShapeMismatch`] if `a` and `y` hold different element counts.
    fn derivative(&self, a: &Tensor, y: &Tensor) -> Result<Tensor>;
}

/// `0.5 · ‖a − y‖²`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Quadratic;

/// Binary cross-entropy summed over outputs,
/// `Σ −y·ln(a) − (1 − y)·ln(1 − a)`, with `a` clipped to `[ε, 1 − ε]`.
#[derive(Debug, Clone, Copy, Default)]
pub struct CrossEntropy;

impl Cost for Quadratic {
    fn name(&self) -> &'static str {
        "quadratic"
    }

    fn eval(&self, a: &Tensor, y: &Tensor) -> Result<Real> {
        Ok(0.5 * a.sub(&y.reshape(a.shape())?)?.sum_squares())
    }

    fn derivative(&self, a: &Tensor, y: &Tensor) -> Result<Tensor> {
        a.sub(&y.reshape(a.shape())?)
    }
}

fn clip(a: Real) -> Real {
    a.clamp(EPSILON, 1.0 - EPSILON)
}

impl Cost for CrossEntropy {
    fn name(&self) -> &'static str {
        "cross entropy"
    }

    fn eval(&self, a: &Tensor, y: &Tensor) -> Result<Real> {
        let terms = a.zip_map(&y.reshape(a.shape())?, |a, y| {
            let a = clip(a);
            -y * a.ln() - (1.0 - y) * (1.0 - a).ln()
        })?;
        Ok(terms.sum())
    }

    fn derivative(&self, a: &Tensor, y: &Tensor) -> Result<Tensor> {
        a.zip_map(&y.reshape(a.shape())?, |a, y| {
            let a = clip(a);
            (a - y) / (a * (1.0 - a))
        })
    }
}
