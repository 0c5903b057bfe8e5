//! Core tensor data structure and dense arithmetic.
//!
//! # Core Tensor Utilities
//!
//! A [`Tensor`] is a shape plus flat row-major storage of [`Real`] values.
//! The element width is fixed crate-wide; nothing here is generic over it.
//!
//! It supports:
//! - Construction from shape + data, zeros, constant fills
//! - Shape-checked reshapes and element-wise arithmetic
//! - Batched 2D matrix products over identical leading dimensions
//! - The column-vector convention: trailing dims `(length, 1)`
//!
//! ## Design Highlights
//! - Shape is stored as a `Vec<usize>` and enforced at runtime
//! - Element-wise binary ops never broadcast; mismatches are [`Error::ShapeMismatch`]
//! - Matrix products parallelise over output rows with `rayon`
//!
//! ## Example
//!
//! ```rust
//! use stride_nn::tensors::Tensor;
//! let t = Tensor::new(vec![2, 3], vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
//! assert_eq!(t.shape(), &[2, 3]);
//! ```

use crate::error::{Error, Result};
use crate::ops::shape::{contiguous_strides, next_index};
use crate::Real;
use rayon::prelude::*;
use std::ops::{Mul, MulAssign};

/// An N-dimensional tensor with a shape and flat row-major data.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    shape: Vec<usize>,
    data: Vec<Real>,
}

impl Tensor {
    /// Creates a new tensor with the given shape and flat data.
    ///
    /// # Panics
    /// Panics if the number of elements in `data` does not match the shape product.
    /// Use [`Tensor::from_vec`] when the shape comes from user input.
    pub fn new(shape: impl Into<Vec<usize>>, data: Vec<Real>) -> Self {
        let shape = shape.into();
        assert_eq!(
            shape.iter().product::<usize>(),
            data.len(),
            "shape {:?} is incompatible with {} data elements",
            shape,
            data.len()
        );
        Self { shape, data }
    }

    /// Fallible counterpart of [`Tensor::new`].
    ///
    /// # Errors
    /// [`Error::ShapeMismatch`] if `data.len()` differs from the shape's element count.
    pub fn from_vec(shape: impl Into<Vec<usize>>, data: Vec<Real>) -> Result<Self> {
        let shape = shape.into();
        if shape.iter().product::<usize>() != data.len() {
            return Err(Error::shape(&shape, &[data.len()]));
        }
        Ok(Self { shape, data })
    }

    /// A tensor of zeros.
    #[must_use]
    pub fn zeros(shape: &[usize]) -> Self {
        Self::full(shape, 0.0)
    }

    /// A tensor of ones.
    #[must_use]
    pub fn ones(shape: &[usize]) -> Self {
        Self::full(shape, 1.0)
    }

    /// A tensor with every element set to `value`.
    #[must_use]
    pub fn full(shape: &[usize], value: Real) -> Self {
        Self {
            shape: shape.to_vec(),
            data: vec![value; shape.iter().product()],
        }
    }

    /// The empty parameter tensor (shape `[0]`) used by parameter-free layers.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            shape: vec![0],
            data: Vec::new(),
        }
    }

    /// Zeros with the same shape as `self`.
    #[must_use]
    pub fn zeros_like(&self) -> Self {
        Self::zeros(&self.shape)
    }

    #[must_use]
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    #[must_use]
    pub fn data(&self) -> &[Real] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [Real] {
        &mut self.data
    }

    #[must_use]
    pub fn into_data(self) -> Vec<Real> {
        self.data
    }

    /// Number of elements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[must_use]
    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    /// Returns a copy with a new shape holding the same number of elements.
    ///
    /// # Errors
    /// [`Error::ShapeMismatch`] if the element counts differ.
    pub fn reshape(&self, shape: &[usize]) -> Result<Self> {
        self.clone().into_shape(shape)
    }

    /// Consuming [`Tensor::reshape`]; never copies the data.
    ///
    /// # Errors
    /// [`Error::ShapeMismatch`] if the element counts differ.
    pub fn into_shape(mut self, shape: &[usize]) -> Result<Self> {
        if shape.iter().product::<usize>() != self.data.len() {
            return Err(Error::shape(shape, &self.shape));
        }
        self.shape = shape.to_vec();
        Ok(self)
    }

    /// Replaces this tensor's data with another tensor of the same shape.
    ///
    /// # Errors
    /// [`Error::ShapeMismatch`] if shapes differ; `self` is left untouched.
    pub fn update(&mut self, mut other: Tensor) -> Result<()> {
        if self.shape != other.shape {
            return Err(Error::shape(&self.shape, &other.shape));
        }
        std::mem::swap(&mut self.data, &mut other.data);
        Ok(())
    }

    /// Applies `f` to every element.
    #[must_use]
    pub fn map(&self, f: impl Fn(Real) -> Real) -> Self {
        Self {
            shape: self.shape.clone(),
            data: self.data.iter().map(|&x| f(x)).collect(),
        }
    }

    /// Combines two same-shaped tensors element by element.
    ///
    /// # Errors
    /// [`Error::ShapeMismatch`] if the shapes differ.
    pub fn zip_map(&self, other: &Tensor, f: impl Fn(Real, Real) -> Real) -> Result<Self> {
        if self.shape != other.shape {
            return Err(Error::shape(&self.shape, &other.shape));
        }
        Ok(Self {
            shape: self.shape.clone(),
            data: self
                .data
                .iter()
                .zip(&other.data)
                .map(|(&a, &b)| f(a, b))
                .collect(),
        })
    }

    /// Element-wise `self + other`.
    ///
    /// # Errors
    /// [`Error::ShapeMismatch`] if the shapes differ.
    pub fn add(&self, other: &Tensor) -> Result<Self> {
        self.zip_map(other, |a, b| a + b)
    }

    /// Element-wise `self - other`.
    ///
    /// # Errors
    /// [`Error::ShapeMismatch`] if the shapes differ.
    pub fn sub(&self, other: &Tensor) -> Result<Self> {
        self.zip_map(other, |a, b| a - b)
    }

    /// Element-wise `self * other`.
    ///
    /// # Errors
    /// [`Error::ShapeMismatch`] if the shapes differ.
    pub fn hadamard(&self, other: &Tensor) -> Result<Self> {
        self.zip_map(other, |a, b| a * b)
    }

    /// In-place `self += other`.
    ///
    /// # Errors
    /// [`Error::ShapeMismatch`] if the shapes differ.
    pub fn add_assign(&mut self, other: &Tensor) -> Result<()> {
        if self.shape != other.shape {
            return Err(Error::shape(&self.shape, &other.shape));
        }
        for (a, &b) in self.data.iter_mut().zip(&other.data) {
            *a += b;
        }
        Ok(())
    }

    #[must_use]
    pub fn sum(&self) -> Real {
        self.data.iter().sum()
    }

    #[must_use]
    pub fn sum_squares(&self) -> Real {
        self.data.iter().map(|x| x * x).sum()
    }

    /// Euclidean (Frobenius) norm over all elements.
    #[must_use]
    pub fn norm(&self) -> Real {
        self.sum_squares().sqrt()
    }

    /// Flat index of the largest element; ties resolve to the first occurrence.
    #[must_use]
    pub fn argmax(&self) -> Option<usize> {
        argmax(&self.data)
    }

    /// Sub-tensor `i` along the leading axis.
    ///
    /// # Errors
    /// [`Error::InvalidArgument`] for a 0-d tensor or an out-of-range index.
    pub fn index_axis0(&self, i: usize) -> Result<Self> {
        let Some((&n, rest)) = self.shape.split_first() else {
            return Err(Error::invalid("cannot index a 0-d tensor"));
        };
        if i >= n {
            return Err(Error::invalid(format!("index {i} out of range for axis of {n}")));
        }
        let step: usize = rest.iter().product();
        Ok(Self {
            shape: rest.to_vec(),
            data: self.data[i * step..(i + 1) * step].to_vec(),
        })
    }

    /// Stacks same-shaped tensors along a new leading axis.
    ///
    /// # Errors
    /// [`Error::ShapeMismatch`] if the parts do not share one shape.
    pub fn stack(parts: &[Tensor]) -> Result<Self> {
        let Some(first) = parts.first() else {
            return Ok(Self::empty());
        };
        let mut data = Vec::with_capacity(first.len() * parts.len());
        for p in parts {
            if p.shape != first.shape {
                return Err(Error::shape(&first.shape, &p.shape));
            }
            data.extend_from_slice(&p.data);
        }
        let mut shape = vec![parts.len()];
        shape.extend_from_slice(&first.shape);
        Self::from_vec(shape, data)
    }

    /// Swaps the two trailing dimensions.
    ///
    /// # Errors
    /// [`Error::InvalidArgument`] for tensors of rank below 2.
    pub fn transpose_2d(&self) -> Result<Self> {
        let n = self.ndim();
        if n < 2 {
            return Err(Error::invalid("transpose_2d needs at least 2 dimensions"));
        }
        let (rows, cols) = (self.shape[n - 2], self.shape[n - 1]);
        let mut shape = self.shape.clone();
        shape.swap(n - 2, n - 1);
        let mut data = vec![0.0; self.len()];
        let plane = rows * cols;
        if plane > 0 {
            for (dst, src) in data.chunks_mut(plane).zip(self.data.chunks(plane)) {
                for r in 0..rows {
                    for c in 0..cols {
                        dst[c * rows + r] = src[r * cols + c];
                    }
                }
            }
        }
        Ok(Self { shape, data })
    }

    /// Batched matrix product `(..., m, k) x (..., k, n) -> (..., m, n)`.
    ///
    /// Leading dimensions must be identical; they are not broadcast.
    ///
    /// # Errors
    /// [`Error::ShapeMismatch`] if the inner or leading dimensions disagree.
    pub fn matmul(&self, other: &Tensor) -> Result<Self> {
        let (na, nb) = (self.ndim(), other.ndim());
        if na < 2 || nb < 2 || self.shape[..na - 2] != other.shape[..nb - 2] {
            return Err(Error::shape(&self.shape, &other.shape));
        }
        let (m, k) = (self.shape[na - 2], self.shape[na - 1]);
        let (k2, n) = (other.shape[nb - 2], other.shape[nb - 1]);
        if k != k2 {
            return Err(Error::shape(&[m, k], &[k2, n]));
        }

        let mut shape = self.shape[..na - 2].to_vec();
        shape.extend_from_slice(&[m, n]);
        let mut out = vec![0.0; shape.iter().product()];
        if out.is_empty() {
            return Ok(Self { shape, data: out });
        }

        let a = &self.data;
        let b = &other.data;
        out.par_chunks_mut(n).enumerate().for_each(|(row_idx, row)| {
            let batch = row_idx / m;
            let i = row_idx % m;
            let a_row = &a[batch * m * k + i * k..batch * m * k + (i + 1) * k];
            let b_mat = &b[batch * k * n..(batch + 1) * k * n];
            for (l, &a_il) in a_row.iter().enumerate() {
                let b_row = &b_mat[l * n..(l + 1) * n];
                for (o, &b_lj) in row.iter_mut().zip(b_row) {
                    *o += a_il * b_lj;
                }
            }
        });

        Ok(Self { shape, data: out })
    }

    /// Reverses the order of elements along the trailing `nd` axes.
    ///
    /// # Errors
    /// [`Error::InvalidArgument`] if `nd` exceeds the rank.
    pub fn flip_trailing(&self, nd: usize) -> Result<Self> {
        let rank = self.ndim();
        if nd > rank {
            return Err(Error::invalid(format!("cannot flip {nd} axes of a rank-{rank} tensor")));
        }
        if self.is_empty() {
            return Ok(self.clone());
        }
        let strides = contiguous_strides(&self.shape);
        let mut data = vec![0.0; self.len()];
        let mut idx = vec![0; rank];
        let mut src = 0;
        loop {
            let dst: usize = idx
                .iter()
                .enumerate()
                .map(|(d, &i)| {
                    let i = if d >= rank - nd { self.shape[d] - 1 - i } else { i };
                    i * strides[d]
                })
                .sum();
            data[dst] = self.data[src];
            src += 1;
            if !next_index(&mut idx, &self.shape) {
                break;
            }
        }
        Ok(Self {
            shape: self.shape.clone(),
            data,
        })
    }
}

impl Mul<Real> for Tensor {
    type Output = Tensor;

    fn mul(mut self, rhs: Real) -> Tensor {
        self *= rhs;
        self
    }
}

impl Mul<Real> for &Tensor {
    type Output = Tensor;

    fn mul(self, rhs: Real) -> Tensor {
        self.map(|x| x * rhs)
    }
}

impl MulAssign<Real> for Tensor {
    fn mul_assign(&mut self, rhs: Real) {
        for x in &mut self.data {
            *x *= rhs;
        }
    }
}

/// First-occurrence arg-max of a slice.
pub(crate) fn argmax(values: &[Real]) -> Option<usize> {
    let mut best: Option<(usize, Real)> = None;
    for (i, &v) in values.iter().enumerate() {
        match best {
            Some((_, b)) if v <= b => {}
            _ => best = Some((i, v)),
        }
    }
    best.map(|(i, _)| i)
}

/// Defines a tensor from nested literal arrays.
///
/// Supports arbitrary dimensionality as long as sublists are uniform in shape.
///
/// # Example
/// ```
/// use stride_nn::tensor;
/// let t = tensor!([[1.0, 2.0], [3.0, 4.0]]);
/// assert_eq!(t.shape(), &[2, 2]);
/// ```
#[macro_export]
macro_rules! tensor {
    ($lit:literal) => {
        $crate::tensors::Tensor::new(Vec::<usize>::new(), vec![$lit as $crate::Real])
    };

    ([ $( [ $( $inner:tt )* ] ),+ $(,)? ]) => {{
        let children = vec![ $( $crate::tensor!([ $( $inner )* ]) ),+ ];
        let first_shape = children[0].shape().to_vec();
        assert!(children.iter().all(|c| c.shape() == first_shape.as_slice()),
            "ragged tensor literal (rows have mismatched shapes)");
        let mut shape = vec![children.len()];
        shape.extend_from_slice(&first_shape);
        let mut data = Vec::with_capacity(children.len() * children[0].len());
        for c in children { data.extend(c.into_data()); }
        $crate::tensors::Tensor::new(shape, data)
    }};

    ([ $( $x:expr ),+ $(,)? ]) => {{
        let data: Vec<$crate::Real> = vec![ $( $x as $crate::Real ),+ ];
        $crate::tensors::Tensor::new(vec![data.len()], data)
    }};
}
