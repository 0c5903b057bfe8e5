//! Parallel CPU kernels for correlation, dilation and pooling.
//!
//! # CPU Backend
//!
//! Every kernel here is built on the single windowing primitive in
//! [`super::view`]: a zero-copy strided view whose trailing dimensions are the
//! windows. Output rows are filled in parallel with
//! [`rayon`](https://docs.rs/rayon), one `par_chunks_mut` chunk per row.
//!
//! ## Implemented Ops
//!
//! - `correlate`: valid-mode cross-correlation with an optionally batched kernel
//! - `dilate`: zero insertion between elements plus zero padding
//! - `pool` / `pool_argmax`: max or mean over each window
//!
//! ## Design Goals
//!
//! - Deterministic results: each output element is reduced in a fixed order
//! - No `unsafe`; bounds come from the view's shape arithmetic

use super::shape::{
    broadcast_pair, broadcast_shapes, broadcast_strides, contiguous_strides, dilate_shape,
};
use super::view::{dilated_view_mut, sliding_window_view};
use crate::error::{Error, Result};
use crate::tensors::{Tensor, argmax};
use crate::Real;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Reduction applied to each pooling window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PoolMode {
    Max,
    Average,
}

impl FromStr for PoolMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "max" => Ok(Self::Max),
            "average" | "mean" => Ok(Self::Average),
            other => Err(Error::invalid(format!("unsupported pooling mode `{other}`"))),
        }
    }
}

impl fmt::Display for PoolMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Max => "max",
            Self::Average => "average",
        })
    }
}

/// Inserts `stride - 1` zeros between neighbouring elements of the trailing
/// dims and surrounds them with `pad` zeros on each side.
///
/// # Errors
/// See [`dilate_shape`].
///
/// # Example
/// ```rust
/// use stride_nn::ops::cpu::dilate;
/// use stride_nn::tensor;
///
/// let d = dilate(&tensor!([[1, 2], [3, 4]]), &[2], &[0]).unwrap();
/// assert_eq!(d, tensor!([[1, 0, 2], [0, 0, 0], [3, 0, 4]]));
/// ```
pub fn dilate(matrix: &Tensor, stride_shape: &[usize], pad_shape: &[usize]) -> Result<Tensor> {
    let shape = dilate_shape(matrix.shape(), stride_shape, pad_shape)?;
    let (stride, pad) = broadcast_pair(stride_shape, pad_shape)?;
    let mut out = Tensor::zeros(&shape);
    if !matrix.is_empty() {
        dilated_view_mut(&mut out, matrix.shape(), &stride, &pad).assign(matrix)?;
    }
    Ok(out)
}

/// Valid-mode cross-correlation of `matrix` with `kernel`.
///
/// The trailing `num_kernel_dims` dims of `kernel` (all of them when `None`)
/// form the window. Any remaining leading kernel dims are a batch of kernels
/// that is broadcast against the view's leading shape, numpy style. The kernel
/// is *not* flipped.
///
/// Returns a tensor of the broadcast leading shape; it is empty when the
/// kernel is larger than the matrix.
///
/// # Errors
/// [`Error::InvalidArgument`] for a zero `num_kernel_dims`, or one exceeding
/// the kernel rank, or bad strides; [`Error::ShapeMismatch`] when the kernel
/// batch does not broadcast.
///
/// # Example
/// ```rust
/// use stride_nn::ops::cpu::correlate;
/// use stride_nn::tensor;
///
/// let m = tensor!([[1, 2, 3], [4, 5, 6], [7, 8, 9]]);
/// let out = correlate(&m, &tensor!([[-1, -2]]), &[2, 1], None).unwrap();
/// assert_eq!(out, tensor!([[-5, -8], [-23, -26]]));
/// ```
pub fn correlate(
    matrix: &Tensor,
    kernel: &Tensor,
    stride_shape: &[usize],
    num_kernel_dims: Option<usize>,
) -> Result<Tensor> {
    let kernel_rank = kernel.ndim();
    let nd = num_kernel_dims.unwrap_or(kernel_rank);
    if nd == 0 || nd > kernel_rank {
        return Err(Error::invalid(format!(
            "num_kernel_dims {nd} must be within 1..={kernel_rank}"
        )));
    }
    let window = &kernel.shape()[kernel_rank - nd..];
    let view = sliding_window_view(matrix, window, stride_shape)?;
    let view_rank = view.shape().len();
    let view_lead = &view.shape()[..view_rank - nd];

    let mut kernel_lead = kernel.shape()[..kernel_rank - nd].to_vec();
    kernel_lead.extend(std::iter::repeat_n(1, nd));
    let out_shape = broadcast_shapes(view_lead, &kernel_lead)?;
    let out_len: usize = out_shape.iter().product();
    if out_len == 0 {
        return Ok(Tensor::zeros(&out_shape));
    }

    let matrix_strides = broadcast_strides(view_lead, &view.strides()[..view_rank - nd], &out_shape);
    let kernel_strides = broadcast_strides(
        &kernel_lead,
        &contiguous_strides(&kernel_lead),
        &out_shape,
    );
    let window_offsets = view.window_offsets(nd);
    let window_len = window_offsets.len();
    let storage = view.storage();
    let base = view.offset();
    let kernel_data = kernel.data();

    let rank = out_shape.len();
    let row_len = out_shape[rank - 1];
    let row_shape = &out_shape[..rank - 1];
    let (ms_last, ks_last) = (matrix_strides[rank - 1], kernel_strides[rank - 1] * window_len);

    let mut out = vec![0.0; out_len];
    out.par_chunks_mut(row_len).enumerate().for_each(|(r, row)| {
        let idx = unravel(r, row_shape);
        let m_row = base + dot(&idx, &matrix_strides);
        let k_row = dot(&idx, &kernel_strides) * window_len;
        for (j, o) in row.iter_mut().enumerate() {
            let m0 = m_row + j * ms_last;
            let k0 = k_row + j * ks_last;
            *o = window_offsets
                .iter()
                .zip(&kernel_data[k0..k0 + window_len])
                .map(|(&w, &k)| storage[m0 + w] * k)
                .sum();
        }
    });

    Ok(Tensor::new(out_shape, out))
}

/// Pools every `kernel_shape` window of the trailing dims.
///
/// # Errors
/// Same as [`super::shape::pool_shape`].
///
/// # Example
/// ```rust
/// use stride_nn::ops::cpu::{pool, PoolMode};
/// use stride_nn::tensor;
///
/// let m = tensor!([[1, 2, 3, 4], [5, 6, 7, 8]]);
/// assert_eq!(pool(&m, &[2, 2], &[2], PoolMode::Max).unwrap(), tensor!([[6, 8]]));
/// assert_eq!(pool(&m, &[2, 2], &[2], PoolMode::Average).unwrap(), tensor!([[3.5, 5.5]]));
/// ```
pub fn pool(
    matrix: &Tensor,
    kernel_shape: &[usize],
    stride_shape: &[usize],
    mode: PoolMode,
) -> Result<Tensor> {
    let view = sliding_window_view(matrix, kernel_shape, stride_shape)?;
    let nd = kernel_shape.len();
    let shape = view.shape()[..view.shape().len() - nd].to_vec();
    let window = view.window_offsets(nd);
    let storage = view.storage();
    let size = window.len() as Real;

    let data = view
        .outer_offsets(nd)
        .into_par_iter()
        .map(|base| match mode {
            PoolMode::Max => window
                .iter()
                .map(|&w| storage[base + w])
                .fold(Real::NEG_INFINITY, Real::max),
            PoolMode::Average => window.iter().map(|&w| storage[base + w]).sum::<Real>() / size,
        })
        .collect();
    Ok(Tensor::new(shape, data))
}

/// Max-pools like [`pool`] and also returns, per output element, the flat
/// offset into `matrix` of the first window maximum.
///
/// # Errors
/// Same as [`super::shape::pool_shape`].
pub fn pool_argmax(
    matrix: &Tensor,
    kernel_shape: &[usize],
    stride_shape: &[usize],
) -> Result<(Tensor, Vec<usize>)> {
    let view = sliding_window_view(matrix, kernel_shape, stride_shape)?;
    let nd = kernel_shape.len();
    let shape = view.shape()[..view.shape().len() - nd].to_vec();
    let window = view.window_offsets(nd);
    let storage = view.storage();

    let (values, routes): (Vec<Real>, Vec<usize>) = view
        .outer_offsets(nd)
        .into_par_iter()
        .map(|base| {
            let values: Vec<Real> = window.iter().map(|&w| storage[base + w]).collect();
            let best = argmax(&values).unwrap_or(0);
            (values[best], base + window[best])
        })
        .unzip();
    Ok((Tensor::new(shape, values), routes))
}

/// Row-major multi-index of flat position `flat` within `shape`.
fn unravel(mut flat: usize, shape: &[usize]) -> Vec<usize> {
    let mut idx = vec![0; shape.len()];
    for (i, &n) in idx.iter_mut().zip(shape).rev() {
        *i = flat % n;
        flat /= n;
    }
    idx
}

#[inline]
fn dot(idx: &[usize], strides: &[usize]) -> usize {
    idx.iter().zip(strides).map(|(i, s)| i * s).sum()
}
