//! Shape arithmetic for correlation, dilation and pooling.
//!
//! Every function here is pure. Parameter shapes (`kernel_shape`,
//! `stride_shape`, `pad_shape`) describe the *trailing* dimensions of a
//! matrix; all leading dimensions pass through untouched. A stride or pad of
//! length 1 is broadcast to the kernel's dimensionality, which is the only
//! implicit broadcast in the crate.

use crate::error::{Error, Result};

/// Row-major element strides of a contiguous tensor.
#[must_use]
pub fn contiguous_strides(shape: &[usize]) -> Vec<usize> {
    let mut strides = vec![1; shape.len()];
    for d in (0..shape.len().saturating_sub(1)).rev() {
        strides[d] = strides[d + 1] * shape[d + 1];
    }
    strides
}

/// Advances a row-major multi-index; returns `false` once it wraps around.
#[inline]
pub fn next_index(idx: &mut [usize], limits: &[usize]) -> bool {
    for d in (0..idx.len()).rev() {
        idx[d] += 1;
        if idx[d] < limits[d] {
            return true;
        }
        idx[d] = 0;
    }
    false
}

/// Broadcasts a per-dimension parameter to `nd` entries.
///
/// # Errors
/// [`Error::InvalidArgument`] unless `param` has 1 or `nd` entries.
pub fn broadcast_param(param: &[usize], nd: usize) -> Result<Vec<usize>> {
    match param.len() {
        1 => Ok(vec![param[0]; nd]),
        n if n == nd => Ok(param.to_vec()),
        n => Err(Error::invalid(format!(
            "parameter of {n} dims cannot broadcast to {nd} dims"
        ))),
    }
}

/// Right-aligned broadcast of two shapes, numpy style.
///
/// # Errors
/// [`Error::ShapeMismatch`] if a dimension pair is neither equal nor contains a 1.
pub fn broadcast_shapes(a: &[usize], b: &[usize]) -> Result<Vec<usize>> {
    let n = a.len().max(b.len());
    let mut out = vec![0; n];
    for (i, o) in out.iter_mut().enumerate() {
        let da = if i + a.len() >= n { a[i + a.len() - n] } else { 1 };
        let db = if i + b.len() >= n { b[i + b.len() - n] } else { 1 };
        *o = match (da, db) {
            (x, y) if x == y => x,
            (1, y) => y,
            (x, 1) => x,
            _ => return Err(Error::shape(a, b)),
        };
    }
    Ok(out)
}

/// Strides that walk `shape` (right-aligned into `target`) while iterating
/// `target`; broadcast dimensions get stride 0.
pub(crate) fn broadcast_strides(shape: &[usize], strides: &[usize], target: &[usize]) -> Vec<usize> {
    let off = target.len() - shape.len();
    (0..target.len())
        .map(|d| {
            if d < off || shape[d - off] == 1 {
                0
            } else {
                strides[d - off]
            }
        })
        .collect()
}

/// Output shape of a valid-mode correlation.
///
/// For each trailing dimension covered by the kernel the size is
/// `floor((m - k) / s) + 1`, clamped to 0 when the kernel is larger than the
/// matrix.
///
/// # Errors
/// [`Error::InvalidArgument`] if the kernel has more dims than the matrix,
/// a kernel dim is 0, a stride is 0, or the stride cannot broadcast.
pub fn correlate_shape(
    matrix_shape: &[usize],
    kernel_shape: &[usize],
    stride_shape: &[usize],
) -> Result<Vec<usize>> {
    let nd = kernel_shape.len();
    if nd > matrix_shape.len() {
        return Err(Error::invalid(format!(
            "kernel {kernel_shape:?} has more dims than matrix {matrix_shape:?}"
        )));
    }
    if kernel_shape.contains(&0) {
        return Err(Error::invalid(format!("kernel {kernel_shape:?} has a zero-sized dim")));
    }
    let stride = broadcast_param(stride_shape, nd)?;
    if stride.contains(&0) {
        return Err(Error::invalid(format!("stride {stride_shape:?} must be >= 1")));
    }

    let lead = matrix_shape.len() - nd;
    let mut out = matrix_shape[..lead].to_vec();
    for ((&m, &k), &s) in matrix_shape[lead..].iter().zip(kernel_shape).zip(&stride) {
        out.push(if k > m { 0 } else { (m - k) / s + 1 });
    }
    Ok(out)
}

/// Size of a matrix after inserting `stride - 1` zeros between elements and
/// `pad` zeros on both sides: `pad * 2 + (m - 1) * stride + 1` per dim.
///
/// # Errors
/// [`Error::InvalidArgument`] if the parameters cannot broadcast together,
/// cover more dims than the matrix has, or contain a zero stride.
pub fn dilate_shape(
    matrix_shape: &[usize],
    stride_shape: &[usize],
    pad_shape: &[usize],
) -> Result<Vec<usize>> {
    let (stride, pad) = broadcast_pair(stride_shape, pad_shape)?;
    let nd = stride.len();
    if nd > matrix_shape.len() {
        return Err(Error::invalid(format!(
            "dilation covers {nd} dims but matrix {matrix_shape:?} has fewer"
        )));
    }
    if stride.contains(&0) {
        return Err(Error::invalid(format!("stride {stride_shape:?} must be >= 1")));
    }

    let lead = matrix_shape.len() - nd;
    let mut out = matrix_shape[..lead].to_vec();
    for ((&m, &s), &p) in matrix_shape[lead..].iter().zip(&stride).zip(&pad) {
        let body = if m == 0 { 0 } else { (m - 1) * s + 1 };
        out.push(p * 2 + body);
    }
    Ok(out)
}

/// Output shape of pooling; identical to [`correlate_shape`].
///
/// # Errors
/// Same as [`correlate_shape`].
pub fn pool_shape(
    matrix_shape: &[usize],
    kernel_shape: &[usize],
    stride_shape: &[usize],
) -> Result<Vec<usize>> {
    correlate_shape(matrix_shape, kernel_shape, stride_shape)
}

/// Broadcasts stride and pad against each other.
pub(crate) fn broadcast_pair(a: &[usize], b: &[usize]) -> Result<(Vec<usize>, Vec<usize>)> {
    let nd = a.len().max(b.len());
    Ok((broadcast_param(a, nd)?, broadcast_param(b, nd)?))
}
