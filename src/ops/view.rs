//! Zero-copy strided views.
//!
//! A view is a borrowed slice plus an element offset, a shape, and strides
//! measured in elements. Nothing is copied; windows are produced purely by
//! composing strides.
//!
//! Read-only views ([`StridedView`]) may alias freely. Writable views
//! ([`StridedViewMut`]) can only be obtained when every view index maps to a
//! distinct element, which the constructors check before handing one out.

use super::shape::{broadcast_param, contiguous_strides, correlate_shape, next_index};
use crate::error::{Error, Result};
use crate::tensors::Tensor;
use crate::Real;

/// A read-only strided window into tensor storage.
#[derive(Debug, Clone)]
pub struct StridedView<'a> {
    data: &'a [Real],
    offset: usize,
    shape: Vec<usize>,
    strides: Vec<usize>,
}

impl<'a> StridedView<'a> {
    /// A contiguous view over the whole tensor.
    #[must_use]
    pub fn new(tensor: &'a Tensor) -> Self {
        Self {
            data: tensor.data(),
            offset: 0,
            shape: tensor.shape().to_vec(),
            strides: contiguous_strides(tensor.shape()),
        }
    }

    #[must_use]
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Element strides, one per dimension.
    #[must_use]
    pub fn strides(&self) -> &[usize] {
        &self.strides
    }

    #[must_use]
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// The underlying storage the view indexes into.
    #[must_use]
    pub fn storage(&self) -> &'a [Real] {
        self.data
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.shape.iter().product()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Storage offset of a multi-index.
    #[must_use]
    pub fn offset_of(&self, index: &[usize]) -> usize {
        self.offset
            + index
                .iter()
                .zip(&self.strides)
                .map(|(i, s)| i * s)
                .sum::<usize>()
    }

    #[must_use]
    pub fn get(&self, index: &[usize]) -> Real {
        self.data[self.offset_of(index)]
    }

    /// Storage offsets (relative to a window's base) of every element in the
    /// trailing `nd` dims, in row-major order.
    #[must_use]
    pub fn window_offsets(&self, nd: usize) -> Vec<usize> {
        let rank = self.shape.len();
        relative_offsets(&self.shape[rank - nd..], &self.strides[rank - nd..])
    }

    /// Absolute storage offsets of each leading position (all but the trailing
    /// `nd` dims), in row-major order.
    #[must_use]
    pub fn outer_offsets(&self, nd: usize) -> Vec<usize> {
        let rank = self.shape.len();
        relative_offsets(&self.shape[..rank - nd], &self.strides[..rank - nd])
            .into_iter()
            .map(|o| o + self.offset)
            .collect()
    }

    /// Copies the viewed elements into a new contiguous tensor.
    #[must_use]
    pub fn to_tensor(&self) -> Tensor {
        let data = relative_offsets(&self.shape, &self.strides)
            .into_iter()
            .map(|o| self.data[self.offset + o])
            .collect();
        Tensor::new(self.shape.clone(), data)
    }
}

/// A writable strided view whose indices map to pairwise distinct elements.
#[derive(Debug)]
pub struct StridedViewMut<'a> {
    data: &'a mut [Real],
    offset: usize,
    shape: Vec<usize>,
    strides: Vec<usize>,
}

impl<'a> StridedViewMut<'a> {
    #[must_use]
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Writes `src` element by element into the view.
    ///
    /// # Errors
    /// [`Error::ShapeMismatch`] if `src` has a different shape than the view.
    pub fn assign(&mut self, src: &Tensor) -> Result<()> {
        if src.shape() != self.shape.as_slice() {
            return Err(Error::shape(&self.shape, src.shape()));
        }
        for (o, &v) in relative_offsets(&self.shape, &self.strides)
            .into_iter()
            .zip(src.data())
        {
            self.data[self.offset + o] = v;
        }
        Ok(())
    }

    /// Adds `value` to every element of the window at leading position
    /// `outer` (the trailing `nd` dims form the window).
    pub fn add_to_window(&mut self, outer: &[usize], nd: usize, value: Real) {
        let rank = self.shape.len();
        let base = self.offset
            + outer
                .iter()
                .zip(&self.strides[..rank - nd])
                .map(|(i, s)| i * s)
                .sum::<usize>();
        for o in relative_offsets(&self.shape[rank - nd..], &self.strides[rank - nd..]) {
            self.data[base + o] += value;
        }
    }
}

/// Shape and strides of a sliding-window view, shared by the read-only and
/// writable constructors.
fn window_layout(
    matrix_shape: &[usize],
    window_shape: &[usize],
    stride_shape: &[usize],
) -> Result<(Vec<usize>, Vec<usize>)> {
    let correlated = correlate_shape(matrix_shape, window_shape, stride_shape)?;
    let nd = window_shape.len();
    let lead = matrix_shape.len() - nd;
    let stride = broadcast_param(stride_shape, nd)?;
    let base = contiguous_strides(matrix_shape);

    let mut shape = correlated;
    shape.extend_from_slice(window_shape);

    let mut strides = base[..lead].to_vec();
    strides.extend(base[lead..].iter().zip(&stride).map(|(b, s)| b * s));
    strides.extend_from_slice(&base[lead..]);
    Ok((shape, strides))
}

/// Exposes every `window_shape` region of `matrix` (stepping by
/// `stride_shape`) as extra trailing dimensions.
///
/// The view has shape `(*leading, *correlated, *window_shape)`.
///
/// # Errors
/// Same as [`correlate_shape`].
pub fn sliding_window_view<'a>(
    matrix: &'a Tensor,
    window_shape: &[usize],
    stride_shape: &[usize],
) -> Result<StridedView<'a>> {
    let (shape, strides) = window_layout(matrix.shape(), window_shape, stride_shape)?;
    Ok(StridedView {
        data: matrix.data(),
        offset: 0,
        shape,
        strides,
    })
}

/// Writable variant of [`sliding_window_view`].
///
/// Only granted when windows cannot overlap, i.e. the stride is at least the
/// window size in every dimension.
///
/// # Errors
/// [`Error::InvalidArgument`] when windows would overlap; otherwise the same
/// as [`correlate_shape`].
pub fn sliding_window_view_mut<'a>(
    matrix: &'a mut Tensor,
    window_shape: &[usize],
    stride_shape: &[usize],
) -> Result<StridedViewMut<'a>> {
    let stride = broadcast_param(stride_shape, window_shape.len())?;
    if stride.iter().zip(window_shape).any(|(s, w)| s < w) {
        return Err(Error::invalid(format!(
            "writable window view requires stride {stride:?} >= window {window_shape:?}"
        )));
    }
    let (shape, strides) = window_layout(matrix.shape(), window_shape, stride_shape)?;
    Ok(StridedViewMut {
        data: matrix.data_mut(),
        offset: 0,
        shape,
        strides,
    })
}

/// Writable view selecting the strided sub-positions of a dilated tensor.
///
/// `target` must already have the dilated shape for a matrix of
/// `source_shape`. Every stride is at least 1, so the mapping is injective.
pub(crate) fn dilated_view_mut<'a>(
    target: &'a mut Tensor,
    source_shape: &[usize],
    stride: &[usize],
    pad: &[usize],
) -> StridedViewMut<'a> {
    let nd = stride.len();
    let lead = source_shape.len() - nd;
    let base = contiguous_strides(target.shape());
    let strides = base
        .iter()
        .enumerate()
        .map(|(d, &b)| if d < lead { b } else { b * stride[d - lead] })
        .collect();
    let offset = pad
        .iter()
        .enumerate()
        .map(|(i, &p)| p * base[lead + i])
        .sum();
    StridedViewMut {
        data: target.data_mut(),
        offset,
        shape: source_shape.to_vec(),
        strides,
    }
}

/// Row-major list of `Σ idx[d] * strides[d]` over all indices of `shape`.
fn relative_offsets(shape: &[usize], strides: &[usize]) -> Vec<usize> {
    let total: usize = shape.iter().product();
    if total == 0 {
        return Vec::new();
    }
    let mut out = Vec::with_capacity(total);
    let mut idx = vec![0; shape.len()];
    loop {
        out.push(idx.iter().zip(strides).map(|(i, s)| i * s).sum());
        if !next_index(&mut idx, shape) {
            break;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensor;

    #[test]
    fn window_view_shape_and_values() {
        let m = tensor!([[1, 2, 3], [4, 5, 6], [7, 8, 9]]);
        let view = sliding_window_view(&m, &[2, 2], &[1]).unwrap();
        assert_eq!(view.shape(), &[2, 2, 2, 2]);
        assert_eq!(view.get(&[1, 1, 0, 0]), 5.0);
        assert_eq!(view.get(&[1, 1, 1, 1]), 9.0);
        assert_eq!(view.get(&[0, 1, 1, 0]), 5.0);
    }

    #[test]
    fn window_view_is_empty_for_oversized_window() {
        let m = Tensor::ones(&[2, 2]);
        let view = sliding_window_view(&m, &[3, 3], &[1]).unwrap();
        assert!(view.is_empty());
        assert_eq!(view.outer_offsets(2), Vec::<usize>::new());
    }

    #[test]
    fn writable_view_requires_non_overlapping_windows() {
        let mut m = Tensor::zeros(&[4, 4]);
        assert!(sliding_window_view_mut(&mut m, &[2, 2], &[1, 2]).is_err());
        let mut view = sliding_window_view_mut(&mut m, &[2, 2], &[2]).unwrap();
        view.add_to_window(&[1, 0], 2, 3.0);
        view.add_to_window(&[0, 1], 2, 7.0);
        assert_eq!(
            m.data(),
            &[
                0.0, 0.0, 7.0, 7.0, //
                0.0, 0.0, 7.0, 7.0, //
                3.0, 3.0, 0.0, 0.0, //
                3.0, 3.0, 0.0, 0.0,
            ]
        );
    }

    #[test]
    fn to_tensor_copies_window() {
        let m = tensor!([[1, 2, 3], [4, 5, 6]]);
        let view = sliding_window_view(&m, &[2, 2], &[1, 1]).unwrap();
        let copy = view.to_tensor();
        assert_eq!(copy.shape(), &[1, 2, 2, 2]);
        assert_eq!(&copy.data()[4..], &[2.0, 3.0, 5.0, 6.0]);
    }
}
