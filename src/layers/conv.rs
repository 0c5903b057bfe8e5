use super::{Layer, PassContext, check_chw};
use crate::activation::Activation;
use crate::error::{Error, Result};
use crate::ops::cpu::{correlate, dilate};
use crate::ops::shape::{broadcast_param, correlate_shape};
use crate::tensors::Tensor;
use std::fmt;

/// A 2D convolution layer over `(C, H, W)` inputs producing `(F, H', W')`.
///
/// The forward pass *correlates* each of the `F` kernels `(C, kh, kw)` with
/// the input; kernels are not flipped. The bias holds one value per feature.
#[derive(Debug)]
pub struct Convolution {
    input_shape: Vec<usize>,
    output_shape: Vec<usize>,
    kernel_shape: [usize; 3],
    stride: [usize; 2],
    bias: Tensor,
    weight: Tensor,
    activation: Box<dyn Activation>,
}

impl Convolution {
    /// `kernel_shape` is `(kh, kw)`; the channel count is taken from the
    /// input. `stride_shape` has one or two entries.
    ///
    /// # Errors
    /// [`Error::InvalidArgument`] for a malformed shape, a zero stride, zero
    /// features, or a kernel larger than the input.
    pub fn new(
        input_shape: &[usize],
        kernel_shape: &[usize],
        features: usize,
        stride_shape: &[usize],
        activation: Box<dyn Activation>,
    ) -> Result<Self> {
        check_chw(input_shape, "input shape")?;
        let &[kh, kw] = kernel_shape else {
            return Err(Error::invalid(format!(
                "convolution kernel {kernel_shape:?} must be (height, width)"
            )));
        };
        if features == 0 {
            return Err(Error::invalid("convolution needs at least one output feature"));
        }
        let stride = broadcast_param(stride_shape, 2)?;
        let channels = input_shape[0];
        let correlated = correlate_shape(input_shape, &[channels, kh, kw], &[1, stride[0], stride[1]])?;
        if correlated.contains(&0) {
            return Err(Error::invalid(format!(
                "kernel {kernel_shape:?} does not fit input {input_shape:?}"
            )));
        }

        let mut layer = Self {
            input_shape: input_shape.to_vec(),
            output_shape: vec![features, correlated[1], correlated[2]],
            kernel_shape: [channels, kh, kw],
            stride: [stride[0], stride[1]],
            bias: Tensor::zeros(&[features, 1, 1]),
            weight: Tensor::zeros(&[features, channels, kh, kw]),
            activation,
        };
        layer.init_scaled_normal_params(&mut rand::rng());
        Ok(layer)
    }

    fn features(&self) -> usize {
        self.output_shape[0]
    }

    /// `[1, sh, sw]`, the stride over the `(C, H, W)` window.
    fn window_stride(&self) -> [usize; 3] {
        [1, self.stride[0], self.stride[1]]
    }
}

/// Copies the trailing `(h, w)` plane of every leading index into a tensor
/// of trailing size `(rows, cols)`, cropping or zero-extending at the end.
fn resize_plane(t: &Tensor, rows: usize, cols: usize) -> Tensor {
    let n = t.ndim();
    let (h, w) = (t.shape()[n - 2], t.shape()[n - 1]);
    let mut shape = t.shape()[..n - 2].to_vec();
    shape.extend_from_slice(&[rows, cols]);
    let mut out = Tensor::zeros(&shape);
    let planes: usize = t.shape()[..n - 2].iter().product();
    let (copy_r, copy_c) = (rows.min(h), cols.min(w));
    let src = t.data();
    let dst = out.data_mut();
    for p in 0..planes {
        for r in 0..copy_r {
            let s = p * h * w + r * w;
            let d = p * rows * cols + r * cols;
            dst[d..d + copy_c].copy_from_slice(&src[s..s + copy_c]);
        }
    }
    out
}

impl Layer for Convolution {
    fn bias(&self) -> &Tensor {
        &self.bias
    }

    fn weight(&self) -> &Tensor {
        &self.weight
    }

    fn params_mut(&mut self) -> (&mut Tensor, &mut Tensor) {
        (&mut self.bias, &mut self.weight)
    }

    fn activation(&self) -> &dyn Activation {
        self.activation.as_ref()
    }

    fn input_shape(&self) -> &[usize] {
        &self.input_shape
    }

    fn output_shape(&self) -> &[usize] {
        &self.output_shape
    }

    fn weighted_input(&self, x: &Tensor, _ctx: &mut PassContext) -> Result<Tensor> {
        let x = x.reshape(&self.input_shape)?;
        // (F, 1, H', W'): one correlation per kernel in the batch
        let mut z = correlate(&x, &self.weight, &self.window_stride(), Some(3))?;
        let plane = self.output_shape[1] * self.output_shape[2];
        for (chunk, &b) in z.data_mut().chunks_mut(plane).zip(self.bias.data()) {
            for v in chunk {
                *v += b;
            }
        }
        z.into_shape(&self.output_vector_shape())
    }

    fn derived_params(
        &self,
        x: &Tensor,
        delta: &Tensor,
        _ctx: &PassContext,
    ) -> Result<(Tensor, Tensor)> {
        let [channels, kh, kw] = self.kernel_shape;
        let (height, width) = (self.input_shape[1], self.input_shape[2]);
        let features = self.features();
        let delta = delta.reshape(&self.output_shape)?;

        let plane = self.output_shape[1] * self.output_shape[2];
        let del_b = Tensor::new(
            vec![features, 1, 1],
            delta.data().chunks(plane).map(|c| c.iter().sum()).collect(),
        );

        // stride-1 correlation of the input with the stride-dilated delta
        let dilated = dilate(&delta, &self.stride, &[0])?;
        let (dh, dw) = (dilated.shape()[1], dilated.shape()[2]);
        let dilated = dilated.into_shape(&[features, 1, dh, dw])?;
        let x = x.reshape(&[1, channels, height, width])?;
        let full = correlate(&x, &dilated, &[1], Some(2))?;
        // rows/cols past the last stride step never reached the kernel
        let del_w = resize_plane(&full, kh, kw);

        Ok((del_b, del_w))
    }

    fn backpropagate(&self, _x: &Tensor, delta: &Tensor, _ctx: &PassContext) -> Result<Tensor> {
        let [channels, kh, kw] = self.kernel_shape;
        let (height, width) = (self.input_shape[1], self.input_shape[2]);
        let features = self.features();
        let delta = delta.reshape(&self.output_shape)?;

        // full correlation of the dilated, padded delta with flipped kernels
        let padded = dilate(&delta, &self.stride, &[kh - 1, kw - 1])?;
        let (ph, pw) = (padded.shape()[1], padded.shape()[2]);
        let padded = padded.into_shape(&[features, 1, ph, pw])?;
        let flipped = self.weight.flip_trailing(2)?;
        let per_feature = correlate(&padded, &flipped, &[1], Some(2))?;

        let (oh, ow) = (per_feature.shape()[2], per_feature.shape()[3]);
        let block = channels * oh * ow;
        let mut summed = Tensor::zeros(&[channels, oh, ow]);
        for chunk in per_feature.data().chunks(block) {
            for (s, &v) in summed.data_mut().iter_mut().zip(chunk) {
                *s += v;
            }
        }
        resize_plane(&summed, height, width).into_shape(&self.input_vector_shape())
    }
}

impl fmt::Display for Convolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [c, kh, kw] = self.kernel_shape;
        write!(
            f,
            "{c}x{kh}x{kw} convolution: {:?} -> {:?} ({})",
            self.input_shape,
            self.output_shape,
            self.num_params()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activation::Identity;
    use crate::tensor;

    #[test]
    fn output_shape_follows_stride() {
        let conv = Convolution::new(&[2, 7, 6], &[3, 2], 4, &[2], Box::new(Identity)).unwrap();
        assert_eq!(conv.output_shape(), &[4, 3, 3]);
        assert_eq!(conv.weight().shape(), &[4, 2, 3, 2]);
        assert_eq!(conv.bias().shape(), &[4, 1, 1]);
        assert_eq!(conv.num_params(), 4 + 4 * 2 * 3 * 2);
        assert_eq!(conv.to_string(), "2x3x2 convolution: [2, 7, 6] -> [4, 3, 3] (52)");
    }

    #[test]
    fn rejects_kernel_larger_than_input() {
        assert!(Convolution::new(&[1, 2, 2], &[3, 3], 1, &[1], Box::new(Identity)).is_err());
    }

    #[test]
    fn forward_correlates_and_adds_bias() {
        let mut conv = Convolution::new(&[1, 3, 3], &[2, 2], 1, &[1], Box::new(Identity)).unwrap();
        conv.update_params(tensor!([[[10]]]), tensor!([[[[1, 0], [0, -1]]]]))
            .unwrap();
        let x = tensor!([[[1, 2, 3], [4, 5, 6], [7, 8, 9]]]);
        let z = conv.weighted_input(&x, &mut PassContext::new()).unwrap();
        assert_eq!(z.shape(), &[1, 4, 1]);
        assert_eq!(z.data(), &[6.0, 6.0, 6.0, 6.0]);
    }

    #[test]
    fn resize_plane_crops_and_extends() {
        let t = tensor!([[[1, 2, 3], [4, 5, 6]]]);
        assert_eq!(resize_plane(&t, 1, 2), tensor!([[[1, 2]]]));
        assert_eq!(resize_plane(&t, 3, 4), tensor!([[[1, 2, 3, 0], [4, 5, 6, 0], [0, 0, 0, 0]]]));
    }
}
