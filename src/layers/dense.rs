use super::{Layer, PassContext, check_chw, vector_shape};
use crate::activation::Activation;
use crate::error::{Error, Result};
use crate::tensors::Tensor;
use std::fmt;

/// A fully connected layer, applied per channel: `z = W · x + b`.
///
/// With input `(C, H, W)` and output `(C, H', W')` the bias has shape
/// `(C, H' * W', 1)` and the weight `(C, H' * W', H * W)`.
#[derive(Debug)]
pub struct FullyConnected {
    input_shape: Vec<usize>,
    output_shape: Vec<usize>,
    bias: Tensor,
    weight: Tensor,
    activation: Box<dyn Activation>,
}

impl FullyConnected {
    /// Builds the layer with scaled-normal parameters from the thread RNG.
    ///
    /// # Errors
    /// [`Error::InvalidArgument`] if a shape is not `(C, H, W)` or the
    /// channel counts differ.
    pub fn new(
        input_shape: &[usize],
        output_shape: &[usize],
        activation: Box<dyn Activation>,
    ) -> Result<Self> {
        check_chw(input_shape, "input shape")?;
        check_chw(output_shape, "output shape")?;
        if input_shape[0] != output_shape[0] {
            return Err(Error::invalid(format!(
                "input channels {} must match output channels {}",
                input_shape[0], output_shape[0]
            )));
        }
        let channels = input_shape[0];
        let nx = vector_shape(input_shape)[1];
        let ny = vector_shape(output_shape)[1];

        let mut layer = Self {
            input_shape: input_shape.to_vec(),
            output_shape: output_shape.to_vec(),
            bias: Tensor::zeros(&[channels, ny, 1]),
            weight: Tensor::zeros(&[channels, ny, nx]),
            activation,
        };
        layer.init_scaled_normal_params(&mut rand::rng());
        Ok(layer)
    }
}

impl Layer for FullyConnected {
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
        let x = x.reshape(&self.input_vector_shape())?;
        self.weight.matmul(&x)?.add(&self.bias)
    }

    fn derived_params(
        &self,
        x: &Tensor,
        delta: &Tensor,
        _ctx: &PassContext,
    ) -> Result<(Tensor, Tensor)> {
        let x = x.reshape(&self.input_vector_shape())?;
        let delta = delta.reshape(&self.output_vector_shape())?;
        let del_w = delta.matmul(&x.transpose_2d()?)?;
        Ok((delta, del_w))
    }

    fn backpropagate(&self, _x: &Tensor, delta: &Tensor, _ctx: &PassContext) -> Result<Tensor> {
        let delta = delta.reshape(&self.output_vector_shape())?;
        self.weight.transpose_2d()?.matmul(&delta)
    }
}

impl fmt::Display for FullyConnected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "fully connected: {:?} -> {:?} ({})",
            self.input_shape,
            self.output_shape,
            self.num_params()
        )
    }
}
