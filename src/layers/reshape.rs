use super::{Layer, PassContext, check_chw};
use crate::activation::{Activation, IDENTITY};
use crate::error::{Error, Result};
use crate::tensors::Tensor;
use std::fmt;

/// Reinterprets a `(C, H, W)` sample as another `(C', H', W')` with the same
/// element count, e.g. to flatten pooled features before a fully connected
/// layer.
#[derive(Debug)]
pub struct Reshape {
    input_shape: Vec<usize>,
    output_shape: Vec<usize>,
    bias: Tensor,
    weight: Tensor,
}

impl Reshape {
    /// # Errors
    /// [`Error::InvalidArgument`] for malformed shapes or differing element counts.
    pub fn new(input_shape: &[usize], output_shape: &[usize]) -> Result<Self> {
        check_chw(input_shape, "input shape")?;
        check_chw(output_shape, "output shape")?;
        let (n_in, n_out) = (
            input_shape.iter().product::<usize>(),
            output_shape.iter().product::<usize>(),
        );
        if n_in != n_out {
            return Err(Error::invalid(format!(
                "cannot reshape {input_shape:?} ({n_in}) into {output_shape:?} ({n_out})"
            )));
        }
        Ok(Self {
            input_shape: input_shape.to_vec(),
            output_shape: output_shape.to_vec(),
            bias: Tensor::empty(),
            weight: Tensor::empty(),
        })
    }
}

impl Layer for Reshape {
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
        &IDENTITY
    }

    fn input_shape(&self) -> &[usize] {
        &self.input_shape
    }

    fn output_shape(&self) -> &[usize] {
        &self.output_shape
    }

    fn weighted_input(&self, x: &Tensor, _ctx: &mut PassContext) -> Result<Tensor> {
        x.reshape(&self.input_shape)?
            .into_shape(&self.output_vector_shape())
    }

    fn derived_params(
        &self,
        _x: &Tensor,
        _delta: &Tensor,
        _ctx: &PassContext,
    ) -> Result<(Tensor, Tensor)> {
        Ok((Tensor::empty(), Tensor::empty()))
    }

    fn backpropagate(&self, _x: &Tensor, delta: &Tensor, _ctx: &PassContext) -> Result<Tensor> {
        delta
            .reshape(&self.output_vector_shape())?
            .into_shape(&self.input_vector_shape())
    }
}

impl fmt::Display for Reshape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "reshape: {:?} -> {:?} (0)", self.input_shape, self.output_shape)
    }
}
