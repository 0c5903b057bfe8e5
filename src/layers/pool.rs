use super::{Layer, PassContext, check_chw};
use crate::activation::{Activation, IDENTITY};
use crate::error::{Error, Result};
use crate::ops::cpu::{PoolMode, pool, pool_argmax};
use crate::ops::shape::{broadcast_param, next_index, pool_shape};
use crate::ops::view::{sliding_window_view, sliding_window_view_mut};
use crate::tensors::Tensor;
use crate::Real;
use std::fmt;

/// Parameter-free max or average pooling over the trailing dims of
/// `(C, H, W)`. The activation is the identity.
#[derive(Debug)]
pub struct Pool {
    input_shape: Vec<usize>,
    output_shape: Vec<usize>,
    kernel_shape: Vec<usize>,
    stride_shape: Vec<usize>,
    mode: PoolMode,
    bias: Tensor,
    weight: Tensor,
}

impl Pool {
    /// `stride_shape` defaults to `kernel_shape` when `None`.
    ///
    /// # Errors
    /// [`Error::InvalidArgument`] for malformed shapes or a window that does
    /// not fit the input.
    pub fn new(
        input_shape: &[usize],
        kernel_shape: &[usize],
        mode: PoolMode,
        stride_shape: Option<&[usize]>,
    ) -> Result<Self> {
        check_chw(input_shape, "input shape")?;
        if kernel_shape.is_empty() {
            return Err(Error::invalid("pooling kernel needs at least one dim"));
        }
        let stride = broadcast_param(stride_shape.unwrap_or(kernel_shape), kernel_shape.len())?;
        let output_shape = pool_shape(input_shape, kernel_shape, &stride)?;
        if output_shape.contains(&0) {
            return Err(Error::invalid(format!(
                "pool window {kernel_shape:?} does not fit input {input_shape:?}"
            )));
        }
        Ok(Self {
            input_shape: input_shape.to_vec(),
            output_shape,
            kernel_shape: kernel_shape.to_vec(),
            stride_shape: stride,
            mode,
            bias: Tensor::empty(),
            weight: Tensor::empty(),
        })
    }

    #[must_use]
    pub fn mode(&self) -> PoolMode {
        self.mode
    }

    fn has_disjoint_windows(&self) -> bool {
        self.stride_shape.iter().zip(&self.kernel_shape).all(|(s, k)| s >= k)
    }
}

impl Layer for Pool {
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

    fn weighted_input(&self, x: &Tensor, ctx: &mut PassContext) -> Result<Tensor> {
        let x = x.reshape(&self.input_shape)?;
        let z = match self.mode {
            PoolMode::Max => {
                let (z, routes) = pool_argmax(&x, &self.kernel_shape, &self.stride_shape)?;
                ctx.set_routes(routes);
                z
            }
            PoolMode::Average => pool(&x, &self.kernel_shape, &self.stride_shape, self.mode)?,
        };
        z.into_shape(&self.output_vector_shape())
    }

    fn derived_params(
        &self,
        _x: &Tensor,
        _delta: &Tensor,
        _ctx: &PassContext,
    ) -> Result<(Tensor, Tensor)> {
        Ok((Tensor::empty(), Tensor::empty()))
    }

    fn backpropagate(&self, x: &Tensor, delta: &Tensor, ctx: &PassContext) -> Result<Tensor> {
        let x = x.reshape(&self.input_shape)?;
        let delta = delta.reshape(&self.output_shape)?;
        let mut dcdx = x.zeros_like();

        match self.mode {
            PoolMode::Max => {
                let recomputed;
                let routes = match ctx.routes() {
                    Some(r) if r.len() == delta.len() => r,
                    _ => {
                        recomputed = pool_argmax(&x, &self.kernel_shape, &self.stride_shape)?.1;
                        recomputed.as_slice()
                    }
                };
                let out = dcdx.data_mut();
                for (&at, &d) in routes.iter().zip(delta.data()) {
                    out[at] += d;
                }
            }
            PoolMode::Average => {
                let nd = self.kernel_shape.len();
                let share = (self.kernel_shape.iter().product::<usize>() as Real).recip();
                if self.has_disjoint_windows() {
                    let mut view =
                        sliding_window_view_mut(&mut dcdx, &self.kernel_shape, &self.stride_shape)?;
                    let mut outer = vec![0; delta.ndim()];
                    for &d in delta.data() {
                        view.add_to_window(&outer, nd, d * share);
                        next_index(&mut outer, delta.shape());
                    }
                } else {
                    let view = sliding_window_view(&x, &self.kernel_shape, &self.stride_shape)?;
                    let window = view.window_offsets(nd);
                    let out = dcdx.data_mut();
                    for (base, &d) in view.outer_offsets(nd).into_iter().zip(delta.data()) {
                        for &w in &window {
                            out[base + w] += d * share;
                        }
                    }
                }
            }
        }
        dcdx.into_shape(&self.input_vector_shape())
    }
}

impl fmt::Display for Pool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "pool {}: {:?} -> {:?} (0)",
            self.mode, self.input_shape, self.output_shape
        )
    }
}
