//! # Strided Tensor Operations
//!
//! Shape arithmetic, zero-copy window views and the CPU kernels built on them.
//!
//! ## Submodules
//!
//! - [`shape`]: pure shape arithmetic (`correlate_shape`, `dilate_shape`, `pool_shape`)
//! - [`view`]: read-only and writable strided views, `sliding_window_view`
//! - [`cpu`]: multi-threaded `correlate`, `dilate`, `pool` kernels
//!
//! Parameter shapes always describe the *trailing* dims of a matrix. A stride
//! or pad given with one entry is broadcast to the kernel's dimensionality.
//!
//! Example:
//! ```rust
//! use stride_nn::ops::{cpu::correlate, shape::correlate_shape};
//! use stride_nn::tensors::Tensor;
//!
//! let m = Tensor::ones(&[6, 8]);
//! let k = Tensor::ones(&[3, 3]);
//! let out = correlate(&m, &k, &[2, 3], None).unwrap();
//! assert_eq!(out.shape(), correlate_shape(&[6, 8], &[3, 3], &[2, 3]).unwrap().as_slice());
//! ```

pub mod cpu;
pub mod shape;
pub mod view;

pub use cpu::{PoolMode, correlate, dilate, pool, pool_argmax};
pub use shape::{correlate_shape, dilate_shape, pool_shape};
pub use view::{StridedView, StridedViewMut, sliding_window_view, sliding_window_view_mut};
