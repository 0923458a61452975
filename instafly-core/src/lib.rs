//! # instafly-core
//!
//! A small tape based autodiff engine with just enough neural network
//! machinery to train a convolutional image scorer, plus optimizers that
//! work directly on a network's *input*.
//!
//! # Tensors
//!
//! *See [tensor] and [tensor_ops] for more information.*
//!
//! A [tensor::Tensor] is a row-major `f32` array with a runtime [shapes::Shape],
//! created through a [tensor::Cpu] device:
//!
//! ```rust
//! # use instafly_core::prelude::*;
//! let dev: Cpu = Default::default();
//! let a = dev.zeros([1, 64, 64, 3]);
//! let b = dev.sample_uniform([2, 3]);
//! let c = dev.tensor([1.0, 2.0, 3.0]);
//! assert_eq!(a.shape().num_elements(), 64 * 64 * 3);
//! ```
//!
//! # Neural networks
//!
//! *See [nn] for more information.*
//!
//! Layers are described by configs and built on a device. Tuples run their
//! members in sequence:
//!
//! ```rust
//! # use instafly_core::prelude::*;
//! # fn main() -> Result<(), Error> {
//! let dev: Cpu = Default::default();
//! let arch = (LinearConfig::new(4, 8), ReLU, LinearConfig::new(8, 1));
//! let model = dev.try_build_module(arch)?;
//! let y = model.try_forward(dev.sample_uniform([3, 4]))?;
//! assert_eq!(y.shape(), &Shape::from([3, 1]));
//! # Ok(())
//! # }
//! ```
//!
//! # Optimizing
//!
//! *See [optim] for more information.*
//!
//! [optim::Sgd] updates the parameters of a network from a [tensor::Gradients].
//! [optim::Minimizer] goes the other way: it keeps the network fixed and
//! repeatedly steps a single input tensor with an [optim::UpdateRule] such as
//! [optim::MomentumAscent].

pub mod losses;
pub mod nn;
pub mod optim;
pub mod shapes;
pub mod tensor;
pub mod tensor_ops;

/// Contains all the public types, traits and functions.
pub mod prelude {
    pub use crate::losses::*;
    pub use crate::nn::*;
    pub use crate::optim::*;
    pub use crate::shapes::*;
    pub use crate::tensor::*;
}

#[cfg(test)]
pub(crate) mod tests {
    pub use crate::tensor::Cpu;

    pub type TestDevice = Cpu;

    pub const DEFAULT_TOLERANCE: f32 = 1e-5;

    #[track_caller]
    pub fn assert_close(lhs: &[f32], rhs: &[f32]) {
        assert_close_with_tolerance(lhs, rhs, DEFAULT_TOLERANCE)
    }

    #[track_caller]
    pub fn assert_close_with_tolerance(lhs: &[f32], rhs: &[f32], tolerance: f32) {
        assert_eq!(lhs.len(), rhs.len(), "lengths differ\n\n{lhs:?}\n\n{rhs:?}");
        for (l, r) in lhs.iter().zip(rhs.iter()) {
            if (l - r).abs() > tolerance {
                panic!("lhs != rhs | {l} != {r}\n\n{lhs:?}\n\n{rhs:?}");
            }
        }
    }
}
