//! Optimizers for both directions of a network.
//!
//! # Updating network parameters
//!
//! [Sgd] implements [Optimizer] for any [crate::nn::TensorCollection]: compute a
//! loss on a traced input, backprop, then hand the [crate::tensor::Gradients]
//! to [Optimizer::update]:
//!
//! ```rust
//! # use instafly_core::prelude::*;
//! # fn main() -> Result<(), Error> {
//! let dev: Cpu = Default::default();
//! let mut model = dev.try_build_module(LinearConfig::new(5, 2))?;
//! let mut opt = Sgd::new(&model, Default::default());
//! let y = model.try_forward(dev.zeros([3, 5]).leaky_traced())?;
//! let loss = mse_loss(y, dev.ones([3, 2]))?;
//! let gradients = loss.try_backward()?;
//! opt.update(&mut model, &gradients)?;
//! # Ok(())
//! # }
//! ```
//!
//! # Optimizing an input
//!
//! A [Minimizer] keeps a network fixed and instead walks a single input tensor
//! downhill on a scalar objective, one [UpdateRule] step at a time. With the
//! objective set to the negated network output this maximizes the output.

mod minimizer;
mod momentum;
mod sgd;

pub use minimizer::{value_and_grad, FnTarget, MinimizeTarget, Minimizer};
pub use momentum::{MomentumAscent, MomentumConfig, UpdateRule};
pub use sgd::{Momentum, Sgd, SgdConfig, WeightDecay};

use crate::tensor::{Error, Gradients};

/// All optimizers must implement the update function, which takes a `M`
/// and updates all of its parameters.
///
/// Parameters that have no gradient are collected and reported as
/// [Error::UnusedTensors] after every other parameter has been updated.
pub trait Optimizer<M> {
    /// Updates all of `module`'s parameters using `gradients`.
    fn update(&mut self, module: &mut M, gradients: &Gradients) -> Result<(), Error>;
}
