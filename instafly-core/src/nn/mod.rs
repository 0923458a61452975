//! High level neural network building blocks such as [Linear], [Conv2D],
//! activations, and tuples as [Module]s.
//!
//! # Mental model for modules
//!
//! A layer is described by a small `Copy` config (e.g. [LinearConfig]), which is
//! turned into the actual layer holding tensors with [Cpu::try_build_module]:
//!
//! ```rust
//! # use instafly_core::prelude::*;
//! # fn main() -> Result<(), Error> {
//! let dev: Cpu = Default::default();
//! let model: Linear = dev.try_build_module(LinearConfig::new(5, 2))?;
//! let y = model.try_forward(dev.zeros([10, 5]))?;
//! assert_eq!(y.shape(), &Shape::from([10, 2]));
//! # Ok(())
//! # }
//! ```
//!
//! Tuples of configs build tuples of modules, and a tuple of modules calls its
//! members one after another.
//!
//! # Parameters
//!
//! Every module implements [TensorCollection], which walks all of its
//! parameters together with a dotted path such as `1.weight`. This is what
//! [crate::optim::Sgd] and the safetensors helpers
//! ([crate::tensor::SaveToSafetensors], [crate::tensor::LoadFromSafetensors])
//! are built on.

mod activations;
mod conv;
mod flatten;
mod linear;
mod tuples;

pub use activations::ReLU;
pub use conv::{Conv2D, Conv2DConfig};
pub use flatten::Flatten;
pub use linear::{Linear, LinearConfig};

use crate::tensor::{Cpu, Error, Tensor};

/// A unit of a neural network. Acts on the generic `Input`
/// and produces `Module::Output`.
pub trait Module<Input> {
    /// The type that this unit produces given `Input`.
    type Output;

    fn try_forward(&self, input: Input) -> Result<Self::Output, Error>;
}

/// Something that can be built on a [Cpu], typically the config of a layer.
pub trait BuildOnDevice {
    type Built;
    fn try_build_on_device(&self, device: &Cpu) -> Result<Self::Built, Error>;
}

impl Cpu {
    /// Builds the module described by `arch`, sampling its parameters from
    /// this device's rng.
    pub fn try_build_module<M: BuildOnDevice>(&self, arch: M) -> Result<M::Built, Error> {
        arch.try_build_on_device(self)
    }
}

/// Something that owns named tensors, which are visited in a fixed order.
pub trait TensorCollection {
    /// Calls `f` with the full path and a reference to every tensor.
    fn try_visit(
        &self,
        prefix: &str,
        f: &mut dyn FnMut(&str, &Tensor) -> Result<(), Error>,
    ) -> Result<(), Error>;

    /// Calls `f` with the full path and a mutable reference to every tensor.
    fn try_visit_mut(
        &mut self,
        prefix: &str,
        f: &mut dyn FnMut(&str, &mut Tensor) -> Result<(), Error>,
    ) -> Result<(), Error>;

    /// Total number of scalar parameters.
    fn num_params(&self) -> usize {
        let mut total = 0;
        // the visitor never fails
        let _ = self.try_visit("", &mut |_, t| {
            total += t.shape().num_elements();
            Ok(())
        });
        total
    }
}

impl TensorCollection for Tensor {
    fn try_visit(
        &self,
        prefix: &str,
        f: &mut dyn FnMut(&str, &Tensor) -> Result<(), Error>,
    ) -> Result<(), Error> {
        f(prefix, self)
    }

    fn try_visit_mut(
        &mut self,
        prefix: &str,
        f: &mut dyn FnMut(&str, &mut Tensor) -> Result<(), Error>,
    ) -> Result<(), Error> {
        f(prefix, self)
    }
}

/// Joins `prefix` and `name` with a `.`, skipping the dot for an empty prefix.
pub(crate) fn join_path(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}.{name}")
    }
}
