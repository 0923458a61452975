use super::{BuildOnDevice, Module, TensorCollection};
use crate::tensor::{Cpu, Error, Tape, Tensor};

/// Unit struct that impls [Module] as calling [Tensor::try_relu] on `input`.
#[derive(Default, Debug, Clone, Copy)]
pub struct ReLU;

impl BuildOnDevice for ReLU {
    type Built = Self;
    fn try_build_on_device(&self, _: &Cpu) -> Result<Self, Error> {
        Ok(*self)
    }
}

impl TensorCollection for ReLU {
    fn try_visit(
        &self,
        _: &str,
        _: &mut dyn FnMut(&str, &Tensor) -> Result<(), Error>,
    ) -> Result<(), Error> {
        Ok(())
    }

    fn try_visit_mut(
        &mut self,
        _: &str,
        _: &mut dyn FnMut(&str, &mut Tensor) -> Result<(), Error>,
    ) -> Result<(), Error> {
        Ok(())
    }
}

impl<T: Tape> Module<Tensor<T>> for ReLU {
    type Output = Tensor<T>;
    fn try_forward(&self, input: Tensor<T>) -> Result<Self::Output, Error> {
        input.try_relu()
    }
}
