use super::{BuildOnDevice, Module, TensorCollection};
use crate::{
    shapes::Shape,
    tensor::{Cpu, Error, Tape, Tensor},
};

/// Flattens everything but the first (batch) axis, so `(B, H, W, C)` becomes
/// `(B, H * W * C)`.
#[derive(Default, Debug, Clone, Copy)]
pub struct Flatten;

impl BuildOnDevice for Flatten {
    type Built = Self;
    fn try_build_on_device(&self, _: &Cpu) -> Result<Self, Error> {
        Ok(*self)
    }
}

impl TensorCollection for Flatten {
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

impl<T: Tape> Module<Tensor<T>> for Flatten {
    type Output = Tensor<T>;
    fn try_forward(&self, input: Tensor<T>) -> Result<Self::Output, Error> {
        let batch = match input.shape().dims().first() {
            Some(&b) => b,
            None => {
                return Err(Error::ShapeMismatch {
                    expected: Shape::from([1, input.shape().num_elements()]),
                    found: input.shape().clone(),
                })
            }
        };
        let rest = input.shape().trailing_elements();
        input.try_reshape([batch, rest])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::*;

    #[test]
    fn test_flattens() {
        let dev: TestDevice = Default::default();
        let y = Flatten.try_forward(dev.zeros([5, 4, 3, 2])).unwrap();
        assert_eq!(y.shape(), &Shape::from([5, 24]));
        let y = Flatten.try_forward(dev.zeros([7])).unwrap();
        assert_eq!(y.shape(), &Shape::from([7, 1]));
        assert!(Flatten.try_forward(dev.scalar(1.0)).is_err());
    }
}
