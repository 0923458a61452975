use rand_distr::Uniform;

use super::{join_path, BuildOnDevice, Module, TensorCollection};
use crate::{
    shapes::Shape,
    tensor::{Cpu, Error, Tape, Tensor},
};

/// Describes a [Linear] layer mapping `inp` features to `out` features.
///
/// ```rust
/// # use instafly_core::prelude::*;
/// # fn main() -> Result<(), Error> {
/// let dev: Cpu = Default::default();
/// let model = dev.try_build_module(LinearConfig::new(5, 2))?;
/// assert_eq!(model.weight.shape(), &Shape::from([5, 2]));
/// assert_eq!(model.bias.shape(), &Shape::from([2]));
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinearConfig {
    pub inp: usize,
    pub out: usize,
}

impl LinearConfig {
    pub fn new(inp: usize, out: usize) -> Self {
        Self { inp, out }
    }
}

/// A linear transformation of the form `x * weight + bias`, where `x` is a
/// `(batch, inp)` matrix.
///
/// Initializes [Self::weight] and [Self::bias] from a [Uniform] distribution
/// between [-1 / sqrt(inp), 1 / sqrt(inp)].
#[derive(Debug, Clone)]
pub struct Linear {
    /// Transposed weight matrix, shape `(inp, out)`
    pub weight: Tensor,

    /// Bias vector, shape `(out, )`
    pub bias: Tensor,
}

impl BuildOnDevice for LinearConfig {
    type Built = Linear;
    fn try_build_on_device(&self, device: &Cpu) -> Result<Linear, Error> {
        let bound = 1.0 / (self.inp.max(1) as f32).sqrt();
        let distr = Uniform::new(-bound, bound);
        Ok(Linear {
            weight: device.sample([self.inp, self.out], distr),
            bias: device.sample([self.out], distr),
        })
    }
}

impl TensorCollection for Linear {
    fn try_visit(
        &self,
        prefix: &str,
        f: &mut dyn FnMut(&str, &Tensor) -> Result<(), Error>,
    ) -> Result<(), Error> {
        f(&join_path(prefix, "weight"), &self.weight)?;
        f(&join_path(prefix, "bias"), &self.bias)
    }

    fn try_visit_mut(
        &mut self,
        prefix: &str,
        f: &mut dyn FnMut(&str, &mut Tensor) -> Result<(), Error>,
    ) -> Result<(), Error> {
        f(&join_path(prefix, "weight"), &mut self.weight)?;
        f(&join_path(prefix, "bias"), &mut self.bias)
    }
}

impl<T: Tape> Module<Tensor<T>> for Linear {
    type Output = Tensor<T>;

    /// Accepts `(inp, )` vectors as well as `(batch, inp)` matrices.
    fn try_forward(&self, x: Tensor<T>) -> Result<Self::Output, Error> {
        match x.shape().dims() {
            &[inp] => {
                let out = self.bias.shape().num_elements();
                x.try_reshape([1, inp])?
                    .try_matmul(self.weight.clone())?
                    .try_broadcast_add(self.bias.clone())?
                    .try_reshape(Shape::from([out]))
            }
            _ => x
                .try_matmul(self.weight.clone())?
                .try_broadcast_add(self.bias.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::*;

    // (inp, out) layout of a 5 -> 2 layer
    const W: [f32; 10] = [
        -0.3458893, 0.11733949, -0.30371523, 0.14059687, -0.3712057, -0.10670426, 0.14303583,
        -0.09373143, -0.0268966, 0.18974298,
    ];
    const B: [f32; 2] = [0.3765365, -0.290717];

    fn fixed_linear(dev: &TestDevice) -> Linear {
        Linear {
            weight: dev.try_tensor_from_vec(W.to_vec(), [5, 2]).unwrap(),
            bias: dev.tensor(B),
        }
    }

    #[test]
    fn test_linear_initialize() {
        let dev: TestDevice = Default::default();
        let m = dev.try_build_module(LinearConfig::new(2000, 1)).unwrap();
        let bound = 1.0 / 2000.0f32.sqrt();
        for v in m.weight.as_vec() {
            assert!(-bound <= v && v <= bound && v != 0.0);
        }
        for v in m.bias.as_vec() {
            assert!(-bound <= v && v <= bound && v != 0.0);
        }
    }

    #[test]
    fn test_forward_1d() {
        let dev: TestDevice = Default::default();
        let model = fixed_linear(&dev);
        let x = dev.tensor([-0.8808001, 2.4185333, 2.2478335, 0.0565211, 2.031299]);
        let y = model.try_forward(x.leaky_trace()).unwrap();
        assert_close(y.as_slice(), &[-0.93430865, 0.08624211]);

        let g = y.try_mean().unwrap().try_backward().unwrap();
        assert_close(
            g.get_ref_checked(&model.weight).unwrap(),
            &[
                -0.44040006, -0.44040006, 1.2092667, 1.2092667, 1.1239168, 1.1239168,
                0.02826055, 0.02826055, 1.0156495, 1.0156495,
            ],
        );
        assert_close(g.get_ref_checked(&model.bias).unwrap(), &[0.5; 2]);
    }

    #[test]
    fn test_forward_2d() {
        let dev: TestDevice = Default::default();
        let model = fixed_linear(&dev);
        let x = dev
            .try_tensor_from_vec(
                vec![
                    -1.9468665, 1.4611785, -1.6698982, 1.408863, 1.3425643, -0.4457622,
                    -0.8808001, 2.4185333, 2.2478335, 0.0565211,
                ],
                [2, 5],
            )
            .unwrap();
        let y = model.try_forward(x.leaky_trace()).unwrap();
        assert_eq!(y.shape(), &Shape::from([2, 2]));
        let g = y.try_mean().unwrap().try_backward().unwrap();
        assert_close(g.get_ref_checked(&model.bias).unwrap(), &[0.5; 2]);
        let gx = g.get_ref_checked(&x).unwrap();
        assert_close(&gx[..5], &gx[5..]);
    }

    #[test]
    fn test_wrong_input_features() {
        let dev: TestDevice = Default::default();
        let model = fixed_linear(&dev);
        assert!(model.try_forward(dev.zeros([3, 4])).is_err());
    }
}
