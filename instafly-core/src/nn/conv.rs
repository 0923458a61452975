use rand_distr::Uniform;

use super::{join_path, BuildOnDevice, Module, TensorCollection};
use crate::tensor::{Cpu, Error, Tape, Tensor};

/// Describes a [Conv2D] layer acting on channels last images.
///
/// `stride` and `padding` apply to both height and width.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Conv2DConfig {
    pub in_chan: usize,
    pub out_chan: usize,
    pub kernel_size: usize,
    pub stride: usize,
    pub padding: usize,
}

impl Conv2DConfig {
    /// Stride `1` and no padding.
    pub fn new(in_chan: usize, out_chan: usize, kernel_size: usize) -> Self {
        Self {
            in_chan,
            out_chan,
            kernel_size,
            stride: 1,
            padding: 0,
        }
    }

    pub fn with_stride(self, stride: usize) -> Self {
        Self { stride, ..self }
    }

    pub fn with_padding(self, padding: usize) -> Self {
        Self { padding, ..self }
    }
}

/// Performs 2d convolutions on `(batch, height, width, in_chan)` images.
///
/// **Pytorch Equivalent**: `torch.nn.Conv2d` with channels last tensors.
#[derive(Debug, Clone)]
pub struct Conv2D {
    /// Shape `(kernel_size, kernel_size, in_chan, out_chan)`
    pub weight: Tensor,
    /// Shape `(out_chan, )`
    pub bias: Tensor,
    pub stride: usize,
    pub padding: usize,
}

impl BuildOnDevice for Conv2DConfig {
    type Built = Conv2D;
    fn try_build_on_device(&self, device: &Cpu) -> Result<Conv2D, Error> {
        let k = self.kernel_size;
        let fan_in = (self.in_chan * k * k).max(1) as f32;
        let bound = 1.0 / fan_in.sqrt();
        let distr = Uniform::new(-bound, bound);
        Ok(Conv2D {
            weight: device.sample([k, k, self.in_chan, self.out_chan], distr),
            bias: device.sample([self.out_chan], distr),
            stride: self.stride,
            padding: self.padding,
        })
    }
}

impl TensorCollection for Conv2D {
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

impl<T: Tape> Module<Tensor<T>> for Conv2D {
    type Output = Tensor<T>;
    fn try_forward(&self, x: Tensor<T>) -> Result<Self::Output, Error> {
        x.try_conv2d(self.weight.clone(), self.stride, self.padding)?
            .try_broadcast_add(self.bias.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{shapes::Shape, tests::*};

    #[test]
    fn test_conv2d_initialize() {
        let dev: TestDevice = Default::default();
        let m = dev
            .try_build_module(Conv2DConfig::new(3, 8, 3).with_stride(2).with_padding(1))
            .unwrap();
        assert_eq!(m.weight.shape(), &Shape::from([3, 3, 3, 8]));
        assert_eq!(m.bias.shape(), &Shape::from([8]));
        let bound = 1.0 / 27.0f32.sqrt();
        assert!(m.weight.as_slice().iter().all(|&v| -bound <= v && v <= bound));
    }

    #[test]
    fn test_conv2d_forward_adds_bias() {
        let dev: TestDevice = Default::default();
        let m = Conv2D {
            weight: dev.zeros([3, 3, 2, 4]),
            bias: dev.tensor([1.0, 2.0, 3.0, 4.0]),
            stride: 2,
            padding: 1,
        };
        let x = dev.sample_uniform([1, 6, 6, 2]);
        let y = m.try_forward(x.leaky_trace()).unwrap();
        assert_eq!(y.shape(), &Shape::from([1, 3, 3, 4]));
        assert_close(&y.as_slice()[..4], &[1.0, 2.0, 3.0, 4.0]);

        let g = y.try_sum().unwrap().try_backward().unwrap();
        assert_close(g.get_ref_checked(&m.bias).unwrap(), &[9.0; 4]);
        assert!(g.get_ref_checked(&m.weight).is_some());
        assert!(g.get_ref_checked(&x).is_some());
    }
}
