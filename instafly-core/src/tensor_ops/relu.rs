use super::utilities::{try_unary_op, UnaryDerivative};
use crate::tensor::{Error, Tape, Tensor};

#[derive(Debug, Default, Copy, Clone)]
pub(crate) struct ReLUKernelOp;

impl UnaryDerivative for ReLUKernelOp {
    const DF_USES_FX: bool = false;
    fn f(&self, x: f32) -> f32 {
        x.max(0.0)
    }
    fn df(&self, x: f32) -> f32 {
        if x > 0.0 {
            1.0
        } else {
            0.0
        }
    }
}

impl<T: Tape> Tensor<T> {
    /// [Rectified Linear Unit (ReLU)](https://en.wikipedia.org/wiki/Rectifier_(neural_networks)).
    /// The derivative is 0 at 0.
    pub fn try_relu(self) -> Result<Self, Error> {
        try_unary_op(ReLUKernelOp, self)
    }
}

#[cfg(test)]
mod tests {
    use crate::tests::*;

    #[test]
    fn test_relu() {
        let dev: TestDevice = Default::default();
        let x = dev.tensor([-2.0, -1.0, 0.0, 1.0, 2.0]);
        let r = x.leaky_trace().try_relu().unwrap();
        assert_close(r.as_slice(), &[0.0, 0.0, 0.0, 1.0, 2.0]);
        let g = r.try_sum().unwrap().try_backward().unwrap();
        assert_close(g.get_ref_checked(&x).unwrap(), &[0.0, 0.0, 0.0, 1.0, 1.0]);
    }
}
