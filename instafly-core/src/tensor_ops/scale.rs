use super::utilities::{try_unary_op, UnaryDerivative};
use crate::tensor::{Error, Tape, Tensor};

#[derive(Debug, Copy, Clone)]
pub(crate) struct ScaleKernelOp(f32);

impl UnaryDerivative for ScaleKernelOp {
    const DF_USES_FX: bool = false;
    fn f(&self, x: f32) -> f32 {
        x * self.0
    }
    fn df(&self, _: f32) -> f32 {
        self.0
    }
}

impl<T: Tape> Tensor<T> {
    /// Multiplies every element by `s`.
    pub fn try_scale(self, s: f32) -> Result<Self, Error> {
        try_unary_op(ScaleKernelOp(s), self)
    }
}

#[cfg(test)]
mod tests {
    use crate::tests::*;

    #[test]
    fn test_scale() {
        let dev: TestDevice = Default::default();
        let x = dev.tensor([1.0, -2.0]);
        let r = x.leaky_trace().try_scale(-0.5).unwrap();
        assert_close(r.as_slice(), &[-0.5, 1.0]);
        let g = r.try_sum().unwrap().try_backward().unwrap();
        assert_close(g.get_ref_checked(&x).unwrap(), &[-0.5, -0.5]);
    }
}
