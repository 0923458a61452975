use super::utilities::{try_unary_op, UnaryDerivative};
use crate::tensor::{Error, Tape, Tensor};

#[derive(Debug, Default, Copy, Clone)]
pub(crate) struct NegateKernelOp;

impl UnaryDerivative for NegateKernelOp {
    const DF_USES_FX: bool = false;
    fn f(&self, x: f32) -> f32 {
        -x
    }
    fn df(&self, _: f32) -> f32 {
        -1.0
    }
}

impl<T: Tape> Tensor<T> {
    /// Negates all elements.
    pub fn try_negate(self) -> Result<Self, Error> {
        try_unary_op(NegateKernelOp, self)
    }
}

#[cfg(test)]
mod tests {
    use crate::tests::*;

    #[test]
    fn test_1d_neg() {
        let dev: TestDevice = Default::default();
        let a = dev.tensor([-2.0, 0.0, 5.0]);
        let r = a.leaky_trace().try_negate().unwrap();
        assert_close(r.as_slice(), &[2.0, 0.0, -5.0]);
        let g = r.try_sum().unwrap().try_backward().unwrap();
        assert_close(g.get_ref_checked(&a).unwrap(), &[-1.0; 3]);
    }
}
