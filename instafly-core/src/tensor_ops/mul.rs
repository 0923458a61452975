use super::utilities::{try_binary_op, BinaryDerivative};
use crate::tensor::{Error, Merge, Tape, Tensor};

#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct BinaryMulKernelOp;

impl BinaryDerivative for BinaryMulKernelOp {
    fn f(&self, x: f32, y: f32) -> f32 {
        x * y
    }
    fn dfdx(&self, _: f32, y: f32) -> f32 {
        y
    }
    fn dfdy(&self, x: f32, _: f32) -> f32 {
        x
    }
}

impl<LTape: Tape> Tensor<LTape> {
    /// Element wise multiplication of two tensors with the same shape.
    pub fn try_mul<RTape>(self, rhs: Tensor<RTape>) -> Result<Self, Error>
    where
        LTape: Merge<RTape>,
    {
        try_binary_op(BinaryMulKernelOp, self, rhs)
    }
}

#[cfg(test)]
mod tests {
    use crate::tests::*;

    #[test]
    fn test_mul_1d() {
        let dev: TestDevice = Default::default();
        let a = dev.tensor([1.0, 2.0, 3.0]);
        let b = dev.tensor([1.0, -1.0, 0.0]);

        let r = a.leaky_trace().try_mul(b.clone()).unwrap();
        assert_close(r.as_slice(), &[1.0, -2.0, 0.0]);
        let g = r.try_sum().unwrap().try_backward().unwrap();
        assert_close(g.get_ref_checked(&a).unwrap(), &[1.0, -1.0, 0.0]);
        assert_close(g.get_ref_checked(&b).unwrap(), &[1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_mul_with_itself() {
        let dev: TestDevice = Default::default();
        let a = dev.tensor([1.0, -2.0]);
        let r = a.leaky_trace().try_mul(a.clone()).unwrap();
        assert_close(r.as_slice(), &[1.0, 4.0]);
        let g = r.try_sum().unwrap().try_backward().unwrap();
        assert_close(g.get_ref_checked(&a).unwrap(), &[2.0, -4.0]);
    }
}
