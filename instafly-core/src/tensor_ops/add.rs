use super::utilities::{try_binary_op, BinaryDerivative};
use crate::tensor::{Error, Merge, Tape, Tensor};

#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct BinaryAddKernelOp;

impl BinaryDerivative for BinaryAddKernelOp {
    fn f(&self, x: f32, y: f32) -> f32 {
        x + y
    }
    fn dfdx(&self, _: f32, _: f32) -> f32 {
        1.0
    }
    fn dfdy(&self, _: f32, _: f32) -> f32 {
        1.0
    }
}

impl<LTape: Tape> Tensor<LTape> {
    /// Element wise addition of two tensors with the same shape.
    pub fn try_add<RTape>(self, rhs: Tensor<RTape>) -> Result<Self, Error>
    where
        LTape: Merge<RTape>,
    {
        try_binary_op(BinaryAddKernelOp, self, rhs)
    }
}

#[cfg(test)]
mod tests {
    use crate::tests::*;

    #[test]
    fn test_add_1d() {
        let dev: TestDevice = Default::default();
        let a = dev.tensor([1.0, 2.0, 3.0]);
        let b = dev.tensor([1.0, -1.0, 0.0]);

        let r = a.leaky_trace().try_add(b.clone()).unwrap();
        assert_close(r.as_slice(), &[2.0, 1.0, 3.0]);
        let g = r.try_mean().unwrap().try_backward().unwrap();
        assert_close(g.get_ref_checked(&a).unwrap(), &[1.0 / 3.0; 3]);
        assert_close(g.get_ref_checked(&b).unwrap(), &[1.0 / 3.0; 3]);
    }

    #[test]
    fn test_add_shape_mismatch() {
        let dev: TestDevice = Default::default();
        let a = dev.tensor([1.0, 2.0, 3.0]);
        let b = dev.tensor([1.0, 2.0]);
        assert!(a.try_add(b).is_err());
    }
}
