use super::utilities::{try_unary_op, UnaryDerivative};
use crate::tensor::{Error, Tape, Tensor};

#[derive(Debug, Default, Copy, Clone)]
pub(crate) struct SquareKernelOp;

impl UnaryDerivative for SquareKernelOp {
    const DF_USES_FX: bool = false;
    fn f(&self, x: f32) -> f32 {
        x * x
    }
    fn df(&self, x: f32) -> f32 {
        2.0 * x
    }
}

impl<T: Tape> Tensor<T> {
    /// `x * x` for every element.
    pub fn try_square(self) -> Result<Self, Error> {
        try_unary_op(SquareKernelOp, self)
    }
}
