//! Standard loss functions such as [mse_loss()].

use crate::tensor::{Error, Tape, Tensor};

/// [Mean Squared Error](https://en.wikipedia.org/wiki/Mean_squared_error).
/// This computes `(pred - targ).square().mean()`.
///
/// `targ` must have the same shape as `pred`.
pub fn mse_loss<T: Tape>(pred: Tensor<T>, targ: Tensor) -> Result<Tensor<T>, Error> {
    pred.try_sub(targ)?.try_square()?.try_mean()
}
