//! Operations on tensors like [Tensor::try_relu()], [Tensor::try_matmul()], and
//! [Tensor::try_conv2d()].
//!
//! Every op consumes its inputs and returns a new tensor carrying the tape
//! of the left most input. Ops on a [crate::tensor::OwnedTape] also record how
//! to backpropagate through them.
//!
//! # Broadcasts
//!
//! Elementwise ops require both sides to have exactly the same shape. The only
//! broadcast is [Tensor::try_broadcast_add()], which adds a bias along the last axis.
//!
//! [Tensor::try_relu()]: crate::tensor::Tensor::try_relu
//! [Tensor::try_matmul()]: crate::tensor::Tensor::try_matmul
//! [Tensor::try_conv2d()]: crate::tensor::Tensor::try_conv2d
//! [Tensor::try_broadcast_add()]: crate::tensor::Tensor::try_broadcast_add

mod utilities;

mod add;
mod broadcast_add;
mod conv2d;
mod matmul;
mod mul;
mod negate;
mod relu;
mod reshape;
mod scale;
mod square;
mod sub;
mod sum_to;
