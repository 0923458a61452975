//! The [Tensor] struct, the [Cpu] device, and gradient tracking.
//!
//! A tensor is an `Arc` of row-major `f32` data plus a runtime [Shape]. Cloning a
//! tensor is cheap and keeps its [UniqueId], which is what gradients are keyed by.
//!
//! # Tracking gradients
//!
//! Every tensor carries a tape. Plain tensors carry [NoneTape], which records
//! nothing. Calling [Tensor::leaky_trace] (or [Tensor::traced] with an existing
//! [Gradients]) swaps in an [OwnedTape]. Every op applied from then on records
//! how to backpropagate, and calling [Tensor::try_backward] on the final single
//! element tensor replays them in reverse:
//!
//! ```rust
//! # use instafly_core::prelude::*;
//! # fn main() -> Result<(), Error> {
//! let dev: Cpu = Default::default();
//! let x = dev.tensor([1.0, -2.0, 3.0]);
//! let loss = x.leaky_trace().try_square()?.try_sum()?;
//! let grads = loss.try_backward()?;
//! assert_eq!(grads.try_get(&x)?.as_vec(), vec![2.0, -4.0, 6.0]);
//! # Ok(())
//! # }
//! ```
//!
//! Binary ops take the tape of their left hand side, so the traced tensor
//! should appear on the left (`x.try_mul(w)`, not `w.try_mul(x)`).

mod cpu;
mod error;
mod gradients;
pub(crate) mod safetensors;
mod unique_id;

use std::sync::Arc;

pub use cpu::Cpu;
pub use error::Error;
pub use gradients::{Gradients, Merge, NoneTape, OwnedTape, Tape};
pub use safetensors::{LoadFromSafetensors, SaveToSafetensors};
pub(crate) use unique_id::unique_id;
pub use unique_id::UniqueId;

use crate::shapes::Shape;

/// An n dimensional array of `f32` stored on a [Cpu].
///
/// `T` is the tape, either [NoneTape] or [OwnedTape].
#[derive(Clone)]
pub struct Tensor<T = NoneTape> {
    pub(crate) id: UniqueId,
    pub(crate) data: Arc<Vec<f32>>,
    pub(crate) shape: Shape,
    pub(crate) device: Cpu,
    pub(crate) tape: T,
}

impl<T> std::fmt::Debug for Tensor<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tensor")
            .field("id", &self.id)
            .field("shape", &self.shape)
            .field("data", &self.data)
            .finish()
    }
}

impl<T> Tensor<T> {
    pub fn id(&self) -> UniqueId {
        self.id
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn device(&self) -> &Cpu {
        &self.device
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    pub fn as_vec(&self) -> Vec<f32> {
        self.data.as_ref().clone()
    }

    /// The value of a single element tensor.
    pub fn try_scalar(&self) -> Result<f32, Error> {
        match self.data.as_slice() {
            [v] => Ok(*v),
            _ => Err(Error::ShapeMismatch {
                expected: Shape::scalar(),
                found: self.shape.clone(),
            }),
        }
    }

    /// Separates the data from the tape.
    pub fn split_tape(self) -> (Tensor, T) {
        (
            Tensor {
                id: self.id,
                data: self.data,
                shape: self.shape,
                device: self.device,
                tape: NoneTape,
            },
            self.tape,
        )
    }

    /// Drops whatever tape is attached.
    pub fn retaped(&self) -> Tensor {
        Tensor {
            id: self.id,
            data: self.data.clone(),
            shape: self.shape.clone(),
            device: self.device.clone(),
            tape: NoneTape,
        }
    }

    /// Mutable access to the data. Copies it first if the buffer is shared.
    /// The id is kept, so this is how optimizers update parameters in place.
    pub(crate) fn make_mut(&mut self) -> &mut Vec<f32> {
        Arc::make_mut(&mut self.data)
    }

    /// A new tensor with the same shape on the same device, with a fresh id.
    pub(crate) fn new_like(&self, data: Vec<f32>) -> Tensor {
        self.device.upgrade(data, self.shape.clone())
    }
}

impl Tensor<NoneTape> {
    /// Attaches `tape` to this tensor.
    pub fn put_tape<T>(self, tape: T) -> Tensor<T> {
        Tensor {
            id: self.id,
            data: self.data,
            shape: self.shape,
            device: self.device,
            tape,
        }
    }

    /// Clones this tensor and starts tracking gradients into a fresh
    /// [Gradients::leaky].
    pub fn leaky_trace(&self) -> Tensor<OwnedTape> {
        self.clone().leaky_traced()
    }

    /// Starts tracking gradients into a fresh [Gradients::leaky].
    pub fn leaky_traced(self) -> Tensor<OwnedTape> {
        self.put_tape(Default::default())
    }

    /// Clones this tensor and starts tracking gradients into `gradients`.
    pub fn trace(&self, gradients: Gradients) -> Tensor<OwnedTape> {
        self.clone().traced(gradients)
    }

    /// Starts tracking gradients into `gradients`.
    pub fn traced(self, gradients: Gradients) -> Tensor<OwnedTape> {
        self.put_tape(OwnedTape::from(gradients))
    }
}

impl Tensor<OwnedTape> {
    /// Runs backprop from this single element tensor through every op
    /// recorded on its tape.
    pub fn try_backward(self) -> Result<Gradients, Error> {
        if self.shape.num_elements() != 1 {
            return Err(Error::ShapeMismatch {
                expected: Shape::scalar(),
                found: self.shape,
            });
        }
        let (t, mut tape) = self.split_tape();
        tape.try_alloc_grad(&t)?;
        tape.add_backward_op(move |grads| {
            grads.get_mut(&t)?.fill(1.0);
            Ok(())
        });
        tape.execute()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::*;

    #[test]
    fn test_clone_keeps_id() {
        let dev: TestDevice = Default::default();
        let a = dev.zeros([2, 3]);
        let b = a.clone();
        assert_eq!(a.id(), b.id());
        assert_ne!(a.id(), dev.zeros([2, 3]).id());
    }

    #[test]
    fn test_try_scalar() {
        let dev: TestDevice = Default::default();
        assert_eq!(dev.scalar(3.5).try_scalar().unwrap(), 3.5);
        assert_eq!(dev.tensor([2.0]).try_scalar().unwrap(), 2.0);
        assert!(dev.tensor([1.0, 2.0]).try_scalar().is_err());
    }

    #[test]
    fn test_backward_requires_single_element() {
        let dev: TestDevice = Default::default();
        let x = dev.tensor([1.0, 2.0]);
        let r = x.leaky_trace().try_square().unwrap().try_backward();
        assert!(matches!(r, Err(Error::ShapeMismatch { .. })));
    }

    #[test]
    fn test_unrelated_tensor_has_no_gradient() {
        let dev: TestDevice = Default::default();
        let x = dev.tensor([1.0, 2.0]);
        let y = dev.tensor([3.0, 4.0]);
        let grads = x.leaky_trace().try_sum().unwrap().try_backward().unwrap();
        assert!(grads.get_checked(&x).is_some());
        assert!(grads.get_checked(&y).is_none());
    }

    #[test]
    fn test_traced_reuses_gradients() {
        let dev: TestDevice = Default::default();
        let x = dev.tensor([1.0, 2.0]);
        let grads = x.leaky_trace().try_sum().unwrap().try_backward().unwrap();
        let grads = x
            .trace(grads)
            .try_scale(2.0)
            .unwrap()
            .try_sum()
            .unwrap()
            .try_backward()
            .unwrap();
        assert_close(grads.get_ref_checked(&x).unwrap(), &[3.0, 3.0]);
    }
}
