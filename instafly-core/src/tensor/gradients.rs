//! Implementations of [OwnedTape], [NoneTape], and the gradient container [Gradients].
#![allow(clippy::type_complexity)]

use std::collections::BTreeMap;

use super::{unique_id, Error, Tensor, UniqueId};

/// A generic container for keeping gradients of tensors keyed by the
/// tensor's [UniqueId].
///
/// Gradients are plain row-major buffers with the same number of elements as
/// the tensor they belong to.
#[derive(Clone, Debug, Default)]
pub struct Gradients {
    gradient_by_id: BTreeMap<UniqueId, Vec<f32>>,
}

impl Gradients {
    /// Creates an empty [Gradients] object.
    /// **This never drops gradients for temporary tensors**, which is why it is
    /// called leaky.
    pub fn leaky() -> Self {
        Default::default()
    }

    pub fn len(&self) -> usize {
        self.gradient_by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.gradient_by_id.is_empty()
    }

    /// Inserts a zeroed gradient for `t` if there isn't one yet.
    pub fn try_alloc_for<T>(&mut self, t: &Tensor<T>) -> Result<(), Error> {
        self.gradient_by_id
            .entry(t.id)
            .or_insert_with(|| vec![0.0; t.shape.num_elements()]);
        Ok(())
    }

    /// Retrieves mutable gradient for `t`, allocating one if it isn't present.
    pub fn get_or_alloc_mut<T>(&mut self, t: &Tensor<T>) -> &mut Vec<f32> {
        self.gradient_by_id
            .entry(t.id)
            .or_insert_with(|| vec![0.0; t.shape.num_elements()])
    }

    /// Returns a reference to the underlying gradient if found.
    pub fn get_ref_checked<T>(&self, t: &Tensor<T>) -> Option<&[f32]> {
        self.gradient_by_id.get(&t.id).map(Vec::as_slice)
    }

    /// Clones the gradient of `t` into a new tensor of the same shape, or
    /// `None` if nothing was backpropagated into `t`.
    pub fn get_checked<T>(&self, t: &Tensor<T>) -> Option<Tensor> {
        let buf = self.gradient_by_id.get(&t.id)?.clone();
        Some(t.device.upgrade(buf, t.shape.clone()))
    }

    /// Like [Gradients::get_checked], but a missing gradient is an error.
    pub fn try_get<T>(&self, t: &Tensor<T>) -> Result<Tensor, Error> {
        self.get_checked(t).ok_or(Error::MissingGradient(t.id))
    }

    pub(crate) fn get_ref<T>(&self, t: &Tensor<T>) -> Result<&[f32], Error> {
        self.get_ref_checked(t).ok_or(Error::MissingGradient(t.id))
    }

    pub(crate) fn get_mut<T>(&mut self, t: &Tensor<T>) -> Result<&mut Vec<f32>, Error> {
        self.gradient_by_id
            .get_mut(&t.id)
            .ok_or(Error::MissingGradient(t.id))
    }

    fn take<T>(&mut self, t: &Tensor<T>) -> Result<Vec<f32>, Error> {
        self.gradient_by_id
            .remove(&t.id)
            .ok_or(Error::MissingGradient(t.id))
    }

    fn put<T>(&mut self, t: &Tensor<T>, grad: Vec<f32>) {
        self.gradient_by_id.insert(t.id, grad);
    }

    /// Hands `f` the gradient of `inp` to update and the gradient of `out` to
    /// backprop from.
    pub(crate) fn backprop<A, B>(
        &mut self,
        inp: &Tensor<A>,
        out: &Tensor<B>,
        f: impl FnOnce(&mut [f32], &[f32]),
    ) -> Result<(), Error> {
        let mut grad_inp = self.take(inp)?;
        let result = self.get_ref(out).map(|grad_out| f(&mut grad_inp, grad_out));
        self.put(inp, grad_inp);
        result
    }

    /// Two input version of [Gradients::backprop]. `lhs` and `rhs` may be the
    /// same tensor (e.g. `x * x`), in which case both contributions are summed.
    pub(crate) fn backprop2<A, B, C>(
        &mut self,
        lhs: &Tensor<A>,
        rhs: &Tensor<B>,
        out: &Tensor<C>,
        f: impl FnOnce(&mut [f32], &mut [f32], &[f32]),
    ) -> Result<(), Error> {
        if lhs.id == rhs.id {
            let mut grad_lhs = self.take(lhs)?;
            let mut grad_rhs = vec![0.0; grad_lhs.len()];
            let result = self
                .get_ref(out)
                .map(|grad_out| f(&mut grad_lhs, &mut grad_rhs, grad_out));
            for (l, r) in grad_lhs.iter_mut().zip(grad_rhs) {
                *l += r;
            }
            self.put(lhs, grad_lhs);
            return result;
        }
        let mut grad_lhs = self.take(lhs)?;
        let mut grad_rhs = match self.take(rhs) {
            Ok(g) => g,
            Err(e) => {
                self.put(lhs, grad_lhs);
                return Err(e);
            }
        };
        let result = self
            .get_ref(out)
            .map(|grad_out| f(&mut grad_lhs, &mut grad_rhs, grad_out));
        self.put(lhs, grad_lhs);
        self.put(rhs, grad_rhs);
        result
    }
}

type BackwardOp = Box<dyn FnOnce(&mut Gradients) -> Result<(), Error>>;

/// Contains a [Gradients] and list of backward operations.
pub struct OwnedTape {
    /// A list of (Time, BackwardOp) pairs. The Time is used to ensure operations
    /// from merged tapes are executed in the correct order.
    pub(crate) operations: Vec<(UniqueId, BackwardOp)>,
    pub(crate) gradients: Gradients,
}

impl Default for OwnedTape {
    fn default() -> Self {
        Self {
            operations: Default::default(),
            gradients: Gradients::leaky(),
        }
    }
}

impl std::fmt::Debug for OwnedTape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OwnedTape")
            .field("num_operations", &self.operations.len())
            .field("gradients", &self.gradients)
            .finish()
    }
}

impl From<Gradients> for OwnedTape {
    fn from(gradients: Gradients) -> Self {
        Self {
            operations: Default::default(),
            gradients,
        }
    }
}

impl OwnedTape {
    /// Runs all the recorded operations, newest first, and returns the
    /// accumulated [Gradients].
    pub(crate) fn execute(&mut self) -> Result<Gradients, Error> {
        // Merged tapes interleave operations, so restore creation order first.
        self.operations.sort_by_key(|(k, _)| *k);
        self.operations.dedup_by_key(|(k, _)| *k);
        for (_, operation) in self.operations.drain(..).rev() {
            (operation)(&mut self.gradients)?;
        }
        Ok(std::mem::take(&mut self.gradients))
    }
}

/// Contains nothing. When [Tape::add_backward_op] is called, this struct does nothing.
#[derive(Default, Debug, Clone, Copy)]
pub struct NoneTape;

/// Something that can track backward operations.
pub trait Tape: Default + Merge<Self> + Merge<NoneTape> {
    /// Whether this object is currently tracking gradients. This is known at compile time.
    const OWNS_TAPE: bool;
    fn add_backward_op<F>(&mut self, operation: F)
    where
        F: 'static + FnOnce(&mut Gradients) -> Result<(), Error>;
    fn try_alloc_grad<T>(&mut self, t: &Tensor<T>) -> Result<(), Error>;
}

impl Tape for OwnedTape {
    const OWNS_TAPE: bool = true;
    fn add_backward_op<F>(&mut self, operation: F)
    where
        F: 'static + FnOnce(&mut Gradients) -> Result<(), Error>,
    {
        self.operations.push((unique_id(), Box::new(operation)));
    }
    fn try_alloc_grad<T>(&mut self, t: &Tensor<T>) -> Result<(), Error> {
        self.gradients.try_alloc_for(t)
    }
}

impl Tape for NoneTape {
    const OWNS_TAPE: bool = false;
    fn add_backward_op<F>(&mut self, _: F)
    where
        F: 'static + FnOnce(&mut Gradients) -> Result<(), Error>,
    {
    }
    fn try_alloc_grad<T>(&mut self, _: &Tensor<T>) -> Result<(), Error> {
        Ok(())
    }
}

/// Combine two things
pub trait Merge<T: ?Sized> {
    /// Merges `T` into `self`
    fn merge(self, other: T) -> Self;
}

impl Merge<NoneTape> for NoneTape {
    fn merge(self, _: NoneTape) -> Self {
        self
    }
}

impl Merge<NoneTape> for OwnedTape {
    fn merge(self, _: NoneTape) -> Self {
        self
    }
}

impl Merge<OwnedTape> for OwnedTape {
    fn merge(mut self, mut other: Self) -> Self {
        self.gradients
            .gradient_by_id
            .append(&mut other.gradients.gradient_by_id);
        self.operations.append(&mut other.operations);
        self
    }
}
