use std::sync::{Arc, Mutex, PoisonError};

use rand::{rngs::StdRng, Rng, SeedableRng};
use rand_distr::{Distribution, Uniform};

use super::{unique_id, Error, NoneTape, Tensor};
use crate::shapes::Shape;

/// A device that allocates tensors on the heap and runs every op on the cpu.
///
/// Holds the random number generator used by [Cpu::sample] so that runs
/// seeded with [Cpu::seed_from_u64] are reproducible.
#[derive(Clone, Debug)]
pub struct Cpu {
    pub(crate) rng: Arc<Mutex<StdRng>>,
}

impl Default for Cpu {
    fn default() -> Self {
        Self::seed_from_u64(0)
    }
}

impl Cpu {
    /// Constructs rng with the given seed.
    pub fn seed_from_u64(seed: u64) -> Self {
        Self {
            rng: Arc::new(Mutex::new(StdRng::seed_from_u64(seed))),
        }
    }

    pub(crate) fn upgrade(&self, data: Vec<f32>, shape: Shape) -> Tensor {
        Tensor {
            id: unique_id(),
            data: Arc::new(data),
            shape,
            device: self.clone(),
            tape: NoneTape,
        }
    }

    pub fn zeros(&self, shape: impl Into<Shape>) -> Tensor {
        self.filled(shape, 0.0)
    }

    pub fn ones(&self, shape: impl Into<Shape>) -> Tensor {
        self.filled(shape, 1.0)
    }

    pub fn filled(&self, shape: impl Into<Shape>, value: f32) -> Tensor {
        let shape = shape.into();
        self.upgrade(vec![value; shape.num_elements()], shape)
    }

    /// A zero dimensional tensor holding `value`.
    pub fn scalar(&self, value: f32) -> Tensor {
        self.upgrade(vec![value], Shape::scalar())
    }

    /// A one dimensional tensor from an array.
    /// ```rust
    /// # use instafly_core::prelude::*;
    /// let dev: Cpu = Default::default();
    /// let t = dev.tensor([1.0, 2.0, 3.0]);
    /// assert_eq!(t.shape(), &Shape::from([3]));
    /// ```
    pub fn tensor<const N: usize>(&self, values: [f32; N]) -> Tensor {
        self.upgrade(values.to_vec(), Shape::from([N]))
    }

    /// Creates a tensor with `shape` from row-major `data`.
    pub fn try_tensor_from_vec(
        &self,
        data: Vec<f32>,
        shape: impl Into<Shape>,
    ) -> Result<Tensor, Error> {
        let shape = shape.into();
        if data.len() != shape.num_elements() {
            return Err(Error::WrongNumElements {
                expected: shape.num_elements(),
                found: data.len(),
            });
        }
        Ok(self.upgrade(data, shape))
    }

    /// Fills a tensor with samples drawn from `distr`.
    pub fn sample<D: Distribution<f32>>(&self, shape: impl Into<Shape>, distr: D) -> Tensor {
        let shape = shape.into();
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        let data = (0..shape.num_elements())
            .map(|_| rng.sample(&distr))
            .collect();
        drop(rng);
        self.upgrade(data, shape)
    }

    /// Samples every element uniformly from `[0, 1)`.
    pub fn sample_uniform(&self, shape: impl Into<Shape>) -> Tensor {
        self.sample(shape, Uniform::new(0.0f32, 1.0))
    }
}
