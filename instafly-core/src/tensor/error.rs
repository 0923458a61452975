use crate::shapes::Shape;

use super::UniqueId;

/// Errors from creating tensors, running tensor operations, differentiating
/// objectives and moving weights in and out of `.safetensors` files.
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Two tensors that must agree on their shape do not.
    #[error("shape mismatch: expected {expected:?}, found {found:?}")]
    ShapeMismatch { expected: Shape, found: Shape },

    /// Not enough (or too many) elements were provided when creating a tensor.
    #[error("wrong number of elements: expected {expected}, found {found}")]
    WrongNumElements { expected: usize, found: usize },

    /// A shape has a zero-sized dimension, or more elements than can be
    /// addressed, where neither is allowed.
    #[error("unusable shape {0:?}")]
    InvalidShape(Shape),

    /// An objective produced something other than a single value.
    #[error("objective must produce a single element, produced shape {0:?}")]
    NonScalarObjective(Shape),

    /// Backpropagation from the objective never reached the input.
    #[error("objective is not connected to its input")]
    DisconnectedObjective,

    /// NaN or infinity showed up in a value or gradient.
    #[error("non-finite {0} encountered")]
    NonFinite(&'static str),

    /// Some parameters were not used to compute the loss handed to an optimizer.
    #[error("{} parameter(s) received no gradient: {0:?}", .0.len())]
    UnusedTensors(Vec<String>),

    /// A backward operation looked for a gradient that was never allocated.
    #[error("no gradient allocated for tensor {0:?}")]
    MissingGradient(UniqueId),

    /// A tensor stored in a weights file is not f32.
    #[error("tensor `{name}` has unsupported dtype {dtype}")]
    UnsupportedDtype { name: String, dtype: String },

    #[error(transparent)]
    Safetensors(#[from] safetensors::SafeTensorError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
