//! Runtime shapes of [crate::tensor::Tensor]s.
//!
//! All tensors are stored contiguous and row-major, so a shape is nothing more
//! than the list of its dimensions. The empty shape `()` is a scalar and holds
//! exactly one element.

/// The dimensions of a tensor, outermost first.
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct Shape(Vec<usize>);

impl Shape {
    pub fn new(dims: impl Into<Vec<usize>>) -> Self {
        Self(dims.into())
    }

    /// The shape of a single element tensor with no dimensions.
    pub fn scalar() -> Self {
        Self(Vec::new())
    }

    pub fn dims(&self) -> &[usize] {
        &self.0
    }

    pub fn num_dims(&self) -> usize {
        self.0.len()
    }

    /// Size of dimension `i`. Returns `None` if out of range.
    pub fn dim(&self, i: usize) -> Option<usize> {
        self.0.get(i).copied()
    }

    /// The product of all dimensions. A scalar has 1 element.
    pub fn num_elements(&self) -> usize {
        self.0.iter().product()
    }

    /// Product of every dimension after the first one.
    pub(crate) fn trailing_elements(&self) -> usize {
        self.0.iter().skip(1).product()
    }
}

impl std::fmt::Debug for Shape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "(")?;
        for (i, d) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{d}")?;
        }
        if self.0.len() == 1 {
            write!(f, ",")?;
        }
        write!(f, ")")
    }
}

impl std::fmt::Display for Shape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(self, f)
    }
}

impl From<Vec<usize>> for Shape {
    fn from(dims: Vec<usize>) -> Self {
        Self(dims)
    }
}

impl From<&[usize]> for Shape {
    fn from(dims: &[usize]) -> Self {
        Self(dims.to_vec())
    }
}

impl<const N: usize> From<[usize; N]> for Shape {
    fn from(dims: [usize; N]) -> Self {
        Self(dims.to_vec())
    }
}

impl From<&Shape> for Shape {
    fn from(shape: &Shape) -> Self {
        shape.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_num_elements() {
        assert_eq!(Shape::scalar().num_elements(), 1);
        assert_eq!(Shape::from([3]).num_elements(), 3);
        assert_eq!(Shape::from([1, 4, 4, 3]).num_elements(), 48);
        assert_eq!(Shape::from([2, 0, 5]).num_elements(), 0);
    }

    #[test]
    fn test_debug_format() {
        assert_eq!(format!("{:?}", Shape::scalar()), "()");
        assert_eq!(format!("{:?}", Shape::from([2])), "(2,)");
        assert_eq!(format!("{:?}", Shape::from([1, 64, 64, 3])), "(1, 64, 64, 3)");
    }
}
