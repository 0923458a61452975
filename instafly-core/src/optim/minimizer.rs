use tracing::{debug, info};

use super::UpdateRule;
use crate::{
    shapes::Shape,
    tensor::{Error, OwnedTape, Tensor},
};

/// Evaluates `objective` at `x` and differentiates it with respect to `x`.
///
/// Returns the objective value and a gradient with the shape of `x`.
///
/// # Errors
/// - [Error::NonScalarObjective] if the objective is not a single element
/// - [Error::DisconnectedObjective] if backprop never reaches `x`
/// - [Error::NonFinite] if the value or the gradient contains NaN or infinity
pub fn value_and_grad<F>(x: &Tensor, mut objective: F) -> Result<(f32, Tensor), Error>
where
    F: FnMut(Tensor<OwnedTape>) -> Result<Tensor<OwnedTape>, Error>,
{
    let y = objective(x.leaky_trace())?;
    if y.shape().num_elements() != 1 {
        return Err(Error::NonScalarObjective(y.shape().clone()));
    }
    let value = y.try_scalar()?;
    if !value.is_finite() {
        return Err(Error::NonFinite("objective value"));
    }
    let grads = y.try_backward()?;
    let grad = grads.get_checked(x).ok_or(Error::DisconnectedObjective)?;
    if grad.as_slice().iter().any(|g| !g.is_finite()) {
        return Err(Error::NonFinite("gradient"));
    }
    Ok((value, grad))
}

/// What a [Minimizer] optimizes.
pub trait MinimizeTarget {
    /// Shape of the input tensor being optimized.
    fn input_shape(&self) -> Shape;

    /// The scalar to minimize, computed from the traced input.
    fn objective(&self, x: Tensor<OwnedTape>) -> Result<Tensor<OwnedTape>, Error>;

    /// The tensor a run starts from.
    fn try_initial_input(&self) -> Result<Tensor, Error>;
}

/// A [MinimizeTarget] made from an input shape and two closures.
///
/// ```rust
/// # use instafly_core::prelude::*;
/// # fn main() -> Result<(), Error> {
/// let dev: Cpu = Default::default();
/// let target = FnTarget::new(
///     [2],
///     |x: Tensor<OwnedTape>| x.try_square()?.try_sum(),
///     || Ok(dev.tensor([3.0, -4.0])),
/// );
/// let mut rule = MomentumAscent::new(MomentumConfig { lr: 0.1, gamma: 0.0 });
/// let x = Minimizer::new(target).try_run(&mut rule, 50)?;
/// assert!(x.as_slice().iter().all(|v| v.abs() < 1e-3));
/// # Ok(())
/// # }
/// ```
pub struct FnTarget<O, I> {
    input_shape: Shape,
    objective: O,
    initial: I,
}

impl<O, I> FnTarget<O, I>
where
    O: Fn(Tensor<OwnedTape>) -> Result<Tensor<OwnedTape>, Error>,
    I: Fn() -> Result<Tensor, Error>,
{
    pub fn new(input_shape: impl Into<Shape>, objective: O, initial: I) -> Self {
        Self {
            input_shape: input_shape.into(),
            objective,
            initial,
        }
    }
}

impl<O, I> MinimizeTarget for FnTarget<O, I>
where
    O: Fn(Tensor<OwnedTape>) -> Result<Tensor<OwnedTape>, Error>,
    I: Fn() -> Result<Tensor, Error>,
{
    fn input_shape(&self) -> Shape {
        self.input_shape.clone()
    }

    fn objective(&self, x: Tensor<OwnedTape>) -> Result<Tensor<OwnedTape>, Error> {
        (self.objective)(x)
    }

    fn try_initial_input(&self) -> Result<Tensor, Error> {
        (self.initial)()
    }
}

/// Runs a fixed number of [UpdateRule] steps on the input of a
/// [MinimizeTarget].
///
/// There is no convergence check: every run performs exactly the requested
/// number of steps, and zero steps returns the starting tensor untouched. The
/// rule is borrowed, so several calls with the same rule continue where the
/// previous one stopped.
#[derive(Debug, Clone)]
pub struct Minimizer<T> {
    target: T,
}

impl<T: MinimizeTarget> Minimizer<T> {
    pub fn new(target: T) -> Self {
        Self { target }
    }

    pub fn target(&self) -> &T {
        &self.target
    }

    /// Starts from [MinimizeTarget::try_initial_input].
    pub fn try_run<R: UpdateRule>(
        &self,
        rule: &mut R,
        num_iterations: usize,
    ) -> Result<Tensor, Error> {
        self.try_run_with(rule, num_iterations, |_, _| {})
    }

    /// Like [Minimizer::try_run], calling `observer(iteration, value)` with the
    /// objective value of every step.
    pub fn try_run_with<R, F>(
        &self,
        rule: &mut R,
        num_iterations: usize,
        observer: F,
    ) -> Result<Tensor, Error>
    where
        R: UpdateRule,
        F: FnMut(usize, f32),
    {
        let x = self.target.try_initial_input()?;
        self.try_run_from_with(x, rule, num_iterations, observer)
    }

    /// Starts from `x` instead of the target's initial input.
    pub fn try_run_from<R: UpdateRule>(
        &self,
        x: Tensor,
        rule: &mut R,
        num_iterations: usize,
    ) -> Result<Tensor, Error> {
        self.try_run_from_with(x, rule, num_iterations, |_, _| {})
    }

    pub fn try_run_from_with<R, F>(
        &self,
        mut x: Tensor,
        rule: &mut R,
        num_iterations: usize,
        mut observer: F,
    ) -> Result<Tensor, Error>
    where
        R: UpdateRule,
        F: FnMut(usize, f32),
    {
        let expected = self.target.input_shape();
        if x.shape() != &expected {
            return Err(Error::ShapeMismatch {
                expected,
                found: x.shape().clone(),
            });
        }

        info!(num_iterations, shape = ?expected, "minimizing");
        for iteration in 0..num_iterations {
            let (stepped, value) = rule.try_step(x, |t| self.target.objective(t))?;
            debug!(iteration, objective = value);
            observer(iteration, value);
            x = stepped;
        }
        Ok(x)
    }
}
