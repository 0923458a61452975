use super::value_and_grad;
use crate::tensor::{Error, OwnedTape, Tensor};

/// Computes one step of an input-space optimization.
///
/// An update rule owns whatever state it needs between steps (e.g. a
/// velocity), so one instance must be used for exactly one run at a time.
pub trait UpdateRule {
    /// Evaluates `objective` and its gradient at `x` and returns the stepped
    /// tensor together with the objective value *before* the step.
    fn try_step<F>(&mut self, x: Tensor, objective: F) -> Result<(Tensor, f32), Error>
    where
        F: FnMut(Tensor<OwnedTape>) -> Result<Tensor<OwnedTape>, Error>;
}

/// Hyperparameters of [MomentumAscent].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MomentumConfig {
    /// Step size. Defaults to `1e-2`.
    pub lr: f32,
    /// Decay of the previous velocity. Defaults to `1e-2`.
    pub gamma: f32,
}

impl Default for MomentumConfig {
    fn default() -> Self {
        Self {
            lr: 1e-2,
            gamma: 1e-2,
        }
    }
}

/// Classical momentum:
///
/// ```text
/// v = gamma * v + lr * grad
/// x = x - v
/// ```
///
/// This descends on the objective it is given. Handing it the *negated*
/// score of a network therefore climbs the score, hence the name.
///
/// The velocity starts at zero and takes the shape of the first tensor it
/// sees. Stepping a tensor of any other shape afterwards is an
/// [Error::ShapeMismatch].
#[derive(Debug, Clone, Default)]
pub struct MomentumAscent {
    pub cfg: MomentumConfig,
    velocity: Option<Tensor>,
}

impl MomentumAscent {
    pub fn new(cfg: MomentumConfig) -> Self {
        Self {
            cfg,
            velocity: None,
        }
    }

    /// The accumulated velocity, `None` before the first step.
    pub fn velocity(&self) -> Option<&Tensor> {
        self.velocity.as_ref()
    }
}

impl UpdateRule for MomentumAscent {
    fn try_step<F>(&mut self, x: Tensor, objective: F) -> Result<(Tensor, f32), Error>
    where
        F: FnMut(Tensor<OwnedTape>) -> Result<Tensor<OwnedTape>, Error>,
    {
        if let Some(v) = &self.velocity {
            if v.shape() != x.shape() {
                return Err(Error::ShapeMismatch {
                    expected: v.shape().clone(),
                    found: x.shape().clone(),
                });
            }
        }

        let (value, grad) = value_and_grad(&x, objective)?;

        let MomentumConfig { lr, gamma } = self.cfg;
        let velocity: Vec<f32> = match &self.velocity {
            Some(v) => v
                .as_slice()
                .iter()
                .zip(grad.as_slice())
                .map(|(v, g)| gamma * v + lr * g)
                .collect(),
            None => grad.as_slice().iter().map(|g| lr * g).collect(),
        };
        let stepped: Vec<f32> = x
            .as_slice()
            .iter()
            .zip(&velocity)
            .map(|(x, v)| x - v)
            .collect();
        // a failed step leaves the velocity as it was
        if stepped.iter().any(|v| !v.is_finite()) {
            return Err(Error::NonFinite("stepped input"));
        }

        self.velocity = Some(x.new_like(velocity));
        Ok((x.new_like(stepped), value))
    }
}
