use std::marker::PhantomData;

use super::Optimizer;
use crate::{
    nn::TensorCollection,
    tensor::{Error, Gradients},
};

/// L2 and decoupled regularization methods
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WeightDecay {
    /// Weight decay applied to the gradients before any momentum updates. Equivalent to L2 regularization.
    L2(f32),

    /// Weight decay applied after any momentum updates, without modifying the gradients.
    /// See [Decoupled Weight Decay Regularization](https://arxiv.org/abs/1711.05101)
    Decoupled(f32),
}

/// Momentum used for [Sgd]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Momentum {
    /// Momentum that is applied to the velocity of a parameter directly.
    Classic(f32),

    /// Momentum that is applied to both velocity and gradients. See [Sgd] nesterov paper for more.
    Nesterov(f32),
}

/// Configuration of hyperparameters for [Sgd].
///
/// Using classic momentum:
/// ```rust
/// # use instafly_core::prelude::*;
/// SgdConfig {
///     lr: 1e-2,
///     momentum: Some(Momentum::Classic(0.5)),
///     weight_decay: None,
/// };
/// ```
///
/// Using L2 weight decay:
/// ```rust
/// # use instafly_core::prelude::*;
/// SgdConfig {
///     lr: 1e-3,
///     momentum: None,
///     weight_decay: Some(WeightDecay::L2(1e-2)),
/// };
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SgdConfig {
    /// Learning rate. Defaults to `1e-2`
    pub lr: f32,

    /// Optional momentum. Defaults to `None`.
    pub momentum: Option<Momentum>,

    /// Optional weight decay. Defaults to `None`.
    pub weight_decay: Option<WeightDecay>,
}

impl Default for SgdConfig {
    fn default() -> Self {
        Self {
            lr: 1e-2,
            momentum: None,
            weight_decay: None,
        }
    }
}

/// Implementation of Stochastic Gradient Descent. Based on [pytorch's implementation](https://pytorch.org/docs/stable/generated/torch.optim.SGD.html)
///
/// Nesterov Momentum is implemented as described in
/// [On the importance of initialization and momentum in deep learning](https://proceedings.mlr.press/v28/sutskever13.html).
///
/// The optimizer is tied to the type of the model it was created for, and keeps
/// one velocity buffer per parameter.
#[derive(Debug)]
pub struct Sgd<M> {
    /// Hyperparameter configuration
    pub cfg: SgdConfig,

    velocity: Gradients,

    marker: PhantomData<fn(&M)>,
}

impl<M> Sgd<M> {
    /// Constructs using hyperparameters from `cfg`
    pub fn new(_model: &M, cfg: SgdConfig) -> Self {
        Self {
            cfg,
            velocity: Gradients::leaky(),
            marker: PhantomData,
        }
    }
}

fn sgd_kernel(cfg: &SgdConfig, param: &mut [f32], velocity: &mut [f32], grad: &[f32]) {
    let lr = cfg.lr;
    for ((p, mut g), v) in param
        .iter_mut()
        .zip(grad.iter().cloned())
        .zip(velocity.iter_mut())
    {
        if let Some(WeightDecay::L2(wd)) = cfg.weight_decay {
            g += wd * *p;
        }

        match cfg.momentum {
            Some(Momentum::Classic(u)) => {
                *v = g + u * *v;
                g = *v * lr;
            }
            Some(Momentum::Nesterov(u)) => {
                *v = g + u * *v;
                g = (g + u * *v) * lr;
            }
            None => g *= lr,
        }

        if let Some(WeightDecay::Decoupled(wd)) = cfg.weight_decay {
            g += wd * lr * *p;
        }

        *p -= g;
    }
}

impl<M: TensorCollection> Optimizer<M> for Sgd<M> {
    fn update(&mut self, module: &mut M, gradients: &Gradients) -> Result<(), Error> {
        let cfg = self.cfg;
        let velocity = &mut self.velocity;
        let mut unused = Vec::new();
        module.try_visit_mut("", &mut |name, p| {
            match gradients.get_ref_checked(&*p) {
                None => unused.push(name.to_string()),
                Some(g) => {
                    let v = velocity.get_or_alloc_mut(&*p);
                    sgd_kernel(&cfg, p.make_mut(), v, g);
                }
            }
            Ok(())
        })?;
        if unused.is_empty() {
            Ok(())
        } else {
            Err(Error::UnusedTensors(unused))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{losses::mse_loss, nn::*, tensor::Tensor, tests::*};

    fn rate(dev: &TestDevice) -> Tensor {
        dev.tensor([0.1, 1.0, 2.0, 10.0, 100.0])
    }

    #[test]
    fn test_perfect_sgd() {
        let dev: TestDevice = Default::default();
        let mut pred = dev.zeros([5]);
        let mut sgd = Sgd::new(
            &pred,
            SgdConfig {
                lr: 1.0,
                momentum: None,
                weight_decay: None,
            },
        );

        let targ = dev.ones([5]);
        for _ in 0..5 {
            let loss = mse_loss(pred.leaky_trace(), targ.clone())
                .unwrap()
                .try_scale(2.5)
                .unwrap();
            let gradients = loss.try_backward().unwrap();
            sgd.update(&mut pred, &gradients).expect("");
        }
        assert_close(pred.as_slice(), &[1.0; 5]);
        assert_close(targ.as_slice(), &[1.0; 5]);
    }

    #[test]
    fn test_sgd_no_momentum() {
        let dev: TestDevice = Default::default();
        let mut t = dev.ones([5]);
        let mut sgd = Sgd::new(&t, Default::default());

        let rate = rate(&dev);
        let expected = [
            [0.9998, 0.998, 0.996, 0.98, 0.8],
            [0.99960005, 0.99600005, 0.992, 0.96000004, 0.6],
            [0.9994001, 0.9940001, 0.988, 0.94000006, 0.40000004],
            [0.9992001, 0.9920001, 0.98399997, 0.9200001, 0.20000005],
            [0.99900013, 0.9900001, 0.97999996, 0.9000001, 5.9604645e-8],
        ];

        for e in expected.iter() {
            let gradients = t
                .leaky_trace()
                .try_mul(rate.clone())
                .unwrap()
                .try_mean()
                .unwrap()
                .try_backward()
                .unwrap();
            sgd.update(&mut t, &gradients).expect("");
            assert_close(t.as_slice(), e);
        }
    }

    #[test]
    fn test_sgd_classic_momentum() {
        let dev: TestDevice = Default::default();

        let mut t = dev.ones([5]);
        let mut sgd = Sgd::new(
            &t,
            SgdConfig {
                lr: 1e-2,
                momentum: Some(Momentum::Classic(0.5)),
                weight_decay: None,
            },
        );

        let rate = rate(&dev);
        let expected = [
            [0.9998, 0.998, 0.996, 0.98, 0.8],
            [0.99950004, 0.995, 0.99, 0.95000005, 0.5],
            [0.99915004, 0.9915, 0.983, 0.915, 0.15],
            [0.99877506, 0.98775, 0.9755, 0.8775, -0.225],
            [0.9983876, 0.983875, 0.96775, 0.83875, -0.61249995],
        ];

        for e in expected.iter() {
            let gradients = t
                .leaky_trace()
                .try_mul(rate.clone())
                .unwrap()
                .try_mean()
                .unwrap()
                .try_backward()
                .unwrap();
            sgd.update(&mut t, &gradients).expect("");
            assert_close(t.as_slice(), e);
        }
    }

    #[test]
    fn test_sgd_nesterov_momentum() {
        let dev: TestDevice = Default::default();

        let mut t = dev.ones([5]);
        let mut sgd = Sgd::new(
            &t,
            SgdConfig {
                lr: 1e-2,
                momentum: Some(Momentum::Nesterov(0.5)),
                weight_decay: None,
            },
        );

        let rate = rate(&dev);
        let expected = [
            [0.9997, 0.997, 0.994, 0.97, 0.70000005],
            [0.99935, 0.9935, 0.987, 0.935, 0.35000005],
            [0.99897504, 0.98974997, 0.9795, 0.8975, -0.024999946],
            [0.99858755, 0.98587495, 0.97175, 0.85875, -0.41249993],
            [0.9981938, 0.98193747, 0.963875, 0.819375, -0.8062499],
        ];

        for e in expected.iter() {
            let gradients = t
                .leaky_trace()
                .try_mul(rate.clone())
                .unwrap()
                .try_mean()
                .unwrap()
                .try_backward()
                .unwrap();
            sgd.update(&mut t, &gradients).expect("");
            assert_close(t.as_slice(), e);
        }
    }

    #[test]
    fn test_sgd_weight_decay_no_momentum() {
        let dev: TestDevice = Default::default();

        // With no momentum, both versions should be the same
        let mut t = dev.ones([5]);
        let mut sgd_l2 = Sgd::new(
            &t,
            SgdConfig {
                lr: 1e-2,
                momentum: None,
                weight_decay: Some(WeightDecay::L2(1e-1)),
            },
        );
        let mut sgd_decoupled = Sgd::new(
            &t,
            SgdConfig {
                lr: 1e-2,
                momentum: None,
                weight_decay: Some(WeightDecay::Decoupled(1e-1)),
            },
        );

        let rate = rate(&dev);
        let expected = [
            [0.9988, 0.997, 0.995, 0.979, 0.799],
            [0.99760115, 0.994003, 0.990005, 0.958021, 0.59820104],
            [0.9964036, 0.991009, 0.98501503, 0.937063, 0.39760286],
            [0.9952072, 0.988018, 0.98003, 0.9161259, 0.19720526],
            [0.994012, 0.98502994, 0.97505, 0.8952098, -0.00299193],
        ];
        for e in expected.iter() {
            let gradients = t
                .leaky_trace()
                .try_mul(rate.clone())
                .unwrap()
                .try_mean()
                .unwrap()
                .try_backward()
                .unwrap();
            sgd_l2.update(&mut t, &gradients).expect("");
            assert_close(t.as_slice(), e);
        }
        t = dev.ones([5]);
        for e in expected.iter() {
            let gradients = t
                .leaky_trace()
                .try_mul(rate.clone())
                .unwrap()
                .try_mean()
                .unwrap()
                .try_backward()
                .unwrap();
            sgd_decoupled.update(&mut t, &gradients).expect("");
            assert_close(t.as_slice(), e);
        }
    }

    #[test]
    fn test_sgd_decoupled_weight_decay_classic_momentum() {
        let dev: TestDevice = Default::default();

        let mut t = dev.ones([5]);
        let mut sgd = Sgd::new(
            &t,
            SgdConfig {
                lr: 1e-2,
                momentum: Some(Momentum::Classic(0.5)),
                weight_decay: Some(WeightDecay::Decoupled(1e-1)),
            },
        );

        let rate = rate(&dev);
        let expected = [
            [0.9988, 0.997, 0.995, 0.979, 0.799],
            [0.9975012, 0.993003, 0.988005, 0.948021, 0.498201],
            [0.9961537, 0.98851, 0.980017, 0.912073, 0.147703],
            [0.9947826, 0.983771, 0.971537, 0.873661, -0.227445],
            [0.9934003, 0.978913, 0.962815, 0.834037, -0.614717],
        ];
        for e in expected.iter() {
            let gradients = t
                .leaky_trace()
                .try_mul(rate.clone())
                .unwrap()
                .try_mean()
                .unwrap()
                .try_backward()
                .unwrap();
            sgd.update(&mut t, &gradients).expect("");
            assert_close(t.as_slice(), e);
        }
    }

    #[test]
    fn test_sgd_updates_every_layer() {
        let dev: TestDevice = Default::default();
        let mut model = dev
            .try_build_module((LinearConfig::new(5, 16), ReLU, LinearConfig::new(16, 10)))
            .unwrap();
        let mut sgd = Sgd::new(&model, Default::default());
        let before: Vec<Vec<f32>> = {
            let mut v = Vec::new();
            model
                .try_visit("", &mut |_, t| {
                    v.push(t.as_vec());
                    Ok(())
                })
                .unwrap();
            v
        };

        let x = dev.sample_uniform([8, 5]);
        let y = model.try_forward(x.leaky_traced()).unwrap();
        let loss = mse_loss(y, dev.ones([8, 10])).unwrap();
        let gradients = loss.try_backward().unwrap();
        sgd.update(&mut model, &gradients).expect("");

        let mut i = 0;
        model
            .try_visit("", &mut |name, t| {
                assert_ne!(t.as_vec(), before[i], "{name} did not change");
                i += 1;
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn test_sgd_reports_unused_tensors() {
        let dev: TestDevice = Default::default();
        let mut model = dev
            .try_build_module((LinearConfig::new(5, 16), LinearConfig::new(16, 10)))
            .unwrap();
        let mut sgd = Sgd::new(&model, Default::default());

        let y = model.0.try_forward(dev.zeros([5]).leaky_traced()).unwrap();
        let gradients = y.try_sum().unwrap().try_backward().unwrap();
        let err = sgd.update(&mut model, &gradients).unwrap_err();
        match err {
            Error::UnusedTensors(names) => assert_eq!(names, ["1.weight", "1.bias"]),
            e => panic!("unexpected error {e:?}"),
        }
    }
}
