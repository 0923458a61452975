//! Activation maximization: what image does a trained [ScoreNet] like best?

use std::{
    path::PathBuf,
    time::{SystemTime, UNIX_EPOCH},
};

use instafly_core::prelude::*;
use tracing::info;

use crate::{
    image_io::{load_image_tensor, save_image_tensor},
    model::{ImageSize, ScoreNet},
};

/// Binds a [Minimizer] to the input of a [ScoreNet].
///
/// The objective is the negated raw score, so minimizing it climbs the score.
/// The raw score is taken before the final clip because the clip has zero
/// gradient wherever the score is negative.
#[derive(Debug, Clone)]
pub struct ImageVisualizer<'a> {
    model: &'a ScoreNet,
    device: Cpu,
    seed: Option<Tensor>,
}

impl<'a> ImageVisualizer<'a> {
    /// Starts from uniform noise in `[0, 1)`.
    pub fn new(model: &'a ScoreNet, device: Cpu) -> Self {
        Self {
            model,
            device,
            seed: None,
        }
    }

    /// Starts from `seed`, which must already be normalized to `[0, 1]`.
    pub fn with_seed(model: &'a ScoreNet, device: Cpu, seed: Tensor) -> Self {
        Self {
            model,
            device,
            seed: Some(seed),
        }
    }
}

impl MinimizeTarget for ImageVisualizer<'_> {
    fn input_shape(&self) -> Shape {
        self.model.input_shape()
    }

    fn objective(&self, x: Tensor<OwnedTape>) -> Result<Tensor<OwnedTape>, Error> {
        self.model.try_raw_score(x)?.try_sum()?.try_negate()
    }

    fn try_initial_input(&self) -> Result<Tensor, Error> {
        match &self.seed {
            Some(seed) => Ok(seed.clone()),
            None => Ok(self.device.sample_uniform(self.input_shape())),
        }
    }
}

/// Everything a visualization run needs.
#[derive(Debug, Clone)]
pub struct VisualizeConfig {
    /// Trained weights in safetensors format.
    pub weights: PathBuf,
    pub output: PathBuf,
    /// Start from this image instead of noise.
    pub seed_image: Option<PathBuf>,
    /// Defaults to `500`.
    pub num_iterations: usize,
    pub momentum: MomentumConfig,
    pub size: ImageSize,
    /// Seed for the initial noise. Taken from the clock when `None`.
    pub rng_seed: Option<u64>,
}

impl VisualizeConfig {
    pub fn new(weights: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        Self {
            weights: weights.into(),
            output: output.into(),
            seed_image: None,
            num_iterations: 500,
            momentum: Default::default(),
            size: Default::default(),
            rng_seed: None,
        }
    }
}

/// Raw scores of the image before and after a run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VisualizeReport {
    pub initial_raw_score: f32,
    pub final_raw_score: f32,
}

pub(crate) fn seed_from_clock() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or_default()
}

/// Loads the model, runs the minimizer and writes the optimized image.
pub fn visualize(cfg: &VisualizeConfig) -> Result<VisualizeReport, crate::Error> {
    let device = Cpu::seed_from_u64(cfg.rng_seed.unwrap_or_else(seed_from_clock));
    let model = ScoreNet::try_load(&device, cfg.size, &cfg.weights)?;
    info!(weights = %cfg.weights.display(), params = model.num_params(), "loaded model");

    let target = match &cfg.seed_image {
        Some(path) => {
            let seed = load_image_tensor(&device, path, cfg.size)?;
            ImageVisualizer::with_seed(&model, device.clone(), seed)
        }
        None => ImageVisualizer::new(&model, device.clone()),
    };
    let minimizer = Minimizer::new(target);
    let initial = minimizer.target().try_initial_input()?;
    let initial_raw_score = model.try_raw_score(initial.clone())?.try_scalar()?;

    let mut rule = MomentumAscent::new(cfg.momentum);
    let image = minimizer.try_run_from_with(initial, &mut rule, cfg.num_iterations, |i, value| {
        if i % 50 == 0 {
            info!(iteration = i, raw_score = -value, "visualizing");
        }
    })?;
    let final_raw_score = model.try_raw_score(image.clone())?.try_scalar()?;

    save_image_tensor(&image, &cfg.output)?;
    info!(
        output = %cfg.output.display(),
        initial_raw_score,
        final_raw_score,
        "saved visualization"
    );
    Ok(VisualizeReport {
        initial_raw_score,
        final_raw_score,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ScoreNetConfig;

    fn small_model(dev: &Cpu) -> ScoreNet {
        let size = ImageSize {
            width: 8,
            height: 8,
        };
        dev.try_build_module(ScoreNetConfig { size }).unwrap()
    }

    #[test]
    fn test_objective_is_negated_raw_score() {
        let dev = Cpu::seed_from_u64(5);
        let model = small_model(&dev);
        let vis = ImageVisualizer::new(&model, dev.clone());
        let x = vis.try_initial_input().unwrap();
        assert_eq!(x.shape(), &model.input_shape());

        let raw = model.try_raw_score(x.clone()).unwrap().try_scalar().unwrap();
        let (value, _) = value_and_grad(&x, |t| vis.objective(t)).unwrap();
        assert!((value + raw).abs() < 1e-6);
    }

    #[test]
    fn test_seeded_initial_input() {
        let dev: Cpu = Default::default();
        let model = small_model(&dev);
        let seed = dev.filled([1, 8, 8, 3], 0.25);
        let vis = ImageVisualizer::with_seed(&model, dev.clone(), seed.clone());
        assert_eq!(vis.try_initial_input().unwrap().as_vec(), seed.as_vec());
    }

    #[test]
    fn test_ascent_raises_raw_score() {
        let dev = Cpu::seed_from_u64(11);
        let model = small_model(&dev);
        let minimizer = Minimizer::new(ImageVisualizer::new(&model, dev.clone()));
        let x0 = minimizer.target().try_initial_input().unwrap();
        let before = model.try_raw_score(x0.clone()).unwrap().try_scalar().unwrap();

        let mut rule = MomentumAscent::new(MomentumConfig { lr: 0.1, gamma: 0.5 });
        let x = minimizer.try_run_from(x0, &mut rule, 20).unwrap();
        let after = model.try_raw_score(x).unwrap().try_scalar().unwrap();
        assert!(after > before, "{after} <= {before}");
    }
}
