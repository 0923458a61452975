//! Fitting a [ScoreNet] to a [Dataset].

use std::path::PathBuf;

use instafly_core::prelude::*;
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
use tracing::info;

use crate::{
    dataset::{load_dataset, Dataset},
    model::{ImageSize, ScoreNet, ScoreNetConfig},
    visualizer::seed_from_clock,
};

/// Everything a training run needs.
#[derive(Debug, Clone)]
pub struct TrainConfig {
    /// Metadata CSV with `path` and `like_rate` columns.
    pub csv_path: PathBuf,
    pub image_dir: PathBuf,
    /// Where the trained weights are written, in safetensors format.
    pub output: PathBuf,
    /// Defaults to `10`.
    pub epochs: usize,
    /// Defaults to `32`.
    pub batch_size: usize,
    /// Share of the samples used for fitting, the rest is held out. Defaults
    /// to `0.8`.
    pub train_fraction: f32,
    pub sgd: SgdConfig,
    pub size: ImageSize,
    /// Seed for weight init and shuffling. Taken from the clock when `None`.
    pub seed: Option<u64>,
}

impl TrainConfig {
    pub fn new(
        csv_path: impl Into<PathBuf>,
        image_dir: impl Into<PathBuf>,
        output: impl Into<PathBuf>,
    ) -> Self {
        Self {
            csv_path: csv_path.into(),
            image_dir: image_dir.into(),
            output: output.into(),
            epochs: 10,
            batch_size: 32,
            train_fraction: 0.8,
            sgd: Default::default(),
            size: Default::default(),
            seed: None,
        }
    }
}

/// Losses observed while training.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainReport {
    /// Mean training loss of every epoch.
    pub epoch_losses: Vec<f32>,
    /// Mean squared error on the held out samples, `None` when nothing was
    /// held out.
    pub test_mse: Option<f32>,
    pub num_train: usize,
    pub num_test: usize,
}

/// Splits `0..n` into shuffled train and test indices. At least one sample
/// always ends up in the training set.
fn split_indices(n: usize, train_fraction: f32, rng: &mut StdRng) -> (Vec<usize>, Vec<usize>) {
    let mut indices: Vec<usize> = (0..n).collect();
    indices.shuffle(rng);
    let num_train = ((n as f32 * train_fraction).round() as usize).clamp(1, n.max(1));
    let test = indices.split_off(num_train.min(n));
    (indices, test)
}

/// Runs one pass over `indices`, returning the mean batch loss.
fn train_epoch(
    model: &mut ScoreNet,
    opt: &mut Sgd<ScoreNet>,
    data: &Dataset,
    device: &Cpu,
    indices: &[usize],
    batch_size: usize,
) -> Result<f32, crate::Error> {
    let mut total = 0.0;
    let mut batches = 0;
    for batch in indices.chunks(batch_size.max(1)) {
        let (x, y) = data.batch(device, batch)?;
        let pred = model.try_forward(x.leaky_traced())?;
        let loss = mse_loss(pred, y)?;
        total += loss.try_scalar()?;
        batches += 1;
        let gradients = loss.try_backward()?;
        opt.update(model, &gradients)?;
    }
    Ok(total / batches.max(1) as f32)
}

/// Mean squared error of `model` over `indices`, weighting every sample equally.
pub fn evaluate(
    model: &ScoreNet,
    data: &Dataset,
    device: &Cpu,
    indices: &[usize],
    batch_size: usize,
) -> Result<f32, crate::Error> {
    let mut sum = 0.0;
    for batch in indices.chunks(batch_size.max(1)) {
        let (x, y) = data.batch(device, batch)?;
        let loss = mse_loss(model.try_forward(x)?, y)?.try_scalar()?;
        sum += loss * batch.len() as f32;
    }
    Ok(sum / indices.len().max(1) as f32)
}

/// Loads the dataset, trains a fresh [ScoreNet] with SGD on mean squared
/// error and saves its weights.
pub fn train(cfg: &TrainConfig) -> Result<TrainReport, crate::Error> {
    let seed = cfg.seed.unwrap_or_else(seed_from_clock);
    let device = Cpu::seed_from_u64(seed);
    let mut rng = StdRng::seed_from_u64(seed);

    let data = load_dataset(&device, &cfg.csv_path, &cfg.image_dir, cfg.size)?;
    let (train_idx, test_idx) = split_indices(data.len(), cfg.train_fraction, &mut rng);
    info!(
        train = train_idx.len(),
        test = test_idx.len(),
        "split dataset"
    );

    let mut model = device.try_build_module(ScoreNetConfig { size: cfg.size })?;
    let mut opt = Sgd::new(&model, cfg.sgd);
    info!(params = model.num_params(), "built model");

    let mut epoch_losses = Vec::with_capacity(cfg.epochs);
    let mut order = train_idx.clone();
    for epoch in 0..cfg.epochs {
        order.shuffle(&mut rng);
        let loss = train_epoch(&mut model, &mut opt, &data, &device, &order, cfg.batch_size)?;
        info!(epoch, loss, "finished epoch");
        epoch_losses.push(loss);
    }

    let test_mse = if test_idx.is_empty() {
        None
    } else {
        let mse = evaluate(&model, &data, &device, &test_idx, cfg.batch_size)?;
        info!(mse, "evaluated held out samples");
        Some(mse)
    };

    model.save_safetensors(&cfg.output)?;
    info!(output = %cfg.output.display(), "saved weights");

    Ok(TrainReport {
        epoch_losses,
        test_mse,
        num_train: train_idx.len(),
        num_test: test_idx.len(),
    })
}
