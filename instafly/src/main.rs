use std::path::PathBuf;

use anyhow::Context;
use clap::{builder::RangedU64ValueParser, Args, Parser, Subcommand, ValueHint};
use instafly::{
    dump::{self, CollectorConfig},
    model::ImageSize,
    train::{train, TrainConfig},
    visualizer::{visualize, VisualizeConfig},
};
use instafly_core::optim::{MomentumConfig, SgdConfig};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Collect post thumbnails, learn what gets liked and render what the model likes"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Extract users and thumbnails from a mitmproxy dump
    Collect(CollectArgs),

    /// Fit the scoring network to collected images
    Train(TrainArgs),

    /// Optimize an image to maximize the network's score
    Visualize(VisualizeArgs),
}

#[derive(Args)]
struct CollectArgs {
    /// mitmdump output file
    #[arg(short = 'f', value_name = "MITM_DUMP_FILE_PATH", value_hint = ValueHint::FilePath)]
    dump: PathBuf,

    /// CSV file the collected users are written to
    #[arg(short = 'u', value_name = "USER_FILE_PATH", value_hint = ValueHint::FilePath)]
    users: PathBuf,

    /// CSV file the collected posts are written to
    #[arg(short = 'm', value_name = "MEDIA_FILE_PATH", value_hint = ValueHint::FilePath)]
    media: PathBuf,

    /// Directory the thumbnails are saved in
    #[arg(short = 'd', value_name = "IMAGE_DIR_PATH", value_hint = ValueHint::DirPath)]
    image_dir: PathBuf,

    /// Only write the tables, skip thumbnail bodies
    #[arg(long)]
    no_images: bool,
}

#[derive(Args)]
struct SizeArgs {
    /// Image width seen by the network
    #[arg(long, default_value_t = 64, value_parser = RangedU64ValueParser::<usize>::new().range(1..))]
    width: usize,

    /// Image height seen by the network
    #[arg(long, default_value_t = 64, value_parser = RangedU64ValueParser::<usize>::new().range(1..))]
    height: usize,
}

impl SizeArgs {
    fn size(&self) -> ImageSize {
        ImageSize {
            width: self.width,
            height: self.height,
        }
    }
}

#[derive(Args)]
struct TrainArgs {
    /// Media CSV with `path` and `like_rate` columns
    #[arg(short = 'd', value_hint = ValueHint::FilePath)]
    csv: PathBuf,

    /// Directory image paths in the CSV are relative to
    #[arg(short = 'i', value_hint = ValueHint::DirPath)]
    image_dir: PathBuf,

    /// Where the trained weights are written
    #[arg(short = 'o', value_hint = ValueHint::FilePath)]
    output: PathBuf,

    #[arg(short = 'n', long, default_value_t = 10)]
    epochs: usize,

    #[arg(long, default_value_t = 32)]
    batch_size: usize,

    #[arg(long, default_value_t = 1e-2)]
    lr: f32,

    /// Share of samples used for fitting, the rest is held out
    #[arg(long, default_value_t = 0.8)]
    train_fraction: f32,

    /// Seed for weight init and shuffling, taken from the clock if omitted
    #[arg(long)]
    seed: Option<u64>,

    #[command(flatten)]
    size: SizeArgs,
}

#[derive(Args)]
struct VisualizeArgs {
    /// Trained weights (safetensors)
    #[arg(short = 'w', value_hint = ValueHint::FilePath)]
    weights: PathBuf,

    /// Where the optimized image is written
    #[arg(short = 'o', value_hint = ValueHint::FilePath)]
    output: PathBuf,

    /// Start from this image instead of random noise
    #[arg(short = 's', value_hint = ValueHint::FilePath)]
    seed_image: Option<PathBuf>,

    #[arg(short = 'n', long, default_value_t = 500)]
    iterations: usize,

    #[arg(long, default_value_t = 0.01)]
    lr: f32,

    /// Momentum decay
    #[arg(long, default_value_t = 0.01)]
    gamma: f32,

    /// Seed for the initial noise, taken from the clock if omitted
    #[arg(long)]
    seed: Option<u64>,

    #[command(flatten)]
    size: SizeArgs,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .init();
}

fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();
    match cli.command {
        Command::Collect(args) => {
            let cfg = CollectorConfig {
                collect_images: !args.no_images,
                ..Default::default()
            };
            let summary = dump::collect(&args.dump, &args.users, &args.media, &args.image_dir, cfg)
                .with_context(|| format!("collecting from {}", args.dump.display()))?;
            info!(users = summary.users, images = summary.images, "done");
        }
        Command::Train(args) => {
            let mut cfg = TrainConfig::new(args.csv, args.image_dir, args.output);
            cfg.epochs = args.epochs;
            cfg.batch_size = args.batch_size;
            cfg.train_fraction = args.train_fraction;
            cfg.sgd = SgdConfig {
                lr: args.lr,
                ..Default::default()
            };
            cfg.size = args.size.size();
            cfg.seed = args.seed;
            let report = train(&cfg).context("training")?;
            info!(
                final_loss = report.epoch_losses.last().copied(),
                test_mse = report.test_mse,
                "done"
            );
        }
        Command::Visualize(args) => {
            let mut cfg = VisualizeConfig::new(args.weights, args.output);
            cfg.seed_image = args.seed_image;
            cfg.num_iterations = args.iterations;
            cfg.momentum = MomentumConfig {
                lr: args.lr,
                gamma: args.gamma,
            };
            cfg.size = args.size.size();
            cfg.rng_seed = args.seed;
            let report = visualize(&cfg).context("visualizing")?;
            info!(
                initial = report.initial_raw_score,
                last = report.final_raw_score,
                output = %cfg.output.display(),
                "done"
            );
        }
    }
    Ok(())
}
