//! Image Folder Classifier CLI
//!
//! Fine-tunes a pretrained ResNet on a folder-structured image dataset,
//! classifies local images with the resulting weights, and inspects datasets.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use tracing::info;

use imagefolder_classifier::backend::{backend_name, default_device, InferenceBackend, TrainingBackend};
use imagefolder_classifier::dataset::{is_image_file, DatasetLayout, ImageFolder};
use imagefolder_classifier::model::pretrained::default_checkpoint_path;
use imagefolder_classifier::model::Arch;
use imagefolder_classifier::training::{run_training, TrainingConfig};
use imagefolder_classifier::utils::format_duration;
use imagefolder_classifier::utils::logging::{init_logging, LogConfig};
use imagefolder_classifier::Predictor;

/// Fine-tune and run ResNet image classifiers with Burn
#[derive(Parser, Debug)]
#[command(name = "imagefolder_classifier")]
#[command(version)]
#[command(about = "Fine-tune a pretrained ResNet on an image folder", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, default_value = "false")]
    verbose: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Disable ANSI colors in log output
    #[arg(long, default_value = "false")]
    no_color: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Fine-tune a classifier on an image folder
    Train(TrainArgs),

    /// Classify an image, or every image in a directory
    Infer {
        /// Path to input image or directory
        #[arg(short, long)]
        input: PathBuf,

        /// Weights snapshot written by `train`
        #[arg(short, long, default_value = "model/classifier.mpk")]
        weights: PathBuf,

        /// Class names file written by `train`
        #[arg(short, long, default_value = "model/class_names.txt")]
        class_names: PathBuf,

        /// Architecture (defaults to the one recorded with the weights)
        #[arg(long, value_enum)]
        arch: Option<Arch>,

        /// Square input resolution
        #[arg(long, default_value_t = imagefolder_classifier::IMAGE_SIZE)]
        image_size: usize,

        /// Print one JSON object per image
        #[arg(long, default_value = "false")]
        json: bool,
    },

    /// List the classes and example counts of a dataset
    Classes {
        /// Dataset root
        #[arg(short, long, default_value = "data")]
        data_dir: PathBuf,
    },
}

/// Training options; unset flags fall back to `--config`, then to defaults
#[derive(Args, Debug)]
struct TrainArgs {
    /// JSON training configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Dataset root (class folders, or `train/` and `val/`) [default: data]
    #[arg(short, long)]
    data_dir: Option<PathBuf>,

    /// Output directory for weights and class names [default: model]
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Number of training epochs [default: 10]
    #[arg(short, long)]
    epochs: Option<usize>,

    /// Batch size [default: 32]
    #[arg(short, long)]
    batch_size: Option<usize>,

    /// Learning rate [default: 0.0001]
    #[arg(short, long)]
    learning_rate: Option<f64>,

    /// Square input resolution [default: 224]
    #[arg(long)]
    image_size: Option<usize>,

    /// Backbone depth [default: resnet50]
    #[arg(long, value_enum)]
    arch: Option<Arch>,

    /// Random seed for the per-epoch shuffle [default: 42]
    #[arg(long)]
    seed: Option<u64>,

    /// ImageNet checkpoint (.pth) [default: pretrained/<torchvision file name>]
    #[arg(long, conflicts_with = "from_scratch")]
    pretrained: Option<PathBuf>,

    /// Train every parameter from random initialization
    #[arg(long, default_value = "false")]
    from_scratch: bool,

    /// Continue from a snapshot written by a previous run
    #[arg(long)]
    resume: Option<PathBuf>,
}

impl TrainArgs {
    fn into_config(self) -> Result<TrainingConfig> {
        let mut config = match &self.config {
            Some(path) => TrainingConfig::load(path)
                .with_context(|| format!("Failed to read training config {:?}", path))?,
            None => TrainingConfig::default(),
        };

        if let Some(data_dir) = self.data_dir {
            config.data_dir = data_dir;
        }
        if let Some(output_dir) = self.output_dir {
            config.output_dir = output_dir;
        }
        if let Some(epochs) = self.epochs {
            config.epochs = epochs;
        }
        if let Some(batch_size) = self.batch_size {
            config.batch_size = batch_size;
        }
        if let Some(learning_rate) = self.learning_rate {
            config.learning_rate = learning_rate;
        }
        if let Some(image_size) = self.image_size {
            config.image_size = image_size;
        }
        if let Some(arch) = self.arch {
            config.arch = arch;
        }
        if let Some(seed) = self.seed {
            config.seed = seed;
        }
        if let Some(resume) = self.resume {
            config.resume = Some(resume);
        }

        if self.from_scratch {
            config.pretrained = None;
        } else if let Some(pretrained) = self.pretrained {
            config.pretrained = Some(pretrained);
        } else if config.pretrained.is_none() {
            config.pretrained = Some(default_checkpoint_path(config.arch));
        }

        Ok(config)
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut log_config = if cli.verbose {
        LogConfig::verbose()
    } else {
        LogConfig::from_level_name(&cli.log_level)
    };
    if cli.no_color {
        log_config.ansi_colors = false;
        colored::control::set_override(false);
    }

    let _ = init_logging(&log_config);

    match cli.command {
        Commands::Train(args) => cmd_train(args.into_config()?)?,

        Commands::Infer {
            input,
            weights,
            class_names,
            arch,
            image_size,
            json,
        } => cmd_infer(&input, &weights, &class_names, arch, image_size, json)?,

        Commands::Classes { data_dir } => cmd_classes(&data_dir)?,
    }

    Ok(())
}

fn cmd_train(config: TrainingConfig) -> Result<()> {
    info!("Using backend: {}", backend_name());
    let start = std::time::Instant::now();

    let device = default_device();
    let summary = run_training::<TrainingBackend>(&config, &device)?;

    println!(
        "  Finished {} epochs in {}",
        summary.epochs.len(),
        format_duration(start.elapsed().as_secs_f64())
    );
    println!();
    println!("{}", "Next steps:".cyan().bold());
    println!(
        "  • Classify an image: imagefolder_classifier infer --input <image> --weights {:?}",
        summary.weights_path
    );
    println!(
        "  • Serve predictions: imagefolder_classifier_server --weights {:?} --class-names {:?}",
        summary.weights_path, summary.class_names_path
    );

    Ok(())
}

fn cmd_infer(
    input: &Path,
    weights: &Path,
    class_names: &Path,
    arch: Option<Arch>,
    image_size: usize,
    json: bool,
) -> Result<()> {
    let images = collect_images(input)?;

    let device = default_device();
    let predictor = Predictor::<InferenceBackend>::load(weights, class_names, arch, image_size, &device)
        .context("Failed to load classifier")?;

    if !json {
        println!(
            "{} {} with {} classes on {}",
            "Loaded".green().bold(),
            predictor.arch(),
            predictor.num_classes(),
            backend_name()
        );
        println!();
    }

    for path in images {
        let bytes = std::fs::read(&path).with_context(|| format!("Failed to read {:?}", path))?;

        match predictor.predict(&bytes) {
            Ok(result) if json => println!("{}", serde_json::to_string(&result)?),
            Ok(result) => println!("  {} {}", path.display().to_string().cyan(), result.display()),
            Err(e) if e.is_client_error() => {
                println!("  {} {}: {}", "Skipped".yellow(), path.display(), e)
            }
            Err(e) => return Err(e.into()),
        }
    }

    Ok(())
}

fn collect_images(input: &Path) -> Result<Vec<PathBuf>> {
    if input.is_file() {
        return Ok(vec![input.to_path_buf()]);
    }
    if !input.is_dir() {
        bail!("Input not found: {:?}", input);
    }

    let mut images: Vec<PathBuf> = std::fs::read_dir(input)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file() && is_image_file(path))
        .collect();
    images.sort();

    if images.is_empty() {
        bail!("No images found in {:?}", input);
    }
    Ok(images)
}

fn cmd_classes(data_dir: &Path) -> Result<()> {
    let layout = DatasetLayout::detect(data_dir)?;
    let train = ImageFolder::open(layout.train_dir())?;

    println!("{}", "Dataset Classes:".cyan().bold());
    println!("  Root:     {:?}", data_dir);
    println!(
        "  Layout:   {}",
        if layout.has_validation() {
            "train/ + val/"
        } else {
            "single split (no validation)"
        }
    );
    println!("  Classes:  {}", train.num_classes());
    println!("  Examples: {}", train.len());
    println!();

    for (idx, count) in train.class_counts().iter().enumerate() {
        println!(
            "  {:>3}. {:30} {:>6}",
            idx,
            train.classes().name(idx).unwrap_or("?"),
            count
        );
    }

    if let DatasetLayout::Split { val, .. } = &layout {
        let val = ImageFolder::open_with_classes(val, train.classes())?;
        println!();
        println!("  Validation examples: {}", val.len());
    }

    Ok(())
}
