//! Supervised Fine-Tuning
//!
//! A custom training loop over Burn's autodiff API: Adam at a constant
//! learning rate, cross-entropy on logits, a full reshuffle every epoch,
//! and optional validation on a held-out split driving the checkpoint policy.

use std::path::PathBuf;

use burn::{
    data::dataloader::batcher::Batcher,
    data::dataset::Dataset,
    module::AutodiffModule,
    nn::loss::CrossEntropyLossConfig,
    optim::{AdamConfig, GradientsParams, Optimizer},
    tensor::{
        backend::{AutodiffBackend, Backend},
        ElementConversion,
    },
};
use chrono::{DateTime, Local};
use colored::Colorize;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::checkpoint::{save_without_validation, BestCheckpoint};
use super::config::TrainingConfig;
use crate::dataset::{
    DatasetLayout, ImageBatch, ImageBatcher, ImageFolder, ImageFolderDataset, Mode,
};
use crate::model::{build_classifier, load_weights, save_weights, ResNet, ResNetConfig};
use crate::utils::error::Result;
use crate::utils::logging::TrainingLogger;

/// Metrics of one epoch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpochStats {
    /// 1-based epoch number
    pub epoch: usize,
    pub train_loss: f64,
    pub train_accuracy: f64,
    pub val_accuracy: Option<f64>,
    /// Whether weights were written after this epoch
    pub checkpoint_saved: bool,
}

/// Outcome of a training run, written as `training_summary.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingSummary {
    pub arch: String,
    pub class_names: Vec<String>,
    pub train_samples: usize,
    pub val_samples: Option<usize>,
    pub epochs: Vec<EpochStats>,
    pub best_val_accuracy: Option<f64>,
    pub best_epoch: Option<usize>,
    pub weights_path: PathBuf,
    pub class_names_path: PathBuf,
    pub started_at: DateTime<Local>,
    pub finished_at: DateTime<Local>,
}

impl TrainingSummary {
    pub fn num_classes(&self) -> usize {
        self.class_names.len()
    }

    pub fn checkpoints_written(&self) -> usize {
        self.epochs.iter().filter(|e| e.checkpoint_saved).count()
    }
}

/// Run a fine-tuning job described by `config`
///
/// # Type Parameters
/// * `B` - The autodiff backend to use (e.g., `Autodiff<NdArray>` or `Autodiff<Cuda>`)
///
/// The class name table is written as soon as the training split is read,
/// before the model is built, so a run that fails later still leaves the
/// class order of its dataset behind.
pub fn run_training<B: AutodiffBackend>(
    config: &TrainingConfig,
    device: &B::Device,
) -> Result<TrainingSummary> {
    config.validate()?;
    let started_at = Local::now();

    println!("{}", "Initializing Training...".green().bold());
    info!("Training on device {:?}", device);

    // Datasets
    let layout = DatasetLayout::detect(&config.data_dir)?;
    let train_folder = ImageFolder::open(layout.train_dir())?;

    std::fs::create_dir_all(&config.output_dir)?;
    let class_names_path = config.class_names_path();
    train_folder.classes().save(&class_names_path)?;

    let val_folder = match &layout {
        DatasetLayout::Split { val, .. } => {
            Some(ImageFolder::open_with_classes(val, train_folder.classes())?)
        }
        DatasetLayout::Single(_) => None,
    };

    let num_classes = train_folder.num_classes();
    let train_dataset = ImageFolderDataset::new(&train_folder, config.image_size, Mode::Train);
    let val_dataset = val_folder
        .as_ref()
        .map(|folder| ImageFolderDataset::new(folder, config.image_size, Mode::Inference));
    let batcher = ImageBatcher::new(config.image_size);

    // Model
    let model_config = ResNetConfig::new(config.arch, num_classes);
    let mut model: ResNet<B> = match &config.resume {
        Some(path) => {
            info!("Resuming from {:?}", path);
            load_weights(model_config.init(device), &model_config, path, device)?
        }
        None => build_classifier(&model_config, config.pretrained.as_deref(), device)?,
    };

    let mut optimizer = AdamConfig::new().init();
    let loss_fn = CrossEntropyLossConfig::new().init(device);

    println!();
    println!("{}", "Training Configuration:".cyan().bold());
    println!("  Architecture:       {}", config.arch);
    println!("  Classes:            {}", num_classes);
    println!("  Training samples:   {}", train_dataset.len());
    match &val_dataset {
        Some(val) => println!("  Validation samples: {}", val.len()),
        None => println!("  Validation samples: none (single-split dataset)"),
    }
    println!("  Epochs:             {}", config.epochs);
    println!("  Batch size:         {}", config.batch_size);
    println!("  Learning rate:      {}", config.learning_rate);
    println!(
        "  Backbone:           {}",
        match (&config.resume, &config.pretrained) {
            (Some(path), _) => format!("resumed from {:?}", path),
            (None, Some(path)) => format!("pretrained from {:?}", path),
            (None, None) => "random initialization".to_string(),
        }
    );
    println!();

    let weights_path = config.weights_path();
    let mut written_weights = crate::model::persist::weights_file(&weights_path);
    let mut policy = BestCheckpoint::new();
    let mut logger = TrainingLogger::new(config.epochs);
    let mut epoch_rng = ChaCha8Rng::seed_from_u64(config.seed);
    let mut history = Vec::with_capacity(config.epochs);

    for epoch in 0..config.epochs {
        logger.start_epoch(epoch);
        println!(
            "{}",
            format!("Epoch {}/{}", epoch + 1, config.epochs).yellow().bold()
        );

        let mut epoch_loss = 0.0f64;
        let mut correct = 0usize;
        let mut seen = 0usize;

        let indices = shuffled_indices(train_dataset.len(), &mut epoch_rng);
        let num_batches = indices.len().div_ceil(config.batch_size);

        for (batch_idx, chunk) in indices.chunks(config.batch_size).enumerate() {
            let items = train_dataset.load_items(chunk)?;
            let batch: ImageBatch<B> = batcher.batch(items, device);
            let batch_size = batch.targets.dims()[0];

            let output = model.forward(batch.images);
            let loss = loss_fn.forward(output.clone(), batch.targets.clone());

            let loss_value: f64 = loss.clone().into_scalar().elem();
            epoch_loss += loss_value;

            let predictions = output.argmax(1).reshape([batch_size]);
            let batch_correct: i64 = predictions
                .equal(batch.targets)
                .int()
                .sum()
                .into_scalar()
                .elem();
            correct += batch_correct as usize;
            seen += batch_size;

            // Gradients are rebuilt from this loss alone
            let grads = GradientsParams::from_grads(loss.backward(), &model);
            model = optimizer.step(config.learning_rate, model, grads);

            if (batch_idx + 1) % 10 == 0 || batch_idx + 1 == num_batches {
                debug!(
                    "Batch {}/{}: loss = {:.4}, acc = {:.2}%",
                    batch_idx + 1,
                    num_batches,
                    loss_value,
                    100.0 * correct as f64 / seen as f64
                );
            }
        }

        let train_loss = epoch_loss / num_batches.max(1) as f64;
        let train_accuracy = correct as f64 / seen.max(1) as f64;

        let (val_accuracy, save) = match &val_dataset {
            Some(val) => {
                let accuracy = evaluate(&model.valid(), val, &batcher, config.batch_size, device)?;
                (Some(accuracy), policy.observe(epoch + 1, accuracy))
            }
            None => (None, save_without_validation(epoch + 1, config.epochs)),
        };

        logger.end_epoch(train_loss, train_accuracy, val_accuracy);

        if save {
            written_weights = save_weights(&model, &model_config, &weights_path)?;
            if let Some(accuracy) = val_accuracy {
                logger.log_new_best(accuracy);
            }
        }

        println!(
            "  {} Loss: {:.4} | Train Acc: {:.2}%{}{}",
            "→".cyan(),
            train_loss,
            train_accuracy * 100.0,
            val_accuracy
                .map(|acc| format!(" | Val Acc: {:.2}%", acc * 100.0))
                .unwrap_or_default(),
            if save {
                " (saved)".green().to_string()
            } else {
                String::new()
            }
        );

        history.push(EpochStats {
            epoch: epoch + 1,
            train_loss,
            train_accuracy,
            val_accuracy,
            checkpoint_saved: save,
        });
    }

    logger.log_complete(policy.best());

    let summary = TrainingSummary {
        arch: config.arch.to_string(),
        class_names: train_folder.classes().names().to_vec(),
        train_samples: train_dataset.len(),
        val_samples: val_dataset.as_ref().map(|v| v.len()),
        epochs: history,
        best_val_accuracy: policy.best(),
        best_epoch: policy.best_epoch(),
        weights_path: written_weights,
        class_names_path,
        started_at,
        finished_at: Local::now(),
    };

    let summary_path = config.summary_path();
    std::fs::write(&summary_path, serde_json::to_string_pretty(&summary)?)?;
    info!("Wrote training summary to {:?}", summary_path);

    println!();
    println!("{}", "Training Complete!".green().bold());
    println!("  Weights:     {:?}", summary.weights_path);
    println!("  Class names: {:?}", summary.class_names_path);
    if let Some(best) = summary.best_val_accuracy {
        println!("  Best validation accuracy: {:.2}%", best * 100.0);
    }

    Ok(summary)
}

/// All indices `0..len` in a fresh random order
fn shuffled_indices(len: usize, rng: &mut ChaCha8Rng) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..len).collect();
    indices.shuffle(rng);
    indices
}

/// Accuracy of `model` over the whole dataset, in sequential batches
pub fn evaluate<B: Backend>(
    model: &ResNet<B>,
    dataset: &ImageFolderDataset,
    batcher: &ImageBatcher,
    batch_size: usize,
    device: &B::Device,
) -> Result<f64> {
    let indices: Vec<usize> = (0..dataset.len()).collect();
    let mut correct = 0usize;
    let mut total = 0usize;

    for chunk in indices.chunks(batch_size) {
        let items = dataset.load_items(chunk)?;
        let batch: ImageBatch<B> = batcher.batch(items, device);
        let n = batch.targets.dims()[0];

        let predictions = model.forward(batch.images).argmax(1).reshape([n]);
        let batch_correct: i64 = predictions
            .equal(batch.targets)
            .int()
            .sum()
            .into_scalar()
            .elem();

        correct += batch_correct as usize;
        total += n;
    }

    Ok(correct as f64 / total.max(1) as f64)
}
