//! # Image Folder Classifier
//!
//! Fine-tunes a pretrained ResNet on a folder-structured image dataset and
//! serves predictions from the resulting weights, built on the Burn framework.
//!
//! ## Modules
//!
//! - `dataset`: Class discovery, preprocessing/augmentation, Burn dataset and batcher
//! - `model`: ResNet backbone with a replaceable head, pretrained loading, snapshots
//! - `training`: Supervised fine-tuning loop and checkpoint policy
//! - `inference`: Load-once predictor used by the CLI and the HTTP server
//! - `utils`: Error types and logging setup
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use imagefolder_classifier::dataset::ImageFolder;
//! use imagefolder_classifier::model::{Arch, ResNetConfig};
//!
//! let train = ImageFolder::open("data/train")?;
//! let config = ResNetConfig::new(Arch::ResNet50, train.num_classes());
//! // ... see training::supervised::run_training
//! ```

pub mod backend;
pub mod dataset;
pub mod inference;
pub mod model;
pub mod training;
pub mod utils;

// Re-export commonly used items for convenience
pub use dataset::{ClassNameTable, DatasetLayout, ImageFolder, Mode, Preprocessor};
pub use inference::{PredictionResult, Predictor};
pub use model::{Arch, ResNet, ResNetConfig};
pub use training::{run_training, TrainingConfig};
pub use utils::error::{ClassifierError, Result};

/// Default square image size fed to the network
pub const IMAGE_SIZE: usize = 224;

/// Class count used at inference when no class names file is present
pub const FALLBACK_NUM_CLASSES: usize = 10;

/// Version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
