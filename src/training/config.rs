//! Training Configuration
//!
//! Hyperparameters and file locations for a fine-tuning run. Serializable to
//! JSON so a run can be described in a file and overridden from the CLI.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::dataset::check_image_size;
use crate::model::Arch;
use crate::utils::error::{ClassifierError, Result};

/// Training configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Dataset root (single class-folder directory, or `train/` + `val/`)
    pub data_dir: PathBuf,

    /// Directory receiving weights, class names and the run summary
    pub output_dir: PathBuf,

    /// Weights file name inside `output_dir`, without extension
    pub weights_name: String,

    /// Class names file name inside `output_dir`
    pub class_names_file: String,

    /// Number of training epochs
    pub epochs: usize,

    /// Batch size for training and validation
    pub batch_size: usize,

    /// Square input resolution
    pub image_size: usize,

    /// Constant Adam learning rate
    pub learning_rate: f64,

    /// Backbone depth
    pub arch: Arch,

    /// Seed for the per-epoch shuffle
    pub seed: u64,

    /// ImageNet checkpoint for the backbone; `None` trains from scratch
    pub pretrained: Option<PathBuf>,

    /// Snapshot to continue from instead of the pretrained backbone
    pub resume: Option<PathBuf>,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            output_dir: PathBuf::from("model"),
            weights_name: "classifier".to_string(),
            class_names_file: "class_names.txt".to_string(),
            epochs: 10,
            batch_size: 32,
            image_size: crate::IMAGE_SIZE,
            learning_rate: 1e-4,
            arch: Arch::ResNet50,
            seed: 42,
            pretrained: None,
            resume: None,
        }
    }
}

impl TrainingConfig {
    /// Weights path without the recorder extension
    pub fn weights_path(&self) -> PathBuf {
        self.output_dir.join(&self.weights_name)
    }

    pub fn class_names_path(&self) -> PathBuf {
        self.output_dir.join(&self.class_names_file)
    }

    pub fn summary_path(&self) -> PathBuf {
        self.output_dir.join("training_summary.json")
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.epochs == 0 {
            return Err(ClassifierError::Config("epochs must be greater than 0".into()));
        }
        if self.batch_size == 0 {
            return Err(ClassifierError::Config("batch_size must be greater than 0".into()));
        }
        check_image_size(self.image_size)?;
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(ClassifierError::Config(format!(
                "learning_rate must be positive, got {}",
                self.learning_rate
            )));
        }
        if self.weights_name.is_empty() || self.class_names_file.is_empty() {
            return Err(ClassifierError::Config("output file names must not be empty".into()));
        }
        Ok(())
    }

    /// Save configuration to a JSON file
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load configuration from a JSON file; missing fields take their defaults
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = TrainingConfig::default();
        assert_eq!(config.batch_size, 32);
        assert_eq!(config.epochs, 10);
        assert_eq!(config.image_size, 224);
        assert_eq!(config.learning_rate, 1e-4);
        assert_eq!(config.arch, Arch::ResNet50);
        assert_eq!(config.weights_path(), PathBuf::from("model/classifier"));
        assert_eq!(config.class_names_path(), PathBuf::from("model/class_names.txt"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("train.json");
        std::fs::write(&path, r#"{"epochs": 3, "arch": "resnet18"}"#).unwrap();

        let config = TrainingConfig::load(&path).unwrap();
        assert_eq!(config.epochs, 3);
        assert_eq!(config.arch, Arch::ResNet18);
        assert_eq!(config.batch_size, 32);
    }

    #[test]
    fn test_save_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("train.json");

        let config = TrainingConfig {
            pretrained: Some(PathBuf::from("pretrained/resnet50-11ad3fa6.pth")),
            ..Default::default()
        };
        config.save(&path).unwrap();
        assert_eq!(TrainingConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let zero_batch = TrainingConfig {
            batch_size: 0,
            ..Default::default()
        };
        assert!(matches!(zero_batch.validate(), Err(ClassifierError::Config(_))));

        let bad_lr = TrainingConfig {
            learning_rate: -1.0,
            ..Default::default()
        };
        assert!(bad_lr.validate().is_err());

        let tiny = TrainingConfig {
            image_size: 16,
            ..Default::default()
        };
        assert!(matches!(tiny.validate(), Err(ClassifierError::Config(_))));
    }
}
