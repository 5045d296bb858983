//! Application state for the inference server
//!
//! Built once before the listener starts and shared read-only by every
//! request handler.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use imagefolder_classifier::backend::{default_device, InferenceBackend};
use imagefolder_classifier::model::Arch;
use imagefolder_classifier::Predictor;

/// Default upload limit for `/predict` (10 MiB)
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Server configuration
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Weights snapshot written by training
    pub weights: PathBuf,
    /// Class names file written by training (optional on disk)
    pub class_names: PathBuf,
    /// Architecture override; otherwise read from the snapshot sidecar
    pub arch: Option<Arch>,
    /// Square input resolution
    pub image_size: usize,
    /// Maximum accepted request body size
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            weights: PathBuf::from("model/classifier.mpk"),
            class_names: PathBuf::from("model/class_names.txt"),
            arch: None,
            image_size: imagefolder_classifier::IMAGE_SIZE,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}

/// Shared application state
pub struct AppState {
    /// Server configuration
    pub config: ServerConfig,
    /// Loaded classifier
    pub predictor: Predictor<InferenceBackend>,
    /// Server start time
    pub started_at: Instant,
}

impl AppState {
    /// Load weights and class names; any failure aborts startup
    pub fn load(config: ServerConfig) -> imagefolder_classifier::Result<Self> {
        let device = default_device();
        let predictor = Predictor::load(
            &config.weights,
            &config.class_names,
            config.arch,
            config.image_size,
            &device,
        )?;
        Ok(Self::new(config, predictor))
    }

    pub fn new(config: ServerConfig, predictor: Predictor<InferenceBackend>) -> Self {
        Self {
            config,
            predictor,
            started_at: Instant::now(),
        }
    }

    /// Get uptime in seconds
    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}

pub type SharedState = Arc<AppState>;
