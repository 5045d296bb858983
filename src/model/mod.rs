//! Model module for ResNet classifiers using the Burn framework
//!
//! This module provides:
//! - ResNet-18/34/50/101 backbones with a replaceable linear head
//! - Loading of torchvision ImageNet checkpoints as the starting point
//! - Weight snapshots with shape validation on load

pub mod config;
pub mod persist;
pub mod pretrained;
pub mod resnet;

use std::path::Path;

use burn::tensor::backend::Backend;
use tracing::info;

use crate::utils::error::{ClassifierError, Result};

// Re-export main types for convenience
pub use config::{Arch, ResNetConfig};
pub use persist::{load_weights, save_weights};
pub use pretrained::load_pretrained;
pub use resnet::ResNet;

/// Build the model a training run starts from
///
/// With `pretrained`, the backbone comes from that ImageNet checkpoint and
/// only the head is fresh; without it every parameter is randomly initialized.
pub fn build_classifier<B: Backend>(
    config: &ResNetConfig,
    pretrained: Option<&Path>,
    device: &B::Device,
) -> Result<ResNet<B>> {
    config.validate().map_err(ClassifierError::Config)?;

    match pretrained {
        Some(path) => load_pretrained(config.arch, config.num_classes, path, device),
        None => {
            info!(
                "Initializing {} with random weights ({} classes)",
                config.arch, config.num_classes
            );
            Ok(config.init(device))
        }
    }
}
