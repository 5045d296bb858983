//! Pretrained Backbones
//!
//! Loads torchvision ImageNet checkpoints (`.pth`) into [`ResNet`] with
//! `burn-import`, then swaps the 1000-way ImageNet head for a fresh one.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};

use burn::module::Module;
use burn::record::{FullPrecisionSettings, Recorder};
use burn::tensor::backend::Backend;
use burn_import::pytorch::{LoadArgs, PyTorchFileRecorder};
use tracing::info;

use super::config::{Arch, ResNetConfig, IMAGENET_CLASSES};
use super::persist::check_shapes;
use super::resnet::ResNet;
use crate::utils::error::{ClassifierError, Result};

/// Directory searched for pretrained checkpoints when none is given
pub const DEFAULT_PRETRAINED_DIR: &str = "pretrained";

/// File name torchvision publishes the checkpoint under
pub fn checkpoint_file_name(arch: Arch) -> &'static str {
    let url = arch.torchvision_url();
    url.rsplit('/').next().unwrap_or(url)
}

/// Default local path of the checkpoint for `arch`
pub fn default_checkpoint_path(arch: Arch) -> PathBuf {
    Path::new(DEFAULT_PRETRAINED_DIR).join(checkpoint_file_name(arch))
}

fn pretrained_error(arch: Arch, path: &Path, reason: impl std::fmt::Display) -> ClassifierError {
    ClassifierError::Pretrained {
        path: path.to_path_buf(),
        reason: format!("{} (download: {})", reason, arch.torchvision_url()),
    }
}

/// torchvision key layout mapped onto the module tree
fn load_args(path: &Path) -> LoadArgs {
    LoadArgs::new(path.to_path_buf())
        // layer1.0.conv1.weight -> layer1.blocks.0.conv1.weight
        .with_key_remap(r"(layer[1-4])\.([0-9]+)\.(.+)", "$1.blocks.$2.$3")
        // downsample is a Sequential(conv, bn) in torchvision
        .with_key_remap(r"(.+)\.downsample\.0\.(.+)", "$1.downsample.conv.$2")
        .with_key_remap(r"(.+)\.downsample\.1\.(.+)", "$1.downsample.bn.$2")
}

/// Build a classifier from an ImageNet checkpoint with a fresh `num_classes` head
pub fn load_pretrained<B: Backend>(
    arch: Arch,
    num_classes: usize,
    path: &Path,
    device: &B::Device,
) -> Result<ResNet<B>> {
    if !path.is_file() {
        return Err(pretrained_error(arch, path, "checkpoint not found"));
    }

    info!("Loading {} ImageNet weights from {:?}", arch, path);

    let record = catch_unwind(AssertUnwindSafe(|| {
        PyTorchFileRecorder::<FullPrecisionSettings>::default()
            .load::<<ResNet<B> as Module<B>>::Record>(load_args(path), device)
    }))
    .map_err(|_| pretrained_error(arch, path, "checkpoint could not be parsed"))?
    .map_err(|e| pretrained_error(arch, path, e))?;

    let model: ResNet<B> = ResNetConfig::new(arch, IMAGENET_CLASSES).init(device);
    let expected = model.parameter_shapes();

    let model = catch_unwind(AssertUnwindSafe(|| model.load_record(record)))
        .map_err(|_| pretrained_error(arch, path, "checkpoint does not match the architecture"))?;

    check_shapes(&expected, &model.parameter_shapes())
        .map_err(|reason| pretrained_error(arch, path, reason))?;

    Ok(model.with_head(num_classes, device))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::InferenceBackend;
    use tempfile::TempDir;

    #[test]
    fn test_checkpoint_names() {
        assert_eq!(checkpoint_file_name(Arch::ResNet50), "resnet50-11ad3fa6.pth");
        assert_eq!(
            default_checkpoint_path(Arch::ResNet18),
            PathBuf::from("pretrained/resnet18-f37072fd.pth")
        );
    }

    #[test]
    fn test_missing_checkpoint_is_pretrained_error() {
        let dir = TempDir::new().unwrap();
        let device = Default::default();

        let result = load_pretrained::<InferenceBackend>(
            Arch::ResNet18,
            4,
            &dir.path().join("resnet18.pth"),
            &device,
        );

        match result {
            Err(err @ ClassifierError::Pretrained { .. }) => {
                assert!(err.to_string().contains("download.pytorch.org"));
            }
            other => panic!("expected pretrained error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_unreadable_checkpoint_is_pretrained_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("resnet18.pth");
        std::fs::write(&path, b"not a pickle").unwrap();
        let device = Default::default();

        let result = load_pretrained::<InferenceBackend>(Arch::ResNet18, 4, &path, &device);
        assert!(matches!(result, Err(ClassifierError::Pretrained { .. })));
    }
}
