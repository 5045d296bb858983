//! Weight Snapshots
//!
//! Saves and restores classifier parameters with Burn's `CompactRecorder`
//! (named msgpack, `.mpk`). A JSON sidecar next to the snapshot records the
//! architecture and class count it was trained with.
//!
//! Loading never returns a model whose parameters disagree with the model it
//! was asked to fill: any missing parameter or shape difference is reported
//! as a load error naming the parameter.

use std::ffi::OsString;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};

use burn::config::Config;
use burn::module::Module;
use burn::record::{CompactRecorder, Recorder};
use burn::tensor::backend::Backend;
use tracing::{debug, info};

use super::config::ResNetConfig;
use super::resnet::{ParameterShapes, ResNet};
use crate::utils::error::{ClassifierError, Result};

/// Extension the recorder appends to snapshot stems
pub const WEIGHTS_EXTENSION: &str = "mpk";

/// Snapshot path without the recorder extension
pub fn weights_stem(path: &Path) -> PathBuf {
    match path.extension() {
        Some(ext) if ext == WEIGHTS_EXTENSION => path.with_extension(""),
        _ => path.to_path_buf(),
    }
}

/// Snapshot file as written on disk
pub fn weights_file(path: &Path) -> PathBuf {
    with_suffix(&weights_stem(path), WEIGHTS_EXTENSION)
}

/// JSON sidecar holding the [`ResNetConfig`] of a snapshot
pub fn config_file(path: &Path) -> PathBuf {
    with_suffix(&weights_stem(path), "json")
}

fn with_suffix(stem: &Path, extension: &str) -> PathBuf {
    let mut name = OsString::from(stem.as_os_str());
    name.push(".");
    name.push(extension);
    PathBuf::from(name)
}

/// Configuration recorded next to a snapshot, if any
pub fn stored_config(path: &Path) -> Result<Option<ResNetConfig>> {
    let sidecar = config_file(path);
    if !sidecar.is_file() {
        return Ok(None);
    }
    ResNetConfig::load(&sidecar)
        .map(Some)
        .map_err(|e| ClassifierError::load(&sidecar, e.to_string()))
}

/// Save model parameters plus their configuration sidecar
///
/// Returns the path of the written snapshot.
pub fn save_weights<B: Backend>(
    model: &ResNet<B>,
    config: &ResNetConfig,
    path: &Path,
) -> Result<PathBuf> {
    let stem = weights_stem(path);
    if let Some(parent) = stem.parent() {
        std::fs::create_dir_all(parent)?;
    }

    model
        .clone()
        .save_file(stem.clone(), &CompactRecorder::new())
        .map_err(|e| ClassifierError::load(&stem, format!("failed to write snapshot: {}", e)))?;
    config.save(config_file(&stem))?;

    let file = weights_file(&stem);
    info!("Saved weights to {:?}", file);
    Ok(file)
}

/// Fill `model` with the parameters stored at `path`
///
/// `config` is what `model` was built from; a sidecar declaring another
/// architecture is rejected before the snapshot is read.
pub fn load_weights<B: Backend>(
    model: ResNet<B>,
    config: &ResNetConfig,
    path: &Path,
    device: &B::Device,
) -> Result<ResNet<B>> {
    let stem = weights_stem(path);
    let file = weights_file(&stem);

    if !file.is_file() {
        return Err(ClassifierError::load(&file, "snapshot file not found"));
    }

    if let Some(stored) = stored_config(&stem)? {
        if stored.arch != config.arch {
            return Err(ClassifierError::load(
                &file,
                format!(
                    "architecture mismatch: model is {}, snapshot is {}",
                    config.arch, stored.arch
                ),
            ));
        }
    }

    let expected = model.parameter_shapes();

    let record = CompactRecorder::new()
        .load::<<ResNet<B> as Module<B>>::Record>(stem.clone(), device)
        .map_err(|e| ClassifierError::load(&file, e.to_string()))?;

    // The head is the usual place a class-count change shows up
    let head_expected = model.fc.weight.dims();
    let head_found = record.fc.weight.dims();
    if head_expected != head_found {
        return Err(ClassifierError::load(
            &file,
            format!(
                "fc.weight: expected {:?}, found {:?}",
                head_expected, head_found
            ),
        ));
    }

    let loaded = catch_unwind(AssertUnwindSafe(|| model.load_record(record)))
        .map_err(|panic| ClassifierError::load(&file, panic_message(panic)))?;

    check_shapes(&expected, &loaded.parameter_shapes())
        .map_err(|reason| ClassifierError::load(&file, reason))?;

    debug!("Loaded {} parameters from {:?}", expected.len(), file);
    Ok(loaded)
}

/// Compare two parameter listings, naming the first disagreement
pub(crate) fn check_shapes(
    expected: &ParameterShapes,
    found: &ParameterShapes,
) -> std::result::Result<(), String> {
    for (name, shape) in expected {
        match found.iter().find(|(other, _)| other == name) {
            None => return Err(format!("{}: missing from snapshot", name)),
            Some((_, other)) if other != shape => {
                return Err(format!("{}: expected {:?}, found {:?}", name, shape, other))
            }
            Some(_) => {}
        }
    }

    if let Some((name, _)) = found
        .iter()
        .find(|(name, _)| !expected.iter().any(|(other, _)| other == name))
    {
        return Err(format!("{}: unexpected parameter in snapshot", name));
    }

    Ok(())
}

fn panic_message(panic: Box<dyn std::any::Any + Send>) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "snapshot does not match the model structure".to_string()
    }
}
