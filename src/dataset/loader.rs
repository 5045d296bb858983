//! Image Folder Loader
//!
//! Turns a directory tree into labeled examples: every immediate
//! subdirectory of the root is a class, indexed by sorted name, and every
//! image file below it is one example.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use walkdir::WalkDir;

use super::class_names::ClassNameTable;
use super::is_image_file;
use crate::utils::error::{ClassifierError, Result};

/// A single image sample with its label
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageSample {
    /// Path to the image file
    pub path: PathBuf,
    /// Class label index
    pub label: usize,
    /// Class name (the directory name)
    pub class_name: String,
}

/// Discover class names from the immediate subdirectories of `root`, sorted.
///
/// Fails when the root is missing, is not a directory, or has no subdirectories.
pub fn discover_classes<P: AsRef<Path>>(root: P) -> Result<Vec<String>> {
    let root = root.as_ref();

    if !root.exists() {
        return Err(ClassifierError::Dataset(format!(
            "dataset directory does not exist: {:?}",
            root
        )));
    }
    if !root.is_dir() {
        return Err(ClassifierError::Dataset(format!(
            "dataset path is not a directory: {:?}",
            root
        )));
    }

    let mut classes = Vec::new();
    for entry in std::fs::read_dir(root)? {
        let entry = entry?;
        if entry.path().is_dir() {
            let name = entry.file_name().into_string().map_err(|raw| {
                ClassifierError::Dataset(format!("class directory name is not UTF-8: {:?}", raw))
            })?;
            classes.push(name);
        }
    }
    classes.sort();

    if classes.is_empty() {
        return Err(ClassifierError::Dataset(format!(
            "no class subdirectories found in {:?}",
            root
        )));
    }

    Ok(classes)
}

/// An image folder dataset: the class table plus every enumerated example
#[derive(Debug, Clone)]
pub struct ImageFolder {
    root: PathBuf,
    classes: ClassNameTable,
    samples: Vec<ImageSample>,
}

impl ImageFolder {
    /// Open a dataset whose class table is derived from its own directories
    ///
    /// ```text
    /// root/
    /// ├── bird/
    /// │   ├── 001.jpg
    /// │   └── 002.png
    /// ├── cat/
    /// └── dog/
    /// ```
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        info!("Loading image folder from {:?}", root);

        let classes = ClassNameTable::new(discover_classes(&root)?);
        let samples = enumerate_samples(&root, classes.names(), &classes)?;

        let folder = Self {
            root,
            classes,
            samples,
        };
        folder.log_stats();
        Ok(folder)
    }

    /// Open a held-out split, labelling it with an existing class table.
    ///
    /// Every class directory must be known to `classes`; classes may be absent.
    pub fn open_with_classes<P: AsRef<Path>>(root: P, classes: &ClassNameTable) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        info!("Loading image folder from {:?} with {} known classes", root, classes.len());

        let class_dirs = discover_classes(&root)?;
        if let Some(unknown) = class_dirs.iter().find(|c| classes.index_of(c).is_none()) {
            return Err(ClassifierError::Dataset(format!(
                "class '{}' in {:?} does not exist in the training classes",
                unknown, root
            )));
        }

        let samples = enumerate_samples(&root, &class_dirs, classes)?;

        let folder = Self {
            root,
            classes: classes.clone(),
            samples,
        };
        folder.log_stats();
        Ok(folder)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn classes(&self) -> &ClassNameTable {
        &self.classes
    }

    pub fn samples(&self) -> &[ImageSample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn num_classes(&self) -> usize {
        self.classes.len()
    }

    /// Number of samples per class index
    pub fn class_counts(&self) -> Vec<usize> {
        let mut counts = vec![0usize; self.num_classes()];
        for sample in &self.samples {
            counts[sample.label] += 1;
        }
        counts
    }

    fn log_stats(&self) {
        info!(
            "Loaded {} samples across {} classes",
            self.samples.len(),
            self.num_classes()
        );
        for (idx, count) in self.class_counts().iter().enumerate() {
            debug!(
                "  {:3}. {:30} {:6}",
                idx,
                self.classes.name(idx).unwrap_or("?"),
                count
            );
        }
    }
}

fn enumerate_samples(
    root: &Path,
    class_dirs: &[String],
    classes: &ClassNameTable,
) -> Result<Vec<ImageSample>> {
    let mut samples = Vec::new();

    for class_name in class_dirs {
        let label = classes.index_of(class_name).ok_or_else(|| {
            ClassifierError::Dataset(format!("class '{}' has no index", class_name))
        })?;
        let class_dir = root.join(class_name);

        let before = samples.len();
        for entry in WalkDir::new(&class_dir)
            .min_depth(1)
            .follow_links(true)
            .sort_by_file_name()
        {
            let entry = entry.map_err(|e| {
                ClassifierError::Dataset(format!("failed to walk {:?}: {}", class_dir, e))
            })?;

            if entry.file_type().is_file() && is_image_file(entry.path()) {
                samples.push(ImageSample {
                    path: entry.path().to_path_buf(),
                    label,
                    class_name: class_name.clone(),
                });
            }
        }

        if samples.len() == before {
            return Err(ClassifierError::Dataset(format!(
                "class directory {:?} contains no images",
                class_dir
            )));
        }
    }

    Ok(samples)
}

/// Physical layout of a dataset root
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatasetLayout {
    /// One directory of class subdirectories; no validation
    Single(PathBuf),
    /// `train/` and `val/` subdirectories, each holding class subdirectories
    Split { train: PathBuf, val: PathBuf },
}

impl DatasetLayout {
    /// Detect the layout of `root`
    pub fn detect<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref();

        if !root.is_dir() {
            return Err(ClassifierError::Dataset(format!(
                "dataset directory does not exist: {:?}",
                root
            )));
        }

        let train = root.join("train");
        let val = root.join("val");

        if train.is_dir() && val.is_dir() {
            Ok(Self::Split { train, val })
        } else {
            Ok(Self::Single(root.to_path_buf()))
        }
    }

    pub fn has_validation(&self) -> bool {
        matches!(self, Self::Split { .. })
    }

    /// Directory the training examples (and class table) come from
    pub fn train_dir(&self) -> &Path {
        match self {
            Self::Single(root) => root,
            Self::Split { train, .. } => train,
        }
    }
}
