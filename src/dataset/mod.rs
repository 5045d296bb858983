//! Dataset module for folder-structured image data
//!
//! This module provides functionality for:
//! - Discovering classes from directory names and enumerating examples
//! - Persisting the class name table shared by training and inference
//! - Preprocessing and training-time augmentation
//! - Burn `Dataset` and `Batcher` integration
//!
//! ## Layouts
//!
//! A dataset root is either a single directory of class subdirectories, or a
//! root containing `train/` and `val/`, each holding class subdirectories.

pub mod augmentation;
pub mod burn_dataset;
pub mod class_names;
pub mod loader;

// Re-export main types for convenience
pub use augmentation::{check_image_size, Mode, Preprocessor};
pub use burn_dataset::{ImageBatch, ImageBatcher, ImageFolderDataset, ImageItem};
pub use class_names::ClassNameTable;
pub use loader::{discover_classes, DatasetLayout, ImageFolder, ImageSample};

/// File extensions recognised as images (compared case-insensitively)
pub const IMAGE_EXTENSIONS: [&str; 10] = [
    "jpg", "jpeg", "png", "bmp", "gif", "ppm", "pgm", "tif", "tiff", "webp",
];

/// Check whether a path has a recognised image extension
pub fn is_image_file(path: &std::path::Path) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_is_image_file() {
        assert!(is_image_file(Path::new("a/b/cat.jpg")));
        assert!(is_image_file(Path::new("a/b/CAT.JPEG")));
        assert!(is_image_file(Path::new("dog.webp")));
        assert!(!is_image_file(Path::new("notes.txt")));
        assert!(!is_image_file(Path::new("README")));
    }
}
