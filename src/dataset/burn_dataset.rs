//! Burn Dataset Integration
//!
//! Implements Burn's `Dataset` trait and `Batcher` for image folders.
//! Images are decoded lazily, one item at a time, with the preprocessing
//! mode chosen per dataset (augmented for training, canonical otherwise).

use std::path::PathBuf;

use burn::data::dataloader::batcher::Batcher;
use burn::data::dataset::Dataset;
use burn::prelude::*;

use super::augmentation::{Mode, Preprocessor};
use super::loader::ImageFolder;
use crate::utils::error::{ClassifierError, Result};

/// A single preprocessed example ready for batching
#[derive(Clone, Debug)]
pub struct ImageItem {
    /// Image data as flattened CHW float array [3 * S * S]
    pub image: Vec<f32>,
    /// Class label
    pub label: usize,
}

/// Lazily-decoding dataset over an [`ImageFolder`]
#[derive(Debug, Clone)]
pub struct ImageFolderDataset {
    samples: Vec<(PathBuf, usize)>,
    preprocessor: Preprocessor,
    mode: Mode,
}

impl ImageFolderDataset {
    pub fn new(folder: &ImageFolder, image_size: usize, mode: Mode) -> Self {
        let samples = folder
            .samples()
            .iter()
            .map(|s| (s.path.clone(), s.label))
            .collect();

        Self {
            samples,
            preprocessor: Preprocessor::new(image_size),
            mode,
        }
    }

    pub fn image_size(&self) -> usize {
        self.preprocessor.image_size()
    }

    /// Load one item, surfacing decode failures instead of skipping them
    pub fn try_get(&self, index: usize) -> Result<ImageItem> {
        let (path, label) = self.samples.get(index).ok_or_else(|| {
            ClassifierError::Dataset(format!(
                "index {} out of range for dataset of {} samples",
                index,
                self.samples.len()
            ))
        })?;

        let image = self.preprocessor.process_file(path, self.mode)?;
        Ok(ImageItem {
            image,
            label: *label,
        })
    }

    /// Load the items at `indices`, in order
    pub fn load_items(&self, indices: &[usize]) -> Result<Vec<ImageItem>> {
        indices.iter().map(|&i| self.try_get(i)).collect()
    }
}

impl Dataset<ImageItem> for ImageFolderDataset {
    fn get(&self, index: usize) -> Option<ImageItem> {
        self.try_get(index).ok()
    }

    fn len(&self) -> usize {
        self.samples.len()
    }
}

/// A batch of images and their targets
#[derive(Clone, Debug)]
pub struct ImageBatch<B: Backend> {
    /// Images with shape [batch_size, 3, height, width]
    pub images: Tensor<B, 4>,
    /// Labels with shape [batch_size]
    pub targets: Tensor<B, 1, Int>,
}

/// Stacks [`ImageItem`]s into an [`ImageBatch`]
#[derive(Clone, Debug)]
pub struct ImageBatcher {
    image_size: usize,
}

impl ImageBatcher {
    pub fn new(image_size: usize) -> Self {
        Self { image_size }
    }
}

impl<B: Backend> Batcher<B, ImageItem, ImageBatch<B>> for ImageBatcher {
    fn batch(&self, items: Vec<ImageItem>, device: &B::Device) -> ImageBatch<B> {
        let batch_size = items.len();
        let size = self.image_size;

        let targets_data: Vec<i64> = items.iter().map(|item| item.label as i64).collect();
        let images_data: Vec<f32> = items.into_iter().flat_map(|item| item.image).collect();

        let images = Tensor::<B, 4>::from_floats(
            TensorData::new(images_data, [batch_size, 3, size, size]),
            device,
        );
        let targets =
            Tensor::<B, 1, Int>::from_data(TensorData::new(targets_data, [batch_size]), device);

        ImageBatch { images, targets }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::InferenceBackend;
    use image::{DynamicImage, Rgb, RgbImage};
    use std::fs;
    use tempfile::TempDir;

    type TestBackend = InferenceBackend;

    fn write_png(path: &std::path::Path, color: [u8; 3]) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        DynamicImage::ImageRgb8(RgbImage::from_pixel(5, 3, Rgb(color)))
            .save(path)
            .unwrap();
    }

    #[test]
    fn test_dataset_items_and_batch_shape() {
        let dir = TempDir::new().unwrap();
        write_png(&dir.path().join("black/a.png"), [0, 0, 0]);
        write_png(&dir.path().join("white/b.png"), [255, 255, 255]);
        write_png(&dir.path().join("white/c.png"), [255, 255, 255]);

        let folder = ImageFolder::open(dir.path()).unwrap();
        let dataset = ImageFolderDataset::new(&folder, 8, Mode::Inference);
        assert_eq!(dataset.len(), 3);

        let first = dataset.get(0).unwrap();
        assert_eq!(first.label, 0);
        assert!(first.image.iter().all(|&v| v == 0.0));
        assert!(dataset.get(3).is_none());

        let items = dataset.load_items(&[0, 1, 2]).unwrap();
        let device = Default::default();
        let batch: ImageBatch<TestBackend> = ImageBatcher::new(8).batch(items, &device);

        assert_eq!(batch.images.dims(), [3, 3, 8, 8]);
        assert_eq!(batch.targets.dims(), [3]);
        let targets: Vec<i64> = batch.targets.into_data().iter::<i64>().collect();
        assert_eq!(targets, vec![0, 1, 1]);
    }

    #[test]
    fn test_try_get_propagates_decode_errors() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("cat")).unwrap();
        fs::write(dir.path().join("cat/broken.jpg"), b"garbage").unwrap();

        let folder = ImageFolder::open(dir.path()).unwrap();
        let dataset = ImageFolderDataset::new(&folder, 8, Mode::Train);

        assert!(matches!(dataset.try_get(0), Err(ClassifierError::Decode(_))));
        assert!(dataset.get(0).is_none());
    }
}
