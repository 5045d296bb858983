//! Image Preprocessing and Augmentation
//!
//! Converts a raw image into CHW float data of shape `[3, S, S]` with values
//! in `[0, 1]`:
//! 1. Convert to RGB (grayscale, RGBA and palette images included)
//! 2. Stretch to exactly `S x S` with a bilinear filter (aspect ratio is not kept)
//! 3. Scale to `[0, 1]`
//!
//! Training mode then applies a random horizontal flip (p = 0.5) followed by
//! brightness and contrast jitter of up to ±20%.

use std::io::Cursor;
use std::path::Path;

use image::imageops::{self, FilterType};
use image::{DynamicImage, ImageReader, RgbImage};
use rand::Rng;

use crate::utils::error::{ClassifierError, Result};

/// Maximum relative change applied by brightness and contrast jitter
pub const JITTER_STRENGTH: f32 = 0.2;

/// Probability of a horizontal flip in training mode
pub const FLIP_PROBABILITY: f64 = 0.5;

/// Smallest input side the ResNet stem and four stages can downsample
pub const MIN_IMAGE_SIZE: usize = 32;

/// Largest accepted input side
pub const MAX_IMAGE_SIZE: usize = 4096;

/// Luma weights used to compute the mean intensity for contrast jitter
const LUMA: [f32; 3] = [0.299, 0.587, 0.114];

/// Preprocessing mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Random flip and color jitter on top of the canonical transform
    Train,
    /// Deterministic resize and scale only
    Inference,
}

/// Check an input resolution before building a [`Preprocessor`] for it
pub fn check_image_size(image_size: usize) -> Result<()> {
    if !(MIN_IMAGE_SIZE..=MAX_IMAGE_SIZE).contains(&image_size) {
        return Err(ClassifierError::Config(format!(
            "image_size must be between {} and {}, got {}",
            MIN_IMAGE_SIZE, MAX_IMAGE_SIZE, image_size
        )));
    }
    Ok(())
}

/// Turns decoded images into network input
#[derive(Debug, Clone)]
pub struct Preprocessor {
    image_size: u32,
}

impl Preprocessor {
    /// `image_size` is expected to pass [`check_image_size`]
    pub fn new(image_size: usize) -> Self {
        Self {
            image_size: image_size.min(MAX_IMAGE_SIZE) as u32,
        }
    }

    pub fn image_size(&self) -> usize {
        self.image_size as usize
    }

    /// Number of f32 values produced per image
    pub fn output_len(&self) -> usize {
        3 * self.image_size() * self.image_size()
    }

    /// Decode an in-memory image of any supported format
    pub fn decode(bytes: &[u8]) -> Result<DynamicImage> {
        ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .map_err(|e| ClassifierError::Decode(e.to_string()))?
            .decode()
            .map_err(|e| ClassifierError::Decode(e.to_string()))
    }

    /// Open and decode an image file
    pub fn open<P: AsRef<Path>>(path: P) -> Result<DynamicImage> {
        let path = path.as_ref();
        ImageReader::open(path)?
            .with_guessed_format()?
            .decode()
            .map_err(|e| ClassifierError::Decode(format!("{:?}: {}", path, e)))
    }

    /// Transform a decoded image into CHW data
    pub fn process(&self, image: &DynamicImage, mode: Mode) -> Vec<f32> {
        let rgb = image.to_rgb8();
        let mut resized = imageops::resize(&rgb, self.image_size, self.image_size, FilterType::Triangle);

        match mode {
            Mode::Inference => to_chw(&resized),
            Mode::Train => {
                let mut rng = rand::thread_rng();

                if rng.gen_bool(FLIP_PROBABILITY) {
                    imageops::flip_horizontal_in_place(&mut resized);
                }

                let mut data = to_chw(&resized);
                let brightness = rng.gen_range(1.0 - JITTER_STRENGTH..=1.0 + JITTER_STRENGTH);
                let contrast = rng.gen_range(1.0 - JITTER_STRENGTH..=1.0 + JITTER_STRENGTH);
                adjust_brightness(&mut data, brightness);
                adjust_contrast(&mut data, contrast);
                data
            }
        }
    }

    pub fn process_bytes(&self, bytes: &[u8], mode: Mode) -> Result<Vec<f32>> {
        let image = Self::decode(bytes)?;
        Ok(self.process(&image, mode))
    }

    pub fn process_file<P: AsRef<Path>>(&self, path: P, mode: Mode) -> Result<Vec<f32>> {
        let image = Self::open(path)?;
        Ok(self.process(&image, mode))
    }
}

/// Convert an RGB image to CHW layout normalized to [0, 1]
fn to_chw(rgb: &RgbImage) -> Vec<f32> {
    let (width, height) = rgb.dimensions();
    let plane = (width * height) as usize;
    let mut data = vec![0.0f32; 3 * plane];

    for (i, pixel) in rgb.pixels().enumerate() {
        data[i] = pixel[0] as f32 / 255.0;
        data[plane + i] = pixel[1] as f32 / 255.0;
        data[2 * plane + i] = pixel[2] as f32 / 255.0;
    }

    data
}

/// Scale every value by `factor`, clamped to [0, 1]
fn adjust_brightness(data: &mut [f32], factor: f32) {
    for value in data.iter_mut() {
        *value = (*value * factor).clamp(0.0, 1.0);
    }
}

/// Blend every value with the mean grayscale intensity, clamped to [0, 1]
fn adjust_contrast(data: &mut [f32], factor: f32) {
    let plane = data.len() / 3;
    if plane == 0 {
        return;
    }

    let mut sum = 0.0f32;
    for i in 0..plane {
        sum += LUMA[0] * data[i] + LUMA[1] * data[plane + i] + LUMA[2] * data[2 * plane + i];
    }
    let mean = sum / plane as f32;

    for value in data.iter_mut() {
        *value = (mean + factor * (*value - mean)).clamp(0.0, 1.0);
    }
}
