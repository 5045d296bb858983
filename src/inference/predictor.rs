//! Inference Predictor Module
//!
//! Everything needed to answer classification requests, built once: the
//! model with its weights loaded, the optional class name table and the
//! canonical preprocessing. Prediction never mutates the predictor, so one
//! instance serves any number of callers.

use std::path::Path;
use std::sync::Mutex;

use burn::tensor::{activation::softmax, backend::Backend, Tensor, TensorData};
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::dataset::{check_image_size, ClassNameTable, Mode, Preprocessor};
use crate::model::persist::stored_config;
use crate::model::{load_weights, Arch, ResNet, ResNetConfig};
use crate::utils::error::{ClassifierError, Result};
use crate::FALLBACK_NUM_CLASSES;

/// Result of a single prediction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    /// Predicted class index
    pub predicted_class: usize,

    /// Softmax probability of the predicted class
    pub confidence: f32,

    /// Name of the predicted class, when a class table is loaded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_name: Option<String>,
}

impl PredictionResult {
    /// Arg-max over a probability vector; the first index wins ties
    pub fn from_probabilities(probabilities: &[f32], classes: Option<&ClassNameTable>) -> Self {
        let (predicted_class, confidence) = probabilities
            .iter()
            .copied()
            .enumerate()
            .fold((0, f32::NEG_INFINITY), |best, (i, p)| {
                if p > best.1 {
                    (i, p)
                } else {
                    best
                }
            });

        Self {
            predicted_class,
            confidence: if confidence.is_finite() { confidence } else { 0.0 },
            class_name: classes
                .and_then(|table| table.name(predicted_class))
                .map(str::to_string),
        }
    }

    /// Pretty print the prediction result
    pub fn display(&self) -> String {
        match &self.class_name {
            Some(name) => format!(
                "{} (class {}) with {:.2}% confidence",
                name,
                self.predicted_class,
                self.confidence * 100.0
            ),
            None => format!(
                "class {} with {:.2}% confidence",
                self.predicted_class,
                self.confidence * 100.0
            ),
        }
    }
}

/// Classifier ready to serve predictions
pub struct Predictor<B: Backend> {
    // Forward passes run on a clone; the lock only guards the clone
    model: Mutex<ResNet<B>>,
    config: ResNetConfig,
    classes: Option<ClassNameTable>,
    preprocessor: Preprocessor,
    device: B::Device,
}

impl<B: Backend> Predictor<B> {
    /// Load weights and the class table
    ///
    /// Without a class names file the head is sized for
    /// [`FALLBACK_NUM_CLASSES`] and predictions carry no names. The
    /// architecture defaults to the one recorded next to the weights.
    pub fn load(
        weights: &Path,
        class_names: &Path,
        arch: Option<Arch>,
        image_size: usize,
        device: &B::Device,
    ) -> Result<Self> {
        check_image_size(image_size)?;
        let classes = ClassNameTable::load_optional(class_names)?;
        let num_classes = match &classes {
            Some(table) if table.is_empty() => {
                return Err(ClassifierError::Config(format!(
                    "class names file {:?} lists no classes",
                    class_names
                )))
            }
            Some(table) => table.len(),
            None => {
                warn!(
                    "No class names at {:?}; assuming {} unnamed classes",
                    class_names, FALLBACK_NUM_CLASSES
                );
                FALLBACK_NUM_CLASSES
            }
        };

        let arch = match arch {
            Some(arch) => arch,
            None => stored_config(weights)?
                .map(|stored| stored.arch)
                .unwrap_or_default(),
        };

        let config = ResNetConfig::new(arch, num_classes);
        let model = load_weights(config.init(device), &config, weights, device)?;

        info!(
            "Loaded {} classifier with {} classes from {:?}",
            arch, num_classes, weights
        );

        Ok(Self::new(model, config, classes, image_size, device))
    }

    /// Wrap an already-built model
    pub fn new(
        model: ResNet<B>,
        config: ResNetConfig,
        classes: Option<ClassNameTable>,
        image_size: usize,
        device: &B::Device,
    ) -> Self {
        Self {
            model: Mutex::new(model),
            config,
            classes,
            preprocessor: Preprocessor::new(image_size),
            device: device.clone(),
        }
    }

    pub fn num_classes(&self) -> usize {
        self.config.num_classes
    }

    pub fn arch(&self) -> Arch {
        self.config.arch
    }

    pub fn classes(&self) -> Option<&ClassNameTable> {
        self.classes.as_ref()
    }

    pub fn image_size(&self) -> usize {
        self.preprocessor.image_size()
    }

    /// Classify encoded image bytes (any supported format)
    pub fn predict(&self, bytes: &[u8]) -> Result<PredictionResult> {
        let data = self.preprocessor.process_bytes(bytes, Mode::Inference)?;
        Ok(self.classify(data))
    }

    pub fn predict_image(&self, image: &DynamicImage) -> PredictionResult {
        self.classify(self.preprocessor.process(image, Mode::Inference))
    }

    pub fn predict_file<P: AsRef<Path>>(&self, path: P) -> Result<PredictionResult> {
        let data = self.preprocessor.process_file(path, Mode::Inference)?;
        Ok(self.classify(data))
    }

    /// Class probabilities for preprocessed CHW data
    pub fn probabilities(&self, data: Vec<f32>) -> Vec<f32> {
        let size = self.preprocessor.image_size();
        let input = Tensor::<B, 4>::from_floats(TensorData::new(data, [1, 3, size, size]), &self.device);

        let logits = self.model().forward(input);
        softmax(logits, 1).into_data().iter::<f32>().collect()
    }

    fn classify(&self, data: Vec<f32>) -> PredictionResult {
        let probabilities = self.probabilities(data);
        PredictionResult::from_probabilities(&probabilities, self.classes.as_ref())
    }

    fn model(&self) -> ResNet<B> {
        match self.model.lock() {
            Ok(model) => model.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::InferenceBackend;
    use crate::model::save_weights;
    use image::{ImageFormat, Rgb, RgbImage};
    use std::io::Cursor;
    use tempfile::TempDir;

    type TestBackend = InferenceBackend;

    fn png_bytes(width: u32, height: u32, color: [u8; 3]) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb(color)))
            .write_to(&mut buf, ImageFormat::Png)
            .unwrap();
        buf.into_inner()
    }

    fn names(list: &[&str]) -> ClassNameTable {
        ClassNameTable::new(list.iter().map(|s| s.to_string()).collect())
    }

    #[test]
    fn test_one_pixel_image_prediction_in_range() {
        let device = Default::default();
        let config = ResNetConfig::new(Arch::ResNet18, 3);
        let model: ResNet<TestBackend> = config.init(&device);
        let predictor = Predictor::new(model, config, Some(names(&["a", "b", "c"])), 32, &device);

        let result = predictor.predict(&png_bytes(1, 1, [10, 200, 30])).unwrap();

        assert!(result.predicted_class < 3);
        assert!((0.0..=1.0).contains(&result.confidence));
        assert!(result.confidence >= 1.0 / 3.0 - 1e-4);
        assert_eq!(
            result.class_name.as_deref(),
            ["a", "b", "c"].get(result.predicted_class).copied()
        );
    }

    #[test]
    fn test_prediction_is_deterministic() {
        let device = Default::default();
        let config = ResNetConfig::new(Arch::ResNet18, 4);
        let model: ResNet<TestBackend> = config.init(&device);
        let predictor = Predictor::new(model, config, None, 32, &device);

        let bytes = png_bytes(40, 20, [120, 60, 200]);
        let first = predictor.predict(&bytes).unwrap();
        let second = predictor.predict(&bytes).unwrap();
        assert_eq!(first, second);
        assert!(first.class_name.is_none());
    }

    #[test]
    fn test_garbage_bytes_are_decode_errors() {
        let device = Default::default();
        let config = ResNetConfig::new(Arch::ResNet18, 2);
        let model: ResNet<TestBackend> = config.init(&device);
        let predictor = Predictor::new(model, config, None, 32, &device);

        let err = predictor.predict(b"plain text").unwrap_err();
        assert!(err.is_client_error());
    }

    #[test]
    fn test_load_with_class_names() {
        let dir = TempDir::new().unwrap();
        let device = Default::default();
        let config = ResNetConfig::new(Arch::ResNet18, 2);
        let model: ResNet<TestBackend> = config.init(&device);
        save_weights(&model, &config, &dir.path().join("classifier")).unwrap();
        names(&["cat", "dog"]).save(dir.path().join("class_names.txt")).unwrap();

        let predictor = Predictor::<TestBackend>::load(
            &dir.path().join("classifier.mpk"),
            &dir.path().join("class_names.txt"),
            None,
            32,
            &device,
        )
        .unwrap();

        assert_eq!(predictor.num_classes(), 2);
        assert_eq!(predictor.arch(), Arch::ResNet18);
        let result = predictor.predict(&png_bytes(8, 8, [0, 0, 0])).unwrap();
        assert!(result.class_name.is_some());
    }

    #[test]
    fn test_missing_class_names_falls_back_to_ten_classes() {
        let dir = TempDir::new().unwrap();
        let device = Default::default();
        let config = ResNetConfig::new(Arch::ResNet18, FALLBACK_NUM_CLASSES);
        let model: ResNet<TestBackend> = config.init(&device);
        save_weights(&model, &config, &dir.path().join("classifier")).unwrap();

        let predictor = Predictor::<TestBackend>::load(
            &dir.path().join("classifier"),
            &dir.path().join("class_names.txt"),
            Some(Arch::ResNet18),
            32,
            &device,
        )
        .unwrap();

        assert_eq!(predictor.num_classes(), 10);
        assert!(predictor.classes().is_none());
    }

    #[test]
    fn test_class_table_disagreeing_with_weights_fails_to_load() {
        let dir = TempDir::new().unwrap();
        let device = Default::default();
        let config = ResNetConfig::new(Arch::ResNet18, 5);
        let model: ResNet<TestBackend> = config.init(&device);
        save_weights(&model, &config, &dir.path().join("classifier")).unwrap();
        names(&["a", "b", "c"]).save(dir.path().join("class_names.txt")).unwrap();

        let result = Predictor::<TestBackend>::load(
            &dir.path().join("classifier"),
            &dir.path().join("class_names.txt"),
            None,
            32,
            &device,
        );
        match result {
            Err(err @ ClassifierError::Load { .. }) => assert!(err.to_string().contains("fc.weight")),
            Err(other) => panic!("expected load error, got {}", other),
            Ok(_) => panic!("expected load error"),
        }
    }

    #[test]
    fn test_load_rejects_unusable_image_size() {
        let dir = TempDir::new().unwrap();
        let device = Default::default();
        let config = ResNetConfig::new(Arch::ResNet18, 2);
        let model: ResNet<TestBackend> = config.init(&device);
        save_weights(&model, &config, &dir.path().join("classifier")).unwrap();

        for image_size in [0, 31, usize::MAX] {
            let result = Predictor::<TestBackend>::load(
                &dir.path().join("classifier"),
                &dir.path().join("class_names.txt"),
                None,
                image_size,
                &device,
            );
            assert!(matches!(result, Err(ClassifierError::Config(_))));
        }
    }

    #[test]
    fn test_json_omits_missing_class_name() {
        let unnamed = PredictionResult::from_probabilities(&[0.1, 0.7, 0.2], None);
        assert_eq!(unnamed.predicted_class, 1);
        let json = serde_json::to_value(&unnamed).unwrap();
        assert!(json.get("class_name").is_none());
        assert_eq!(json["predicted_class"], 1);

        let table = names(&["x", "y", "z"]);
        let named = PredictionResult::from_probabilities(&[0.1, 0.2, 0.7], Some(&table));
        let json = serde_json::to_value(&named).unwrap();
        assert_eq!(json["class_name"], "z");
    }
}
