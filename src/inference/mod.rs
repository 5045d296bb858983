//! Inference module for serving predictions
//!
//! A [`Predictor`] is built once from a weights snapshot and the class names
//! file written by training, then answers `predict` calls from the CLI or the
//! HTTP server.

pub mod predictor;

// Re-export main types for convenience
pub use predictor::{PredictionResult, Predictor};
