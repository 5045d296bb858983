//! Training module for fine-tuning classifiers
//!
//! This module provides:
//! - The supervised fine-tuning loop
//! - The best-validation checkpoint policy
//! - Run configuration (CLI defaults, JSON files)
//!
//! ## Run lifecycle
//!
//! 1. Read the training split and persist its class table
//! 2. Build the model (pretrained backbone, scratch, or resumed snapshot)
//! 3. For each epoch: train on a reshuffled split, validate if a `val/`
//!    split exists, and save weights according to the checkpoint policy
//! 4. Write a JSON summary of the run

pub mod checkpoint;
pub mod config;
pub mod supervised;

// Re-export main types for convenience
pub use checkpoint::BestCheckpoint;
pub use config::TrainingConfig;
pub use supervised::{evaluate, run_training, EpochStats, TrainingSummary};
