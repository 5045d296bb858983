//! Error Handling Module
//!
//! Defines the error taxonomy of the classifier library.
//! Uses thiserror for ergonomic error definitions.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for classifier operations
#[derive(Error, Debug)]
pub enum ClassifierError {
    /// Bytes or file contents are not a decodable image
    #[error("Failed to decode image: {0}")]
    Decode(String),

    /// Dataset root missing, empty, or malformed
    #[error("Dataset error: {0}")]
    Dataset(String),

    /// Persisted parameters do not fit the constructed model
    #[error("Failed to load weights from '{path}': {reason}")]
    Load { path: PathBuf, reason: String },

    /// Pretrained backbone weights unavailable or unreadable
    #[error("Pretrained backbone unavailable at '{path}': {reason}")]
    Pretrained { path: PathBuf, reason: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ClassifierError {
    /// Whether the error was caused by the caller's input rather than the service
    pub fn is_client_error(&self) -> bool {
        matches!(self, ClassifierError::Decode(_))
    }

    pub(crate) fn load(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        ClassifierError::Load {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// Convenience Result type for classifier operations
pub type Result<T> = std::result::Result<T, ClassifierError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ClassifierError::Dataset("no classes".to_string());
        assert_eq!(format!("{}", err), "Dataset error: no classes");
    }

    #[test]
    fn test_load_error_names_path_and_reason() {
        let err = ClassifierError::load("model/classifier.mpk", "fc.weight: shape mismatch");
        let message = err.to_string();
        assert!(message.contains("classifier.mpk"));
        assert!(message.contains("fc.weight"));
    }

    #[test]
    fn test_only_decode_is_client_error() {
        assert!(ClassifierError::Decode("bad".into()).is_client_error());
        assert!(!ClassifierError::Config("bad".into()).is_client_error());
        assert!(!ClassifierError::load("x", "y").is_client_error());
    }
}
