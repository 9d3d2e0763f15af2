//! Error types for model training and prediction

use thiserror::Error;

/// Errors produced while configuring, fitting, evaluating or persisting a model.
#[derive(Error, Debug)]
pub enum ModelError {
    #[error(transparent)]
    Core(#[from] landslideml_core::Error),

    #[error("Model type '{0}' not supported (expected RandomForest, SVM or GBM)")]
    UnsupportedModel(String),

    #[error("Invalid kwargs found: {}", .0.join(", "))]
    InvalidParams(Vec<String>),

    #[error("Invalid parameter: {name} = {value} ({reason})")]
    InvalidParameter {
        name: String,
        value: String,
        reason: String,
    },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Model is not fitted yet")]
    NotFitted,

    #[error("Expected {expected} features, got {actual}")]
    FeatureMismatch { expected: usize, actual: usize },

    #[error("Training failed: {0}")]
    Training(String),

    #[error("Model file error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ModelError {
    pub(crate) fn invalid_parameter(
        name: impl Into<String>,
        value: impl ToString,
        reason: impl Into<String>,
    ) -> Self {
        ModelError::InvalidParameter {
            name: name.into(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

/// Result alias for model operations.
pub type Result<T> = std::result::Result<T, ModelError>;
