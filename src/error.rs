//! Ошибки пайплайна обучения и инференса

use std::path::PathBuf;

use thiserror::Error;

/// Ошибка проверки входных признаков.
///
/// Никогда не выбрасывается из `StressPredictor::predict`: превращается в поле `error`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Input must be a JSON object")]
    NotAnObject,

    #[error("Missing features: {}", .0.join(", "))]
    MissingFeatures(Vec<String>),

    #[error("Feature '{0}' must be a number")]
    NotNumeric(String),

    #[error("Feature '{0}' must be non-negative")]
    Negative(String),
}

#[derive(Debug, Error)]
pub enum StressError {
    #[error("Data file not found at {}", .path.display())]
    DataNotFound { path: PathBuf },

    #[error("Failed to load data: {0}")]
    DataLoad(String),

    #[error("Expected {expected} feature columns, found {found}")]
    Shape { expected: usize, found: usize },

    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Failed to save model to {}: {source}", .path.display())]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to load model artifact: {0}")]
    ArtifactLoad(String),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Prediction failed: {0}")]
    Inference(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Model not trained")]
    NotTrained,
}

pub type Result<T> = std::result::Result<T, StressError>;
