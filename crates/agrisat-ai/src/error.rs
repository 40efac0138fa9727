use std::path::PathBuf;

use agrisat_core::CoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AiError {
    #[error("model unavailable at {}: {reason}", path.display())]
    ModelUnavailable { path: PathBuf, reason: String },

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("model returned {found} values, expected {expected}")]
    OutputShape { expected: usize, found: usize },

    #[error("inference failed: {0}")]
    Inference(String),

    #[cfg(feature = "onnx")]
    #[error("onnx runtime error: {0}")]
    Ort(#[from] ort::Error),
}

impl AiError {
    pub fn unavailable(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::ModelUnavailable {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub fn is_insufficient_data(&self) -> bool {
        matches!(self, Self::Core(CoreError::InsufficientData { .. }))
    }

    pub fn is_shape_mismatch(&self) -> bool {
        matches!(self, Self::Core(CoreError::ShapeMismatch { .. }))
    }
}

pub type Result<T> = std::result::Result<T, AiError>;
