use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ModelError {
    #[error("confidence threshold must be within [0, 1], got {0}")]
    ThresholdOutOfRange(f64),

    #[error("unknown provider status: {0}")]
    UnknownStatus(String),

    #[error("unknown extraction mode: {0}")]
    UnknownExtractionMode(String),
}
