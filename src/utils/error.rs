//! Error Handling Module
//!
//! Defines custom error types for the OCT classification library.
//! Uses thiserror for ergonomic error definitions.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for OCT classification operations
#[derive(Error, Debug)]
pub enum OctError {
    /// Error loading or processing an image
    #[error("Failed to load image at '{0}': {1}")]
    ImageLoad(PathBuf, String),

    /// Error with dataset operations
    #[error("Dataset error: {0}")]
    Dataset(String),

    /// Error with model operations
    #[error("Model error: {0}")]
    Model(String),

    /// Error with training
    #[error("Training error: {0}")]
    Training(String),

    /// Configuration error (bad paths, missing classes), fatal
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl From<image::ImageError> for OctError {
    fn from(err: image::ImageError) -> Self {
        OctError::Dataset(err.to_string())
    }
}

impl From<serde_json::Error> for OctError {
    fn from(err: serde_json::Error) -> Self {
        OctError::Serialization(err.to_string())
    }
}

/// Specialized Result type for OCT classification operations
pub type Result<T> = std::result::Result<T, OctError>;
