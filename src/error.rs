//! Error types for the converter.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for conversion operations.
pub type Result<T> = std::result::Result<T, ConvertError>;

/// Errors that can occur while converting descriptors.
#[derive(Error, Debug)]
pub enum ConvertError {
    /// Descriptor root element or required fields are missing.
    #[error("Malformed descriptor: {0}")]
    MalformedInput(String),

    /// No descriptor files matched an engine identity.
    #[error("No input files for engine '{0}'")]
    NoInputFiles(String),

    /// Icon content type has no known file extension.
    #[error("Unsupported image type: {0}")]
    UnsupportedImageType(String),

    /// Staging directory for an engine already exists.
    #[error("Output already exists: {}", .0.display())]
    OutputAlreadyExists(PathBuf),

    /// Filesystem error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Archive creation failed.
    #[error("Archive error: {0}")]
    Archive(String),

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Invalid discovery pattern.
    #[error("Invalid file pattern: {0}")]
    InvalidPattern(String),
}
