//! Error types for Larder.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the larder library.
#[derive(Debug, Error)]
pub enum LarderError {
    // Construction errors
    #[error("Table '{table}' does not exist and no column schema was provided")]
    SchemaRequired { table: String },

    #[error("Configuration conflict: {message}")]
    ConfigConflict { message: String },

    // Write-path validation errors
    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    // Database errors
    #[error("Database error: {message}")]
    Database {
        message: String,
        #[source]
        source: Option<rusqlite::Error>,
    },

    // File system errors
    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    // Serialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },
}

/// Result type alias for larder operations.
pub type Result<T> = std::result::Result<T, LarderError>;

// Conversion implementations for common error types

impl From<rusqlite::Error> for LarderError {
    fn from(err: rusqlite::Error) -> Self {
        LarderError::Database {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<std::io::Error> for LarderError {
    fn from(err: std::io::Error) -> Self {
        LarderError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for LarderError {
    fn from(err: serde_json::Error) -> Self {
        LarderError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl LarderError {
    /// Create an invalid-input error with a message.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        LarderError::InvalidInput {
            message: message.into(),
        }
    }

    /// Create an IO error with path context.
    pub fn io_with_path(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        LarderError::Io {
            message: err.to_string(),
            path: Some(path.into()),
            source: Some(err),
        }
    }
}
