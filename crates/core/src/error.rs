//! Error types for vitrum
//!
//! This module defines the error type shared by every layer of the system.
//! We use `thiserror` for automatic `Display` and `Error` trait implementations.

use std::io;
use thiserror::Error;

/// Result type alias for vitrum operations
pub type VitrumResult<T> = std::result::Result<T, VitrumError>;

/// Error types for the retrieval engine
#[derive(Debug, Error)]
pub enum VitrumError {
    /// I/O error (file operations, directory walks, etc.)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Entity (table) does not exist in the backend
    #[error("Entity not found: {entity}")]
    EntityNotFound {
        /// Name of the missing entity
        entity: String,
    },

    /// Entity (table) already exists in the backend
    #[error("Entity already exists: {entity}")]
    EntityExists {
        /// Name of the existing entity
        entity: String,
    },

    /// A selector or writer was used before `open` or after `close`
    #[error("Not open: {0}")]
    NotOpen(String),

    /// Invalid or missing configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A stored row could not be mapped onto a typed record
    #[error("Lookup error: {0}")]
    Lookup(String),

    /// Operation not supported by this module or backend
    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    /// Backend failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// A worker task failed or panicked
    #[error("Task failed: {0}")]
    TaskFailed(String),
}

impl VitrumError {
    /// Create an `EntityNotFound` error
    pub fn entity_not_found(entity: impl Into<String>) -> Self {
        VitrumError::EntityNotFound {
            entity: entity.into(),
        }
    }

    /// Create an `EntityExists` error
    pub fn entity_exists(entity: impl Into<String>) -> Self {
        VitrumError::EntityExists {
            entity: entity.into(),
        }
    }

    /// Create an `InvalidConfig` error
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        VitrumError::InvalidConfig(msg.into())
    }

    /// Create a `Lookup` error
    pub fn lookup(msg: impl Into<String>) -> Self {
        VitrumError::Lookup(msg.into())
    }

    /// Create an `Unsupported` error
    pub fn unsupported(msg: impl Into<String>) -> Self {
        VitrumError::Unsupported(msg.into())
    }

    /// Create a `Storage` error
    pub fn storage(msg: impl Into<String>) -> Self {
        VitrumError::Storage(msg.into())
    }

    /// Whether this error reports a missing entity
    pub fn is_not_found(&self) -> bool {
        matches!(self, VitrumError::EntityNotFound { .. })
    }
}

impl From<serde_json::Error> for VitrumError {
    fn from(e: serde_json::Error) -> Self {
        VitrumError::Serialization(e.to_string())
    }
}

impl From<toml::de::Error> for VitrumError {
    fn from(e: toml::de::Error) -> Self {
        VitrumError::InvalidConfig(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_io() {
        let err = VitrumError::Io(io::Error::new(io::ErrorKind::NotFound, "file not found"));
        assert!(err.to_string().contains("I/O error"));
    }

    #[test]
    fn test_error_display_entity_not_found() {
        let err = VitrumError::entity_not_found("features_ocr");
        let msg = err.to_string();
        assert!(msg.contains("Entity not found"));
        assert!(msg.contains("features_ocr"));
        assert!(err.is_not_found());
    }

    #[test]
    fn test_error_display_invalid_config() {
        let err = VitrumError::invalid_config("no features configured");
        assert!(err.to_string().contains("no features configured"));
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_error_from_io() {
        let io_err = io::Error::new(io::ErrorKind::PermissionDenied, "access denied");
        let err: VitrumError = io_err.into();
        assert!(matches!(err, VitrumError::Io(_)));
    }

    #[test]
    fn test_error_from_json() {
        let result: VitrumResult<serde_json::Value> =
            serde_json::from_str("{not json").map_err(|e| e.into());
        assert!(matches!(result, Err(VitrumError::Serialization(_))));
    }

    #[test]
    fn test_error_from_toml() {
        let result: VitrumResult<toml::Value> = toml::from_str("= broken").map_err(|e| e.into());
        assert!(matches!(result, Err(VitrumError::InvalidConfig(_))));
    }
}
