/*!
Error types for the bucketstore core.
*/

use thiserror::Error;

/// Result type used throughout the bucketstore core.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur while encoding metadata or talking to the object store.
#[derive(Error, Debug)]
pub enum StoreError {
    /// A metadata header slot was present but could not be decoded
    #[error("Malformed {format} metadata payload: {reason}")]
    MalformedMetadataPayload {
        format: &'static str,
        reason: String,
    },

    /// A metadata value is not a string, number, boolean or null
    #[error("Unsupported metadata value type for key '{key}': {kind}")]
    UnsupportedValueType { key: String, kind: &'static str },

    /// I/O errors while reading local content
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The requested object does not exist
    #[error("Object not found: {0}")]
    NotFound(String),

    /// Object-storage client errors
    #[error("Storage error: {0}")]
    Storage(String),

    /// Configuration validation errors
    #[error("Validation error: {0}")]
    Validation(String),
}

impl StoreError {
    /// Create a new malformed payload error
    pub fn malformed<S: Into<String>>(format: &'static str, reason: S) -> Self {
        Self::MalformedMetadataPayload {
            format,
            reason: reason.into(),
        }
    }

    /// Create a new unsupported value type error
    pub fn unsupported_value<S: Into<String>>(key: S, kind: &'static str) -> Self {
        Self::UnsupportedValueType {
            key: key.into(),
            kind,
        }
    }

    /// Create a new storage error
    pub fn storage<S: Into<String>>(msg: S) -> Self {
        Self::Storage(msg.into())
    }

    /// Create a new not found error
    pub fn not_found<S: Into<String>>(key: S) -> Self {
        Self::NotFound(key.into())
    }

    /// Create a new validation error
    pub fn validation<S: Into<String>>(msg: S) -> Self {
        Self::Validation(msg.into())
    }

    /// True for errors raised while decoding or encoding metadata
    pub fn is_codec_error(&self) -> bool {
        matches!(
            self,
            Self::MalformedMetadataPayload { .. } | Self::UnsupportedValueType { .. }
        )
    }
}
