//! Error types for queue operations.
//!
//! Provider failures are folded into [`QueueError`] so callers can decide
//! between stopping, retrying later and skipping one message without knowing
//! which backend produced the error.

use chrono::Duration;
use thiserror::Error;

/// Failure of a queue operation
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Queue not found: {queue_name}")]
    QueueNotFound { queue_name: String },

    /// The message was deleted already or its pop receipt is stale
    #[error("Message not found or receipt expired: {receipt}")]
    MessageNotFound { receipt: String },

    #[error("Queue '{queue_name}' is full (capacity: {capacity})")]
    QueueFull { queue_name: String, capacity: usize },

    #[error("Operation cancelled: {operation}")]
    Cancelled { operation: String },

    #[error("Operation timed out after {duration:?}")]
    Timeout { duration: Duration },

    #[error("Connection failed: {message}")]
    ConnectionFailed { message: String },

    /// Rejected credentials or signature; retrying will not help
    #[error("Authentication failed: {message}")]
    AuthenticationFailed { message: String },

    #[error("Message too large: {size} bytes (max: {max_size})")]
    MessageTooLarge { size: usize, max_size: usize },

    /// Service-side error code not covered by the variants above
    #[error("Provider error ({provider}): {code} - {message}")]
    ProviderError {
        provider: String,
        code: String,
        message: String,
    },

    #[error("Serialization failed: {0}")]
    SerializationError(#[from] SerializationError),

    #[error("Configuration error: {0}")]
    ConfigurationError(#[from] ConfigurationError),

    #[error("Validation error: {0}")]
    ValidationError(#[from] ValidationError),
}

impl QueueError {
    /// Check if the same operation may succeed when repeated later
    pub fn is_transient(&self) -> bool {
        match self {
            Self::QueueFull { .. }
            | Self::Timeout { .. }
            | Self::ConnectionFailed { .. }
            | Self::ProviderError { .. } => true,
            Self::QueueNotFound { .. }
            | Self::MessageNotFound { .. }
            | Self::Cancelled { .. }
            | Self::AuthenticationFailed { .. }
            | Self::MessageTooLarge { .. }
            | Self::SerializationError(_)
            | Self::ConfigurationError(_)
            | Self::ValidationError(_) => false,
        }
    }

    /// Check if the operation failed because its caller cancelled it
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

/// Errors during message serialization/deserialization
#[derive(Debug, Error)]
pub enum SerializationError {
    #[error("Message body is not valid UTF-8")]
    InvalidUtf8,

    #[error("Malformed XML payload: {message}")]
    InvalidXml { message: String },

    #[error("Required element '{element}' missing from response")]
    MissingElement { element: String },
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Missing required configuration: {key}")]
    Missing { key: String },

    #[error("Configuration parsing failed: {message}")]
    Parsing { message: String },
}

/// Validation errors
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Required field missing: {field}")]
    Required { field: String },

    #[error("Invalid format for {field}: {message}")]
    InvalidFormat { field: String, message: String },

    #[error("Value out of range for {field}: {message}")]
    OutOfRange { field: String, message: String },
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
