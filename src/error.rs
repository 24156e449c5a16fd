//! Error types for the AREMS webhook dispatcher.

use std::time::Duration;

/// Top-level error type for webhook handling.
///
/// Everything but `MalformedPayload` is an upstream failure: the document
/// store, the blob store or the messaging platform did not answer.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Malformed payload: {0}")]
    MalformedPayload(String),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Messaging token rejected by the platform: {0}")]
    TokenRejected(String),
}

/// Document store errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Migration failed: {0}")]
    Migration(String),
}

/// Messaging platform errors.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Failed to send message on channel {name}: {reason}")]
    SendFailed { name: String, reason: String },

    #[error("Channel {name} request timed out after {timeout:?}")]
    Timeout { name: String, timeout: Duration },

    #[error("Channel {name} returned HTTP {status} for {method}")]
    Status {
        name: String,
        method: String,
        status: u16,
    },

    #[error("Invalid response from channel {name}: {reason}")]
    InvalidResponse { name: String, reason: String },

    #[error("HTTP error: {0}")]
    Http(String),
}

/// Blob storage errors.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Invalid object path: {0}")]
    InvalidPath(String),

    #[error("Upload failed for {path}: {reason}")]
    UploadFailed { path: String, reason: String },
}
