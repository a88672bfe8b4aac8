//! Error types for the PolicySync core.

/// Core error type for PolicySync infrastructure.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// Invalid owner identifier.
    #[error("invalid owner id: {0:?} (must be non-empty and free of whitespace)")]
    InvalidOwnerId(String),

    /// Invalid bucket name.
    #[error("invalid bucket name {name:?}: {reason}")]
    InvalidBucketName {
        /// The rejected name.
        name: String,
        /// Why it was rejected.
        reason: String,
    },
}
