//! Reconciliation error types.
//!
//! [`ReconcileError`] is the hard-failure taxonomy of the engine. Each variant
//! maps to an HTTP status code and an S3-style error code string through
//! [`ReconcileError::status_code`] and [`ReconcileError::code`], so the HTTP
//! layer can render any failure without inspecting its message.
//!
//! Soft failures (per-object permission resolution, replication) never become
//! a `ReconcileError`; they are logged and recorded in the
//! [`crate::ReconcileReport`].
//!
//! # Usage
//!
//! ```
//! use http::StatusCode;
//! use policysync_engine::ReconcileError;
//!
//! let err = ReconcileError::PolicyTooLarge { size: 30_000, limit: 20_480 };
//! assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
//! assert_eq!(err.code(), "PolicyTooLarge");
//! ```

use http::StatusCode;
use policysync_core::Cancelled;
use policysync_model::MalformedPolicy;

use crate::store::{MetadataStoreError, RecordStoreError};

/// Hard failure of a policy operation.
#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    // -----------------------------------------------------------------------
    // Rejections (no state change)
    // -----------------------------------------------------------------------
    /// The document does not parse or violates the grammar.
    #[error("Policies must be valid JSON and the first byte must be '{{': {0}")]
    MalformedPolicy(#[from] MalformedPolicy),

    /// The request carried no body.
    #[error("You must provide the Content-Length HTTP header")]
    MissingContentLength,

    /// The body exceeds the configured policy size limit.
    #[error("Policy of {size} bytes exceeds the maximum allowed size of {limit} bytes")]
    PolicyTooLarge {
        /// Size of the submitted body.
        size: usize,
        /// Configured limit.
        limit: usize,
    },

    // -----------------------------------------------------------------------
    // Aborts
    // -----------------------------------------------------------------------
    /// The external record store is categorically unreachable.
    #[error("External record store is unreachable: {0}")]
    ExternalStoreUnreachable(RecordStoreError),

    /// The authoritative local metadata store failed.
    #[error("Failed to persist bucket policy locally: {0}")]
    LocalPersistence(#[source] MetadataStoreError),

    /// The request was cancelled or its deadline passed.
    #[error("Request aborted: {0}")]
    Cancelled(#[from] Cancelled),

    // -----------------------------------------------------------------------
    // Read / delete path
    // -----------------------------------------------------------------------
    /// No policy is stored for the bucket.
    #[error("The bucket policy does not exist: {bucket}")]
    NoSuchBucketPolicy {
        /// The bucket queried.
        bucket: String,
    },

    // -----------------------------------------------------------------------
    // Internal / catch-all
    // -----------------------------------------------------------------------
    /// Internal error with context.
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ReconcileError {
    /// HTTP status this error is reported with.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::MalformedPolicy(_) | Self::PolicyTooLarge { .. } => StatusCode::BAD_REQUEST,
            Self::MissingContentLength => StatusCode::LENGTH_REQUIRED,
            Self::NoSuchBucketPolicy { .. } => StatusCode::NOT_FOUND,
            Self::ExternalStoreUnreachable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Cancelled(Cancelled::DeadlineExceeded) => StatusCode::GATEWAY_TIMEOUT,
            // nginx's "client closed request"; never leaves the process in practice.
            Self::Cancelled(Cancelled::Signalled) => {
                StatusCode::from_u16(499).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            }
            Self::LocalPersistence(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// S3-style error code string.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::MalformedPolicy(_) => "MalformedPolicy",
            Self::MissingContentLength => "MissingContentLength",
            Self::PolicyTooLarge { .. } => "PolicyTooLarge",
            Self::ExternalStoreUnreachable(_) => "ServiceUnavailable",
            Self::Cancelled(Cancelled::DeadlineExceeded) => "RequestTimeout",
            Self::Cancelled(Cancelled::Signalled) => "RequestCancelled",
            Self::NoSuchBucketPolicy { .. } => "NoSuchBucketPolicy",
            Self::LocalPersistence(_) | Self::Internal(_) => "InternalError",
        }
    }
}

/// Convenience result type for reconciliation operations.
pub type ReconcileResult<T> = Result<T, ReconcileError>;
