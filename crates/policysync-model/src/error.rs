//! Policy grammar errors.

/// A submitted policy document could not be accepted.
///
/// Every variant is user-facing: the request is rejected and no state is
/// changed.
#[derive(Debug, thiserror::Error)]
pub enum MalformedPolicy {
    /// The body is not valid policy JSON.
    #[error("policy is not valid JSON: {0}")]
    Syntax(#[from] serde_json::Error),

    /// A statement lacks a required element.
    #[error("statement {index} is missing {field}")]
    MissingField {
        /// Zero-based statement index.
        index: usize,
        /// The absent element (`Principal`, `Action`, `Resource`).
        field: &'static str,
    },

    /// The `Effect` is neither `Allow` nor `Deny`.
    #[error("invalid effect {0:?}")]
    InvalidEffect(String),

    /// A string principal other than `*`.
    #[error("invalid principal {0:?}")]
    InvalidPrincipal(String),

    /// A resource that is not an S3 ARN.
    #[error("invalid resource {0:?}: expected an arn:aws:s3::: ARN")]
    InvalidResource(String),

    /// A resource that does not belong to the target bucket.
    #[error("resource {resource:?} does not match bucket {bucket:?}")]
    ResourceOutsideBucket {
        /// The offending resource pattern.
        resource: String,
        /// The bucket the policy was submitted for.
        bucket: String,
    },

    /// The `Version` element is empty.
    #[error("policy version must not be empty")]
    EmptyVersion,
}
