//! Request routing for the bucket policy API.
//!
//! Only path-style addressing is supported: `/{bucket}?policy`.

use http::{Method, StatusCode};
use policysync_core::BucketName;

/// A routed bucket policy operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyOperation {
    /// `PUT /{bucket}?policy`
    Put(BucketName),
    /// `GET /{bucket}?policy`
    Get(BucketName),
    /// `DELETE /{bucket}?policy`
    Delete(BucketName),
}

impl PolicyOperation {
    /// Operation name used in logs.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Put(_) => "PutBucketPolicy",
            Self::Get(_) => "GetBucketPolicy",
            Self::Delete(_) => "DeleteBucketPolicy",
        }
    }

    /// The target bucket.
    #[must_use]
    pub fn bucket(&self) -> &BucketName {
        match self {
            Self::Put(b) | Self::Get(b) | Self::Delete(b) => b,
        }
    }
}

/// A request that does not address the bucket policy API.
#[derive(Debug, thiserror::Error)]
pub enum RouteError {
    /// The path does not name exactly one bucket.
    #[error("The request path does not address a bucket: {0}")]
    InvalidPath(String),

    /// The bucket segment is not a valid bucket name.
    #[error("The specified bucket is not valid: {0}")]
    InvalidBucketName(String),

    /// The `policy` sub-resource was not requested.
    #[error("Only the bucket policy sub-resource is implemented")]
    NotImplemented,

    /// Unsupported method on the policy sub-resource.
    #[error("The specified method is not allowed against this resource")]
    MethodNotAllowed,
}

impl RouteError {
    /// HTTP status this error is reported with.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidPath(_) | Self::InvalidBucketName(_) => StatusCode::BAD_REQUEST,
            Self::NotImplemented => StatusCode::NOT_IMPLEMENTED,
            Self::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
        }
    }

    /// S3-style error code string.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidPath(_) => "InvalidRequest",
            Self::InvalidBucketName(_) => "InvalidBucketName",
            Self::NotImplemented => "NotImplemented",
            Self::MethodNotAllowed => "MethodNotAllowed",
        }
    }
}

/// Resolve `method` and `uri` to a [`PolicyOperation`].
pub fn resolve(method: &Method, uri: &http::Uri) -> Result<PolicyOperation, RouteError> {
    let segment = uri.path().trim_start_matches('/').trim_end_matches('/');
    if segment.is_empty() || segment.contains('/') {
        return Err(RouteError::InvalidPath(uri.path().to_owned()));
    }

    let wants_policy = uri
        .query()
        .is_some_and(|q| form_urlencoded::parse(q.as_bytes()).any(|(k, _)| k == "policy"));
    if !wants_policy {
        return Err(RouteError::NotImplemented);
    }

    let bucket =
        BucketName::new(segment).map_err(|e| RouteError::InvalidBucketName(e.to_string()))?;

    match *method {
        Method::PUT => Ok(PolicyOperation::Put(bucket)),
        Method::GET => Ok(PolicyOperation::Get(bucket)),
        Method::DELETE => Ok(PolicyOperation::Delete(bucket)),
        _ => Err(RouteError::MethodNotAllowed),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn route(method: Method, uri: &str) -> Result<PolicyOperation, RouteError> {
        resolve(&method, &uri.parse().unwrap())
    }

    #[test]
    fn test_should_route_policy_operations() {
        let bucket = BucketName::new("photos").unwrap();
        assert_eq!(
            route(Method::PUT, "/photos?policy").unwrap(),
            PolicyOperation::Put(bucket.clone())
        );
        assert_eq!(
            route(Method::GET, "/photos/?policy=").unwrap(),
            PolicyOperation::Get(bucket.clone())
        );
        assert_eq!(
            route(Method::DELETE, "/photos?versionId=1&policy").unwrap(),
            PolicyOperation::Delete(bucket)
        );
    }

    #[test]
    fn test_should_reject_requests_without_policy_subresource() {
        assert!(matches!(
            route(Method::GET, "/photos"),
            Err(RouteError::NotImplemented)
        ));
        assert!(matches!(
            route(Method::GET, "/photos?acl"),
            Err(RouteError::NotImplemented)
        ));
    }

    #[test]
    fn test_should_reject_object_paths_and_bad_buckets() {
        assert!(matches!(
            route(Method::PUT, "/photos/cat.jpg?policy"),
            Err(RouteError::InvalidPath(_))
        ));
        assert!(matches!(
            route(Method::PUT, "/?policy"),
            Err(RouteError::InvalidPath(_))
        ));
        let err = route(Method::PUT, "/Bad_Bucket?policy").unwrap_err();
        assert_eq!(err.code(), "InvalidBucketName");
    }

    #[test]
    fn test_should_reject_unsupported_methods() {
        let err = route(Method::POST, "/photos?policy").unwrap_err();
        assert_eq!(err.status_code(), StatusCode::METHOD_NOT_ALLOWED);
    }
}
