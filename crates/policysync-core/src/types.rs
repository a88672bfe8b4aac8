//! Identifier types shared across PolicySync crates.

use std::fmt;

use crate::error::CoreError;

/// Minimum bucket name length.
const MIN_BUCKET_NAME_LEN: usize = 3;

/// Maximum bucket name length.
const MAX_BUCKET_NAME_LEN: usize = 63;

/// Identity of the account that owns every record and permission entry this
/// service touches.
///
/// It is the first component of every derived store key
/// (`{owner}-{suffix}-{bucket}`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct OwnerId(String);

impl OwnerId {
    /// Owner used when none is configured.
    pub const DEFAULT: &'static str = "policysync";

    /// Create a new owner id.
    ///
    /// # Errors
    /// Returns an error if the id is empty or contains whitespace.
    pub fn new(id: impl Into<String>) -> Result<Self, CoreError> {
        let id = id.into();
        if id.is_empty() || id.chars().any(char::is_whitespace) {
            return Err(CoreError::InvalidOwnerId(id));
        }
        Ok(Self(id))
    }

    /// Get the owner id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for OwnerId {
    fn default() -> Self {
        Self(Self::DEFAULT.to_owned())
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A validated bucket name.
///
/// Rules follow the S3 naming constraints: 3-63 characters, lowercase
/// letters, digits, hyphens and dots, starting and ending with a letter or
/// digit, no consecutive dots.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct BucketName(String);

impl BucketName {
    /// Validate and wrap a bucket name.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidBucketName`] if any naming rule is violated.
    ///
    /// # Examples
    ///
    /// ```
    /// use policysync_core::BucketName;
    ///
    /// assert!(BucketName::new("photos").is_ok());
    /// assert!(BucketName::new("AB").is_err());
    /// ```
    pub fn new(name: impl Into<String>) -> Result<Self, CoreError> {
        let name = name.into();
        let invalid = |reason: &str| CoreError::InvalidBucketName {
            name: name.clone(),
            reason: reason.to_owned(),
        };

        if !(MIN_BUCKET_NAME_LEN..=MAX_BUCKET_NAME_LEN).contains(&name.len()) {
            return Err(invalid(&format!(
                "must be between {MIN_BUCKET_NAME_LEN} and {MAX_BUCKET_NAME_LEN} characters long"
            )));
        }
        if !name
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-' || b == b'.')
        {
            return Err(invalid(
                "must only contain lowercase letters, numbers, hyphens, and dots",
            ));
        }
        let first = name.as_bytes()[0];
        let last = name.as_bytes()[name.len() - 1];
        if !first.is_ascii_alphanumeric() || !last.is_ascii_alphanumeric() {
            return Err(invalid("must start and end with a letter or number"));
        }
        if name.contains("..") {
            return Err(invalid("must not contain consecutive dots"));
        }

        Ok(Self(name))
    }

    /// Get the bucket name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BucketName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for BucketName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_create_valid_owner_id() {
        let id = OwnerId::new("did:key:z6Mk").unwrap();
        assert_eq!(id.as_str(), "did:key:z6Mk");
    }

    #[test]
    fn test_should_reject_invalid_owner_id() {
        assert!(OwnerId::new("").is_err());
        assert!(OwnerId::new("has space").is_err());
    }

    #[test]
    fn test_should_use_default_owner_id() {
        assert_eq!(OwnerId::default().as_str(), "policysync");
    }

    #[test]
    fn test_should_accept_valid_bucket_names() {
        for name in ["abc", "my-bucket", "logs.2024", "a1b2c3"] {
            assert!(BucketName::new(name).is_ok(), "{name} should be valid");
        }
    }

    #[test]
    fn test_should_reject_invalid_bucket_names() {
        for name in ["ab", "Upper", "-lead", "trail-", "two..dots", "under_score"] {
            assert!(BucketName::new(name).is_err(), "{name} should be invalid");
        }
    }

    #[test]
    fn test_should_display_bucket_name() {
        let bucket = BucketName::new("photos").unwrap();
        assert_eq!(bucket.to_string(), "photos");
    }
}
