//! Collaborator interfaces consumed by the reconciliation engine.
//!
//! Every backing system is reached through one of these traits and injected
//! into the [`crate::Reconciler`]; the engine never reaches for a global.
//! The traits use `#[async_trait]` so they stay object safe and can be held
//! as `Arc<dyn _>`.
//!
//! Outcomes that callers branch on (`Found`/`Absent`, `Updated`/
//! `NoDifferences`, unreachable vs. other transport failures) are tagged
//! variants, never inferred from error text.

use std::fmt;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use policysync_core::{BucketName, OwnerId, RecordWriteOptions};

/// Config key under which the local metadata store keeps the bucket policy.
pub const POLICY_CONFIG_KEY: &str = "policy.json";

// ---------------------------------------------------------------------------
// Keys
// ---------------------------------------------------------------------------

/// Key of a record in the external record store or permission store:
/// `(owner, tag, bucket)`, rendered as `{owner}-{tag}-{bucket}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecordKey {
    owner: OwnerId,
    tag: String,
    bucket: BucketName,
}

impl RecordKey {
    /// Build a key from its three components.
    #[must_use]
    pub fn new(owner: &OwnerId, tag: impl Into<String>, bucket: &BucketName) -> Self {
        Self {
            owner: owner.clone(),
            tag: tag.into(),
            bucket: bucket.clone(),
        }
    }

    /// The owning account.
    #[must_use]
    pub fn owner(&self) -> &OwnerId {
        &self.owner
    }

    /// The record tag (fixed policy tag, or a per-object derived suffix).
    #[must_use]
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// The bucket the record belongs to.
    #[must_use]
    pub fn bucket(&self) -> &BucketName {
        &self.bucket
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}-{}", self.owner, self.tag, self.bucket)
    }
}

/// Opaque reference to a record's payload in the external record store.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecordRef(String);

impl RecordRef {
    /// Wrap a store-issued payload reference.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The reference as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// External record store
// ---------------------------------------------------------------------------

/// Result of a record lookup that reached the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordLookup {
    /// A record exists under the key.
    Found(RecordRef),
    /// No record exists under the key.
    Absent,
}

/// Result of a successful record update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// The payload changed.
    Updated,
    /// The stored payload was already identical; nothing changed.
    NoDifferences,
}

/// Failure talking to the external record store.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecordStoreError {
    /// The store is categorically unreachable (e.g. no route to host).
    #[error("record store unreachable: {0}")]
    Unreachable(String),

    /// Any other transport failure.
    #[error("record store transport error: {0}")]
    Transport(String),

    /// The store answered but refused the request.
    #[error("record store rejected request: {0}")]
    Rejected(String),
}

impl RecordStoreError {
    /// Whether this failure means the store cannot be reached at all.
    #[must_use]
    pub fn is_unreachable(&self) -> bool {
        matches!(self, Self::Unreachable(_))
    }
}

/// External versioned record store holding a secondary copy of each policy.
#[async_trait]
pub trait RecordStore: Send + Sync + fmt::Debug {
    /// Look up the record stored under `key`.
    async fn lookup(&self, key: &RecordKey) -> Result<RecordLookup, RecordStoreError>;

    /// Load the payload a reference points to.
    async fn load(&self, record: &RecordRef, bucket: &BucketName)
    -> Result<Bytes, RecordStoreError>;

    /// Create a record under `key` and return the reference to its payload.
    async fn create(
        &self,
        key: &RecordKey,
        payload: &[u8],
        options: &RecordWriteOptions,
    ) -> Result<RecordRef, RecordStoreError>;

    /// Replace the payload of an existing record.
    async fn update(
        &self,
        record: &RecordRef,
        payload: &[u8],
        bucket: &BucketName,
        options: &RecordWriteOptions,
    ) -> Result<UpdateOutcome, RecordStoreError>;
}

// ---------------------------------------------------------------------------
// Local metadata store
// ---------------------------------------------------------------------------

/// Failure of the local metadata store.
#[derive(Debug, thiserror::Error)]
pub enum MetadataStoreError {
    /// The store could not complete the operation.
    #[error("metadata store unavailable: {0}")]
    Unavailable(String),
}

/// Local durable bucket metadata store; authoritative for policy reads.
#[async_trait]
pub trait MetadataStore: Send + Sync + fmt::Debug {
    /// Write `data` under `(bucket, key)` and return the write timestamp.
    async fn write(
        &self,
        bucket: &BucketName,
        key: &str,
        data: Bytes,
    ) -> Result<DateTime<Utc>, MetadataStoreError>;

    /// Read the value under `(bucket, key)`, if any.
    async fn read(&self, bucket: &BucketName, key: &str)
    -> Result<Option<Bytes>, MetadataStoreError>;

    /// Remove the value under `(bucket, key)` and return the timestamp.
    async fn delete(&self, bucket: &BucketName, key: &str)
    -> Result<DateTime<Utc>, MetadataStoreError>;
}

// ---------------------------------------------------------------------------
// Permission store
// ---------------------------------------------------------------------------

/// Backing identifier of a per-object permission record.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PermissionId(String);

impl PermissionId {
    /// Wrap a store-issued identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PermissionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Failure of the permission store.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PermissionStoreError {
    /// Transport failure.
    #[error("permission store transport error: {0}")]
    Transport(String),

    /// The store refused the mutation.
    #[error("permission store rejected request: {0}")]
    Rejected(String),
}

/// External system granting and revoking per-object public read access.
#[async_trait]
pub trait PermissionStore: Send + Sync + fmt::Debug {
    /// Resolve a derived key to the backing identifier, `None` if absent.
    async fn resolve(&self, key: &RecordKey) -> Result<Option<PermissionId>, PermissionStoreError>;

    /// Make the record publicly readable.
    async fn grant_public_read(&self, id: &PermissionId) -> Result<(), PermissionStoreError>;

    /// Clear the record's principal list, removing public access.
    async fn clear_principals(&self, id: &PermissionId) -> Result<(), PermissionStoreError>;
}

// ---------------------------------------------------------------------------
// Replication hook
// ---------------------------------------------------------------------------

/// What kind of bucket metadata changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BucketMetaKind {
    /// The bucket policy.
    Policy,
}

/// Notification sent to the replication hook after a metadata change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketMetaEvent {
    /// What changed.
    pub kind: BucketMetaKind,
    /// The bucket.
    pub bucket: BucketName,
    /// The raw submitted policy bytes; `None` when the policy was deleted.
    pub policy: Option<Bytes>,
    /// Timestamp of the local metadata write.
    pub updated_at: DateTime<Utc>,
}

/// Replication hook failure. Logged only, never surfaced to the caller.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("replication notification failed: {0}")]
pub struct ReplicationError(pub String);

/// Fire-and-forget replication notification sink.
#[async_trait]
pub trait ReplicationHook: Send + Sync + fmt::Debug {
    /// Deliver `event`.
    async fn notify(&self, event: BucketMetaEvent) -> Result<(), ReplicationError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_render_record_key() {
        let owner = OwnerId::new("did:key:abc").unwrap();
        let bucket = BucketName::new("photos").unwrap();
        let key = RecordKey::new(&owner, "bucket_policy", &bucket);
        assert_eq!(key.to_string(), "did:key:abc-bucket_policy-photos");
        assert_eq!(key.tag(), "bucket_policy");
        assert_eq!(key.bucket(), &bucket);
        assert_eq!(key.owner(), &owner);
    }

    #[test]
    fn test_should_classify_unreachable_errors() {
        assert!(RecordStoreError::Unreachable("no route to host".into()).is_unreachable());
        assert!(!RecordStoreError::Transport("reset".into()).is_unreachable());
        assert!(!RecordStoreError::Rejected("bad".into()).is_unreachable());
    }
}
