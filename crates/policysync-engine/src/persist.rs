//! Two-step persistence of a canonical policy.
//!
//! The write is a small saga:
//!
//! 1. [`SagaStep::ExternalRecord`]: create-or-update the secondary copy in the
//!    external record store. Failures are logged and the saga continues,
//!    unless the store is categorically unreachable.
//! 2. [`SagaStep::LocalMetadata`]: write the authoritative copy to the local
//!    metadata store. Any failure aborts.
//!
//! Neither step is compensated: the external record is a best-effort mirror
//! and a later successful submission overwrites it.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use policysync_core::{BucketName, Cancelled, RecordWriteOptions, RequestContext};
use tracing::{debug, error, info, warn};

use crate::error::{ReconcileError, ReconcileResult};
use crate::store::{
    MetadataStore, MetadataStoreError, POLICY_CONFIG_KEY, RecordKey, RecordLookup, RecordRef,
    RecordStore, RecordStoreError, UpdateOutcome,
};

/// What the reconciler learned about the external record before persisting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PriorRecord {
    /// The lookup found a record.
    Found(RecordRef),
    /// The lookup reached the store and found nothing.
    Absent,
    /// The lookup failed softly; persistence looks up again.
    Unknown,
}

/// One write of the persistence saga.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SagaStep {
    /// Create-or-update in the external record store.
    ExternalRecord,
    /// Write to the local metadata store.
    LocalMetadata,
}

/// What happens to the saga when a step fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepFailurePolicy {
    /// Log and run the next step.
    Continue,
    /// Stop and report failure.
    Abort,
}

impl SagaStep {
    /// Steps in execution order.
    pub const ORDER: [Self; 2] = [Self::ExternalRecord, Self::LocalMetadata];

    /// Policy applied to an ordinary failure of this step.
    ///
    /// Categorical unreachability of the external record store always
    /// aborts, regardless of this policy.
    #[must_use]
    pub const fn failure_policy(self) -> StepFailurePolicy {
        match self {
            Self::ExternalRecord => StepFailurePolicy::Continue,
            Self::LocalMetadata => StepFailurePolicy::Abort,
        }
    }
}

impl fmt::Display for SagaStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::ExternalRecord => "external_record",
            Self::LocalMetadata => "local_metadata",
        })
    }
}

/// Failure of a single saga step.
#[derive(Debug, thiserror::Error)]
enum StepFailure {
    #[error(transparent)]
    Record(RecordStoreError),
    #[error(transparent)]
    Metadata(MetadataStoreError),
}

impl StepFailure {
    /// Failures that abort the saga whatever the step's policy says.
    fn is_categorical(&self) -> bool {
        matches!(self, Self::Record(e) if e.is_unreachable())
    }
}

impl From<StepFailure> for ReconcileError {
    fn from(failure: StepFailure) -> Self {
        match failure {
            StepFailure::Record(e) if e.is_unreachable() => Self::ExternalStoreUnreachable(e),
            StepFailure::Record(e) => {
                Self::Internal(anyhow::Error::new(e).context("external record step failed"))
            }
            StepFailure::Metadata(e) => Self::LocalPersistence(e),
        }
    }
}

/// Result of the external record step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordStepStatus {
    /// A new record was created.
    Created(RecordRef),
    /// The existing record was updated.
    Updated,
    /// The existing record already held identical bytes.
    Unchanged,
    /// The step failed softly; the reason was logged.
    Failed(String),
}

/// Receipt of a completed saga.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistReceipt {
    /// What happened to the external record.
    pub record: RecordStepStatus,
    /// Timestamp of the local write.
    pub updated_at: DateTime<Utc>,
}

/// Writes canonical policies to the external record store and the local
/// metadata store.
#[derive(Debug, Clone)]
pub struct PolicyPersistence {
    records: Arc<dyn RecordStore>,
    metadata: Arc<dyn MetadataStore>,
    options: RecordWriteOptions,
}

impl PolicyPersistence {
    /// Create a persistence saga over the two stores.
    #[must_use]
    pub fn new(
        records: Arc<dyn RecordStore>,
        metadata: Arc<dyn MetadataStore>,
        options: RecordWriteOptions,
    ) -> Self {
        Self {
            records,
            metadata,
            options,
        }
    }

    /// Run both saga steps for `canonical`.
    ///
    /// # Errors
    ///
    /// - [`ReconcileError::ExternalStoreUnreachable`] if the record store is
    ///   categorically unreachable; the local store is then not written.
    /// - [`ReconcileError::LocalPersistence`] if the local write fails, even
    ///   when the external record was written.
    /// - [`ReconcileError::Cancelled`] if the context is cancelled.
    pub async fn persist(
        &self,
        ctx: &RequestContext,
        key: &RecordKey,
        prior: PriorRecord,
        canonical: &Bytes,
    ) -> ReconcileResult<PersistReceipt> {
        let bucket = key.bucket();
        let mut record = RecordStepStatus::Unchanged;
        let mut updated_at = None;

        for step in SagaStep::ORDER {
            let failure = match step {
                SagaStep::ExternalRecord => {
                    match self.write_record(ctx, key, &prior, canonical).await? {
                        Ok(status) => {
                            record = status;
                            continue;
                        }
                        Err(e) => StepFailure::Record(e),
                    }
                }
                SagaStep::LocalMetadata => {
                    let write = self
                        .metadata
                        .write(bucket, POLICY_CONFIG_KEY, canonical.clone());
                    match ctx.run(write).await? {
                        Ok(ts) => {
                            updated_at = Some(ts);
                            continue;
                        }
                        Err(e) => StepFailure::Metadata(e),
                    }
                }
            };

            if failure.is_categorical() || step.failure_policy() == StepFailurePolicy::Abort {
                error!(bucket = %bucket, step = %step, error = %failure, "aborting persistence");
                return Err(failure.into());
            }
            warn!(bucket = %bucket, step = %step, error = %failure, "saga step failed, continuing");
            if step == SagaStep::ExternalRecord {
                record = RecordStepStatus::Failed(failure.to_string());
            }
        }

        let updated_at = updated_at
            .ok_or_else(|| anyhow::anyhow!("local metadata step did not run"))?;
        debug!(bucket = %bucket, record = ?record, %updated_at, "bucket policy persisted");
        Ok(PersistReceipt { record, updated_at })
    }

    async fn write_record(
        &self,
        ctx: &RequestContext,
        key: &RecordKey,
        prior: &PriorRecord,
        canonical: &[u8],
    ) -> Result<Result<RecordStepStatus, RecordStoreError>, Cancelled> {
        let lookup = match prior {
            PriorRecord::Found(record) => RecordLookup::Found(record.clone()),
            PriorRecord::Absent => RecordLookup::Absent,
            PriorRecord::Unknown => match ctx.run(self.records.lookup(key)).await? {
                Ok(lookup) => lookup,
                Err(e) => return Ok(Err(e)),
            },
        };

        let status = match lookup {
            RecordLookup::Found(record) => {
                let update = self
                    .records
                    .update(&record, canonical, key.bucket(), &self.options);
                match ctx.run(update).await? {
                    Ok(UpdateOutcome::Updated) => {
                        info!(key = %key, record = %record, "external policy record updated");
                        RecordStepStatus::Updated
                    }
                    Ok(UpdateOutcome::NoDifferences) => {
                        debug!(key = %key, record = %record, "external policy record unchanged");
                        RecordStepStatus::Unchanged
                    }
                    Err(e) => return Ok(Err(e)),
                }
            }
            RecordLookup::Absent => {
                match ctx.run(self.records.create(key, canonical, &self.options)).await? {
                    Ok(record) => {
                        info!(key = %key, record = %record, "external policy record created");
                        RecordStepStatus::Created(record)
                    }
                    Err(e) => return Ok(Err(e)),
                }
            }
        };
        Ok(Ok(status))
    }
}

#[cfg(test)]
mod tests {
    use policysync_core::OwnerId;

    use super::*;
    use crate::memory::{MemoryMetadataStore, MemoryRecordStore, RecordCall};

    fn key() -> RecordKey {
        RecordKey::new(
            &OwnerId::default(),
            "bucket_policy",
            &BucketName::new("photos").unwrap(),
        )
    }

    fn setup() -> (Arc<MemoryRecordStore>, Arc<MemoryMetadataStore>, PolicyPersistence) {
        let records = Arc::new(MemoryRecordStore::with_call_log());
        let metadata = Arc::new(MemoryMetadataStore::new());
        let persistence =
            PolicyPersistence::new(records.clone(), metadata.clone(), RecordWriteOptions::default());
        (records, metadata, persistence)
    }

    #[tokio::test]
    async fn test_should_create_record_and_write_locally() {
        let (records, metadata, persistence) = setup();
        let payload = Bytes::from_static(b"{\"Version\":\"2012-10-17\"}");

        let receipt = persistence
            .persist(&RequestContext::background(), &key(), PriorRecord::Absent, &payload)
            .await
            .expect("persisted");

        assert!(matches!(receipt.record, RecordStepStatus::Created(_)));
        assert_eq!(records.payload(&key()), Some(payload.clone()));
        assert_eq!(metadata.get(key().bucket(), POLICY_CONFIG_KEY), Some(payload));
    }

    #[tokio::test]
    async fn test_should_report_unchanged_and_still_write_locally() {
        let (records, metadata, persistence) = setup();
        let payload = Bytes::from_static(b"{}");
        let ctx = RequestContext::background();
        let record = records.seed(&key(), payload.clone());

        let receipt = persistence
            .persist(&ctx, &key(), PriorRecord::Found(record), &payload)
            .await
            .expect("persisted");

        assert_eq!(receipt.record, RecordStepStatus::Unchanged);
        assert_eq!(metadata.write_count(), 1);
    }

    #[tokio::test]
    async fn test_should_look_up_again_when_prior_is_unknown() {
        let (records, _metadata, persistence) = setup();
        let record = records.seed(&key(), Bytes::from_static(b"old"));

        let receipt = persistence
            .persist(
                &RequestContext::background(),
                &key(),
                PriorRecord::Unknown,
                &Bytes::from_static(b"new"),
            )
            .await
            .expect("persisted");

        assert_eq!(receipt.record, RecordStepStatus::Updated);
        assert!(records.calls().contains(&RecordCall::Lookup(key().to_string())));
        assert!(records.calls().contains(&RecordCall::Update(record.to_string())));
    }

    #[tokio::test]
    async fn test_should_continue_after_soft_record_failure() {
        let (records, metadata, persistence) = setup();
        records.fail_writes_with(RecordStoreError::Transport("connection reset".into()));

        let receipt = persistence
            .persist(
                &RequestContext::background(),
                &key(),
                PriorRecord::Absent,
                &Bytes::from_static(b"{}"),
            )
            .await
            .expect("persisted");

        assert!(matches!(receipt.record, RecordStepStatus::Failed(_)));
        assert_eq!(metadata.write_count(), 1);
    }

    #[tokio::test]
    async fn test_should_abort_before_local_write_when_unreachable() {
        let (records, metadata, persistence) = setup();
        records.fail_writes_with(RecordStoreError::Unreachable("no route to host".into()));

        let err = persistence
            .persist(
                &RequestContext::background(),
                &key(),
                PriorRecord::Absent,
                &Bytes::from_static(b"{}"),
            )
            .await
            .expect_err("unreachable");

        assert!(matches!(err, ReconcileError::ExternalStoreUnreachable(_)));
        assert_eq!(metadata.write_count(), 0);
    }

    #[tokio::test]
    async fn test_should_fail_on_local_write_even_if_record_written() {
        let (records, metadata, persistence) = setup();
        metadata.fail_writes(true);

        let err = persistence
            .persist(
                &RequestContext::background(),
                &key(),
                PriorRecord::Absent,
                &Bytes::from_static(b"{}"),
            )
            .await
            .expect_err("local failure");

        assert!(matches!(err, ReconcileError::LocalPersistence(_)));
        assert!(records.payload(&key()).is_some());
    }

    #[tokio::test]
    async fn test_should_abort_when_relookup_finds_store_unreachable() {
        let (records, metadata, persistence) = setup();
        records.fail_lookups_with(RecordStoreError::Unreachable("dns failure".into()));

        let err = persistence
            .persist(
                &RequestContext::background(),
                &key(),
                PriorRecord::Unknown,
                &Bytes::from_static(b"{}"),
            )
            .await
            .expect_err("unreachable");

        assert!(matches!(err, ReconcileError::ExternalStoreUnreachable(_)));
        assert_eq!(metadata.write_count(), 0);
    }

    #[test]
    fn test_should_route_step_failures_to_reconcile_errors() {
        let unreachable = StepFailure::Record(RecordStoreError::Unreachable("down".into()));
        assert!(unreachable.is_categorical());
        assert!(matches!(
            ReconcileError::from(unreachable),
            ReconcileError::ExternalStoreUnreachable(_)
        ));

        let rejected = StepFailure::Record(RecordStoreError::Rejected("bad tag".into()));
        assert!(!rejected.is_categorical());
        assert!(matches!(ReconcileError::from(rejected), ReconcileError::Internal(_)));

        let local = StepFailure::Metadata(MetadataStoreError::Unavailable("disk full".into()));
        assert!(!local.is_categorical());
        assert!(matches!(
            ReconcileError::from(local),
            ReconcileError::LocalPersistence(_)
        ));
    }

    #[test]
    fn test_should_assign_failure_policy_per_step() {
        assert_eq!(
            SagaStep::ExternalRecord.failure_policy(),
            StepFailurePolicy::Continue
        );
        assert_eq!(SagaStep::LocalMetadata.failure_policy(), StepFailurePolicy::Abort);
    }
}
