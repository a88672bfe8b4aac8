//! Bucket policy reconciliation.
//!
//! [`Reconciler`] owns the collaborator handles and sequences one policy
//! submission through [`ReconcileState`]:
//!
//! ```text
//! Start -> PreviousLoaded -> Diffed -> Propagated -> Validated -> Persisted -> Notified -> Done
//! ```
//!
//! Rejections happen at admission, before `Start` is left, and touch no
//! store. Aborts can happen from `Start` (external store unreachable) or at
//! persistence (local store failure, or the external store becoming
//! unreachable). Cancellation aborts wherever it is observed.

use std::sync::Arc;

use anyhow::Context as _;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use policysync_core::{BucketName, PolicySyncConfig, RequestContext};
use policysync_model::{JsonPolicyParser, PolicyDocument, PolicyParser};
use tracing::{debug, error, info, warn};
use typed_builder::TypedBuilder;

use crate::diff::diff;
use crate::error::{ReconcileError, ReconcileResult};
use crate::extract::extract_object_names;
use crate::outcome::{ReconcileOutcome, ReconcileReport, ReconcileState};
use crate::persist::{PolicyPersistence, PriorRecord};
use crate::propagate::{Direction, PermissionPropagator};
use crate::store::{
    BucketMetaEvent, BucketMetaKind, MetadataStore, POLICY_CONFIG_KEY, PermissionStore,
    RecordKey, RecordLookup, RecordRef, RecordStore, ReplicationHook,
};

fn default_parser() -> Arc<dyn PolicyParser> {
    Arc::new(JsonPolicyParser)
}

/// The bucket policy reconciliation engine.
///
/// # Examples
///
/// ```
/// use bytes::Bytes;
/// use policysync_core::{BucketName, RequestContext};
/// use policysync_engine::{InMemoryBackends, ReconcileOutcome};
///
/// # tokio_test::block_on(async {
/// let backends = InMemoryBackends::new();
/// let reconciler = backends.reconciler(Default::default());
/// let bucket = BucketName::new("photos").unwrap();
///
/// let body = Bytes::from_static(br#"{"Version":"2012-10-17","Statement":[]}"#);
/// let report = reconciler
///     .reconcile(&RequestContext::background(), &bucket, body)
///     .await;
/// assert!(matches!(report.outcome, ReconcileOutcome::Synced));
/// # });
/// ```
#[derive(Debug, TypedBuilder)]
pub struct Reconciler {
    /// Policy grammar parser.
    #[builder(default = default_parser())]
    parser: Arc<dyn PolicyParser>,
    /// External versioned record store.
    records: Arc<dyn RecordStore>,
    /// Authoritative local metadata store.
    metadata: Arc<dyn MetadataStore>,
    /// Per-object permission store.
    permissions: Arc<dyn PermissionStore>,
    /// Replication notification sink.
    replication: Arc<dyn ReplicationHook>,
    /// Engine configuration.
    #[builder(default)]
    config: PolicySyncConfig,
}

impl Reconciler {
    /// The configuration in effect.
    #[must_use]
    pub fn config(&self) -> &PolicySyncConfig {
        &self.config
    }

    /// Apply a newly submitted policy `body` to `bucket`.
    ///
    /// Never fails as a whole: every failure is folded into the returned
    /// report's [`ReconcileOutcome`].
    pub async fn reconcile(
        &self,
        ctx: &RequestContext,
        bucket: &BucketName,
        body: Bytes,
    ) -> ReconcileReport {
        let ctx = self.scoped(ctx);
        let mut report = ReconcileReport::new();

        info!(bucket = %bucket, size = body.len(), "reconciling bucket policy");

        match self.run(&ctx, bucket, body, &mut report).await {
            Ok(()) if report.has_partial_failures() => {
                warn!(bucket = %bucket, "bucket policy synced with partial propagation");
                report.outcome = ReconcileOutcome::SyncedWithPartialPropagation;
            }
            Ok(()) => {
                info!(bucket = %bucket, "bucket policy synced");
            }
            Err(e) => {
                let outcome = ReconcileOutcome::from(e);
                match &outcome {
                    ReconcileOutcome::Rejected(reason) => {
                        info!(bucket = %bucket, reason = ?reason, "bucket policy rejected");
                    }
                    ReconcileOutcome::Aborted(reason) => {
                        error!(bucket = %bucket, state = %report.state, reason = ?reason, "bucket policy reconciliation aborted");
                    }
                    ReconcileOutcome::Synced | ReconcileOutcome::SyncedWithPartialPropagation => {}
                }
                report.outcome = outcome;
            }
        }
        report
    }

    /// Return the stored policy of `bucket` in canonical form.
    ///
    /// Reads the local metadata store only.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::NoSuchBucketPolicy`] if no policy is stored.
    pub async fn get_policy(
        &self,
        ctx: &RequestContext,
        bucket: &BucketName,
    ) -> ReconcileResult<Bytes> {
        let ctx = self.scoped(ctx);
        let stored = ctx
            .run(self.metadata.read(bucket, POLICY_CONFIG_KEY))
            .await?
            .map_err(|e| anyhow::Error::new(e).context("reading bucket policy"))?
            .ok_or_else(|| ReconcileError::NoSuchBucketPolicy {
                bucket: bucket.to_string(),
            })?;

        let doc = self
            .parser
            .parse(&stored, bucket)
            .context("stored bucket policy is not valid")?;
        let canonical = doc
            .to_canonical_json()
            .context("serializing bucket policy")?;
        debug!(bucket = %bucket, size = canonical.len(), "bucket policy read");
        Ok(Bytes::from(canonical))
    }

    /// Remove the stored policy of `bucket` and notify replication.
    ///
    /// Object permissions and the external record are left as they are.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::LocalPersistence`] if the local store fails.
    pub async fn delete_policy(
        &self,
        ctx: &RequestContext,
        bucket: &BucketName,
    ) -> ReconcileResult<DateTime<Utc>> {
        let ctx = self.scoped(ctx);
        let updated_at = ctx
            .run(self.metadata.delete(bucket, POLICY_CONFIG_KEY))
            .await?
            .map_err(ReconcileError::LocalPersistence)?;

        info!(bucket = %bucket, "bucket policy deleted");
        self.notify(
            &ctx,
            BucketMetaEvent {
                kind: BucketMetaKind::Policy,
                bucket: bucket.clone(),
                policy: None,
                updated_at,
            },
        )
        .await;
        Ok(updated_at)
    }

    async fn run(
        &self,
        ctx: &RequestContext,
        bucket: &BucketName,
        body: Bytes,
        report: &mut ReconcileReport,
    ) -> ReconcileResult<()> {
        let doc = self.admit(bucket, &body)?;
        let key = RecordKey::new(&self.config.owner_id, &self.config.record_tag, bucket);

        let (previous, prior) = self.load_previous(ctx, bucket, &key).await?;
        report.state = ReconcileState::PreviousLoaded;

        let previous_names = previous
            .as_ref()
            .map(|p| extract_object_names(p, bucket))
            .unwrap_or_default();
        let next_names = extract_object_names(&doc, bucket);
        report.delta = diff(&previous_names, &next_names);
        report.state = ReconcileState::Diffed;
        debug!(
            bucket = %bucket,
            added = report.delta.added.len(),
            removed = report.delta.removed.len(),
            "computed public object delta"
        );

        // Grants before revokes.
        let propagator =
            PermissionPropagator::new(self.permissions.clone(), self.config.owner_id.clone());
        report.grants = Some(
            propagator
                .propagate(ctx, bucket, &report.delta.added, Direction::Grant)
                .await?,
        );
        report.revokes = Some(
            propagator
                .propagate(ctx, bucket, &report.delta.removed, Direction::Revoke)
                .await?,
        );
        report.state = ReconcileState::Propagated;

        let canonical = Bytes::from(
            doc.to_canonical_json()
                .context("serializing bucket policy")?,
        );
        report.canonical = Some(canonical.clone());
        report.state = ReconcileState::Validated;

        let persistence = PolicyPersistence::new(
            self.records.clone(),
            self.metadata.clone(),
            self.config.record_options,
        );
        let receipt = persistence.persist(ctx, &key, prior, &canonical).await?;
        report.record = Some(receipt.record);
        report.updated_at = Some(receipt.updated_at);
        report.state = ReconcileState::Persisted;

        self.notify(
            ctx,
            BucketMetaEvent {
                kind: BucketMetaKind::Policy,
                bucket: bucket.clone(),
                policy: Some(body),
                updated_at: receipt.updated_at,
            },
        )
        .await;
        report.state = ReconcileState::Notified;

        report.state = ReconcileState::Done;
        Ok(())
    }

    /// Admission checks. Nothing here touches a store.
    fn admit(&self, bucket: &BucketName, body: &[u8]) -> ReconcileResult<PolicyDocument> {
        if body.is_empty() {
            return Err(ReconcileError::MissingContentLength);
        }
        if body.len() > self.config.max_policy_size {
            return Err(ReconcileError::PolicyTooLarge {
                size: body.len(),
                limit: self.config.max_policy_size,
            });
        }
        let doc = self.parser.parse(body, bucket)?;
        doc.validate_version()?;
        Ok(doc)
    }

    /// Find the policy currently in force, preferring the external record
    /// and falling back to the local store.
    async fn load_previous(
        &self,
        ctx: &RequestContext,
        bucket: &BucketName,
        key: &RecordKey,
    ) -> ReconcileResult<(Option<PolicyDocument>, PriorRecord)> {
        let prior = match ctx.run(self.records.lookup(key)).await? {
            Ok(RecordLookup::Found(record)) => {
                if let Some(doc) = self.load_record(ctx, bucket, &record).await? {
                    return Ok((Some(doc), PriorRecord::Found(record)));
                }
                PriorRecord::Found(record)
            }
            Ok(RecordLookup::Absent) => {
                debug!(key = %key, "no external policy record");
                PriorRecord::Absent
            }
            Err(e) if e.is_unreachable() => {
                return Err(ReconcileError::ExternalStoreUnreachable(e));
            }
            Err(e) => {
                info!(key = %key, error = %e, "unable to look up external policy record");
                PriorRecord::Unknown
            }
        };

        Ok((self.read_local(ctx, bucket).await?, prior))
    }

    /// Load and parse a record payload. `None` means the caller should fall
    /// back to the local store.
    async fn load_record(
        &self,
        ctx: &RequestContext,
        bucket: &BucketName,
        record: &RecordRef,
    ) -> ReconcileResult<Option<PolicyDocument>> {
        let payload = match ctx.run(self.records.load(record, bucket)).await? {
            Ok(payload) => payload,
            Err(e) if e.is_unreachable() => {
                return Err(ReconcileError::ExternalStoreUnreachable(e));
            }
            Err(e) => {
                info!(bucket = %bucket, record = %record, error = %e, "unable to load external policy record");
                return Ok(None);
            }
        };

        match self.parser.parse(&payload, bucket) {
            Ok(doc) => Ok(Some(doc)),
            Err(e) => {
                info!(bucket = %bucket, record = %record, error = %e, "external policy record is not a valid policy");
                Ok(None)
            }
        }
    }

    /// Current policy from the local store. Read and parse failures are
    /// treated as "no previous policy".
    async fn read_local(
        &self,
        ctx: &RequestContext,
        bucket: &BucketName,
    ) -> ReconcileResult<Option<PolicyDocument>> {
        let stored = match ctx.run(self.metadata.read(bucket, POLICY_CONFIG_KEY)).await? {
            Ok(Some(stored)) => stored,
            Ok(None) => return Ok(None),
            Err(e) => {
                error!(bucket = %bucket, error = %e, "unable to read local bucket policy");
                return Ok(None);
            }
        };

        match self.parser.parse(&stored, bucket) {
            Ok(doc) => Ok(Some(doc)),
            Err(e) => {
                error!(bucket = %bucket, error = %e, "local bucket policy is not a valid policy");
                Ok(None)
            }
        }
    }

    async fn notify(&self, ctx: &RequestContext, event: BucketMetaEvent) {
        let bucket = event.bucket.clone();
        match ctx.run(self.replication.notify(event)).await {
            Ok(Ok(())) => debug!(bucket = %bucket, "replication notified"),
            Ok(Err(e)) => warn!(bucket = %bucket, error = %e, "replication notification failed"),
            Err(e) => warn!(bucket = %bucket, error = %e, "replication notification abandoned"),
        }
    }

    fn scoped(&self, ctx: &RequestContext) -> RequestContext {
        match self.config.request_timeout() {
            Some(timeout) => ctx.clone().with_timeout(timeout),
            None => ctx.clone(),
        }
    }
}
