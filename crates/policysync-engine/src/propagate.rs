//! Propagation of object-level deltas to the permission store.
//!
//! Each object name maps to two backing records: the primary content record
//! (`file_{name}`) and the metadata sidecar (`{name}_info`). Both are
//! resolved through the permission store and then granted public read or
//! stripped of their principals.
//!
//! Propagation is best-effort. A resolution or mutation failure abandons the
//! remaining records of that object only; the batch carries on and the
//! failure is recorded in the [`PropagationReport`]. There is no rollback.
//! Cancellation is the one exception and stops the batch immediately.

use std::fmt;
use std::sync::Arc;

use policysync_core::{BucketName, Cancelled, OwnerId, RequestContext};
use tracing::{debug, info, warn};

use crate::extract::WILDCARD_OBJECT;
use crate::store::{PermissionId, PermissionStore, PermissionStoreError, RecordKey};

/// Which way a batch changes public readability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Make objects publicly readable.
    Grant,
    /// Remove public readability.
    Revoke,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Grant => "grant",
            Self::Revoke => "revoke",
        })
    }
}

/// Step at which propagation of an object failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureStage {
    /// The derived key could not be resolved to a permission record.
    Resolve,
    /// The grant or revoke call failed.
    Mutate,
}

impl fmt::Display for FailureStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Resolve => "resolve",
            Self::Mutate => "mutate",
        })
    }
}

/// Soft, per-object propagation failure.
///
/// Never fails the request; collected in the [`PropagationReport`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{stage} failed for object {object:?} ({key}): {reason}")]
pub struct PermissionResolutionFailure {
    /// The object name being propagated.
    pub object: String,
    /// The derived key that failed.
    pub key: String,
    /// Where it failed.
    pub stage: FailureStage,
    /// Store-provided reason.
    pub reason: String,
}

/// Outcome of one propagation batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropagationReport {
    /// Direction of the batch.
    pub direction: Direction,
    /// Objects whose records were all updated.
    pub applied: Vec<String>,
    /// Objects deliberately left alone (wildcards).
    pub skipped: Vec<String>,
    /// Objects that failed part-way.
    pub failures: Vec<PermissionResolutionFailure>,
}

impl PropagationReport {
    /// An empty report for `direction`.
    #[must_use]
    pub fn new(direction: Direction) -> Self {
        Self {
            direction,
            applied: Vec::new(),
            skipped: Vec::new(),
            failures: Vec::new(),
        }
    }

    /// Whether every object was either applied or deliberately skipped.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// The two derived record suffixes of an object: primary content, then
/// metadata sidecar.
#[must_use]
pub fn derived_suffixes(object: &str) -> [String; 2] {
    [format!("file_{object}"), format!("{object}_info")]
}

/// Issues per-object grant and revoke calls against a [`PermissionStore`].
#[derive(Debug, Clone)]
pub struct PermissionPropagator {
    store: Arc<dyn PermissionStore>,
    owner: OwnerId,
}

impl PermissionPropagator {
    /// Create a propagator acting on behalf of `owner`.
    #[must_use]
    pub fn new(store: Arc<dyn PermissionStore>, owner: OwnerId) -> Self {
        Self { store, owner }
    }

    /// Apply `direction` to every name in `objects`.
    ///
    /// A revoke batch that contains `*` anywhere is skipped as a whole: a
    /// wildcard grant cannot be decomposed into per-object revokes, so public
    /// access is left intact. A `*` inside a grant batch is skipped on its
    /// own, since bulk wildcard grants are not supported.
    ///
    /// # Errors
    ///
    /// Returns [`Cancelled`] if the request context is cancelled; the calls
    /// already made stay in effect.
    pub async fn propagate(
        &self,
        ctx: &RequestContext,
        bucket: &BucketName,
        objects: &[String],
        direction: Direction,
    ) -> Result<PropagationReport, Cancelled> {
        let mut report = PropagationReport::new(direction);

        if direction == Direction::Revoke && objects.iter().any(|o| o == WILDCARD_OBJECT) {
            info!(
                bucket = %bucket,
                objects = objects.len(),
                "revoke batch contains '*', leaving public read access on all objects intact"
            );
            report.skipped = objects.to_vec();
            return Ok(report);
        }

        for object in objects {
            if object == WILDCARD_OBJECT {
                info!(bucket = %bucket, "bulk '*' grant is not supported, skipping");
                report.skipped.push(object.clone());
                continue;
            }

            match direction {
                Direction::Grant => info!(bucket = %bucket, object = %object, "making object publicly readable"),
                Direction::Revoke => info!(bucket = %bucket, object = %object, "removing object from public read access"),
            }

            match self.apply(ctx, bucket, object, direction).await? {
                Ok(()) => report.applied.push(object.clone()),
                Err(failure) => {
                    warn!(bucket = %bucket, error = %failure, "permission propagation failed");
                    report.failures.push(failure);
                }
            }
        }

        debug!(
            bucket = %bucket,
            direction = %direction,
            applied = report.applied.len(),
            skipped = report.skipped.len(),
            failed = report.failures.len(),
            "propagation batch completed"
        );
        Ok(report)
    }

    /// Resolve and mutate both derived records of one object, stopping at
    /// the first failure.
    async fn apply(
        &self,
        ctx: &RequestContext,
        bucket: &BucketName,
        object: &str,
        direction: Direction,
    ) -> Result<Result<(), PermissionResolutionFailure>, Cancelled> {
        for suffix in derived_suffixes(object) {
            let key = RecordKey::new(&self.owner, suffix, bucket);
            let failure = |stage, reason: String| PermissionResolutionFailure {
                object: object.to_owned(),
                key: key.to_string(),
                stage,
                reason,
            };

            let id = match ctx.run(self.store.resolve(&key)).await? {
                Ok(Some(id)) => id,
                Ok(None) => {
                    return Ok(Err(failure(
                        FailureStage::Resolve,
                        "no permission record".to_owned(),
                    )));
                }
                Err(e) => return Ok(Err(failure(FailureStage::Resolve, e.to_string()))),
            };

            if let Err(e) = ctx.run(self.mutate(&id, direction)).await? {
                return Ok(Err(failure(FailureStage::Mutate, e.to_string())));
            }
            debug!(key = %key, id = %id, direction = %direction, "permission record updated");
        }
        Ok(Ok(()))
    }

    async fn mutate(
        &self,
        id: &PermissionId,
        direction: Direction,
    ) -> Result<(), PermissionStoreError> {
        match direction {
            Direction::Grant => self.store.grant_public_read(id).await,
            Direction::Revoke => self.store.clear_principals(id).await,
        }
    }
}
