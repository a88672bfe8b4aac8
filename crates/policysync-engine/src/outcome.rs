//! What a reconciliation run reports back to the HTTP layer.

use std::fmt;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use policysync_core::Cancelled;
use policysync_model::MalformedPolicy;

use crate::diff::PolicyDelta;
use crate::error::ReconcileError;
use crate::persist::RecordStepStatus;
use crate::propagate::PropagationReport;
use crate::store::{MetadataStoreError, RecordStoreError};

/// Stages of a policy submission, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ReconcileState {
    /// Admitted, nothing loaded yet.
    Start,
    /// The previous policy is known (possibly empty).
    PreviousLoaded,
    /// Added and removed object names are computed.
    Diffed,
    /// Grants and revokes were issued.
    Propagated,
    /// The new document is in canonical form.
    Validated,
    /// Both stores were written (the external one best-effort).
    Persisted,
    /// The replication hook was invoked.
    Notified,
    /// Finished.
    Done,
}

impl fmt::Display for ReconcileState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Start => "start",
            Self::PreviousLoaded => "previous_loaded",
            Self::Diffed => "diffed",
            Self::Propagated => "propagated",
            Self::Validated => "validated",
            Self::Persisted => "persisted",
            Self::Notified => "notified",
            Self::Done => "done",
        })
    }
}

/// Why a submission was turned away before any state changed.
#[derive(Debug)]
pub enum RejectReason {
    /// The document is malformed or has an empty version.
    MalformedPolicy(MalformedPolicy),
    /// Empty request body.
    MissingContentLength,
    /// Body larger than the configured limit.
    PolicyTooLarge {
        /// Size of the submitted body.
        size: usize,
        /// Configured limit.
        limit: usize,
    },
}

/// Why a submission stopped part-way.
#[derive(Debug)]
pub enum AbortReason {
    /// The external record store is categorically unreachable.
    ExternalStoreUnreachable(RecordStoreError),
    /// The authoritative local store could not be written.
    LocalPersistence(MetadataStoreError),
    /// The request was cancelled or timed out.
    Cancelled(Cancelled),
    /// Anything else.
    Internal(anyhow::Error),
}

/// Final outcome of a policy submission.
#[derive(Debug)]
pub enum ReconcileOutcome {
    /// Every step succeeded.
    Synced,
    /// The local store holds the new policy, but some object permissions or
    /// the external record could not be updated.
    SyncedWithPartialPropagation,
    /// Turned away at admission; nothing changed.
    Rejected(RejectReason),
    /// Stopped part-way; see the report for the last state reached.
    Aborted(AbortReason),
}

impl ReconcileOutcome {
    /// Whether the local store now holds the submitted policy.
    #[must_use]
    pub fn is_synced(&self) -> bool {
        matches!(self, Self::Synced | Self::SyncedWithPartialPropagation)
    }

    /// The error to render for a rejected or aborted submission.
    #[must_use]
    pub fn into_error(self) -> Option<ReconcileError> {
        match self {
            Self::Synced | Self::SyncedWithPartialPropagation => None,
            Self::Rejected(reason) => Some(reason.into()),
            Self::Aborted(reason) => Some(reason.into()),
        }
    }
}

impl From<ReconcileError> for ReconcileOutcome {
    fn from(err: ReconcileError) -> Self {
        match err {
            ReconcileError::MalformedPolicy(e) => Self::Rejected(RejectReason::MalformedPolicy(e)),
            ReconcileError::MissingContentLength => {
                Self::Rejected(RejectReason::MissingContentLength)
            }
            ReconcileError::PolicyTooLarge { size, limit } => {
                Self::Rejected(RejectReason::PolicyTooLarge { size, limit })
            }
            ReconcileError::ExternalStoreUnreachable(e) => {
                Self::Aborted(AbortReason::ExternalStoreUnreachable(e))
            }
            ReconcileError::LocalPersistence(e) => Self::Aborted(AbortReason::LocalPersistence(e)),
            ReconcileError::Cancelled(c) => Self::Aborted(AbortReason::Cancelled(c)),
            ReconcileError::Internal(e) => Self::Aborted(AbortReason::Internal(e)),
            other @ ReconcileError::NoSuchBucketPolicy { .. } => {
                Self::Aborted(AbortReason::Internal(anyhow::Error::new(other)))
            }
        }
    }
}

impl From<RejectReason> for ReconcileError {
    fn from(reason: RejectReason) -> Self {
        match reason {
            RejectReason::MalformedPolicy(e) => Self::MalformedPolicy(e),
            RejectReason::MissingContentLength => Self::MissingContentLength,
            RejectReason::PolicyTooLarge { size, limit } => Self::PolicyTooLarge { size, limit },
        }
    }
}

impl From<AbortReason> for ReconcileError {
    fn from(reason: AbortReason) -> Self {
        match reason {
            AbortReason::ExternalStoreUnreachable(e) => Self::ExternalStoreUnreachable(e),
            AbortReason::LocalPersistence(e) => Self::LocalPersistence(e),
            AbortReason::Cancelled(c) => Self::Cancelled(c),
            AbortReason::Internal(e) => Self::Internal(e),
        }
    }
}

/// Everything a reconciliation run did.
#[derive(Debug)]
pub struct ReconcileReport {
    /// Final outcome.
    pub outcome: ReconcileOutcome,
    /// Last state reached. `Done` on success.
    pub state: ReconcileState,
    /// Canonical bytes of the new policy, once validated.
    pub canonical: Option<Bytes>,
    /// Object names that gained and lost public read access.
    pub delta: PolicyDelta,
    /// Result of the grant batch, if it ran.
    pub grants: Option<PropagationReport>,
    /// Result of the revoke batch, if it ran.
    pub revokes: Option<PropagationReport>,
    /// What happened to the external record, if persistence ran.
    pub record: Option<RecordStepStatus>,
    /// Timestamp of the local write, if it happened.
    pub updated_at: Option<DateTime<Utc>>,
}

impl ReconcileReport {
    pub(crate) fn new() -> Self {
        Self {
            outcome: ReconcileOutcome::Synced,
            state: ReconcileState::Start,
            canonical: None,
            delta: PolicyDelta::default(),
            grants: None,
            revokes: None,
            record: None,
            updated_at: None,
        }
    }

    /// Whether any soft failure was recorded along the way.
    #[must_use]
    pub fn has_partial_failures(&self) -> bool {
        let propagation_failed = [&self.grants, &self.revokes]
            .into_iter()
            .flatten()
            .any(|report| !report.is_complete());
        let record_failed = matches!(self.record, Some(RecordStepStatus::Failed(_)));
        propagation_failed || record_failed
    }
}
