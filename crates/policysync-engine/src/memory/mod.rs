//! In-memory collaborator implementations.
//!
//! Used by the server binary as its default backends and by tests as fakes.
//! Every store supports failure injection. Call logs are opt-in through
//! `with_call_log` so long-running servers do not accumulate them.

mod metadata;
mod permission;
mod record;
mod replication;

use std::sync::Arc;

use policysync_core::PolicySyncConfig;

pub use metadata::MemoryMetadataStore;
pub use permission::{MemoryPermissionStore, PermissionCall};
pub use record::{MemoryRecordStore, RecordCall};
pub use replication::MemoryReplicationHook;

use crate::reconciler::Reconciler;

/// One of each in-memory store, shared through `Arc`s.
#[derive(Debug, Clone, Default)]
pub struct InMemoryBackends {
    /// External record store.
    pub records: Arc<MemoryRecordStore>,
    /// Local metadata store.
    pub metadata: Arc<MemoryMetadataStore>,
    /// Permission store.
    pub permissions: Arc<MemoryPermissionStore>,
    /// Replication hook.
    pub replication: Arc<MemoryReplicationHook>,
}

impl InMemoryBackends {
    /// Fresh, empty backends that keep no call logs.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fresh, empty backends whose stores log every call.
    #[must_use]
    pub fn with_call_log() -> Self {
        Self {
            records: Arc::new(MemoryRecordStore::with_call_log()),
            metadata: Arc::new(MemoryMetadataStore::new()),
            permissions: Arc::new(MemoryPermissionStore::with_call_log()),
            replication: Arc::new(MemoryReplicationHook::with_call_log()),
        }
    }

    /// A [`Reconciler`] wired to these backends.
    #[must_use]
    pub fn reconciler(&self, config: PolicySyncConfig) -> Reconciler {
        Reconciler::builder()
            .records(self.records.clone())
            .metadata(self.metadata.clone())
            .permissions(self.permissions.clone())
            .replication(self.replication.clone())
            .config(config)
            .build()
    }
}
