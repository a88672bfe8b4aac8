//! In-memory permission store.

use std::collections::HashSet;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use policysync_core::{BucketName, OwnerId};
use policysync_model::WILDCARD_PRINCIPAL;
use tracing::debug;

use crate::propagate::derived_suffixes;
use crate::store::{PermissionId, PermissionStore, PermissionStoreError, RecordKey};

/// A call observed by [`MemoryPermissionStore`], with the rendered record
/// key it concerned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PermissionCall {
    /// `resolve(key)`.
    Resolve(String),
    /// `grant_public_read` on the record registered under the key.
    Grant(String),
    /// `clear_principals` on the record registered under the key.
    Clear(String),
}

#[derive(Debug)]
struct PermissionEntry {
    key: String,
    principals: Vec<String>,
}

/// Permission store holding principal lists per registered record.
///
/// Calls, and the grant and clear counts derived from them, are only kept by
/// stores built with [`MemoryPermissionStore::with_call_log`].
pub struct MemoryPermissionStore {
    /// Rendered record key to identifier.
    ids: DashMap<String, PermissionId>,
    entries: DashMap<PermissionId, PermissionEntry>,
    failing: Mutex<HashSet<String>>,
    calls: Mutex<Vec<PermissionCall>>,
    log_calls: bool,
}

impl std::fmt::Debug for MemoryPermissionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryPermissionStore")
            .field("record_count", &self.entries.len())
            .finish_non_exhaustive()
    }
}

impl Default for MemoryPermissionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryPermissionStore {
    /// Create an empty store that keeps no call log.
    #[must_use]
    pub fn new() -> Self {
        Self {
            ids: DashMap::new(),
            entries: DashMap::new(),
            failing: Mutex::new(HashSet::new()),
            calls: Mutex::new(Vec::new()),
            log_calls: false,
        }
    }

    /// Create an empty store that logs every call.
    #[must_use]
    pub fn with_call_log() -> Self {
        Self {
            log_calls: true,
            ..Self::new()
        }
    }

    /// Register a record with no principals under `key`.
    pub fn register(&self, key: &RecordKey) -> PermissionId {
        let rendered = key.to_string();
        if let Some(id) = self.ids.get(&rendered) {
            return id.clone();
        }
        let id = PermissionId::new(uuid::Uuid::new_v4().to_string());
        self.entries.insert(
            id.clone(),
            PermissionEntry {
                key: rendered.clone(),
                principals: Vec::new(),
            },
        );
        self.ids.insert(rendered, id.clone());
        id
    }

    /// Register both derived records of `object`.
    pub fn register_object(&self, owner: &OwnerId, bucket: &BucketName, object: &str) {
        for suffix in derived_suffixes(object) {
            self.register(&RecordKey::new(owner, suffix, bucket));
        }
    }

    /// Whether the record under `(owner, tag, bucket)` is publicly readable.
    #[must_use]
    pub fn is_public(&self, owner: &OwnerId, bucket: &BucketName, tag: &str) -> bool {
        let rendered = RecordKey::new(owner, tag, bucket).to_string();
        let Some(id) = self.ids.get(&rendered).map(|id| id.clone()) else {
            return false;
        };
        self.entries
            .get(&id)
            .is_some_and(|e| e.principals.iter().any(|p| p == WILDCARD_PRINCIPAL))
    }

    /// Make grants and revokes against the record under
    /// `(owner, tag, bucket)` fail.
    pub fn fail_mutations_for(&self, owner: &OwnerId, bucket: &BucketName, tag: &str) {
        self.failing
            .lock()
            .insert(RecordKey::new(owner, tag, bucket).to_string());
    }

    /// Every call made so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<PermissionCall> {
        self.calls.lock().clone()
    }

    /// Forget the call log.
    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }

    /// Number of `grant_public_read` calls so far.
    #[must_use]
    pub fn grant_count(&self) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|c| matches!(c, PermissionCall::Grant(_)))
            .count()
    }

    /// Number of `clear_principals` calls so far.
    #[must_use]
    pub fn clear_count(&self) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|c| matches!(c, PermissionCall::Clear(_)))
            .count()
    }

    fn record(&self, call: PermissionCall) {
        if self.log_calls {
            self.calls.lock().push(call);
        }
    }

    fn mutate(
        &self,
        id: &PermissionId,
        call: fn(String) -> PermissionCall,
        principals: Vec<String>,
    ) -> Result<(), PermissionStoreError> {
        let mut entry = self
            .entries
            .get_mut(id)
            .ok_or_else(|| PermissionStoreError::Rejected(format!("unknown permission id {id}")))?;
        self.record(call(entry.key.clone()));
        if self.failing.lock().contains(&entry.key) {
            return Err(PermissionStoreError::Transport(format!(
                "mutation failure injected for {}",
                entry.key
            )));
        }
        entry.principals = principals;
        Ok(())
    }
}

#[async_trait]
impl PermissionStore for MemoryPermissionStore {
    async fn resolve(&self, key: &RecordKey) -> Result<Option<PermissionId>, PermissionStoreError> {
        let rendered = key.to_string();
        self.record(PermissionCall::Resolve(rendered.clone()));
        Ok(self.ids.get(&rendered).map(|id| id.clone()))
    }

    async fn grant_public_read(&self, id: &PermissionId) -> Result<(), PermissionStoreError> {
        self.mutate(id, PermissionCall::Grant, vec![WILDCARD_PRINCIPAL.to_owned()])?;
        debug!(id = %id, "public read granted");
        Ok(())
    }

    async fn clear_principals(&self, id: &PermissionId) -> Result<(), PermissionStoreError> {
        self.mutate(id, PermissionCall::Clear, Vec::new())?;
        debug!(id = %id, "principals cleared");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bucket() -> BucketName {
        BucketName::new("photos").unwrap()
    }

    #[tokio::test]
    async fn test_should_resolve_registered_derived_records() {
        let store = MemoryPermissionStore::new();
        store.register_object(&OwnerId::default(), &bucket(), "cat.jpg");

        let content = RecordKey::new(&OwnerId::default(), "file_cat.jpg", &bucket());
        let sidecar = RecordKey::new(&OwnerId::default(), "cat.jpg_info", &bucket());
        let missing = RecordKey::new(&OwnerId::default(), "file_dog.jpg", &bucket());

        assert!(store.resolve(&content).await.unwrap().is_some());
        assert!(store.resolve(&sidecar).await.unwrap().is_some());
        assert!(store.resolve(&missing).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_should_grant_and_clear_principals() {
        let store = MemoryPermissionStore::with_call_log();
        let key = RecordKey::new(&OwnerId::default(), "file_a", &bucket());
        let id = store.register(&key);

        store.grant_public_read(&id).await.unwrap();
        assert!(store.is_public(&OwnerId::default(), &bucket(), "file_a"));

        store.clear_principals(&id).await.unwrap();
        assert!(!store.is_public(&OwnerId::default(), &bucket(), "file_a"));
        assert_eq!(store.grant_count(), 1);
        assert_eq!(store.clear_count(), 1);
    }

    #[tokio::test]
    async fn test_should_fail_injected_mutations() {
        let store = MemoryPermissionStore::new();
        let key = RecordKey::new(&OwnerId::default(), "file_a", &bucket());
        let id = store.register(&key);
        store.fail_mutations_for(&OwnerId::default(), &bucket(), "file_a");

        let result = store.grant_public_read(&id).await;

        assert!(matches!(result, Err(PermissionStoreError::Transport(_))));
        assert!(!store.is_public(&OwnerId::default(), &bucket(), "file_a"));
    }

    #[tokio::test]
    async fn test_should_not_log_calls_by_default() {
        let store = MemoryPermissionStore::new();
        let key = RecordKey::new(&OwnerId::default(), "file_a", &bucket());
        let id = store.register(&key);

        store.resolve(&key).await.unwrap();
        store.grant_public_read(&id).await.unwrap();

        assert!(store.is_public(&OwnerId::default(), &bucket(), "file_a"));
        assert!(store.calls().is_empty());
        assert_eq!(store.grant_count(), 0);
    }
}
