//! In-memory replication hook.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::store::{BucketMetaEvent, ReplicationError, ReplicationHook};

/// Replication hook that accepts every event, optionally recording them.
#[derive(Debug, Default)]
pub struct MemoryReplicationHook {
    events: Mutex<Vec<BucketMetaEvent>>,
    log_events: bool,
    fail: AtomicBool,
}

impl MemoryReplicationHook {
    /// Create a hook that drops delivered events.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a hook that records every delivered event.
    #[must_use]
    pub fn with_call_log() -> Self {
        Self {
            log_events: true,
            ..Self::default()
        }
    }

    /// Events delivered so far, in order. Empty unless recording is on.
    #[must_use]
    pub fn events(&self) -> Vec<BucketMetaEvent> {
        self.events.lock().clone()
    }

    /// Make subsequent notifications fail. Failed events are not recorded.
    pub fn fail_notifications(&self, fail: bool) {
        self.fail.store(fail, Ordering::Relaxed);
    }
}

#[async_trait]
impl ReplicationHook for MemoryReplicationHook {
    async fn notify(&self, event: BucketMetaEvent) -> Result<(), ReplicationError> {
        if self.fail.load(Ordering::Relaxed) {
            return Err(ReplicationError(format!(
                "peer unavailable for bucket {}",
                event.bucket
            )));
        }
        if self.log_events {
            self.events.lock().push(event);
        }
        Ok(())
    }
}
