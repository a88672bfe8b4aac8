//! In-memory external record store.

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use parking_lot::Mutex;
use policysync_core::{BucketName, RecordWriteOptions};
use tracing::debug;

use crate::store::{
    RecordKey, RecordLookup, RecordRef, RecordStore, RecordStoreError, UpdateOutcome,
};

/// A call observed by [`MemoryRecordStore`], with the key or reference it
/// was made against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordCall {
    /// `lookup(key)`.
    Lookup(String),
    /// `load(record)`.
    Load(String),
    /// `create(key, ..)`.
    Create(String),
    /// `update(record, ..)`.
    Update(String),
}

#[derive(Debug, Default)]
struct Faults {
    lookup: Option<RecordStoreError>,
    load: Option<RecordStoreError>,
    write: Option<RecordStoreError>,
}

/// Record store keeping records and payloads in `DashMap`s.
///
/// Failures can be injected per operation class; injected failures persist
/// until [`MemoryRecordStore::clear_faults`] is called. Calls are only logged
/// by stores built with [`MemoryRecordStore::with_call_log`].
pub struct MemoryRecordStore {
    /// Rendered record key to payload reference.
    records: DashMap<String, RecordRef>,
    /// Payload reference to payload bytes.
    payloads: DashMap<RecordRef, Bytes>,
    calls: Mutex<Vec<RecordCall>>,
    log_calls: bool,
    faults: Mutex<Faults>,
}

impl std::fmt::Debug for MemoryRecordStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryRecordStore")
            .field("record_count", &self.records.len())
            .finish_non_exhaustive()
    }
}

impl Default for MemoryRecordStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRecordStore {
    /// Create an empty store that keeps no call log.
    #[must_use]
    pub fn new() -> Self {
        Self {
            records: DashMap::new(),
            payloads: DashMap::new(),
            calls: Mutex::new(Vec::new()),
            log_calls: false,
            faults: Mutex::new(Faults::default()),
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

    /// Insert a record directly, bypassing the call log.
    pub fn seed(&self, key: &RecordKey, payload: Bytes) -> RecordRef {
        let record = new_record_ref();
        self.payloads.insert(record.clone(), payload);
        self.records.insert(key.to_string(), record.clone());
        record
    }

    /// Current payload stored under `key`.
    #[must_use]
    pub fn payload(&self, key: &RecordKey) -> Option<Bytes> {
        let record = self.records.get(&key.to_string())?.clone();
        self.payloads.get(&record).map(|p| p.clone())
    }

    /// Every call made so far, in order. Empty unless the call log is on.
    #[must_use]
    pub fn calls(&self) -> Vec<RecordCall> {
        self.calls.lock().clone()
    }

    /// Forget the call log.
    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }

    /// Fail every subsequent `lookup` with `err`.
    pub fn fail_lookups_with(&self, err: RecordStoreError) {
        self.faults.lock().lookup = Some(err);
    }

    /// Fail every subsequent `load` with `err`.
    pub fn fail_loads_with(&self, err: RecordStoreError) {
        self.faults.lock().load = Some(err);
    }

    /// Fail every subsequent `create` and `update` with `err`.
    pub fn fail_writes_with(&self, err: RecordStoreError) {
        self.faults.lock().write = Some(err);
    }

    /// Remove all injected failures.
    pub fn clear_faults(&self) {
        *self.faults.lock() = Faults::default();
    }

    fn record(&self, call: RecordCall) {
        if self.log_calls {
            self.calls.lock().push(call);
        }
    }
}

fn new_record_ref() -> RecordRef {
    RecordRef::new(uuid::Uuid::new_v4().to_string())
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn lookup(&self, key: &RecordKey) -> Result<RecordLookup, RecordStoreError> {
        self.record(RecordCall::Lookup(key.to_string()));
        if let Some(err) = self.faults.lock().lookup.clone() {
            return Err(err);
        }
        Ok(match self.records.get(&key.to_string()) {
            Some(record) => RecordLookup::Found(record.clone()),
            None => RecordLookup::Absent,
        })
    }

    async fn load(
        &self,
        record: &RecordRef,
        _bucket: &BucketName,
    ) -> Result<Bytes, RecordStoreError> {
        self.record(RecordCall::Load(record.to_string()));
        if let Some(err) = self.faults.lock().load.clone() {
            return Err(err);
        }
        self.payloads
            .get(record)
            .map(|p| p.clone())
            .ok_or_else(|| RecordStoreError::Rejected(format!("no payload {record}")))
    }

    async fn create(
        &self,
        key: &RecordKey,
        payload: &[u8],
        options: &RecordWriteOptions,
    ) -> Result<RecordRef, RecordStoreError> {
        self.record(RecordCall::Create(key.to_string()));
        if let Some(err) = self.faults.lock().write.clone() {
            return Err(err);
        }
        let record = self.seed(key, Bytes::copy_from_slice(payload));
        debug!(key = %key, record = %record, duration_days = options.duration_days, "record created");
        Ok(record)
    }

    async fn update(
        &self,
        record: &RecordRef,
        payload: &[u8],
        _bucket: &BucketName,
        _options: &RecordWriteOptions,
    ) -> Result<UpdateOutcome, RecordStoreError> {
        self.record(RecordCall::Update(record.to_string()));
        if let Some(err) = self.faults.lock().write.clone() {
            return Err(err);
        }
        let mut stored = self
            .payloads
            .get_mut(record)
            .ok_or_else(|| RecordStoreError::Rejected(format!("no payload {record}")))?;
        if stored.value()[..] == *payload {
            return Ok(UpdateOutcome::NoDifferences);
        }
        *stored = Bytes::copy_from_slice(payload);
        Ok(UpdateOutcome::Updated)
    }
}
