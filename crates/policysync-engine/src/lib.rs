//! Bucket access-policy reconciliation engine for PolicySync.
//!
//! Given a newly submitted policy for a bucket, the engine works out which
//! objects gain or lose public read access, pushes those changes to the
//! permission store, and persists the canonical policy to the external record
//! store and the authoritative local metadata store.
//!
//! # Architecture
//!
//! ```text
//!            Reconciler
//!                |
//!   +------------+-------------+------------------+
//!   |            |             |                  |
//!   v            v             v                  v
//! extract      diff      PermissionPropagator  PolicyPersistence
//!                              |                  |
//!                              v                  v
//!                       PermissionStore   RecordStore + MetadataStore
//! ```
//!
//! All collaborators are traits in [`store`] and are injected into the
//! [`Reconciler`]. [`memory`] provides in-memory implementations of each.

pub mod diff;
pub mod error;
pub mod extract;
pub mod memory;
pub mod outcome;
pub mod persist;
pub mod propagate;
pub mod reconciler;
pub mod store;

pub use error::{ReconcileError, ReconcileResult};
pub use memory::InMemoryBackends;
pub use outcome::{AbortReason, ReconcileOutcome, ReconcileReport, ReconcileState, RejectReason};
pub use reconciler::Reconciler;
