//! Core types, configuration, and request context for PolicySync.
//!
//! This crate provides the foundational building blocks shared by the
//! reconciliation engine and the server binary: the owner and bucket
//! identifiers, environment-driven configuration, and the per-request
//! cancellation handle that every external call is raced against.

mod config;
mod context;
mod error;
mod types;

pub use config::{PolicySyncConfig, RecordWriteOptions};
pub use context::{CancelHandle, Cancelled, RequestContext};
pub use error::CoreError;
pub use types::{BucketName, OwnerId};
