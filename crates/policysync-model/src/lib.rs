//! Bucket access-policy document model for PolicySync.
//!
//! [`PolicyDocument`] is the validated in-memory form of a bucket policy.
//! [`JsonPolicyParser`] turns the AWS policy-language JSON subset
//! (`Version`, `Id`, `Statement`, `Sid`, `Effect`, `Principal`, `Action`,
//! `Resource`, `Condition`) into that form, and
//! [`PolicyDocument::to_canonical_json`] produces the stable byte form that is
//! persisted and returned to clients.

pub mod error;
pub mod parse;
pub mod policy;
mod wire;

pub use error::MalformedPolicy;
pub use parse::{JsonPolicyParser, PolicyParser};
pub use policy::{
    Effect, GET_OBJECT_ACTION, PolicyDocument, RESOURCE_ARN_PREFIX, ResourcePattern, Statement,
    WILDCARD_PRINCIPAL,
};
