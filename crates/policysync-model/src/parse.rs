//! Policy grammar parser.
//!
//! [`PolicyParser`] is the seam the reconciliation engine parses through;
//! [`JsonPolicyParser`] is the default implementation for the AWS policy
//! language subset.

use std::collections::BTreeSet;

use policysync_core::BucketName;
use tracing::debug;

use crate::error::MalformedPolicy;
use crate::policy::{
    Effect, PolicyDocument, RESOURCE_ARN_PREFIX, ResourcePattern, Statement, WILDCARD_PRINCIPAL,
};
use crate::wire::{OneOrMany, WirePolicy, WirePrincipal, WireStatement};

/// Turns submitted bytes into a validated [`PolicyDocument`] for a bucket.
pub trait PolicyParser: Send + Sync + std::fmt::Debug {
    /// Parse `bytes` as a policy for `bucket`.
    ///
    /// # Errors
    ///
    /// Returns [`MalformedPolicy`] if the document is not acceptable.
    fn parse(&self, bytes: &[u8], bucket: &BucketName) -> Result<PolicyDocument, MalformedPolicy>;
}

/// Parser for JSON bucket policies.
///
/// Accepts `Version`, `Id`, and `Statement` (single object or array). Each
/// statement may carry `Sid`, `Effect`, `Principal` (`"*"` or
/// `{"AWS": ...}`), `Action`, `Resource`, and `Condition`. Every resource
/// must be an `arn:aws:s3:::` ARN whose bucket part matches the target
/// bucket. An empty `Version` is accepted here; the engine rejects it before
/// persisting.
///
/// # Examples
///
/// ```
/// use policysync_core::BucketName;
/// use policysync_model::{JsonPolicyParser, PolicyParser};
///
/// let bucket = BucketName::new("photos").unwrap();
/// let body = br#"{
///     "Version": "2012-10-17",
///     "Statement": {
///         "Effect": "Allow",
///         "Principal": "*",
///         "Action": "s3:GetObject",
///         "Resource": "arn:aws:s3:::photos/cat.jpg"
///     }
/// }"#;
/// let doc = JsonPolicyParser.parse(body, &bucket).unwrap();
/// assert!(doc.statements[0].grants_public_read());
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonPolicyParser;

impl PolicyParser for JsonPolicyParser {
    fn parse(&self, bytes: &[u8], bucket: &BucketName) -> Result<PolicyDocument, MalformedPolicy> {
        let wire: WirePolicy = serde_json::from_slice(bytes)?;

        let statements = wire
            .statement
            .into_vec()
            .into_iter()
            .enumerate()
            .map(|(index, stmt)| convert_statement(index, stmt, bucket))
            .collect::<Result<Vec<_>, _>>()?;

        debug!(
            bucket = %bucket,
            statements = statements.len(),
            "parsed bucket policy"
        );

        Ok(PolicyDocument {
            version: wire.version,
            id: wire.id,
            statements,
        })
    }
}

fn convert_statement(
    index: usize,
    stmt: WireStatement,
    bucket: &BucketName,
) -> Result<Statement, MalformedPolicy> {
    let effect = stmt.effect.parse::<Effect>()?;

    let principals: BTreeSet<String> = match stmt.principal {
        Some(WirePrincipal::Any(p)) if p == WILDCARD_PRINCIPAL => {
            BTreeSet::from([WILDCARD_PRINCIPAL.to_owned()])
        }
        Some(WirePrincipal::Any(p)) => return Err(MalformedPolicy::InvalidPrincipal(p)),
        Some(WirePrincipal::Aws { aws }) => aws.into_vec().into_iter().collect(),
        None => BTreeSet::new(),
    };
    if principals.is_empty() {
        return Err(MalformedPolicy::MissingField {
            index,
            field: "Principal",
        });
    }

    let actions: BTreeSet<String> = stmt
        .action
        .map(OneOrMany::into_vec)
        .unwrap_or_default()
        .into_iter()
        .collect();
    if actions.is_empty() {
        return Err(MalformedPolicy::MissingField {
            index,
            field: "Action",
        });
    }

    let resources = stmt
        .resource
        .map(OneOrMany::into_vec)
        .unwrap_or_default()
        .into_iter()
        .map(|arn| parse_resource(&arn, bucket))
        .collect::<Result<BTreeSet<_>, _>>()?;
    if resources.is_empty() {
        return Err(MalformedPolicy::MissingField {
            index,
            field: "Resource",
        });
    }

    Ok(Statement {
        sid: stmt.sid,
        effect,
        principals,
        actions,
        resources,
        condition: stmt.condition,
    })
}

/// Strip the ARN prefix and check the bucket part against `bucket`.
fn parse_resource(arn: &str, bucket: &BucketName) -> Result<ResourcePattern, MalformedPolicy> {
    let pattern = arn
        .strip_prefix(RESOURCE_ARN_PREFIX)
        .filter(|p| !p.is_empty())
        .ok_or_else(|| MalformedPolicy::InvalidResource(arn.to_owned()))?;

    let bucket_part = pattern.split_once('/').map_or(pattern, |(b, _)| b);
    if !wildcard_match(bucket_part, bucket.as_str()) {
        return Err(MalformedPolicy::ResourceOutsideBucket {
            resource: arn.to_owned(),
            bucket: bucket.to_string(),
        });
    }

    Ok(ResourcePattern::new(pattern))
}

/// Match `value` against `pattern`, where `*` matches any run of characters
/// and `?` matches exactly one.
fn wildcard_match(pattern: &str, value: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let v: Vec<char> = value.chars().collect();
    let (mut pi, mut vi) = (0, 0);
    let (mut star, mut mark) = (None, 0);

    while vi < v.len() {
        if pi < p.len() && (p[pi] == '?' || p[pi] == v[vi]) {
            pi += 1;
            vi += 1;
        } else if pi < p.len() && p[pi] == '*' {
            star = Some(pi);
            mark = vi;
            pi += 1;
        } else if let Some(s) = star {
            pi = s + 1;
            mark += 1;
            vi = mark;
        } else {
            return false;
        }
    }
    while pi < p.len() && p[pi] == '*' {
        pi += 1;
    }
    pi == p.len()
}
