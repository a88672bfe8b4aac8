//! Derivation of publicly readable object names from a policy.

use policysync_core::BucketName;
use policysync_model::PolicyDocument;

/// Object name standing for "every object in the bucket".
pub const WILDCARD_OBJECT: &str = "*";

/// Collect the object names a policy makes publicly readable.
///
/// Only statements that grant public read (`Allow`, principal `*`, action
/// `s3:GetObject`) contribute. For each of their resource patterns:
///
/// - `bucket/name` yields `name` (everything after the first `/`),
/// - the bare bucket root is skipped, since it is a bucket-level grant,
/// - anything else is taken verbatim, so a lone `*` yields `"*"`.
///
/// Names come out in statement then resource order and are not deduplicated.
///
/// # Examples
///
/// ```
/// use policysync_core::BucketName;
/// use policysync_engine::extract::extract_object_names;
/// use policysync_model::{Effect, PolicyDocument, Statement};
///
/// let bucket = BucketName::new("photos").unwrap();
/// let doc = PolicyDocument::new("2012-10-17").with_statement(
///     Statement::new(Effect::Allow)
///         .principal("*")
///         .action("s3:GetObject")
///         .resource("photos/obj1"),
/// );
/// assert_eq!(extract_object_names(&doc, &bucket), vec!["obj1"]);
/// ```
#[must_use]
pub fn extract_object_names(doc: &PolicyDocument, bucket: &BucketName) -> Vec<String> {
    doc.statements
        .iter()
        .filter(|stmt| stmt.grants_public_read())
        .flat_map(|stmt| stmt.resources.iter())
        .filter_map(|resource| {
            let pattern = resource.as_str();
            match pattern.split_once('/') {
                Some((_, object)) => Some(object.to_owned()),
                None if pattern == bucket.as_str() => None,
                None => Some(pattern.to_owned()),
            }
        })
        .collect()
}
