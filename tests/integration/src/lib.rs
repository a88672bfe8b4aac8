//! Integration tests for the PolicySync server.
//!
//! These tests require a running PolicySync server at `localhost:9000`.
//! They are marked `#[ignore]` so they don't run during normal `cargo test`.
//!
//! Run them with:
//! ```text
//! cargo test -p policysync-integration -- --ignored
//! ```

use std::sync::Once;

static INIT: Once = Once::new();

/// Initialize tracing (once).
fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .init();
    });
}

/// Endpoint URL for the server.
#[must_use]
pub fn endpoint_url() -> String {
    std::env::var("POLICYSYNC_ENDPOINT_URL").unwrap_or_else(|_| "http://localhost:9000".to_owned())
}

/// Create an HTTP client for the server.
#[must_use]
pub fn http_client() -> reqwest::Client {
    init_tracing();
    reqwest::Client::new()
}

/// Generate a unique bucket name for a test.
#[must_use]
pub fn test_bucket_name(prefix: &str) -> String {
    let id = uuid::Uuid::new_v4().to_string()[..8].to_owned();
    format!("test-{prefix}-{id}")
}

/// URL of the policy sub-resource of `bucket`.
#[must_use]
pub fn policy_url(bucket: &str) -> String {
    format!("{}/{bucket}?policy", endpoint_url())
}

/// A public-read policy document for `objects` in `bucket`.
#[must_use]
pub fn public_read_policy(bucket: &str, objects: &[&str]) -> String {
    let resources: Vec<String> = objects
        .iter()
        .map(|o| format!("arn:aws:s3:::{bucket}/{o}"))
        .collect();
    serde_json::json!({
        "Version": "2012-10-17",
        "Statement": [{
            "Effect": "Allow",
            "Principal": "*",
            "Action": ["s3:GetObject"],
            "Resource": resources,
        }]
    })
    .to_string()
}

/// Remove the bucket policy, ignoring failures.
pub async fn cleanup_policy(client: &reqwest::Client, bucket: &str) {
    let _ = client.delete(policy_url(bucket)).send().await;
}

#[cfg(test)]
mod test_health;
#[cfg(test)]
mod test_policy;
