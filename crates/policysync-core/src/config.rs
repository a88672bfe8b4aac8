//! PolicySync configuration.
//!
//! Provides [`PolicySyncConfig`] for configuring the reconciliation engine and
//! the server binary. Values are loaded from environment variables, falling
//! back to defaults.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

use crate::types::OwnerId;

/// Default record tag under which the canonical policy is stored in the
/// external record store.
const DEFAULT_RECORD_TAG: &str = "bucket_policy";

/// As per the AWS S3 specification, 20 KiB of policy JSON is allowed.
const DEFAULT_MAX_POLICY_SIZE: usize = 20 * 1024;

/// Options attached to every create/update issued against the external
/// record store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TypedBuilder)]
#[serde(rename_all = "camelCase")]
pub struct RecordWriteOptions {
    /// How long the record is kept, in days.
    #[builder(default = 365)]
    pub duration_days: u32,

    /// Delay before the record becomes eligible for storage, in days.
    #[builder(default = 30)]
    pub delay_days: u32,

    /// Number of replicas requested.
    #[builder(default = 1)]
    pub replicas: u32,
}

impl Default for RecordWriteOptions {
    fn default() -> Self {
        Self {
            duration_days: 365,
            delay_days: 30,
            replicas: 1,
        }
    }
}

/// PolicySync service configuration.
///
/// # Examples
///
/// ```
/// use policysync_core::PolicySyncConfig;
///
/// let config = PolicySyncConfig::default();
/// assert_eq!(config.gateway_listen, "0.0.0.0:9000");
/// assert_eq!(config.max_policy_size, 20 * 1024);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, TypedBuilder)]
#[serde(rename_all = "camelCase")]
pub struct PolicySyncConfig {
    /// Bind address for the server (e.g. `"0.0.0.0:9000"`).
    #[builder(default = String::from("0.0.0.0:9000"))]
    pub gateway_listen: String,

    /// Owner of all records and permission entries.
    #[builder(default)]
    pub owner_id: OwnerId,

    /// Tag of the policy record in the external record store.
    #[builder(default = String::from(DEFAULT_RECORD_TAG))]
    pub record_tag: String,

    /// Largest accepted policy body, in bytes.
    #[builder(default = DEFAULT_MAX_POLICY_SIZE)]
    pub max_policy_size: usize,

    /// Options for external record writes.
    #[builder(default)]
    pub record_options: RecordWriteOptions,

    /// Per-request deadline in milliseconds. `None` disables the deadline.
    #[builder(default)]
    pub request_timeout_ms: Option<u64>,

    /// Log level filter string (e.g. `"info"`, `"debug"`).
    #[builder(default = String::from("info"))]
    pub log_level: String,

    /// Objects whose permission records the server registers at startup,
    /// each written as `bucket/object`.
    #[builder(default)]
    pub seed_objects: Vec<String>,
}

impl Default for PolicySyncConfig {
    fn default() -> Self {
        Self {
            gateway_listen: String::from("0.0.0.0:9000"),
            owner_id: OwnerId::default(),
            record_tag: String::from(DEFAULT_RECORD_TAG),
            max_policy_size: DEFAULT_MAX_POLICY_SIZE,
            record_options: RecordWriteOptions::default(),
            request_timeout_ms: None,
            log_level: String::from("info"),
            seed_objects: Vec::new(),
        }
    }
}

impl PolicySyncConfig {
    /// Load configuration from environment variables.
    ///
    /// Reads the following environment variables (falling back to defaults):
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `GATEWAY_LISTEN` | `0.0.0.0:9000` |
    /// | `POLICYSYNC_OWNER_ID` | `policysync` |
    /// | `POLICYSYNC_RECORD_TAG` | `bucket_policy` |
    /// | `POLICYSYNC_MAX_POLICY_SIZE` | `20480` |
    /// | `POLICYSYNC_RECORD_DURATION_DAYS` | `365` |
    /// | `POLICYSYNC_RECORD_DELAY_DAYS` | `30` |
    /// | `POLICYSYNC_RECORD_REPLICAS` | `1` |
    /// | `POLICYSYNC_REQUEST_TIMEOUT_MS` | *(unset)* |
    /// | `LOG_LEVEL` | `info` |
    /// | `POLICYSYNC_SEED_OBJECTS` | *(unset)*, comma-separated `bucket/object` |
    ///
    /// Unparseable values are ignored and the default is kept.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(v) = std::env::var("GATEWAY_LISTEN") {
            config.gateway_listen = v;
        }
        if let Ok(v) = std::env::var("POLICYSYNC_OWNER_ID") {
            match OwnerId::new(v) {
                Ok(owner) => config.owner_id = owner,
                Err(e) => tracing::warn!(error = %e, "ignoring POLICYSYNC_OWNER_ID"),
            }
        }
        if let Ok(v) = std::env::var("POLICYSYNC_RECORD_TAG") {
            if !v.is_empty() {
                config.record_tag = v;
            }
        }
        if let Some(n) = env_parse("POLICYSYNC_MAX_POLICY_SIZE") {
            config.max_policy_size = n;
        }
        if let Some(n) = env_parse("POLICYSYNC_RECORD_DURATION_DAYS") {
            config.record_options.duration_days = n;
        }
        if let Some(n) = env_parse("POLICYSYNC_RECORD_DELAY_DAYS") {
            config.record_options.delay_days = n;
        }
        if let Some(n) = env_parse("POLICYSYNC_RECORD_REPLICAS") {
            config.record_options.replicas = n;
        }
        if let Some(n) = env_parse("POLICYSYNC_REQUEST_TIMEOUT_MS") {
            config.request_timeout_ms = Some(n);
        }
        if let Ok(v) = std::env::var("LOG_LEVEL") {
            config.log_level = v;
        }
        if let Ok(v) = std::env::var("POLICYSYNC_SEED_OBJECTS") {
            config.seed_objects = split_list(&v);
        }

        config
    }

    /// The per-request deadline, if one is configured.
    #[must_use]
    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_ms.map(Duration::from_millis)
    }
}

/// Read and parse a numeric environment variable.
fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse::<T>().ok())
}

/// Split a comma-separated list, dropping blank entries.
fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_create_default_config() {
        let config = PolicySyncConfig::default();
        assert_eq!(config.gateway_listen, "0.0.0.0:9000");
        assert_eq!(config.owner_id.as_str(), "policysync");
        assert_eq!(config.record_tag, "bucket_policy");
        assert_eq!(config.max_policy_size, 20_480);
        assert_eq!(config.record_options, RecordWriteOptions::default());
        assert!(config.request_timeout().is_none());
        assert_eq!(config.log_level, "info");
        assert!(config.seed_objects.is_empty());
    }

    #[test]
    fn test_should_split_seed_object_list() {
        assert_eq!(
            split_list(" photos/cat.jpg, ,photos/dog.jpg,"),
            vec!["photos/cat.jpg", "photos/dog.jpg"]
        );
        assert!(split_list("").is_empty());
    }

    #[test]
    fn test_should_default_record_options() {
        let options = RecordWriteOptions::default();
        assert_eq!(options.duration_days, 365);
        assert_eq!(options.delay_days, 30);
        assert_eq!(options.replicas, 1);
    }

    #[test]
    fn test_should_load_from_env() {
        let config = PolicySyncConfig::from_env();
        assert!(!config.gateway_listen.is_empty());
        assert!(!config.record_tag.is_empty());
    }

    #[test]
    fn test_should_build_with_typed_builder() {
        let config = PolicySyncConfig::builder()
            .gateway_listen("127.0.0.1:9999".into())
            .owner_id(OwnerId::new("did:key:abc").unwrap())
            .record_tag("policies".into())
            .max_policy_size(1024)
            .record_options(RecordWriteOptions::builder().replicas(3).build())
            .request_timeout_ms(Some(250))
            .build();

        assert_eq!(config.gateway_listen, "127.0.0.1:9999");
        assert_eq!(config.owner_id.as_str(), "did:key:abc");
        assert_eq!(config.record_tag, "policies");
        assert_eq!(config.max_policy_size, 1024);
        assert_eq!(config.record_options.replicas, 3);
        assert_eq!(config.record_options.duration_days, 365);
        assert_eq!(config.request_timeout(), Some(Duration::from_millis(250)));
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_should_serialize_to_camel_case_json() {
        let config = PolicySyncConfig::default();
        let json = serde_json::to_string(&config).expect("test serialization");
        assert!(json.contains("gatewayListen"));
        assert!(json.contains("maxPolicySize"));
        assert!(json.contains("durationDays"));
        assert!(json.contains("seedObjects"));
    }
}
