//! PolicySync Server - bucket policy API backed by the reconciliation engine.
//!
//! Serves `PUT`, `GET` and `DELETE` on `/{bucket}?policy`. The collaborator
//! stores are the in-memory implementations from `policysync-engine`, so
//! state lives for the lifetime of the process.
//!
//! The in-memory permission store only knows the objects listed in
//! `POLICYSYNC_SEED_OBJECTS`. Policies naming any other object are stored,
//! but their grants fail to resolve and the response reports `partial`.
//!
//! # Usage
//!
//! ```text
//! GATEWAY_LISTEN=0.0.0.0:9000 policysync-server
//! ```
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `GATEWAY_LISTEN` | `0.0.0.0:9000` | Bind address |
//! | `POLICYSYNC_OWNER_ID` | `policysync` | Owner of records and permissions |
//! | `POLICYSYNC_RECORD_TAG` | `bucket_policy` | Tag of the policy record |
//! | `POLICYSYNC_MAX_POLICY_SIZE` | `20480` | Largest accepted policy, in bytes |
//! | `POLICYSYNC_REQUEST_TIMEOUT_MS` | *(unset)* | Per-request deadline |
//! | `POLICYSYNC_SEED_OBJECTS` | *(unset)* | Comma-separated `bucket/object` entries registered with the permission store |
//! | `LOG_LEVEL` | `info` | Log level filter |
//! | `RUST_LOG` | *(unset)* | Fine-grained tracing filter (overrides `LOG_LEVEL`) |

mod handler;
mod response;
mod router;
mod service;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as HttpConnBuilder;
use policysync_core::{BucketName, PolicySyncConfig};
use policysync_engine::InMemoryBackends;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::service::PolicySyncService;

/// Server version reported at startup.
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the tracing subscriber.
///
/// Uses `RUST_LOG` if set, otherwise falls back to the `LOG_LEVEL` config value.
fn init_tracing(log_level: &str) -> Result<()> {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        EnvFilter::try_new(log_level)
            .with_context(|| format!("invalid log level filter: {log_level}"))?
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    Ok(())
}

/// Fresh in-memory backends with the configured seed objects registered.
fn build_backends(config: &PolicySyncConfig) -> Result<InMemoryBackends> {
    let backends = InMemoryBackends::new();
    for entry in &config.seed_objects {
        let (bucket, object) = entry
            .split_once('/')
            .filter(|(_, object)| !object.is_empty())
            .with_context(|| format!("seed object {entry:?} is not of the form bucket/object"))?;
        let bucket = BucketName::new(bucket)
            .with_context(|| format!("invalid bucket in seed object {entry:?}"))?;
        backends
            .permissions
            .register_object(&config.owner_id, &bucket, object);
    }
    Ok(backends)
}

/// Run the accept loop, serving connections until a shutdown signal is received.
async fn serve(listener: TcpListener, service: PolicySyncService) -> Result<()> {
    let graceful = hyper_util::server::graceful::GracefulShutdown::new();
    let http = HttpConnBuilder::new(TokioExecutor::new());

    let shutdown = async {
        tokio::signal::ctrl_c().await.ok();
        info!("received shutdown signal, draining connections");
    };

    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            result = listener.accept() => {
                let (stream, peer_addr) = match result {
                    Ok(conn) => conn,
                    Err(e) => {
                        warn!(error = %e, "failed to accept connection");
                        continue;
                    }
                };

                let svc = service.clone();
                let conn = http.serve_connection(TokioIo::new(stream), svc);
                let conn = graceful.watch(conn.into_owned());

                tokio::spawn(async move {
                    if let Err(e) = conn.await {
                        error!(peer_addr = %peer_addr, error = %e, "connection error");
                    }
                });
            }

            () = &mut shutdown => {
                info!("shutting down gracefully");
                break;
            }
        }
    }

    graceful.shutdown().await;
    info!("all connections drained, exiting");

    Ok(())
}

/// Perform a health check by connecting to the gateway and requesting the health endpoint.
///
/// Exits with code 0 if healthy, 1 otherwise.
async fn run_health_check(addr: &str) -> Result<()> {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    let stream = TcpStream::connect(addr)
        .await
        .with_context(|| format!("cannot connect to {addr}"))?;

    let (mut reader, mut writer) = stream.into_split();

    let request = format!("GET /health HTTP/1.1\r\nHost: {addr}\r\nConnection: close\r\n\r\n");
    writer.write_all(request.as_bytes()).await?;
    writer.shutdown().await?;

    let mut response = String::new();
    reader.read_to_string(&mut response).await?;

    if response.contains("200 OK") && response.contains("\"status\":\"running\"") {
        Ok(())
    } else {
        anyhow::bail!("unhealthy response from {addr}")
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Handle --health-check flag for Docker HEALTHCHECK.
    if std::env::args().any(|a| a == "--health-check") {
        let config = PolicySyncConfig::from_env();
        let addr = config.gateway_listen.replace("0.0.0.0", "127.0.0.1");
        let healthy = run_health_check(&addr).await.is_ok();
        std::process::exit(i32::from(!healthy));
    }

    let config = PolicySyncConfig::from_env();

    init_tracing(&config.log_level)?;

    info!(
        gateway_listen = %config.gateway_listen,
        owner_id = %config.owner_id,
        record_tag = %config.record_tag,
        max_policy_size = config.max_policy_size,
        request_timeout_ms = ?config.request_timeout_ms,
        seed_objects = config.seed_objects.len(),
        version = VERSION,
        "starting PolicySync Server",
    );

    let addr: SocketAddr = config
        .gateway_listen
        .parse()
        .with_context(|| format!("invalid bind address: {}", config.gateway_listen))?;

    let backends = build_backends(&config)?;
    let service = PolicySyncService::new(Arc::new(backends.reconciler(config)));

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {addr}"))?;

    info!(%addr, "listening for connections");

    serve(listener, service).await
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use policysync_core::{OwnerId, RequestContext};
    use policysync_engine::ReconcileOutcome;

    use super::*;

    #[test]
    fn test_should_build_reconciler_from_config() {
        let config = PolicySyncConfig::builder()
            .record_tag("custom_tag".to_owned())
            .build();
        let reconciler = build_backends(&config).unwrap().reconciler(config);

        assert_eq!(reconciler.config().record_tag, "custom_tag");
        assert_eq!(reconciler.config().max_policy_size, 20 * 1024);
    }

    #[tokio::test]
    async fn test_should_sync_policy_for_seeded_objects() {
        let config = PolicySyncConfig::builder()
            .seed_objects(vec!["photos/cat.jpg".to_owned()])
            .build();
        let backends = build_backends(&config).unwrap();
        let reconciler = backends.reconciler(config);
        let bucket = BucketName::new("photos").unwrap();
        let body = Bytes::from_static(
            br#"{"Version":"2012-10-17","Statement":[{"Effect":"Allow","Principal":"*","Action":["s3:GetObject"],"Resource":["arn:aws:s3:::photos/cat.jpg"]}]}"#,
        );

        let report = reconciler
            .reconcile(&RequestContext::background(), &bucket, body)
            .await;

        assert!(matches!(report.outcome, ReconcileOutcome::Synced));
        assert!(backends
            .permissions
            .is_public(&OwnerId::default(), &bucket, "file_cat.jpg"));
    }

    #[test]
    fn test_should_reject_malformed_seed_objects() {
        for entry in ["cat.jpg", "photos/", "Bad Bucket/cat.jpg"] {
            let config = PolicySyncConfig::builder()
                .seed_objects(vec![entry.to_owned()])
                .build();
            assert!(build_backends(&config).is_err(), "{entry} accepted");
        }
    }
}
