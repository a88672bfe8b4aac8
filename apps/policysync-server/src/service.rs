//! The PolicySync HTTP service implementing hyper's `Service` trait.
//!
//! [`PolicySyncService`] handles, in order:
//!
//! 1. Health check interception (`GET /health`, `GET /_health`)
//! 2. Request routing via [`router::resolve`]
//! 3. Request body collection, bounded by the configured policy size limit
//! 4. Dispatch to [`handler::handle`]
//! 5. Common response headers (`x-amz-request-id`, `Server`)
//!
//! A client that disconnects mid-request drops the service future, which
//! abandons the in-flight reconciliation at its next await point.

use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;
use http_body_util::{BodyExt, LengthLimitError, Limited};
use hyper::body::{Body, Incoming};
use hyper::service::Service;
use policysync_core::RequestContext;
use policysync_engine::{ReconcileError, Reconciler};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::handler;
use crate::response::{self, ErrorBody, PolicyResponse};
use crate::router;

/// Hyper service routing bucket policy requests to a shared [`Reconciler`].
#[derive(Debug, Clone)]
pub struct PolicySyncService {
    reconciler: Arc<Reconciler>,
}

impl PolicySyncService {
    /// Create a service around `reconciler`.
    #[must_use]
    pub fn new(reconciler: Arc<Reconciler>) -> Self {
        Self { reconciler }
    }
}

impl Service<http::Request<Incoming>> for PolicySyncService {
    type Response = PolicyResponse;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn call(&self, req: http::Request<Incoming>) -> Self::Future {
        let reconciler = Arc::clone(&self.reconciler);

        Box::pin(async move {
            let request_id = Uuid::new_v4().to_string();
            let response = process_request(req, &reconciler, &request_id).await;
            Ok(add_common_headers(response, &request_id))
        })
    }
}

async fn process_request(
    req: http::Request<Incoming>,
    reconciler: &Reconciler,
    request_id: &str,
) -> PolicyResponse {
    let method = req.method().clone();
    let uri = req.uri().clone();
    debug!(%method, %uri, request_id, "processing request");

    if is_health_check(&method, uri.path()) {
        return health_check_response();
    }

    let op = match router::resolve(&method, &uri) {
        Ok(op) => op,
        Err(err) => {
            warn!(%method, %uri, error = %err, request_id, "failed to route request");
            return response::error_response(
                &ErrorBody {
                    status: err.status_code(),
                    code: err.code(),
                    message: err.to_string(),
                    resource: Some(uri.path()),
                },
                request_id,
            );
        }
    };

    info!(operation = op.name(), bucket = %op.bucket(), request_id, "routed request");

    let limit = reconciler.config().max_policy_size;
    let body = match collect_body(req.into_body(), limit).await {
        Ok(body) => body,
        Err(err) => {
            warn!(error = %err, limit, request_id, "failed to collect request body");
            return response::error_response(
                &ErrorBody {
                    status: err.status_code(),
                    code: err.code(),
                    message: err.to_string(),
                    resource: Some(uri.path()),
                },
                request_id,
            );
        }
    };

    let ctx = RequestContext::background();
    handler::handle(reconciler, &ctx, op, body, request_id).await
}

/// Collect at most `limit` bytes of `body`.
///
/// A body announcing more than `limit` bytes is refused before any of it is
/// read; a body that streams past `limit` is refused as soon as it does.
async fn collect_body<B>(body: B, limit: usize) -> Result<Bytes, ReconcileError>
where
    B: Body<Data = Bytes>,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let announced = usize::try_from(body.size_hint().lower()).unwrap_or(usize::MAX);
    if announced > limit {
        return Err(ReconcileError::PolicyTooLarge {
            size: announced,
            limit,
        });
    }

    match Limited::new(body, limit).collect().await {
        Ok(collected) => Ok(collected.to_bytes()),
        Err(e) if e.is::<LengthLimitError>() => Err(ReconcileError::PolicyTooLarge {
            size: limit.saturating_add(1),
            limit,
        }),
        Err(e) => Err(anyhow::anyhow!(e).context("reading request body").into()),
    }
}

fn is_health_check(method: &http::Method, path: &str) -> bool {
    *method == http::Method::GET && (path == "/health" || path == "/_health")
}

fn health_check_response() -> PolicyResponse {
    response::json(Bytes::from_static(
        br#"{"status":"running","service":"policysync"}"#,
    ))
}

fn add_common_headers(mut response: PolicyResponse, request_id: &str) -> PolicyResponse {
    let headers = response.headers_mut();

    if let Ok(hv) = http::header::HeaderValue::from_str(request_id) {
        headers.insert("x-amz-request-id", hv);
    }
    headers.insert(
        http::header::SERVER,
        http::header::HeaderValue::from_static("PolicySync"),
    );

    response
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::task::{Context, Poll};

    use http_body_util::Full;
    use hyper::body::Frame;

    use super::*;

    #[test]
    fn test_should_detect_health_checks() {
        assert!(is_health_check(&http::Method::GET, "/health"));
        assert!(is_health_check(&http::Method::GET, "/_health"));
        assert!(!is_health_check(&http::Method::PUT, "/health"));
        assert!(!is_health_check(&http::Method::GET, "/photos"));
    }

    #[test]
    fn test_should_add_common_headers() {
        let resp = add_common_headers(response::no_content(), "req-1");
        assert_eq!(
            resp.headers()
                .get("x-amz-request-id")
                .and_then(|v| v.to_str().ok()),
            Some("req-1")
        );
        assert_eq!(
            resp.headers()
                .get(http::header::SERVER)
                .and_then(|v| v.to_str().ok()),
            Some("PolicySync")
        );
    }

    struct ChunkedBody {
        chunks: VecDeque<Bytes>,
    }

    impl Body for ChunkedBody {
        type Data = Bytes;
        type Error = Infallible;

        fn poll_frame(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
        ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
            Poll::Ready(self.get_mut().chunks.pop_front().map(|c| Ok(Frame::data(c))))
        }
    }

    fn chunked(chunks: &[&'static [u8]]) -> ChunkedBody {
        ChunkedBody {
            chunks: chunks.iter().map(|c| Bytes::from_static(c)).collect(),
        }
    }

    #[tokio::test]
    async fn test_should_refuse_body_announced_over_limit() {
        let body = Full::new(Bytes::from(vec![b' '; 33]));

        let err = collect_body(body, 32).await.expect_err("too large");

        assert!(matches!(err, ReconcileError::PolicyTooLarge { size: 33, limit: 32 }));
        assert_eq!(err.status_code(), http::StatusCode::BAD_REQUEST);
        assert_eq!(err.code(), "PolicyTooLarge");
    }

    #[tokio::test]
    async fn test_should_stop_reading_chunked_body_past_limit() {
        let body = chunked(&[b"0123456789", b"0123456789", b"0123456789", b"0123456789"]);

        let err = collect_body(body, 32).await.expect_err("too large");

        assert!(matches!(err, ReconcileError::PolicyTooLarge { limit: 32, .. }));
    }

    #[tokio::test]
    async fn test_should_collect_body_within_limit() {
        let collected = collect_body(chunked(&[b"{\"Version\"", b":\"1\"}"]), 32)
            .await
            .expect("within limit");
        assert_eq!(collected, Bytes::from_static(b"{\"Version\":\"1\"}"));

        let exact = collect_body(Full::new(Bytes::from(vec![b' '; 32])), 32)
            .await
            .expect("exactly at limit");
        assert_eq!(exact.len(), 32);
    }
}
