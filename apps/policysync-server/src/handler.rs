//! Bucket policy operations on top of the [`Reconciler`].

use bytes::Bytes;
use http::HeaderValue;
use policysync_core::RequestContext;
use policysync_engine::{ReconcileError, ReconcileOutcome, Reconciler};
use tracing::{debug, info};

use crate::response::{self, ErrorBody, PolicyResponse};
use crate::router::PolicyOperation;

/// Header reporting whether every permission and record write succeeded.
pub const OUTCOME_HEADER: &str = "x-policysync-outcome";

/// Execute `op` and render the HTTP response.
pub async fn handle(
    reconciler: &Reconciler,
    ctx: &RequestContext,
    op: PolicyOperation,
    body: Bytes,
    request_id: &str,
) -> PolicyResponse {
    let resource = format!("/{}", op.bucket());
    match op {
        PolicyOperation::Put(bucket) => {
            let report = reconciler.reconcile(ctx, &bucket, body).await;
            let outcome = match report.outcome {
                ReconcileOutcome::Synced => "synced",
                ReconcileOutcome::SyncedWithPartialPropagation => "partial",
                failed => {
                    return match failed.into_error() {
                        Some(err) => render_error(&err, &resource, request_id),
                        None => response::no_content(),
                    };
                }
            };
            info!(bucket = %bucket, outcome, state = %report.state, request_id, "bucket policy applied");
            let mut resp = response::no_content();
            resp.headers_mut()
                .insert(OUTCOME_HEADER, HeaderValue::from_static(outcome));
            resp
        }
        PolicyOperation::Get(bucket) => match reconciler.get_policy(ctx, &bucket).await {
            Ok(policy) => response::json(policy),
            Err(err) => render_error(&err, &resource, request_id),
        },
        PolicyOperation::Delete(bucket) => match reconciler.delete_policy(ctx, &bucket).await {
            Ok(updated_at) => {
                debug!(bucket = %bucket, %updated_at, request_id, "bucket policy removed");
                response::no_content()
            }
            Err(err) => render_error(&err, &resource, request_id),
        },
    }
}

fn render_error(err: &ReconcileError, resource: &str, request_id: &str) -> PolicyResponse {
    debug!(error = %err, request_id, "bucket policy operation returned error");
    response::error_response(
        &ErrorBody {
            status: err.status_code(),
            code: err.code(),
            message: err.to_string(),
            resource: Some(resource),
        },
        request_id,
    )
}

#[cfg(test)]
mod tests {
    use http::StatusCode;
    use http_body_util::BodyExt;
    use policysync_core::{BucketName, OwnerId, PolicySyncConfig};
    use policysync_engine::InMemoryBackends;

    use super::*;

    const POLICY: &str = r#"{
        "Version": "2012-10-17",
        "Statement": [{
            "Effect": "Allow",
            "Principal": "*",
            "Action": "s3:GetObject",
            "Resource": "arn:aws:s3:::photos/cat.jpg"
        }]
    }"#;

    fn bucket() -> BucketName {
        BucketName::new("photos").unwrap()
    }

    fn setup() -> (InMemoryBackends, Reconciler) {
        let backends = InMemoryBackends::with_call_log();
        backends
            .permissions
            .register_object(&OwnerId::default(), &bucket(), "cat.jpg");
        let reconciler = backends.reconciler(PolicySyncConfig::default());
        (backends, reconciler)
    }

    async fn body_string(resp: PolicyResponse) -> String {
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_should_put_then_get_policy() {
        let (_backends, reconciler) = setup();
        let ctx = RequestContext::background();

        let resp = handle(
            &reconciler,
            &ctx,
            PolicyOperation::Put(bucket()),
            Bytes::from_static(POLICY.as_bytes()),
            "req",
        )
        .await;
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);
        assert_eq!(
            resp.headers().get(OUTCOME_HEADER).and_then(|v| v.to_str().ok()),
            Some("synced")
        );

        let resp = handle(&reconciler, &ctx, PolicyOperation::Get(bucket()), Bytes::new(), "req").await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_string(resp).await;
        assert!(body.contains("arn:aws:s3:::photos/cat.jpg"));
    }

    #[tokio::test]
    async fn test_should_render_rejection_as_error_xml() {
        let (_backends, reconciler) = setup();

        let resp = handle(
            &reconciler,
            &RequestContext::background(),
            PolicyOperation::Put(bucket()),
            Bytes::new(),
            "req-7",
        )
        .await;

        assert_eq!(resp.status(), StatusCode::LENGTH_REQUIRED);
        let body = body_string(resp).await;
        assert!(body.contains("<Code>MissingContentLength</Code>"));
        assert!(body.contains("<Resource>/photos</Resource>"));
        assert!(body.contains("<RequestId>req-7</RequestId>"));
    }

    #[tokio::test]
    async fn test_should_report_partial_propagation_header() {
        let (backends, reconciler) = setup();
        backends
            .records
            .fail_writes_with(policysync_engine::store::RecordStoreError::Transport(
                "reset".into(),
            ));

        let resp = handle(
            &reconciler,
            &RequestContext::background(),
            PolicyOperation::Put(bucket()),
            Bytes::from_static(POLICY.as_bytes()),
            "req",
        )
        .await;

        assert_eq!(resp.status(), StatusCode::NO_CONTENT);
        assert_eq!(
            resp.headers().get(OUTCOME_HEADER).and_then(|v| v.to_str().ok()),
            Some("partial")
        );
    }

    #[tokio::test]
    async fn test_should_return_not_found_for_missing_policy() {
        let (_backends, reconciler) = setup();

        let resp = handle(
            &reconciler,
            &RequestContext::background(),
            PolicyOperation::Get(bucket()),
            Bytes::new(),
            "req",
        )
        .await;

        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert!(body_string(resp).await.contains("NoSuchBucketPolicy"));
    }

    #[tokio::test]
    async fn test_should_delete_policy() {
        let (backends, reconciler) = setup();
        let ctx = RequestContext::background();
        handle(
            &reconciler,
            &ctx,
            PolicyOperation::Put(bucket()),
            Bytes::from_static(POLICY.as_bytes()),
            "req",
        )
        .await;

        let resp = handle(&reconciler, &ctx, PolicyOperation::Delete(bucket()), Bytes::new(), "req").await;

        assert_eq!(resp.status(), StatusCode::NO_CONTENT);
        assert_eq!(backends.replication.events().len(), 2);
    }
}
