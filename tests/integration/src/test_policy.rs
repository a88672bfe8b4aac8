//! Bucket policy integration tests.

#[cfg(test)]
mod tests {
    use reqwest::StatusCode;

    use crate::{cleanup_policy, http_client, policy_url, public_read_policy, test_bucket_name};

    const OUTCOME_HEADER: &str = "x-policysync-outcome";

    #[tokio::test]
    #[ignore = "requires running server"]
    async fn test_should_put_and_get_bucket_policy() {
        let client = http_client();
        let bucket = test_bucket_name("put");
        let policy = public_read_policy(&bucket, &["cat.jpg", "dog.jpg"]);

        let resp = client
            .put(policy_url(&bucket))
            .body(policy)
            .send()
            .await
            .expect("put policy failed");
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);
        let outcome = resp
            .headers()
            .get(OUTCOME_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(ToOwned::to_owned);
        assert!(matches!(outcome.as_deref(), Some("synced" | "partial")));

        let resp = client
            .get(policy_url(&bucket))
            .send()
            .await
            .expect("get policy failed");
        assert_eq!(resp.status(), StatusCode::OK);
        let stored: serde_json::Value = resp.json().await.expect("policy is not JSON");
        assert_eq!(stored["Version"], "2012-10-17");
        let stored = stored.to_string();
        assert!(stored.contains(&format!("arn:aws:s3:::{bucket}/cat.jpg")));
        assert!(stored.contains(&format!("arn:aws:s3:::{bucket}/dog.jpg")));

        cleanup_policy(&client, &bucket).await;
    }

    #[tokio::test]
    #[ignore = "requires running server"]
    async fn test_should_replace_existing_policy() {
        let client = http_client();
        let bucket = test_bucket_name("replace");

        for objects in [&["a.txt", "b.txt"][..], &["b.txt", "c.txt"][..]] {
            let resp = client
                .put(policy_url(&bucket))
                .body(public_read_policy(&bucket, objects))
                .send()
                .await
                .expect("put policy failed");
            assert_eq!(resp.status(), StatusCode::NO_CONTENT);
        }

        let stored = client
            .get(policy_url(&bucket))
            .send()
            .await
            .expect("get policy failed")
            .text()
            .await
            .expect("read body failed");
        assert!(!stored.contains(&format!("{bucket}/a.txt")));
        assert!(stored.contains(&format!("{bucket}/c.txt")));

        cleanup_policy(&client, &bucket).await;
    }

    #[tokio::test]
    #[ignore = "requires running server"]
    async fn test_should_reject_malformed_policy() {
        let client = http_client();
        let bucket = test_bucket_name("malformed");

        let resp = client
            .put(policy_url(&bucket))
            .body("{not json")
            .send()
            .await
            .expect("put policy failed");

        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body = resp.text().await.expect("read body failed");
        assert!(body.contains("<Code>MalformedPolicy</Code>"));
    }

    #[tokio::test]
    #[ignore = "requires running server"]
    async fn test_should_reject_empty_policy_body() {
        let client = http_client();
        let bucket = test_bucket_name("empty");

        let resp = client
            .put(policy_url(&bucket))
            .body("")
            .send()
            .await
            .expect("put policy failed");

        assert_eq!(resp.status(), StatusCode::LENGTH_REQUIRED);
    }

    #[tokio::test]
    #[ignore = "requires running server"]
    async fn test_should_reject_oversized_policy_body() {
        let client = http_client();
        let bucket = test_bucket_name("oversized");

        let resp = client
            .put(policy_url(&bucket))
            .body(vec![b' '; 64 * 1024])
            .send()
            .await
            .expect("put policy failed");

        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body = resp.text().await.expect("read body");
        assert!(body.contains("<Code>PolicyTooLarge</Code>"));
    }

    #[tokio::test]
    #[ignore = "requires running server"]
    async fn test_should_return_not_found_after_delete() {
        let client = http_client();
        let bucket = test_bucket_name("delete");

        client
            .put(policy_url(&bucket))
            .body(public_read_policy(&bucket, &["x.txt"]))
            .send()
            .await
            .expect("put policy failed");

        let resp = client
            .delete(policy_url(&bucket))
            .send()
            .await
            .expect("delete policy failed");
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);

        let resp = client
            .get(policy_url(&bucket))
            .send()
            .await
            .expect("get policy failed");
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let body = resp.text().await.expect("read body failed");
        assert!(body.contains("NoSuchBucketPolicy"));
    }
}
