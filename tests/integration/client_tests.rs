//! API client behaviour against a mock server

use crate::common::{api_client, number_of_requests, ok_json, test_config};
use serde_json::json;
use trawl::{ApiError, RateClass};
use wiremock::matchers::{header, method, path};
use std::time::Duration;
use wiremock::{Mock, MockServer, ResponseTemplate};

fn exhausted(status: u16) -> ResponseTemplate {
    ResponseTemplate::new(status)
        .set_body_json(json!({ "message": "API rate limit exceeded" }))
        .insert_header("x-ratelimit-limit", "5000")
        .insert_header("x-ratelimit-remaining", "0")
        .insert_header(
            "x-ratelimit-reset",
            (chrono::Utc::now().timestamp() - 1).to_string().as_str(),
        )
}

#[tokio::test]
async fn test_cached_response_costs_one_request_and_one_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/demo"))
        .and(header("authorization", "Bearer test-token"))
        .and(header("accept", "application/vnd.github+json"))
        .respond_with(ok_json(json!({ "default_branch": "main", "html_url": "https://github.com/acme/demo" })))
        .expect(1)
        .mount(&server)
        .await;

    let api = api_client(&test_config(&server));

    let first = api.get("repos/acme/demo").await.unwrap();
    let second = api.get("repos/acme/demo").await.unwrap();

    assert_eq!(first, second);
    assert_eq!(first["default_branch"], "main");
    assert_eq!(api.requests_sent(), 1);
    assert_eq!(api.limiter().snapshot(RateClass::General).unwrap().acquired, 1);
}

#[tokio::test]
async fn test_quota_exhaustion_is_absorbed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/demo"))
        .respond_with(exhausted(403))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/demo"))
        .respond_with(ok_json(json!({ "default_branch": "main", "html_url": "https://github.com/acme/demo" })))
        .mount(&server)
        .await;

    let api = api_client(&test_config(&server));
    let repo = api.get("repos/acme/demo").await.unwrap();

    assert_eq!(repo["default_branch"], "main");
    assert_eq!(number_of_requests(&server).await, 2);
}

#[tokio::test]
async fn test_too_many_requests_is_absorbed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search/code"))
        .respond_with(exhausted(429))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/search/code"))
        .respond_with(ok_json(json!({ "total_count": 0, "items": [] })))
        .mount(&server)
        .await;

    let api = api_client(&test_config(&server));
    let page = api.get("search/code?q=extension%3Aroc").await.unwrap();

    assert_eq!(page["total_count"], 0);
    assert_eq!(api.limiter().snapshot(RateClass::Search).unwrap().acquired, 2);
    assert_eq!(api.limiter().snapshot(RateClass::General).unwrap().acquired, 0);
}

#[tokio::test]
async fn test_persistent_exhaustion_gives_up_after_max_attempts() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/demo"))
        .respond_with(exhausted(403))
        .expect(3)
        .mount(&server)
        .await;

    let api = api_client(&test_config(&server));
    let err = api.get("repos/acme/demo").await.unwrap_err();

    assert!(matches!(err, ApiError::RetriesExhausted { attempts: 3, .. }));
}

#[tokio::test]
async fn test_timeout_is_retried_after_backoff() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/demo"))
        .respond_with(ok_json(json!({ "default_branch": "slow" })).set_delay(Duration::from_millis(1500)))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/demo"))
        .respond_with(ok_json(json!({ "default_branch": "main" })))
        .mount(&server)
        .await;

    let mut config = test_config(&server);
    config.api.request_timeout_secs = 1;
    let api = api_client(&config);
    let repo = api.get("repos/acme/demo").await.unwrap();

    assert_eq!(repo["default_branch"], "main");
    assert_eq!(api.requests_sent(), 2);
}

#[tokio::test]
async fn test_persistent_timeouts_give_up_after_max_attempts() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/demo"))
        .respond_with(ok_json(json!({})).set_delay(Duration::from_millis(1500)))
        .mount(&server)
        .await;

    let mut config = test_config(&server);
    config.api.request_timeout_secs = 1;
    let api = api_client(&config);
    let err = api.get("repos/acme/demo").await.unwrap_err();

    assert!(matches!(err, ApiError::RetriesExhausted { attempts: 3, .. }));
    assert_eq!(api.requests_sent(), 3);
    assert!(api.cache().is_empty());
}

#[tokio::test]
async fn test_not_found_is_surfaced() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/gone"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({ "message": "Not Found" })))
        .mount(&server)
        .await;

    let api = api_client(&test_config(&server));
    let err = api.get("repos/acme/gone").await.unwrap_err();

    assert!(err.is_not_found());
    assert!(api.cache().is_empty());
}

#[tokio::test]
async fn test_forbidden_without_exhaustion_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/private"))
        .respond_with(
            ResponseTemplate::new(403)
                .insert_header("x-ratelimit-remaining", "4000")
                .insert_header("x-ratelimit-reset", "9999999999"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let api = api_client(&test_config(&server));
    let err = api.get("repos/acme/private").await.unwrap_err();

    assert!(matches!(err, ApiError::Status { status: 403, .. }));
}

#[tokio::test]
async fn test_server_error_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/demo"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    let api = api_client(&test_config(&server));
    let err = api.get("repos/acme/demo").await.unwrap_err();

    assert!(matches!(err, ApiError::Status { status: 500, .. }));
}

#[tokio::test]
async fn test_malformed_body_is_a_decode_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/demo"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
        .mount(&server)
        .await;

    let api = api_client(&test_config(&server));
    let err = api.get("repos/acme/demo").await.unwrap_err();

    assert!(matches!(err, ApiError::Decode { .. }));
    assert!(api.cache().is_empty());
}

#[tokio::test]
async fn test_get_url_fetches_absolute_api_urls() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/demo/git/blobs/b1"))
        .respond_with(ok_json(json!({ "sha": "b1" })))
        .mount(&server)
        .await;

    let api = api_client(&test_config(&server));
    let url = format!("{}/repos/acme/demo/git/blobs/b1", server.uri());
    let blob = api.get_url(&url).await.unwrap();

    assert_eq!(blob["sha"], "b1");
    assert!(matches!(
        api.get_url("https://elsewhere.test/repos/acme/demo").await,
        Err(ApiError::ForeignUrl(_))
    ));
}

#[tokio::test]
async fn test_quota_headers_reconcile_the_bucket() {
    let server = MockServer::start().await;
    let reset = chrono::Utc::now().timestamp() + 3600;
    Mock::given(method("GET"))
        .and(path("/rate_limit"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({}))
                .insert_header("x-ratelimit-limit", "60")
                .insert_header("x-ratelimit-remaining", "59")
                .insert_header("x-ratelimit-reset", reset.to_string().as_str()),
        )
        .mount(&server)
        .await;

    let api = api_client(&test_config(&server));
    api.get("rate_limit").await.unwrap();

    let bucket = api.limiter().snapshot(RateClass::General).unwrap();
    assert_eq!(bucket.capacity, 60.0);
    assert!(bucket.tokens <= 60.0);
    // 58 spendable tokens spread over roughly an hour
    assert!(bucket.refill_rate > 58.0 / 3601.0 && bucket.refill_rate <= 58.0 / 3599.0);
}
