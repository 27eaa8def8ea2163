use crate::{ActivitySource, RedditFetcher};
use persona_core::{
    ActivityKind, CoreError, FetchLimits, RedditApiError, RedditCredentials, RetryPolicy, Settings,
};
use serde_json::{json, Value};
use std::time::Duration;
use wiremock::matchers::{body_string_contains, method, path, query_param, query_param_is_missing};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TOKEN_PATH: &str = "/api/v1/access_token";

fn credentials() -> RedditCredentials {
    RedditCredentials {
        client_id: "test_client_id".to_string(),
        client_secret: "test_client_secret".to_string(),
        username: "script_user".to_string(),
        password: "hunter2".to_string(),
        user_agent: "redditor-persona-tests/1.0".to_string(),
    }
}

fn settings(server: &MockServer) -> Settings {
    Settings {
        reddit_api_base: server.uri(),
        reddit_token_url: format!("{}{}", server.uri(), TOKEN_PATH),
        request_timeout_secs: 5,
        ..Settings::default()
    }
}

fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        base_delay_ms: 1,
        max_delay_ms: 10,
        backoff_multiplier: 2.0,
        jitter_factor: 0.0,
    }
}

fn fetcher(server: &MockServer) -> RedditFetcher {
    RedditFetcher::new(&credentials(), &settings(server), fast_retry()).unwrap()
}

fn post(id: &str, score: i64) -> Value {
    json!({
        "kind": "t3",
        "data": {
            "id": id,
            "title": format!("Post {}", id),
            "selftext": format!("Body of post {}", id),
            "subreddit": "rust",
            "permalink": format!("/r/rust/comments/{}/post/", id),
            "created_utc": 1700000000.0,
            "score": score
        }
    })
}

fn comment(id: &str, score: i64) -> Value {
    json!({
        "kind": "t1",
        "data": {
            "id": id,
            "body": format!("Comment {}", id),
            "subreddit": "programming",
            "permalink": format!("/r/programming/comments/x/y/{}/", id),
            "created_utc": 1700000100.0,
            "score": score
        }
    })
}

fn listing(children: Vec<Value>, after: Option<&str>) -> Value {
    json!({
        "kind": "Listing",
        "data": { "children": children, "after": after, "before": null }
    })
}

async fn mount_token(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .and(body_string_contains("grant_type=password"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "test-access-token",
            "token_type": "bearer",
            "expires_in": 86400,
            "scope": "*"
        })))
        .mount(server)
        .await;
}

async fn mount_about(server: &MockServer, username: &str) {
    Mock::given(method("GET"))
        .and(path(format!("/user/{}/about", username)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "kind": "t2",
            "data": {
                "name": username,
                "created_utc": 1500000000.0,
                "link_karma": 120,
                "comment_karma": 340,
                "is_gold": false,
                "is_mod": false,
                "has_verified_email": true
            }
        })))
        .mount(server)
        .await;
}

async fn mount_listing(server: &MockServer, username: &str, segment: &str, body: Value) {
    Mock::given(method("GET"))
        .and(path(format!("/user/{}/{}", username, segment)))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

/// Three posts across two pages and two comments on one page.
async fn mount_standard_user(server: &MockServer, username: &str) {
    mount_token(server).await;
    mount_about(server, username).await;

    Mock::given(method("GET"))
        .and(path(format!("/user/{}/submitted", username)))
        .and(query_param_is_missing("after"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(listing(vec![post("p1", 15), post("p2", 3)], Some("t3_p2"))),
        )
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/user/{}/submitted", username)))
        .and(query_param("after", "t3_p2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(listing(vec![post("p3", 7)], None)))
        .mount(server)
        .await;

    mount_listing(
        server,
        username,
        "comments",
        listing(vec![comment("c1", 9), comment("c2", 1)], None),
    )
    .await;
}

#[tokio::test]
async fn test_fetch_follows_pagination_cursor() {
    let server = MockServer::start().await;
    mount_standard_user(&server, "kojied").await;

    let activity = fetcher(&server)
        .fetch_activity("kojied", FetchLimits::default())
        .await
        .unwrap();

    assert_eq!(activity.profile.username, "kojied");
    assert_eq!(activity.profile.total_karma(), 460);
    assert_eq!(activity.batch.post_count(), 3);
    assert_eq!(activity.batch.comment_count(), 2);

    let ids: Vec<_> = activity.batch.iter().map(|i| i.id.as_str()).collect();
    assert_eq!(ids, vec!["p1", "p2", "p3", "c1", "c2"]);
    assert_eq!(activity.batch.get("c1").unwrap().kind, ActivityKind::Comment);

    // Second page asks only for what is still missing
    let requests = server.received_requests().await.unwrap();
    let second_page = requests
        .iter()
        .find(|r| r.url.query().unwrap_or_default().contains("after=t3_p2"))
        .unwrap();
    let query = second_page.url.query().unwrap();
    assert!(query.contains("limit=48"));
    assert!(query.contains("sort=new"));
    assert!(query.contains("raw_json=1"));

    let auth_header = second_page.headers.get("authorization").unwrap();
    assert_eq!(auth_header.to_str().unwrap(), "Bearer test-access-token");
}

#[tokio::test]
async fn test_fetch_respects_max_posts() {
    let server = MockServer::start().await;
    mount_token(&server).await;
    mount_about(&server, "prolific").await;

    Mock::given(method("GET"))
        .and(path("/user/prolific/submitted"))
        .and(query_param("limit", "3"))
        .respond_with(ResponseTemplate::new(200).set_body_json(listing(
            (0..5).map(|i| post(&format!("p{}", i), i)).collect(),
            Some("t3_p4"),
        )))
        .expect(1)
        .mount(&server)
        .await;
    mount_listing(&server, "prolific", "comments", listing(vec![], None)).await;

    let limits = FetchLimits {
        max_posts: 3,
        max_comments: 10,
    };
    let activity = fetcher(&server)
        .fetch_activity("prolific", limits)
        .await
        .unwrap();

    assert_eq!(activity.batch.post_count(), 3);
    assert_eq!(activity.batch.comment_count(), 0);
}

#[tokio::test]
async fn test_single_rate_limit_is_retried_with_same_result() {
    let throttled = MockServer::start().await;
    mount_standard_user(&throttled, "kojied").await;
    Mock::given(method("GET"))
        .and(path("/user/kojied/submitted"))
        .and(query_param("after", "t3_p2"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "0"))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&throttled)
        .await;

    let unthrottled = MockServer::start().await;
    mount_standard_user(&unthrottled, "kojied").await;

    let throttled_fetcher = fetcher(&throttled);
    let retried = throttled_fetcher
        .fetch_activity("kojied", FetchLimits::default())
        .await
        .unwrap();
    let expected = fetcher(&unthrottled)
        .fetch_activity("kojied", FetchLimits::default())
        .await
        .unwrap();

    assert_eq!(retried, expected);
    assert_eq!(throttled_fetcher.retry_executor().get_metrics().total_retries, 1);
}

#[tokio::test]
async fn test_persistent_rate_limit_surfaces_error() {
    let server = MockServer::start().await;
    mount_token(&server).await;
    mount_about(&server, "kojied").await;
    Mock::given(method("GET"))
        .and(path("/user/kojied/submitted"))
        .respond_with(ResponseTemplate::new(429))
        .expect(3)
        .mount(&server)
        .await;

    let err = fetcher(&server)
        .fetch_activity("kojied", FetchLimits::default())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        CoreError::RedditApi(RedditApiError::RateLimitExceeded { retry_after: None })
    ));
}

#[tokio::test]
async fn test_missing_user_is_not_found() {
    let server = MockServer::start().await;
    mount_token(&server).await;
    Mock::given(method("GET"))
        .and(path("/user/ghost/about"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "message": "Not Found",
            "error": 404
        })))
        .mount(&server)
        .await;

    let err = fetcher(&server)
        .fetch_activity("ghost", FetchLimits::default())
        .await
        .unwrap_err();

    assert!(err.is_not_found());
    assert!(matches!(
        err,
        CoreError::RedditApi(RedditApiError::UserNotFound { ref username }) if username == "ghost"
    ));
}

#[tokio::test]
async fn test_suspended_user_is_not_found() {
    let server = MockServer::start().await;
    mount_token(&server).await;
    Mock::given(method("GET"))
        .and(path("/user/banned/about"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "kind": "t2",
            "data": { "name": "banned", "is_suspended": true }
        })))
        .mount(&server)
        .await;

    let err = fetcher(&server)
        .fetch_activity("banned", FetchLimits::default())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        CoreError::RedditApi(RedditApiError::UserNotFound { .. })
    ));
}

#[tokio::test]
async fn test_user_without_activity_is_not_found() {
    let server = MockServer::start().await;
    mount_token(&server).await;
    mount_about(&server, "lurker").await;
    mount_listing(&server, "lurker", "submitted", listing(vec![], None)).await;
    mount_listing(&server, "lurker", "comments", listing(vec![], None)).await;

    let err = fetcher(&server)
        .fetch_activity("lurker", FetchLimits::default())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        CoreError::RedditApi(RedditApiError::NoPublicActivity { .. })
    ));
}

#[tokio::test]
async fn test_rejected_credentials_fail_authentication() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "error": "invalid_grant" })))
        .expect(1)
        .mount(&server)
        .await;

    let err = fetcher(&server)
        .fetch_activity("kojied", FetchLimits::default())
        .await
        .unwrap_err();

    match err {
        CoreError::RedditApi(RedditApiError::AuthenticationFailed { reason }) => {
            assert_eq!(reason, "invalid_grant");
        }
        other => panic!("Expected AuthenticationFailed, got {:?}", other),
    }

    // Nothing past the token endpoint was called
    let requests = server.received_requests().await.unwrap();
    assert!(requests.iter().all(|r| r.url.path() == TOKEN_PATH));
}

#[tokio::test]
async fn test_unauthorized_client_fails_authentication() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "message": "Unauthorized",
            "error": 401
        })))
        .mount(&server)
        .await;

    let err = fetcher(&server)
        .fetch_activity("kojied", FetchLimits::default())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        CoreError::RedditApi(RedditApiError::AuthenticationFailed { .. })
    ));
}

#[tokio::test]
async fn test_token_is_cached_between_runs() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "cached-token",
            "token_type": "bearer",
            "expires_in": 3600
        })))
        .expect(1)
        .mount(&server)
        .await;
    mount_about(&server, "kojied").await;
    mount_listing(&server, "kojied", "submitted", listing(vec![post("p1", 1)], None)).await;
    mount_listing(&server, "kojied", "comments", listing(vec![], None)).await;

    let fetcher = fetcher(&server);
    for _ in 0..2 {
        let activity = fetcher
            .fetch_activity("kojied", FetchLimits::default())
            .await
            .unwrap();
        assert_eq!(activity.batch.len(), 1);
    }
}

#[tokio::test]
async fn test_forbidden_listing() {
    let server = MockServer::start().await;
    mount_token(&server).await;
    mount_about(&server, "private").await;
    Mock::given(method("GET"))
        .and(path("/user/private/submitted"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;

    let err = fetcher(&server)
        .fetch_activity("private", FetchLimits::default())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        CoreError::RedditApi(RedditApiError::Forbidden { .. })
    ));
}

#[test]
fn test_fetcher_construction_makes_no_requests() {
    let settings = Settings::default();
    let fetcher = RedditFetcher::new(&credentials(), &settings, RetryPolicy::reddit());
    assert!(fetcher.is_ok());

    // Secrets never show up in debug output
    let debug = format!("{:?}", fetcher.unwrap());
    assert!(!debug.contains("hunter2"));
}

#[test]
fn test_unreachable_token_endpoint_is_a_network_error() {
    let settings = Settings {
        reddit_token_url: "http://127.0.0.1:1/api/v1/access_token".to_string(),
        request_timeout_secs: 5,
        ..Settings::default()
    };
    let fetcher = RedditFetcher::new(&credentials(), &settings, RetryPolicy::none()).unwrap();

    let result = tokio_test::block_on(fetcher.fetch_activity("kojied", FetchLimits::default()));

    assert!(matches!(result, Err(CoreError::Network(_))));
}

#[tokio::test]
async fn test_slow_listing_times_out() {
    let server = MockServer::start().await;
    mount_token(&server).await;
    Mock::given(method("GET"))
        .and(path("/user/kojied/about"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
        .mount(&server)
        .await;

    let settings = Settings {
        request_timeout_secs: 1,
        ..settings(&server)
    };
    let fetcher = RedditFetcher::new(&credentials(), &settings, RetryPolicy::none()).unwrap();

    let err = fetcher
        .fetch_activity("kojied", FetchLimits::default())
        .await
        .unwrap_err();

    assert!(matches!(err, CoreError::Timeout { seconds: 1 }));
}

#[tokio::test]
async fn test_unparseable_quota_reset_is_ignored() {
    let server = MockServer::start().await;
    mount_token(&server).await;
    mount_about(&server, "kojied").await;
    for (segment, item) in [("submitted", post("p1", 4)), ("comments", comment("c1", 2))] {
        Mock::given(method("GET"))
            .and(path(format!("/user/kojied/{}", segment)))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("x-ratelimit-remaining", "0")
                    .insert_header("x-ratelimit-reset", "inf")
                    .set_body_json(listing(vec![item], None)),
            )
            .mount(&server)
            .await;
    }

    let activity = fetcher(&server)
        .fetch_activity("kojied", FetchLimits::default())
        .await
        .unwrap();

    assert_eq!(activity.batch.len(), 2);
}
