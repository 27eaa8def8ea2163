use chrono::{TimeZone, Utc};
use llm_interface::{GeminiProvider, PersonaRequester, Prompt};
use persona_core::{
    ActivityBatch, ActivityItem, ActivityKind, AppConfig, ConfigError, CoreError, FetchLimits,
    LlmError, RedditApiError, RedditCredentials, RetryPolicy, Settings, UserProfile,
    REQUIRED_ENV_VARS,
};
use persona_pipeline::{PersonaPipeline, Pipeline};
use reddit_client::{ActivitySource, RedditFetcher, UserActivity};
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tempfile::TempDir;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const PERSONA: &str = "USERNAME: kojied\n\nMOTIVATIONS\nConvenience: 5 [post:p1]\n\nFRUSTRATIONS\n- waiting on slow compile times";

fn item(id: &str, kind: ActivityKind, score: i64, body: &str) -> ActivityItem {
    ActivityItem {
        id: id.to_string(),
        kind,
        title: None,
        body: body.to_string(),
        subreddit: "rust".to_string(),
        created_utc: Utc.with_ymd_and_hms(2024, 2, 1, 12, 0, 0).unwrap(),
        score,
        permalink: format!("/r/rust/comments/{}/", id),
    }
}

fn activity() -> UserActivity {
    UserActivity {
        profile: UserProfile {
            username: "kojied".to_string(),
            created_utc: Utc.with_ymd_and_hms(2019, 5, 4, 0, 0, 0).unwrap(),
            link_karma: 10,
            comment_karma: 20,
            is_gold: false,
            is_mod: false,
            has_verified_email: true,
        },
        batch: ActivityBatch::new(
            vec![
                item("p1", ActivityKind::Post, 12, "Meal kits are so convenient"),
                item("p2", ActivityKind::Post, 2, "Compile times are slow today"),
                item("p3", ActivityKind::Post, 1, "Trail running gear"),
            ],
            vec![
                item("c1", ActivityKind::Comment, 7, "Slow compile times hurt"),
                item("c2", ActivityKind::Comment, 0, "Nice"),
            ],
            FetchLimits::default(),
        ),
    }
}

/// Returns a fixed activity, or `UserNotFound` when empty.
struct StaticSource {
    activity: Option<UserActivity>,
    calls: AtomicUsize,
    last_limits: Mutex<Option<FetchLimits>>,
}

impl StaticSource {
    fn new(activity: Option<UserActivity>) -> Self {
        Self {
            activity,
            calls: AtomicUsize::new(0),
            last_limits: Mutex::new(None),
        }
    }
}

impl ActivitySource for StaticSource {
    async fn fetch_activity(
        &self,
        username: &str,
        limits: FetchLimits,
    ) -> Result<UserActivity, CoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_limits.lock().unwrap() = Some(limits);
        self.activity.clone().ok_or_else(|| {
            RedditApiError::UserNotFound {
                username: username.to_string(),
            }
            .into()
        })
    }
}

struct CannedRequester {
    reply: Result<String, LlmError>,
    prompts: Mutex<Vec<Prompt>>,
}

impl CannedRequester {
    fn ok(text: &str) -> Self {
        Self {
            reply: Ok(text.to_string()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    fn failing(error: LlmError) -> Self {
        Self {
            reply: Err(error),
            prompts: Mutex::new(Vec::new()),
        }
    }

    fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }
}

impl PersonaRequester for CannedRequester {
    async fn request_persona(&self, prompt: &Prompt) -> Result<String, CoreError> {
        self.prompts.lock().unwrap().push(prompt.clone());
        self.reply.clone().map_err(CoreError::from)
    }
}

fn settings_in(dir: &TempDir) -> Settings {
    Settings {
        output_dir: dir.path().to_path_buf(),
        max_posts: 2,
        max_comments: 7,
        ..Settings::default()
    }
}

#[tokio::test]
async fn test_run_writes_report() {
    let dir = TempDir::new().unwrap();
    let pipeline = Pipeline::new(
        StaticSource::new(Some(activity())),
        CannedRequester::ok(PERSONA),
        &settings_in(&dir),
    );

    let path = pipeline.run("https://www.reddit.com/user/kojied/").await.unwrap();

    assert_eq!(path, dir.path().join("persona_kojied.txt"));
    let content = std::fs::read_to_string(&path).unwrap();
    assert!(content.contains(PERSONA));
    assert!(content.contains("Posts analyzed: 3"));
    assert!(content.contains("Comments analyzed: 2"));
    assert!(content.contains("[post:p1] r/rust (overlap 1.00, cited by id)"));

    assert_eq!(
        *pipeline.source().last_limits.lock().unwrap(),
        Some(FetchLimits {
            max_posts: 2,
            max_comments: 7
        })
    );
    let prompts = pipeline.requester().prompts.lock().unwrap();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].text.contains("[post:p1]"));
    assert_eq!(prompts[0].dropped, 0);
}

#[tokio::test]
async fn test_unknown_user_writes_nothing() {
    let dir = TempDir::new().unwrap();
    let pipeline = Pipeline::new(
        StaticSource::new(None),
        CannedRequester::ok(PERSONA),
        &settings_in(&dir),
    );

    let err = pipeline.run("u/ghost_user").await.unwrap_err();

    assert!(err.is_not_found());
    assert_eq!(pipeline.requester().calls(), 0);
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_model_failure_writes_nothing() {
    let dir = TempDir::new().unwrap();
    let pipeline = Pipeline::new(
        StaticSource::new(Some(activity())),
        CannedRequester::failing(LlmError::QuotaExceeded {
            provider: "gemini".to_string(),
            details: "daily limit".to_string(),
        }),
        &settings_in(&dir),
    );

    let err = pipeline.run("kojied").await.unwrap_err();

    assert!(matches!(err, CoreError::Llm(LlmError::QuotaExceeded { .. })));
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_invalid_input_stops_before_fetching() {
    let dir = TempDir::new().unwrap();
    let pipeline = Pipeline::new(
        StaticSource::new(Some(activity())),
        CannedRequester::ok(PERSONA),
        &settings_in(&dir),
    );

    let err = pipeline.run("https://example.com/nobody").await.unwrap_err();

    assert!(matches!(err, CoreError::InvalidInput { .. }));
    assert_eq!(pipeline.source().calls.load(Ordering::SeqCst), 0);
}

fn env_for(server: &MockServer, dir: &TempDir) -> (HashMap<&'static str, String>, Settings) {
    let env = REQUIRED_ENV_VARS
        .iter()
        .map(|key| (*key, format!("test-{}", key.to_lowercase())))
        .collect();
    let settings = Settings {
        reddit_api_base: server.uri(),
        reddit_token_url: format!("{}/api/v1/access_token", server.uri()),
        gemini_api_base: server.uri(),
        output_dir: dir.path().to_path_buf(),
        request_timeout_secs: 5,
        ..Settings::default()
    };
    (env, settings)
}

#[tokio::test]
async fn test_missing_api_key_fails_before_any_request() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let (mut env, settings) = env_for(&server, &dir);
    env.remove("GEMINI_API_KEY");

    let err = AppConfig::from_lookup(|k| env.get(k).cloned(), settings).unwrap_err();

    match err {
        ConfigError::MissingEnvironmentVariables { var_names } => {
            assert_eq!(var_names, vec!["GEMINI_API_KEY".to_string()])
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_from_config_makes_no_requests() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let (env, settings) = env_for(&server, &dir);
    let config = AppConfig::from_lookup(|k| env.get(k).cloned(), settings).unwrap();

    let _pipeline: PersonaPipeline = Pipeline::from_config(&config).unwrap();

    assert!(server.received_requests().await.unwrap().is_empty());
}

fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 2,
        base_delay_ms: 1,
        max_delay_ms: 10,
        backoff_multiplier: 2.0,
        jitter_factor: 0.0,
    }
}

async fn mount_reddit(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/api/v1/access_token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "token-123",
            "token_type": "bearer",
            "expires_in": 86400,
            "scope": "*"
        })))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/user/kojied/about"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "kind": "t2",
            "data": {"name": "kojied", "created_utc": 1557000000.0, "link_karma": 5, "comment_karma": 9}
        })))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/user/kojied/submitted"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "kind": "Listing",
            "data": {"after": null, "children": [
                {"kind": "t3", "data": {
                    "id": "p1", "title": "Meal prep on a budget", "selftext": "Convenience matters most",
                    "subreddit": "MealPrepSunday", "permalink": "/r/MealPrepSunday/comments/p1/meal_prep/",
                    "created_utc": 1700000000.0, "score": 31
                }},
                {"kind": "t3", "data": {
                    "id": "p2", "title": "Compile times", "selftext": "",
                    "subreddit": "rust", "permalink": "/r/rust/comments/p2/compile_times/",
                    "created_utc": 1700100000.0, "score": 4
                }},
                {"kind": "t3", "data": {
                    "id": "p3", "title": "Trail shoes", "selftext": "Any recommendations?",
                    "subreddit": "running", "permalink": "/r/running/comments/p3/trail_shoes/",
                    "created_utc": 1700150000.0, "score": 2
                }}
            ]}
        })))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/user/kojied/comments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "kind": "Listing",
            "data": {"after": null, "children": [
                {"kind": "t1", "data": {
                    "id": "c1", "body": "Slow compile times are my biggest frustration",
                    "subreddit": "rust", "permalink": "/r/rust/comments/p9/x/c1/",
                    "created_utc": 1700200000.0, "score": 8
                }},
                {"kind": "t1", "data": {
                    "id": "c2", "body": "Batch cooking on Sundays saves me hours",
                    "subreddit": "MealPrepSunday", "permalink": "/r/MealPrepSunday/comments/p8/y/c2/",
                    "created_utc": 1700300000.0, "score": 3
                }}
            ]}
        })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_end_to_end_against_mock_apis() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let (env, settings) = env_for(&server, &dir);
    let config = AppConfig::from_lookup(|k| env.get(k).cloned(), settings).unwrap();

    mount_reddit(&server).await;
    Mock::given(method("POST"))
        .and(path("/models/gemini-1.5-flash:generateContent"))
        .and(body_string_contains("[post:p1]"))
        .and(body_string_contains("[comment:c1]"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{"content": {"parts": [{"text": PERSONA}]}, "finishReason": "STOP"}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let credentials: &RedditCredentials = &config.reddit;
    let fetcher = RedditFetcher::new(credentials, &config.settings, fast_retry()).unwrap();
    let provider = GeminiProvider::new(&config.gemini_api_key, &config.settings)
        .unwrap()
        .with_retry_policy(fast_retry());
    let pipeline = Pipeline::new(fetcher, provider, &config.settings);

    let path = pipeline.run("reddit.com/u/kojied").await.unwrap();

    let content = std::fs::read_to_string(path).unwrap();
    assert!(content.contains(PERSONA));
    assert!(content.contains("Username: kojied"));
    assert!(content.contains("Posts analyzed: 3"));
    assert!(content.contains("Comments analyzed: 2"));
    assert!(content.contains("r/MealPrepSunday"));
    assert!(content.contains("https://www.reddit.com/r/MealPrepSunday/comments/p1/meal_prep/"));
}

#[tokio::test]
async fn test_end_to_end_not_found_writes_nothing() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let (env, settings) = env_for(&server, &dir);
    let config = AppConfig::from_lookup(|k| env.get(k).cloned(), settings).unwrap();

    Mock::given(method("POST"))
        .and(path("/api/v1/access_token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "token-123",
            "token_type": "bearer",
            "expires_in": 86400
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/user/ghost_user/about"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let pipeline: PersonaPipeline = Pipeline::from_config(&config).unwrap();
    let err = pipeline.run("u/ghost_user").await.unwrap_err();

    assert!(err.is_not_found());
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    let requests = server.received_requests().await.unwrap();
    assert!(requests.iter().all(|r| !r.url.path().contains("generateContent")));
}
