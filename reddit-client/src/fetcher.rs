use crate::api::{ListingKind, RedditApiClient, MAX_PAGE_SIZE};
use crate::auth::RedditAuth;
use persona_core::{
    ActivityBatch, ActivityItem, CoreError, FetchLimits, RedditApiError, RedditCredentials,
    RetryExecutor, RetryPolicy, Settings, UserProfile,
};
use reqwest::Client;
use std::sync::Arc;
use tracing::{debug, info};

/// Everything fetched about one user.
#[derive(Debug, Clone, PartialEq)]
pub struct UserActivity {
    pub profile: UserProfile,
    pub batch: ActivityBatch,
}

/// Source of a user's profile and public activity.
pub trait ActivitySource {
    async fn fetch_activity(
        &self,
        username: &str,
        limits: FetchLimits,
    ) -> Result<UserActivity, CoreError>;
}

#[derive(Debug, Clone)]
pub struct RedditFetcher {
    auth: Arc<RedditAuth>,
    api: RedditApiClient,
    retry: Arc<RetryExecutor>,
}

impl RedditFetcher {
    /// Builds the HTTP client, OAuth client and API client. No requests are made.
    pub fn new(
        credentials: &RedditCredentials,
        settings: &Settings,
        policy: RetryPolicy,
    ) -> Result<Self, CoreError> {
        let http_client = Client::builder()
            .user_agent(credentials.user_agent.as_str())
            .timeout(settings.request_timeout())
            .build()?;

        let auth = RedditAuth::new(
            credentials,
            &settings.reddit_token_url,
            http_client.clone(),
            settings.request_timeout_secs,
        )?;
        let api = RedditApiClient::new(
            http_client,
            &settings.reddit_api_base,
            settings.request_timeout_secs,
        );

        Ok(Self {
            auth: Arc::new(auth),
            api,
            retry: Arc::new(RetryExecutor::new(policy)),
        })
    }

    pub fn retry_executor(&self) -> &RetryExecutor {
        &self.retry
    }

    async fn fetch_listing(
        &self,
        access_token: &str,
        username: &str,
        kind: ListingKind,
        max_items: usize,
    ) -> Result<Vec<ActivityItem>, CoreError> {
        let mut items: Vec<ActivityItem> = Vec::new();
        let mut after: Option<String> = None;
        let operation = format!("{} listing for u/{}", kind.path_segment(), username);

        while items.len() < max_items {
            let limit = (max_items - items.len()).min(MAX_PAGE_SIZE);
            let cursor = after.as_deref();
            let page = self
                .retry
                .execute(&operation, || {
                    self.api
                        .get_user_listing(access_token, username, kind, limit, cursor)
                })
                .await?;

            if page.items.is_empty() {
                debug!("Empty page for {}, stopping", operation);
                break;
            }

            let room = max_items - items.len();
            items.extend(page.items.into_iter().take(room));

            match page.after {
                Some(next) => after = Some(next),
                None => break,
            }
        }

        info!("Fetched {} items for {}", items.len(), operation);
        Ok(items)
    }
}

impl ActivitySource for RedditFetcher {
    async fn fetch_activity(
        &self,
        username: &str,
        limits: FetchLimits,
    ) -> Result<UserActivity, CoreError> {
        info!(
            "Fetching activity for u/{} (max {} posts, {} comments)",
            username, limits.max_posts, limits.max_comments
        );

        let access_token = self
            .retry
            .execute("reddit authentication", || self.auth.access_token())
            .await?;

        let profile = self
            .retry
            .execute(&format!("profile for u/{}", username), || {
                self.api.get_user_about(&access_token, username)
            })
            .await?;

        let posts = self
            .fetch_listing(&access_token, username, ListingKind::Submitted, limits.max_posts)
            .await?;
        let comments = self
            .fetch_listing(&access_token, username, ListingKind::Comments, limits.max_comments)
            .await?;

        if posts.is_empty() && comments.is_empty() {
            return Err(RedditApiError::NoPublicActivity {
                username: username.to_string(),
            }
            .into());
        }

        let batch = ActivityBatch::new(posts, comments, limits);
        info!(
            "Fetched {} posts and {} comments for u/{}",
            batch.post_count(),
            batch.comment_count(),
            username
        );
        Ok(UserActivity { profile, batch })
    }
}
