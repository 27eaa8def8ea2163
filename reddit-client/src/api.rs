use crate::rate_limiter::{RateLimitConfig, RateLimiter};
use chrono::{DateTime, Utc};
use persona_core::{ActivityItem, ActivityKind, CoreError, RedditApiError, UserProfile};
use reqwest::header::HeaderMap;
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Reddit never returns more than this many items per listing page.
pub const MAX_PAGE_SIZE: usize = 100;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditListing<T> {
    #[serde(default)]
    pub kind: String,
    pub data: RedditListingData<T>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditListingData<T> {
    #[serde(default = "Vec::new")]
    pub children: Vec<RedditListingChild<T>>,
    #[serde(default)]
    pub after: Option<String>,
    #[serde(default)]
    pub before: Option<String>,
    #[serde(default)]
    pub dist: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditListingChild<T> {
    #[serde(default)]
    pub kind: String,
    pub data: T,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RedditPostData {
    pub id: String,
    pub title: String,
    pub selftext: String,
    pub subreddit: String,
    pub permalink: String,
    pub created_utc: f64,
    pub score: i64,
    pub num_comments: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RedditCommentData {
    pub id: String,
    pub body: String,
    pub subreddit: String,
    pub permalink: String,
    pub created_utc: f64,
    pub score: i64,
    pub link_title: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RedditUserData {
    pub name: String,
    pub created_utc: f64,
    pub link_karma: i64,
    pub comment_karma: i64,
    pub is_gold: bool,
    pub is_mod: bool,
    pub has_verified_email: Option<bool>,
    pub is_suspended: bool,
}

fn timestamp(created_utc: f64) -> DateTime<Utc> {
    DateTime::from_timestamp(created_utc as i64, 0).unwrap_or_default()
}

impl From<RedditPostData> for ActivityItem {
    fn from(post: RedditPostData) -> Self {
        Self {
            id: post.id,
            kind: ActivityKind::Post,
            title: Some(post.title),
            body: post.selftext,
            subreddit: post.subreddit,
            created_utc: timestamp(post.created_utc),
            score: post.score,
            permalink: post.permalink,
        }
    }
}

impl From<RedditCommentData> for ActivityItem {
    fn from(comment: RedditCommentData) -> Self {
        Self {
            id: comment.id,
            kind: ActivityKind::Comment,
            title: None,
            body: comment.body,
            subreddit: comment.subreddit,
            created_utc: timestamp(comment.created_utc),
            score: comment.score,
            permalink: comment.permalink,
        }
    }
}

impl From<RedditUserData> for UserProfile {
    fn from(user: RedditUserData) -> Self {
        Self {
            username: user.name,
            created_utc: timestamp(user.created_utc),
            link_karma: user.link_karma,
            comment_karma: user.comment_karma,
            is_gold: user.is_gold,
            is_mod: user.is_mod,
            has_verified_email: user.has_verified_email.unwrap_or(false),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListingKind {
    Submitted,
    Comments,
}

impl ListingKind {
    pub fn path_segment(&self) -> &'static str {
        match self {
            ListingKind::Submitted => "submitted",
            ListingKind::Comments => "comments",
        }
    }
}

/// One page of a user's posts or comments.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListingPage {
    pub items: Vec<ActivityItem>,
    pub after: Option<String>,
}

/// Authenticated, rate-limited access to a user's public Reddit data.
/// Clones share one rate limiter.
#[derive(Debug, Clone)]
pub struct RedditApiClient {
    http_client: Client,
    rate_limiter: Arc<RateLimiter>,
    base_url: String,
    timeout_secs: u64,
}

impl RedditApiClient {
    pub fn new(http_client: Client, base_url: &str, timeout_secs: u64) -> Self {
        Self::with_rate_limiter(
            http_client,
            base_url,
            timeout_secs,
            Arc::new(RateLimiter::new(RateLimitConfig::reddit_oauth())),
        )
    }

    pub fn with_rate_limiter(
        http_client: Client,
        base_url: &str,
        timeout_secs: u64,
        rate_limiter: Arc<RateLimiter>,
    ) -> Self {
        Self {
            http_client,
            rate_limiter,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout_secs,
        }
    }

    pub fn rate_limiter(&self) -> &Arc<RateLimiter> {
        &self.rate_limiter
    }

    async fn make_request(
        &self,
        username: &str,
        endpoint: &str,
        access_token: &str,
        query_params: &[(&str, String)],
    ) -> Result<Response, CoreError> {
        let url = format!("{}{}", self.base_url, endpoint);

        let permit = self.rate_limiter.acquire_permit().await?;
        debug!(
            "Acquired rate limit permit for GET {} after {:?}",
            endpoint, permit.queue_wait_time
        );

        debug!("Making Reddit API request: GET {}", endpoint);
        let response = self
            .http_client
            .get(&url)
            .bearer_auth(access_token)
            .query(query_params)
            .send()
            .await
            .map_err(|e| {
                error!("Network error for GET {}: {}", endpoint, e);
                if e.is_timeout() {
                    CoreError::Timeout {
                        seconds: self.timeout_secs,
                    }
                } else {
                    CoreError::Network(e)
                }
            })?;

        self.observe_quota_headers(response.headers()).await;

        let status = response.status();
        if status.is_success() {
            debug!("Request successful: {} {}", status, endpoint);
            return Ok(response);
        }

        error!("Request failed with status: {} for {}", status, endpoint);
        let err = match status {
            StatusCode::TOO_MANY_REQUESTS => {
                let retry_after = response
                    .headers()
                    .get(reqwest::header::RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.trim().parse::<u64>().ok());
                warn!("Rate limited by Reddit, retry after {:?} seconds", retry_after);
                RedditApiError::RateLimitExceeded { retry_after }
            }
            StatusCode::UNAUTHORIZED => RedditApiError::InvalidToken,
            StatusCode::FORBIDDEN => RedditApiError::Forbidden {
                resource: endpoint.to_string(),
            },
            StatusCode::NOT_FOUND => RedditApiError::UserNotFound {
                username: username.to_string(),
            },
            s if s.is_server_error() => RedditApiError::ServerError {
                status_code: s.as_u16(),
            },
            s => RedditApiError::InvalidResponse {
                details: format!("Unexpected status {} for {}", s, endpoint),
            },
        };
        Err(err.into())
    }

    async fn observe_quota_headers(&self, headers: &HeaderMap) {
        let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());
        let remaining = header("x-ratelimit-remaining").and_then(|v| v.trim().parse::<f64>().ok());
        let reset = header("x-ratelimit-reset").and_then(parse_reset_seconds);
        self.rate_limiter.observe_server_quota(remaining, reset).await;
    }

    async fn parse_json<T: DeserializeOwned>(
        response: Response,
        what: &str,
    ) -> Result<T, CoreError> {
        response.json::<T>().await.map_err(|e| {
            error!("Failed to parse {}: {}", what, e);
            CoreError::RedditApi(RedditApiError::InvalidResponse {
                details: format!("Failed to parse {}", what),
            })
        })
    }

    /// `GET /user/{username}/about`. Suspended accounts count as missing.
    pub async fn get_user_about(
        &self,
        access_token: &str,
        username: &str,
    ) -> Result<UserProfile, CoreError> {
        let endpoint = format!("/user/{}/about", username);
        let params = [("raw_json", "1".to_string())];
        let response = self
            .make_request(username, &endpoint, access_token, &params)
            .await?;

        let about: RedditListingChild<RedditUserData> =
            Self::parse_json(response, "user profile").await?;
        if about.data.is_suspended {
            info!("User {} is suspended", username);
            return Err(RedditApiError::UserNotFound {
                username: username.to_string(),
            }
            .into());
        }

        let mut profile = UserProfile::from(about.data);
        if profile.username.is_empty() {
            profile.username = username.to_string();
        }
        debug!("Retrieved profile for u/{}", profile.username);
        Ok(profile)
    }

    /// One page of `/user/{username}/submitted` or `/user/{username}/comments`,
    /// newest first.
    pub async fn get_user_listing(
        &self,
        access_token: &str,
        username: &str,
        kind: ListingKind,
        limit: usize,
        after: Option<&str>,
    ) -> Result<ListingPage, CoreError> {
        let endpoint = format!("/user/{}/{}", username, kind.path_segment());
        let mut params = vec![
            ("limit", limit.min(MAX_PAGE_SIZE).to_string()),
            ("sort", "new".to_string()),
            ("raw_json", "1".to_string()),
        ];
        if let Some(after) = after {
            params.push(("after", after.to_string()));
        }

        let response = self
            .make_request(username, &endpoint, access_token, &params)
            .await?;

        let page = match kind {
            ListingKind::Submitted => {
                let listing: RedditListing<RedditPostData> =
                    Self::parse_json(response, "submitted listing").await?;
                into_page(listing)
            }
            ListingKind::Comments => {
                let listing: RedditListing<RedditCommentData> =
                    Self::parse_json(response, "comment listing").await?;
                into_page(listing)
            }
        };

        info!(
            "Retrieved {} {} items for u/{}",
            page.items.len(),
            kind.path_segment(),
            username
        );
        Ok(page)
    }
}

fn into_page<T: Into<ActivityItem>>(listing: RedditListing<T>) -> ListingPage {
    ListingPage {
        items: listing
            .data
            .children
            .into_iter()
            .map(|child| child.data.into())
            .collect(),
        after: listing.data.after.filter(|a| !a.is_empty()),
    }
}

/// `x-ratelimit-reset` is a count of seconds. Negative, non-finite and
/// unrepresentable values are ignored.
fn parse_reset_seconds(value: &str) -> Option<Duration> {
    let secs = value.trim().parse::<f64>().ok().filter(|s| s.is_finite())?;
    Duration::try_from_secs_f64(secs.max(0.0)).ok()
}
