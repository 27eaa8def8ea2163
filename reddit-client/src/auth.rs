use oauth2::basic::BasicClient;
use oauth2::{
    AuthUrl, ClientId, ClientSecret, HttpRequest, HttpResponse, RequestTokenError,
    ResourceOwnerPassword, ResourceOwnerUsername, TokenResponse, TokenUrl,
};
use persona_core::{ConfigError, CoreError, RedditApiError, RedditCredentials};
use reqwest::Client;
use serde::Deserialize;
use std::time::{Duration, SystemTime};
use tokio::sync::Mutex;
use tracing::{debug, error, info};

const REDDIT_AUTHORIZE_URL: &str = "https://www.reddit.com/api/v1/authorize";

/// Tokens are refreshed this long before Reddit would reject them.
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

#[derive(Clone)]
pub struct RedditToken {
    pub access_token: String,
    pub expires_at: SystemTime,
    pub scope: Vec<String>,
}

impl RedditToken {
    pub fn is_expired(&self) -> bool {
        SystemTime::now() + EXPIRY_MARGIN >= self.expires_at
    }
}

impl std::fmt::Debug for RedditToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedditToken")
            .field("access_token", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .field("scope", &self.scope)
            .finish()
    }
}

// Reddit answers bad passwords with HTTP 200 and a body like this one.
#[derive(Debug, Deserialize)]
struct TokenErrorBody {
    error: String,
}

/// Script-app authentication using the resource-owner password grant.
#[derive(Debug)]
pub struct RedditAuth {
    oauth_client: BasicClient,
    http_client: Client,
    username: ResourceOwnerUsername,
    password: ResourceOwnerPassword,
    timeout_secs: u64,
    token: Mutex<Option<RedditToken>>,
}

impl RedditAuth {
    pub fn new(
        credentials: &RedditCredentials,
        token_url: &str,
        http_client: Client,
        timeout_secs: u64,
    ) -> Result<Self, CoreError> {
        let invalid_url = |field: &str, value: &str| ConfigError::InvalidValue {
            field: field.to_string(),
            value: value.to_string(),
        };

        let auth_url = AuthUrl::new(REDDIT_AUTHORIZE_URL.to_string())
            .map_err(|_| invalid_url("reddit_authorize_url", REDDIT_AUTHORIZE_URL))?;
        let token_url = TokenUrl::new(token_url.to_string())
            .map_err(|_| invalid_url("reddit_token_url", token_url))?;

        let oauth_client = BasicClient::new(
            ClientId::new(credentials.client_id.clone()),
            Some(ClientSecret::new(credentials.client_secret.clone())),
            auth_url,
            Some(token_url),
        );

        Ok(Self {
            oauth_client,
            http_client,
            username: ResourceOwnerUsername::new(credentials.username.clone()),
            password: ResourceOwnerPassword::new(credentials.password.clone()),
            timeout_secs,
            token: Mutex::new(None),
        })
    }

    /// Returns a valid access token, requesting a new one when none is cached
    /// or the cached one is about to expire.
    pub async fn access_token(&self) -> Result<String, CoreError> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref().filter(|t| !t.is_expired()) {
            return Ok(token.access_token.clone());
        }

        let token = self.request_token().await?;
        let access_token = token.access_token.clone();
        *cached = Some(token);
        Ok(access_token)
    }

    async fn request_token(&self) -> Result<RedditToken, CoreError> {
        info!("Requesting Reddit access token for {}", self.username.as_str());

        let http_client = self.http_client.clone();
        let response = self
            .oauth_client
            .exchange_password(&self.username, &self.password)
            .request_async(|request| send_token_request(http_client, request))
            .await;

        match response {
            Ok(token) => {
                let lifetime = token.expires_in().unwrap_or(Duration::from_secs(3600));
                let scope = token
                    .scopes()
                    .map(|scopes| scopes.iter().map(|s| s.to_string()).collect())
                    .unwrap_or_default();
                debug!("Reddit token acquired, valid for {:?}", lifetime);
                Ok(RedditToken {
                    access_token: token.access_token().secret().clone(),
                    expires_at: SystemTime::now() + lifetime,
                    scope,
                })
            }
            Err(RequestTokenError::Request(e)) if e.is_timeout() => {
                error!("Reddit token request timed out");
                Err(CoreError::Timeout {
                    seconds: self.timeout_secs,
                })
            }
            Err(RequestTokenError::Request(e)) => {
                error!("Reddit token request failed: {}", e);
                Err(CoreError::Network(e))
            }
            Err(RequestTokenError::ServerResponse(body)) => {
                let reason = body.error().to_string();
                error!("Reddit rejected credentials: {}", reason);
                Err(RedditApiError::AuthenticationFailed { reason }.into())
            }
            Err(RequestTokenError::Parse(_, body)) => {
                let reason = serde_json::from_slice::<TokenErrorBody>(&body)
                    .map(|b| b.error)
                    .unwrap_or_else(|_| "unexpected token response".to_string());
                error!("Reddit rejected credentials: {}", reason);
                Err(RedditApiError::AuthenticationFailed { reason }.into())
            }
            Err(RequestTokenError::Other(reason)) => {
                error!("Reddit authentication failed: {}", reason);
                Err(RedditApiError::AuthenticationFailed { reason }.into())
            }
        }
    }
}

// Sends the oauth2 request through our own client so the user agent and
// timeout apply to the token call too.
async fn send_token_request(
    http_client: Client,
    request: HttpRequest,
) -> Result<HttpResponse, reqwest::Error> {
    let response = http_client
        .request(request.method, request.url.as_str())
        .headers(request.headers)
        .body(request.body)
        .send()
        .await?;

    let status_code = response.status();
    let headers = response.headers().clone();
    let body = response.bytes().await?.to_vec();

    Ok(HttpResponse {
        status_code,
        headers,
        body,
    })
}
