use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Reddit API error: {0}")]
    RedditApi(#[from] RedditApiError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Could not write report to {path}: {source}")]
    ReportWrite {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Operation timeout after {seconds} seconds")]
    Timeout { seconds: u64 },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl CoreError {
    /// True for the errors that mean the target user cannot be analyzed.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            CoreError::RedditApi(RedditApiError::UserNotFound { .. })
                | CoreError::RedditApi(RedditApiError::NoPublicActivity { .. })
        )
    }
}

#[derive(Error, Debug, Clone)]
pub enum RedditApiError {
    #[error("Authentication failed: {reason}")]
    AuthenticationFailed { reason: String },

    #[error("Rate limit exceeded{}", .retry_after.map(|s| format!(". Retry after {s} seconds")).unwrap_or_default())]
    RateLimitExceeded { retry_after: Option<u64> },

    #[error("Forbidden access to resource: {resource}")]
    Forbidden { resource: String },

    #[error("User not found or suspended: {username}")]
    UserNotFound { username: String },

    #[error("User {username} has no public posts or comments")]
    NoPublicActivity { username: String },

    #[error("Invalid OAuth token")]
    InvalidToken,

    #[error("Invalid API response: {details}")]
    InvalidResponse { details: String },

    #[error("Server error: {status_code}")]
    ServerError { status_code: u16 },
}

#[derive(Error, Debug, Clone)]
pub enum LlmError {
    #[error("API key invalid or missing for {provider}")]
    InvalidApiKey { provider: String },

    #[error("Rate limit exceeded for {provider}{}", .retry_after.map(|s| format!(". Retry after {s} seconds")).unwrap_or_default())]
    RateLimitExceeded {
        provider: String,
        retry_after: Option<u64>,
    },

    #[error("Quota exceeded for {provider}: {details}")]
    QuotaExceeded { provider: String, details: String },

    #[error("Model not available: {model}")]
    ModelNotAvailable { model: String },

    #[error("Content filtered by provider: {reason}")]
    ContentFiltered { reason: String },

    #[error("Provider service unavailable: {provider} (HTTP {status_code})")]
    ServiceUnavailable { provider: String, status_code: u16 },

    #[error("{provider} returned an empty completion")]
    EmptyResponse { provider: String },

    #[error("Invalid response format from {provider}: {details}")]
    InvalidResponseFormat { provider: String, details: String },

    #[error("Request to {provider} failed with HTTP {status_code}: {message}")]
    RequestFailed {
        provider: String,
        status_code: u16,
        message: String,
    },
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: String },

    #[error("Invalid value for {field}: {value}")]
    InvalidValue { field: String, value: String },

    #[error("Environment variables not set: {}", .var_names.join(", "))]
    MissingEnvironmentVariables { var_names: Vec<String> },

    #[error("Could not read configuration file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Configuration parsing error: {0}")]
    Parse(#[from] toml::de::Error),
}
