use crate::error::ConfigError;
use crate::types::FetchLimits;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

pub const REQUIRED_ENV_VARS: [&str; 5] = [
    "REDDIT_CLIENT_ID",
    "REDDIT_CLIENT_SECRET",
    "REDDIT_USERNAME",
    "REDDIT_PASSWORD",
    "GEMINI_API_KEY",
];

pub const USER_AGENT_ENV: &str = "REDDIT_USER_AGENT";
pub const CONFIG_PATH_ENV: &str = "PERSONA_CONFIG";

pub fn default_user_agent() -> String {
    format!("redditor-persona/{}", env!("CARGO_PKG_VERSION"))
}

#[derive(Clone)]
pub struct RedditCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub username: String,
    pub password: String,
    pub user_agent: String,
}

impl std::fmt::Debug for RedditCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedditCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("user_agent", &self.user_agent)
            .finish()
    }
}

/// Tunables read from the optional TOML settings file.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub max_posts: usize,
    pub max_comments: usize,
    pub request_timeout_secs: u64,
    pub prompt_budget_chars: usize,
    pub output_dir: PathBuf,
    pub gemini_model: String,
    pub temperature: f32,
    pub reddit_api_base: String,
    pub reddit_token_url: String,
    pub gemini_api_base: String,
}

impl Default for Settings {
    fn default() -> Self {
        let limits = FetchLimits::default();
        Self {
            max_posts: limits.max_posts,
            max_comments: limits.max_comments,
            request_timeout_secs: 30,
            prompt_budget_chars: 30_000,
            output_dir: PathBuf::from("."),
            gemini_model: "gemini-1.5-flash".to_string(),
            temperature: 0.7,
            reddit_api_base: "https://oauth.reddit.com".to_string(),
            reddit_token_url: "https://www.reddit.com/api/v1/access_token".to_string(),
            gemini_api_base: "https://generativelanguage.googleapis.com/v1beta".to_string(),
        }
    }
}

impl Settings {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let settings: Settings = toml::from_str(content)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::FileNotFound {
                path: path.display().to_string(),
            });
        }
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let settings = Self::from_toml_str(&content)?;
        info!("Loaded settings from {}", path.display());
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |field: &str, value: String| ConfigError::InvalidValue {
            field: field.to_string(),
            value,
        };

        if self.max_posts == 0 {
            return Err(invalid("max_posts", self.max_posts.to_string()));
        }
        if self.max_comments == 0 {
            return Err(invalid("max_comments", self.max_comments.to_string()));
        }
        if self.request_timeout_secs == 0 {
            return Err(invalid(
                "request_timeout_secs",
                self.request_timeout_secs.to_string(),
            ));
        }
        if self.prompt_budget_chars == 0 {
            return Err(invalid(
                "prompt_budget_chars",
                self.prompt_budget_chars.to_string(),
            ));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(invalid("temperature", self.temperature.to_string()));
        }
        if self.gemini_model.trim().is_empty() {
            return Err(invalid("gemini_model", self.gemini_model.clone()));
        }
        Ok(())
    }

    pub fn limits(&self) -> FetchLimits {
        FetchLimits {
            max_posts: self.max_posts,
            max_comments: self.max_comments,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Everything a run needs, built once at startup and passed by reference.
#[derive(Clone)]
pub struct AppConfig {
    pub reddit: RedditCredentials,
    pub gemini_api_key: String,
    pub settings: Settings,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("reddit", &self.reddit)
            .field("gemini_api_key", &"[REDACTED]")
            .field("settings", &self.settings)
            .finish()
    }
}

impl AppConfig {
    /// Builds the config from any variable source. Every missing required
    /// variable is reported in one error.
    pub fn from_lookup<F>(lookup: F, settings: Settings) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let missing: Vec<String> = REQUIRED_ENV_VARS
            .iter()
            .filter(|key| get(**key).is_none())
            .map(|key| key.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(ConfigError::MissingEnvironmentVariables { var_names: missing });
        }

        settings.validate()?;

        let required = |key: &str| get(key).unwrap_or_default();
        let config = Self {
            reddit: RedditCredentials {
                client_id: required("REDDIT_CLIENT_ID"),
                client_secret: required("REDDIT_CLIENT_SECRET"),
                username: required("REDDIT_USERNAME"),
                password: required("REDDIT_PASSWORD"),
                user_agent: get(USER_AGENT_ENV).unwrap_or_else(default_user_agent),
            },
            gemini_api_key: required("GEMINI_API_KEY"),
            settings,
        };
        debug!("Configuration loaded: {:?}", config);
        Ok(config)
    }

    /// Reads the process environment. Settings come from the file named by
    /// `PERSONA_CONFIG`, or `settings_path` when given, else defaults.
    pub fn from_env(settings_path: Option<&Path>) -> Result<Self, ConfigError> {
        let env_path = std::env::var(CONFIG_PATH_ENV).ok().map(PathBuf::from);
        let settings = match settings_path.map(Path::to_path_buf).or(env_path) {
            Some(path) => Settings::load(&path)?,
            None => Settings::default(),
        };
        Self::from_lookup(|key| std::env::var(key).ok(), settings)
    }
}
