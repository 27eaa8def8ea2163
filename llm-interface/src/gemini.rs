use crate::prompt::Prompt;
use crate::PersonaRequester;
use persona_core::{CoreError, LlmError, RetryExecutor, RetryPolicy, Settings};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

pub const PROVIDER_NAME: &str = "gemini";

const TOP_P: f32 = 0.8;
const TOP_K: u32 = 40;
const MAX_OUTPUT_TOKENS: u32 = 4096;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<RequestContent<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Clone, Serialize)]
struct RequestContent<'a> {
    role: &'static str,
    parts: Vec<RequestPart<'a>>,
}

#[derive(Debug, Clone, Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    top_p: f32,
    top_k: u32,
    max_output_tokens: u32,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct GenerateContentResponse {
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct CandidateContent {
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct CandidatePart {
    text: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct UsageMetadata {
    prompt_token_count: u64,
    candidates_token_count: u64,
}

impl GenerateContentResponse {
    /// Concatenated text of the first candidate, or the reason there is none.
    fn into_text(self) -> Result<String, LlmError> {
        if let Some(reason) = self.prompt_feedback.and_then(|f| f.block_reason) {
            return Err(LlmError::ContentFiltered { reason });
        }

        let Some(candidate) = self.candidates.into_iter().next() else {
            return Ok(String::new());
        };

        let text: String = candidate
            .content
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();

        if text.trim().is_empty() {
            if let Some(reason) = candidate.finish_reason.filter(|r| r == "SAFETY") {
                return Err(LlmError::ContentFiltered { reason });
            }
        }
        Ok(text)
    }
}

/// The parts of a Gemini error body that decide how a failure is classified.
#[derive(Debug, Default, PartialEq)]
struct ApiErrorBody {
    message: String,
    status: Option<String>,
    retry_delay_secs: Option<u64>,
}

fn parse_api_error(body: &str, status: u16) -> ApiErrorBody {
    let Ok(json) = serde_json::from_str::<serde_json::Value>(body) else {
        return ApiErrorBody {
            message: format!("HTTP {}: {}", status, body),
            ..Default::default()
        };
    };

    let error = &json["error"];
    let retry_delay_secs = error["details"].as_array().and_then(|details| {
        details
            .iter()
            .filter(|d| {
                d["@type"]
                    .as_str()
                    .is_some_and(|t| t.ends_with("RetryInfo"))
            })
            .find_map(|d| d["retryDelay"].as_str())
            .and_then(parse_duration_secs)
    });

    ApiErrorBody {
        message: error["message"].as_str().unwrap_or("Unknown error").to_string(),
        status: error["status"].as_str().map(String::from),
        retry_delay_secs,
    }
}

/// Parses protobuf duration strings such as `"37s"` or `"1.5s"`, rounding up.
fn parse_duration_secs(value: &str) -> Option<u64> {
    let secs: f64 = value.trim().strip_suffix('s')?.parse().ok()?;
    (secs >= 0.0).then(|| secs.ceil() as u64)
}

fn is_daily_quota(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("billing") || lower.contains("per day") || message.contains("PerDay")
}

fn is_invalid_key(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("api key") || lower.contains("api_key")
}

fn classify_error(
    status: StatusCode,
    retry_after_header: Option<u64>,
    body: &ApiErrorBody,
    model: &str,
) -> LlmError {
    let provider = PROVIDER_NAME.to_string();
    match status {
        StatusCode::TOO_MANY_REQUESTS if is_daily_quota(&body.message) => LlmError::QuotaExceeded {
            provider,
            details: body.message.clone(),
        },
        StatusCode::TOO_MANY_REQUESTS => LlmError::RateLimitExceeded {
            provider,
            retry_after: retry_after_header.or(body.retry_delay_secs),
        },
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => LlmError::InvalidApiKey { provider },
        StatusCode::BAD_REQUEST if is_invalid_key(&body.message) => {
            LlmError::InvalidApiKey { provider }
        }
        StatusCode::NOT_FOUND => LlmError::ModelNotAvailable {
            model: model.to_string(),
        },
        s if s.is_server_error() => LlmError::ServiceUnavailable {
            provider,
            status_code: s.as_u16(),
        },
        s => LlmError::RequestFailed {
            provider,
            status_code: s.as_u16(),
            message: body.message.clone(),
        },
    }
}

/// Client for the Gemini `generateContent` endpoint.
#[derive(Clone)]
pub struct GeminiProvider {
    http_client: Client,
    api_key: String,
    base_url: String,
    model: String,
    temperature: f32,
    timeout_secs: u64,
    retry: Arc<RetryExecutor>,
}

impl std::fmt::Debug for GeminiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiProvider")
            .field("api_key", &"[REDACTED]")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .finish()
    }
}

impl GeminiProvider {
    /// Builds the HTTP client. No requests are made.
    pub fn new(api_key: &str, settings: &Settings) -> Result<Self, CoreError> {
        let http_client = Client::builder()
            .timeout(settings.request_timeout())
            .build()?;

        Ok(Self {
            http_client,
            api_key: api_key.to_string(),
            base_url: settings.gemini_api_base.trim_end_matches('/').to_string(),
            model: settings.gemini_model.clone(),
            temperature: settings.temperature,
            timeout_secs: settings.request_timeout_secs,
            retry: Arc::new(RetryExecutor::new(RetryPolicy::gemini())),
        })
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry = Arc::new(RetryExecutor::new(policy));
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn retry_executor(&self) -> &RetryExecutor {
        &self.retry
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }

    async fn generate(&self, prompt_text: &str) -> Result<String, CoreError> {
        self.retry
            .execute("gemini generate", || self.generate_once(prompt_text))
            .await
    }

    /// One `generateContent` call. An empty completion is returned as an
    /// empty string; the caller decides what to do with it.
    async fn generate_once(&self, prompt_text: &str) -> Result<String, CoreError> {
        let request = GenerateContentRequest {
            contents: vec![RequestContent {
                role: "user",
                parts: vec![RequestPart { text: prompt_text }],
            }],
            generation_config: GenerationConfig {
                temperature: self.temperature,
                top_p: TOP_P,
                top_k: TOP_K,
                max_output_tokens: MAX_OUTPUT_TOKENS,
            },
        };

        debug!("Sending Gemini request to model {}", self.model);
        let response = self
            .http_client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                error!("Network error calling Gemini: {}", e);
                if e.is_timeout() {
                    CoreError::Timeout {
                        seconds: self.timeout_secs,
                    }
                } else {
                    CoreError::Network(e)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok());
            let body = response.text().await.unwrap_or_default();
            let parsed = parse_api_error(&body, status.as_u16());
            error!(
                "Gemini request failed with status {} ({:?}): {}",
                status, parsed.status, parsed.message
            );
            return Err(classify_error(status, retry_after, &parsed, &self.model).into());
        }

        let body: GenerateContentResponse = response.json().await.map_err(|e| {
            error!("Failed to parse Gemini response: {}", e);
            LlmError::InvalidResponseFormat {
                provider: PROVIDER_NAME.to_string(),
                details: e.to_string(),
            }
        })?;

        if let Some(usage) = &body.usage_metadata {
            debug!(
                "Gemini usage: {} prompt tokens, {} completion tokens",
                usage.prompt_token_count, usage.candidates_token_count
            );
        }

        Ok(body.into_text()?)
    }
}

impl PersonaRequester for GeminiProvider {
    async fn request_persona(&self, prompt: &Prompt) -> Result<String, CoreError> {
        info!(
            "Requesting persona from {} ({} prompt chars)",
            self.model,
            prompt.char_count()
        );

        match self.generate(&prompt.text).await {
            Ok(text) if !text.trim().is_empty() => return Ok(text),
            Ok(_) => warn!("Gemini returned an empty completion, asking once more"),
            Err(CoreError::Llm(LlmError::InvalidResponseFormat { details, .. })) => {
                warn!("Gemini returned an unreadable completion ({}), asking once more", details)
            }
            Err(e) => return Err(e),
        }

        let text = self.generate(&prompt.text).await?;
        if text.trim().is_empty() {
            return Err(LlmError::EmptyResponse {
                provider: PROVIDER_NAME.to_string(),
            }
            .into());
        }
        Ok(text)
    }
}
