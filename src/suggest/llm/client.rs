use super::models::{Model, ModelResponse, Usage};
use crate::error::UpstreamError;
use crate::util::truncate_str;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

/// Gemini REST endpoint root
pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Maximum length for error body content in error messages
const MAX_ERROR_BODY_LEN: usize = 200;

/// Rate limit retry configuration
const INITIAL_BACKOFF_MS: u64 = 2000; // 2 seconds
const BACKOFF_MULTIPLIER: u32 = 2; // Exponential backoff

/// The one place the pipeline talks to a model.
///
/// Implementations make exactly one attempt per call. Retries belong in
/// [`RetryingClient`], which wraps any implementation without changing this
/// contract.
pub trait SuggestionClient {
    fn invoke(
        &self,
        prompt: &str,
    ) -> impl Future<Output = Result<ModelResponse, UpstreamError>> + Send;
}

/// Connection settings for [`GeminiClient`].
#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub api_key: Option<String>,
    pub model: Model,
    pub base_url: String,
    pub timeout: Duration,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            model: Model::default(),
            base_url: GEMINI_BASE_URL.to_string(),
            timeout: Duration::from_secs(120),
        }
    }
}

#[derive(Serialize)]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
    tools: Vec<Tool>,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: Vec<PromptPart<'a>>,
}

#[derive(Serialize)]
struct PromptPart<'a> {
    text: &'a str,
}

/// Enables search grounding for the request
#[derive(Serialize)]
struct Tool {
    google_search: GoogleSearch,
}

#[derive(Serialize)]
struct GoogleSearch {}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    usage_metadata: Option<Usage>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    grounding_metadata: Option<GroundingMetadata>,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    text: Option<String>,
    /// Set on reasoning summaries, which are not part of the answer
    #[serde(default)]
    thought: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GroundingMetadata {
    #[serde(default)]
    web_search_queries: Vec<String>,
}

/// Gemini `generateContent` client with Google Search grounding enabled.
#[derive(Debug, Clone)]
pub struct GeminiClient {
    http: reqwest::Client,
    settings: ClientSettings,
}

impl GeminiClient {
    pub fn new(settings: ClientSettings) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(settings.timeout)
            .build()?;
        Ok(Self { http, settings })
    }

    pub fn model(&self) -> Model {
        self.settings.model
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.settings.base_url.trim_end_matches('/'),
            self.settings.model.id()
        )
    }

    async fn call(&self, prompt: &str) -> Result<ModelResponse, UpstreamError> {
        let api_key = self
            .settings
            .api_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .ok_or(UpstreamError::MissingApiKey)?;

        let request = GenerateContentRequest {
            contents: vec![Content {
                parts: vec![PromptPart { text: prompt }],
            }],
            tools: vec![Tool {
                google_search: GoogleSearch {},
            }],
        };

        tracing::debug!(model = self.settings.model.id(), "calling Gemini");
        let response = self
            .http
            .post(self.endpoint())
            .header("Content-Type", "application/json")
            .header("x-goog-api-key", api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| UpstreamError::Transport(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| UpstreamError::Transport(e.to_string()))?;

        if !status.is_success() {
            return Err(classify_status(status.as_u16(), &text));
        }

        let parsed: GenerateContentResponse = serde_json::from_str(&text).map_err(|e| {
            UpstreamError::Decode(format!("{} ({})", e, truncate_str(&text, MAX_ERROR_BODY_LEN)))
        })?;
        response_from_envelope(parsed)
    }
}

impl SuggestionClient for GeminiClient {
    fn invoke(
        &self,
        prompt: &str,
    ) -> impl Future<Output = Result<ModelResponse, UpstreamError>> + Send {
        self.call(prompt)
    }
}

/// Map a non-success HTTP status to an upstream error.
fn classify_status(status: u16, body: &str) -> UpstreamError {
    let body = truncate_str(body, MAX_ERROR_BODY_LEN).to_string();
    match status {
        400 => UpstreamError::BadRequest(body),
        401 | 403 => UpstreamError::Unauthorized { status },
        429 => UpstreamError::RateLimited(body),
        500..=599 => UpstreamError::Server { status, body },
        _ => UpstreamError::Status { status, body },
    }
}

/// Pull the answer text out of a decoded response.
///
/// The text is every non-thought part of the first candidate joined together;
/// nothing (or only whitespace) counts as an empty response.
fn response_from_envelope(
    envelope: GenerateContentResponse,
) -> Result<ModelResponse, UpstreamError> {
    let Some(candidate) = envelope.candidates.into_iter().next() else {
        return Err(UpstreamError::EmptyResponse);
    };

    let text: String = candidate
        .content
        .map(|c| c.parts)
        .unwrap_or_default()
        .into_iter()
        .filter(|p| !p.thought)
        .filter_map(|p| p.text)
        .collect();

    if text.trim().is_empty() {
        tracing::warn!(
            finish_reason = candidate.finish_reason.as_deref().unwrap_or("unknown"),
            "Gemini returned no text"
        );
        return Err(UpstreamError::EmptyResponse);
    }

    let search_queries = candidate
        .grounding_metadata
        .map(|g| g.web_search_queries)
        .unwrap_or_default();

    Ok(ModelResponse {
        text,
        usage: envelope.usage_metadata,
        search_queries,
    })
}

/// Retries transient failures of an inner client with exponential backoff.
///
/// Only rate limits, server errors and transport failures are retried. With
/// `max_retries == 0` this is a plain pass-through.
#[derive(Debug, Clone)]
pub struct RetryingClient<C> {
    inner: C,
    max_retries: u32,
    initial_backoff: Duration,
}

impl<C: SuggestionClient + Sync> RetryingClient<C> {
    pub fn new(inner: C, max_retries: u32) -> Self {
        Self {
            inner,
            max_retries,
            initial_backoff: Duration::from_millis(INITIAL_BACKOFF_MS),
        }
    }

    pub fn with_initial_backoff(mut self, backoff: Duration) -> Self {
        self.initial_backoff = backoff;
        self
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }

    fn backoff_for(&self, attempt: u32) -> Duration {
        self.initial_backoff
            .saturating_mul(BACKOFF_MULTIPLIER.saturating_pow(attempt.saturating_sub(1)))
    }

    async fn call(&self, prompt: &str) -> Result<ModelResponse, UpstreamError> {
        let mut retry_count = 0;
        loop {
            match self.inner.invoke(prompt).await {
                Err(err) if err.is_retryable() && retry_count < self.max_retries => {
                    retry_count += 1;
                    let delay = self.backoff_for(retry_count);
                    tracing::warn!(
                        error = %err,
                        attempt = retry_count,
                        max_retries = self.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        "model call failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                other => return other,
            }
        }
    }
}

impl<C: SuggestionClient + Sync> SuggestionClient for RetryingClient<C> {
    fn invoke(
        &self,
        prompt: &str,
    ) -> impl Future<Output = Result<ModelResponse, UpstreamError>> + Send {
        self.call(prompt)
    }
}
