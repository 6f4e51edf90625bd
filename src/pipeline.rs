//! Suggestion generation pipeline
//!
//! Validating -> Invoking -> Extracting, with any stage able to short-circuit
//! to a typed failure. Only the model call suspends; everything else is local
//! and synchronous. Nothing is retried across stages: retrying the model call
//! is the client's business (see `RetryingClient`).

use crate::error::GenerationError;
use crate::github;
use crate::suggest::llm::{extract_suggestions, prompts, SuggestionClient};
use crate::suggest::{GenerationRequest, GenerationResult};
use crate::util::log_preview;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

const RAW_PREVIEW_CHARS: usize = 500;

/// Where a generation run currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Idle,
    Validating,
    Invoking,
    Extracting,
    Succeeded,
    Failed,
    Cancelled,
}

impl Stage {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Stage::Succeeded | Stage::Failed | Stage::Cancelled)
    }
}

type StageObserver = Box<dyn Fn(Stage) + Send + Sync>;

/// Clears the in-flight flag when a run ends, including when its future is dropped.
struct InFlightGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> InFlightGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Runs repository URL -> prompt -> model -> suggestions.
///
/// One run at a time: a call made while another is in flight fails with
/// [`GenerationError::Busy`] without touching the model.
pub struct Generator<C> {
    client: C,
    stage: Mutex<Stage>,
    in_flight: AtomicBool,
    observer: Option<StageObserver>,
}

impl<C: SuggestionClient> Generator<C> {
    pub fn new(client: C) -> Self {
        Self {
            client,
            stage: Mutex::new(Stage::Idle),
            in_flight: AtomicBool::new(false),
            observer: None,
        }
    }

    /// Call `observer` on every stage transition.
    pub fn with_observer(mut self, observer: impl Fn(Stage) + Send + Sync + 'static) -> Self {
        self.observer = Some(Box::new(observer));
        self
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// Stage of the current run, or the terminal stage of the last one.
    pub fn stage(&self) -> Stage {
        self.stage.lock().map(|s| *s).unwrap_or(Stage::Idle)
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    pub async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<GenerationResult, GenerationError> {
        self.generate_until(request, std::future::pending()).await
    }

    /// Like [`generate`](Self::generate), but gives up when `cancel` resolves
    /// while the model call is outstanding. A cancelled run never reaches
    /// extraction.
    pub async fn generate_until<F>(
        &self,
        request: &GenerationRequest,
        cancel: F,
    ) -> Result<GenerationResult, GenerationError>
    where
        F: Future<Output = ()>,
    {
        let Some(_guard) = InFlightGuard::acquire(&self.in_flight) else {
            tracing::warn!("generation requested while another is in flight");
            return Err(GenerationError::Busy);
        };

        let result = self.run(request, cancel).await;
        self.transition(match &result {
            Ok(_) => Stage::Succeeded,
            Err(GenerationError::Cancelled) => Stage::Cancelled,
            Err(_) => Stage::Failed,
        });
        result
    }

    async fn run<F>(
        &self,
        request: &GenerationRequest,
        cancel: F,
    ) -> Result<GenerationResult, GenerationError>
    where
        F: Future<Output = ()>,
    {
        self.transition(Stage::Validating);
        let repository = github::locate(&request.repository_url).ok_or_else(|| {
            tracing::info!(url = %request.repository_url, "rejected repository URL");
            GenerationError::InvalidInput {
                url: request.repository_url.clone(),
            }
        })?;
        let prompt = prompts::build(&repository, request.goals(), request.scan_todos);

        self.transition(Stage::Invoking);
        tracing::info!(repo = %repository, scan_todos = request.scan_todos, "requesting suggestions");
        let response = tokio::select! {
            biased;
            _ = cancel => {
                tracing::info!(repo = %repository, "generation cancelled");
                return Err(GenerationError::Cancelled);
            }
            result = self.client.invoke(&prompt) => result.map_err(|err| {
                tracing::warn!(repo = %repository, error = %err, "model call failed");
                GenerationError::from(err)
            })?,
        };
        if let Some(usage) = &response.usage {
            tracing::debug!(
                prompt_tokens = usage.prompt_token_count,
                response_tokens = usage.candidates_token_count,
                total_tokens = usage.total_token_count,
                "model usage"
            );
        }
        if !response.search_queries.is_empty() {
            tracing::debug!(queries = ?response.search_queries, "model searched the web");
        }

        self.transition(Stage::Extracting);
        let suggestions = extract_suggestions(&response.text).map_err(|err| {
            tracing::error!(
                reason = %err.reason,
                raw = %log_preview(&err.raw, RAW_PREVIEW_CHARS),
                "failed to parse model response"
            );
            tracing::debug!(raw = %err.raw, "full model response");
            GenerationError::from(err)
        })?;

        if suggestions.is_empty() {
            tracing::warn!(repo = %repository, "model returned an empty suggestion list");
        } else {
            tracing::info!(repo = %repository, count = suggestions.len(), "suggestions ready");
        }

        Ok(GenerationResult {
            repository,
            suggestions,
        })
    }

    fn transition(&self, stage: Stage) {
        tracing::debug!(?stage, "pipeline stage");
        if let Ok(mut current) = self.stage.lock() {
            *current = stage;
        }
        if let Some(observer) = &self.observer {
            observer(stage);
        }
    }
}
