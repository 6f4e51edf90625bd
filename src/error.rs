//! Error taxonomy for the generation pipeline
//!
//! `Display` carries diagnostics for logs. What the user sees comes from
//! `user_message()`, which never includes raw model text or transport detail.

use thiserror::Error;

/// Failure talking to the model service.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UpstreamError {
    /// HTTP 400. Most often the repository is private or unknown to search.
    #[error("model service rejected the request (400): {0}")]
    BadRequest(String),
    #[error("model service refused the API key ({status})")]
    Unauthorized { status: u16 },
    #[error("model service rate limited the request: {0}")]
    RateLimited(String),
    #[error("model service error ({status}): {body}")]
    Server { status: u16, body: String },
    #[error("unexpected model service status ({status}): {body}")]
    Status { status: u16, body: String },
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("undecodable model service response: {0}")]
    Decode(String),
    #[error("no API key configured")]
    MissingApiKey,
    /// The call succeeded but carried no text.
    #[error("model returned no text")]
    EmptyResponse,
}

impl UpstreamError {
    /// Whether another attempt could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            UpstreamError::RateLimited(_)
                | UpstreamError::Server { .. }
                | UpstreamError::Transport(_)
        )
    }

    pub fn user_message(&self) -> String {
        match self {
            UpstreamError::BadRequest(_) => {
                "AI request failed. The repository might be private or inaccessible.".to_string()
            }
            UpstreamError::Unauthorized { .. } => {
                "Invalid API key. Run 'lightning setup' to update it.".to_string()
            }
            UpstreamError::MissingApiKey => {
                "No API key configured. Run 'lightning setup' or set GEMINI_API_KEY.".to_string()
            }
            UpstreamError::EmptyResponse => {
                "No data received from AI. Please try again.".to_string()
            }
            _ => "Failed to generate suggestions. Please try again later.".to_string(),
        }
    }
}

/// The model answered, but the text was not a valid suggestion array.
///
/// `raw` keeps the untouched model output for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("could not parse model response: {reason}")]
pub struct ParseError {
    pub reason: String,
    pub raw: String,
}

/// Typed failure of a generation run.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("not a GitHub repository URL: {url:?}")]
    InvalidInput { url: String },
    #[error(transparent)]
    Upstream(#[from] UpstreamError),
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error("generation cancelled")]
    Cancelled,
    #[error("a generation is already in progress")]
    Busy,
}

impl GenerationError {
    /// Short, actionable text for the end user.
    pub fn user_message(&self) -> String {
        match self {
            GenerationError::InvalidInput { .. } => {
                "Please enter a valid GitHub repository URL.".to_string()
            }
            GenerationError::Upstream(err) => err.user_message(),
            GenerationError::Parse(_) => {
                "Failed to parse AI response. Please try again.".to_string()
            }
            GenerationError::Cancelled => "Generation cancelled.".to_string(),
            GenerationError::Busy => {
                "Suggestions are already being generated. Please wait.".to_string()
            }
        }
    }

    pub fn is_upstream(&self) -> bool {
        matches!(self, GenerationError::Upstream(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bad_request_has_specific_message() {
        let err = GenerationError::from(UpstreamError::BadRequest("denied".into()));
        assert!(err.user_message().contains("private or inaccessible"));
        assert!(!err.user_message().contains("denied"));
    }

    #[test]
    fn test_other_upstream_failures_are_generic() {
        let generic = UpstreamError::Transport("dns".into()).user_message();
        assert_eq!(
            UpstreamError::Server {
                status: 503,
                body: "x".into()
            }
            .user_message(),
            generic
        );
        assert!(!generic.contains("dns"));
    }

    #[test]
    fn test_parse_error_hides_raw_text() {
        let err = GenerationError::from(ParseError {
            reason: "expected value".into(),
            raw: "Sorry, I cannot help.".into(),
        });
        assert!(!err.user_message().contains("Sorry"));
        assert!(!err.to_string().contains("Sorry"));
    }

    #[test]
    fn test_empty_response_counts_as_upstream() {
        let err = GenerationError::from(UpstreamError::EmptyResponse);
        assert!(err.is_upstream());
        assert!(err.user_message().contains("No data"));
        assert!(!GenerationError::Cancelled.is_upstream());
    }

    #[test]
    fn test_retryable_classification() {
        assert!(UpstreamError::RateLimited(String::new()).is_retryable());
        assert!(UpstreamError::Transport(String::new()).is_retryable());
        assert!(!UpstreamError::BadRequest(String::new()).is_retryable());
        assert!(!UpstreamError::MissingApiKey.is_retryable());
        assert!(!UpstreamError::EmptyResponse.is_retryable());
        assert!(!UpstreamError::Unauthorized { status: 401 }.is_retryable());
    }
}
