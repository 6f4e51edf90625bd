pub mod client;
pub mod models;
pub mod parse;
pub mod prompts;

pub use client::{ClientSettings, GeminiClient, RetryingClient, SuggestionClient};
pub use models::{Model, ModelResponse, Usage};
pub use parse::extract_suggestions;
