use serde::{Deserialize, Serialize};

/// Gemini models that support search grounding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Model {
    /// Speed tier - fast, cheap, good enough for three suggestions (gemini-2.5-flash)
    #[default]
    Flash,
    /// Smart tier - slower, deeper research (gemini-2.5-pro)
    Pro,
}

impl Model {
    pub fn id(&self) -> &'static str {
        match self {
            Model::Flash => "gemini-2.5-flash",
            Model::Pro => "gemini-2.5-pro",
        }
    }
}

/// Token accounting reported by Gemini in `usageMetadata`
#[derive(Deserialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Usage {
    #[serde(default)]
    pub prompt_token_count: u32,
    #[serde(default)]
    pub candidates_token_count: u32,
    #[serde(default)]
    pub total_token_count: u32,
}

/// Raw text returned by the model plus what we know about how it got there.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModelResponse {
    pub text: String,
    pub usage: Option<Usage>,
    /// Queries the model issued through search grounding
    pub search_queries: Vec<String>,
}

impl ModelResponse {
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }
}
