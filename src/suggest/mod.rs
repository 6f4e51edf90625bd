//! Issue suggestions
//!
//! The data model shared by the generation pipeline, the history store and the
//! CLI. Suggestions come back from the model as JSON, so the serde shape here
//! is also the wire contract the prompt asks the model to follow.

pub mod llm;

use crate::github::RepositoryIdentifier;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Category of a suggested issue.
///
/// Closed set: the model must answer with one of these exact names, anything
/// else fails validation instead of being coerced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IssueType {
    Bug,
    Feature,
    Refactor,
    Documentation,
}

impl IssueType {
    pub const ALL: [IssueType; 4] = [
        IssueType::Bug,
        IssueType::Feature,
        IssueType::Refactor,
        IssueType::Documentation,
    ];

    /// Name as it appears in model output and in history snapshots.
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueType::Bug => "Bug",
            IssueType::Feature => "Feature",
            IssueType::Refactor => "Refactor",
            IssueType::Documentation => "Documentation",
        }
    }

    /// GitHub label applied when the issue is filed.
    pub fn label(&self) -> &'static str {
        match self {
            IssueType::Bug => "bug",
            IssueType::Feature => "enhancement",
            IssueType::Documentation => "documentation",
            IssueType::Refactor => "refactor",
        }
    }
}

impl fmt::Display for IssueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single proposed issue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueSuggestion {
    pub title: String,
    /// GitHub-flavored Markdown
    pub body: String,
    #[serde(rename = "type")]
    pub kind: IssueType,
    pub reasoning: String,
}

impl IssueSuggestion {
    /// Name of the first required text field that is blank, if any.
    pub fn first_blank_field(&self) -> Option<&'static str> {
        [
            ("title", &self.title),
            ("body", &self.body),
            ("reasoning", &self.reasoning),
        ]
        .into_iter()
        .find(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| name)
    }
}

/// Input for one generation run. Never persisted.
#[derive(Debug, Clone, Default)]
pub struct GenerationRequest {
    pub repository_url: String,
    pub goals: Option<String>,
    pub scan_todos: bool,
}

impl GenerationRequest {
    pub fn new(repository_url: impl Into<String>) -> Self {
        Self {
            repository_url: repository_url.into(),
            ..Self::default()
        }
    }

    pub fn with_goals(mut self, goals: impl Into<String>) -> Self {
        self.goals = Some(goals.into());
        self
    }

    pub fn with_scan_todos(mut self, scan_todos: bool) -> Self {
        self.scan_todos = scan_todos;
        self
    }

    /// Goals exactly as entered, or `None` when missing or blank.
    pub fn goals(&self) -> Option<&str> {
        self.goals
            .as_deref()
            .filter(|goals| !goals.trim().is_empty())
    }
}

/// Successful outcome of a generation run, in model order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationResult {
    pub repository: RepositoryIdentifier,
    pub suggestions: Vec<IssueSuggestion>,
}
