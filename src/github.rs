//! GitHub URL handling
//!
//! Turns a user-supplied repository URL into an owner/name pair and builds the
//! pre-filled "new issue" link for a suggestion. Everything here is purely
//! syntactic: no request is made to GitHub, so a located repository may still
//! not exist.

use crate::suggest::IssueSuggestion;
use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

const GITHUB_HOST: &str = "github.com";

/// Owner/name pair that addresses a GitHub repository.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepositoryIdentifier {
    owner: String,
    name: String,
}

impl RepositoryIdentifier {
    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Canonical `https://github.com/{owner}/{name}` URL.
    pub fn html_url(&self) -> String {
        format!("https://{}/{}/{}", GITHUB_HOST, self.owner, self.name)
    }

    /// Site-scoped search prefix, e.g. `site:github.com/octocat/Hello-World`.
    pub fn site_scope(&self) -> String {
        format!("site:{}/{}/{}", GITHUB_HOST, self.owner, self.name)
    }
}

impl fmt::Display for RepositoryIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// Locate the repository a URL points at.
///
/// Requires an absolute URL whose host is exactly `github.com` and whose path
/// has at least two non-empty segments. Extra segments such as `/tree/main`
/// are ignored. Anything else yields `None`.
pub fn locate(url: &str) -> Option<RepositoryIdentifier> {
    let parsed = Url::parse(url.trim()).ok()?;
    if parsed.host_str() != Some(GITHUB_HOST) {
        return None;
    }

    let mut segments = parsed.path_segments()?.filter(|s| !s.is_empty());
    let owner = segments.next()?;
    let name = segments.next()?;

    Some(RepositoryIdentifier {
        owner: owner.to_string(),
        name: name.to_string(),
    })
}

/// Build the GitHub "new issue" URL pre-filled with a suggestion.
///
/// The `labels` value follows GitHub's default label set; see
/// [`IssueType::label`](crate::suggest::IssueType::label).
pub fn new_issue_url(repo: &RepositoryIdentifier, suggestion: &IssueSuggestion) -> String {
    let base = format!("{}/issues/new", repo.html_url());
    match Url::parse_with_params(
        &base,
        &[
            ("title", suggestion.title.as_str()),
            ("body", suggestion.body.as_str()),
            ("labels", suggestion.kind.label()),
        ],
    ) {
        Ok(url) => url.into(),
        // Owner and name came out of a parsed URL, so the base always parses.
        Err(_) => base,
    }
}
