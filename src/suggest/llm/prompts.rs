//! Prompt construction
//!
//! Pure string assembly: the same repository, goals and flag always give the
//! same bytes, so everything here is testable without the network.

use crate::github::RepositoryIdentifier;

/// Number of suggestions requested when not scanning for TODOs.
pub const DEFAULT_SUGGESTION_COUNT: usize = 3;

/// Marker words searched for when the TODO scan is enabled.
pub const TODO_MARKERS: [&str; 3] = ["TODO", "FIXME", "HACK"];

pub const OUTPUT_CONTRACT: &str = r#"IMPORTANT OUTPUT FORMAT:
You must return a valid JSON array and nothing else.
Each element must have exactly these four fields:
- "title": a clear, professional title
- "body": a very detailed body in GitHub-flavored Markdown
- "type": one of "Bug", "Feature", "Refactor", "Documentation"
- "reasoning": a short reasoning
Do not wrap the JSON in markdown code blocks.
Start the response with '[' and end with ']'.

Example:
[
  {
    "title": "Example Title",
    "body": "Example Body",
    "type": "Feature",
    "reasoning": "Reasoning here"
  }
]"#;

/// Canonical web-search query for existing issues of a repository.
pub fn issue_search_query(repo: &RepositoryIdentifier) -> String {
    format!("issues {}", repo.site_scope())
}

/// Repository-scoped search query for one TODO-style marker.
pub fn todo_search_query(repo: &RepositoryIdentifier, marker: &str) -> String {
    format!("{} \"{}\"", repo.site_scope(), marker)
}

/// Build the full instruction set sent to the model.
pub fn build(repo: &RepositoryIdentifier, goals: Option<&str>, scan_todos: bool) -> String {
    let mut prompt = String::new();

    prompt.push_str(&format!(
        "I have a GitHub repository at: {}\n\n",
        repo.html_url()
    ));
    prompt.push_str("Please analyze this repository.\n");
    prompt.push_str(
        "1. Use web search to understand what this repository does, its main technologies, \
         and any common known issues or missing obvious features.\n",
    );
    prompt.push_str(&format!(
        "2. Search specifically for \"{}\" to see existing problems.\n",
        issue_search_query(repo)
    ));
    if scan_todos {
        prompt.push_str(&format!(
            "3. Search for {} comments in the code as requested below.\n",
            TODO_MARKERS.join("/")
        ));
    } else {
        prompt.push_str(&format!(
            "3. Suggest exactly {} distinct issues that could be created for this repository.\n",
            DEFAULT_SUGGESTION_COUNT
        ));
    }

    if let Some(goals) = goals.filter(|g| !g.trim().is_empty()) {
        prompt.push_str(&format!(
            "\nThe user has specified the following Project Goals: \"{}\". \
             Ensure at least one suggested issue aligns directly with these goals.\n",
            goals
        ));
    }

    if scan_todos {
        let markers = TODO_MARKERS
            .iter()
            .map(|m| format!("\"{}\"", m))
            .collect::<Vec<_>>()
            .join(", ");
        prompt.push_str(&format!(
            "\nCRITICAL INSTRUCTION: The user wants to scan for existing TODOs. \
             Use web search to look for {} comments in the repository code \
             (e.g. search query '{}'). If you find relevant TODOs, prioritize \
             creating an issue to resolve them.\n",
            markers,
            todo_search_query(repo, TODO_MARKERS[0])
        ));
    }

    prompt.push('\n');
    prompt.push_str(OUTPUT_CONTRACT);
    prompt.push('\n');
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::github::locate;

    fn hello_world() -> RepositoryIdentifier {
        locate("https://github.com/octocat/Hello-World").unwrap()
    }

    #[test]
    fn test_build_is_deterministic() {
        let repo = hello_world();
        for (goals, scan) in [(None, false), (Some("speed"), true), (Some(""), false)] {
            assert_eq!(build(&repo, goals, scan), build(&repo, goals, scan));
        }
    }

    #[test]
    fn test_default_prompt_requests_three_without_extras() {
        let prompt = build(&hello_world(), Some(""), false);
        assert!(prompt.contains("exactly 3 distinct issues"));
        assert!(prompt.contains("\"issues site:github.com/octocat/Hello-World\""));
        assert!(!prompt.contains("Project Goals"));
        assert!(!prompt.contains("CRITICAL INSTRUCTION"));
        assert!(!prompt.contains("FIXME"));
    }

    #[test]
    fn test_goals_are_embedded_verbatim() {
        let prompt = build(&hello_world(), Some("  Improve \"offline\" mode "), false);
        assert!(prompt.contains("Project Goals: \"  Improve \"offline\" mode \"."));
        assert!(prompt.contains("at least one suggested issue"));
    }

    #[test]
    fn test_blank_goals_are_ignored() {
        let repo = hello_world();
        assert_eq!(build(&repo, Some(" \n\t"), false), build(&repo, None, false));
    }

    #[test]
    fn test_scan_todos_adds_scoped_query() {
        let prompt = build(&hello_world(), None, true);
        assert!(prompt.contains("site:github.com/octocat/Hello-World \"TODO\""));
        assert!(prompt.contains("\"FIXME\""));
        assert!(prompt.contains("\"HACK\""));
        assert!(prompt.contains("prioritize"));
        assert!(!prompt.contains("exactly 3 distinct issues"));
    }

    #[test]
    fn test_output_contract_always_present() {
        for scan in [false, true] {
            let prompt = build(&hello_world(), Some("docs"), scan);
            assert!(prompt.ends_with(&format!("{}\n", OUTPUT_CONTRACT)));
            assert!(prompt.contains("Start the response with '[' and end with ']'"));
            assert!(prompt.contains("Do not wrap the JSON in markdown code blocks"));
        }
    }
}
