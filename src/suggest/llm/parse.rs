use crate::error::ParseError;
use crate::suggest::IssueSuggestion;
use regex::Regex;
use std::sync::LazyLock;

/// Opening fence: backticks plus a language tag, ending the line.
static OPENING_FENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"```[A-Za-z0-9_+.\-]*[ \t]*\r?\n").expect("fence pattern is valid")
});

/// Slice from the first `[` to the last `]`, when the `[` comes first.
fn extract_array_span(text: &str) -> Option<&str> {
    let start = text.find('[')?;
    let end = text.rfind(']')?;
    if start < end {
        Some(&text[start..=end])
    } else {
        None
    }
}

/// Strip markdown code fences anywhere in the text.
///
/// A tag is only dropped when it sits on an opening fence line; any other
/// triple backtick loses the backticks and keeps the text around them.
fn strip_code_fences(text: &str) -> String {
    OPENING_FENCE.replace_all(text, "\n").replace("```", "")
}

/// Recover the suggestion array from free-form model output.
///
/// Order of operations is fixed: trim, cut to the outermost bracket span (or
/// keep the whole text when there is none), drop fence markers, decode. No
/// further repair is attempted. Every element must carry non-blank `title`,
/// `body` and `reasoning` plus a known `type`; extra fields are ignored.
pub fn extract_suggestions(raw: &str) -> Result<Vec<IssueSuggestion>, ParseError> {
    let fail = |reason: String| ParseError {
        reason,
        raw: raw.to_string(),
    };

    let trimmed = raw.trim();
    let span = extract_array_span(trimmed).unwrap_or(trimmed);
    let json_str = strip_code_fences(span);

    let elements: Vec<serde_json::Value> =
        serde_json::from_str(&json_str).map_err(|e| fail(format!("not a JSON array: {}", e)))?;

    let mut suggestions = Vec::with_capacity(elements.len());
    for (idx, element) in elements.into_iter().enumerate() {
        if !element.is_object() {
            return Err(fail(format!("element {} is not an object", idx)));
        }
        let suggestion: IssueSuggestion = serde_json::from_value(element)
            .map_err(|e| fail(format!("element {}: {}", idx, e)))?;
        if let Some(field) = suggestion.first_blank_field() {
            return Err(fail(format!("element {}: `{}` is empty", idx, field)));
        }
        suggestions.push(suggestion);
    }

    Ok(suggestions)
}
