//! Recover a single top-level JSON object from chatty LLM text: fenced
//! blocks, prose preamble/postscript, partial truncation.

use aav3_core::AppError;

const RAW_EXCERPT_LIMIT: usize = 500;

/// Extract the first complete top-level `{...}` object from `text`.
///
/// Tolerates a leading triple-backtick fence (with or without a language
/// tag) and arbitrary prose around the object. Braces inside double-quoted
/// strings are not counted, so a JSON string value containing `{` or `}`
/// does not confuse the scanner.
pub fn extract(text: &str) -> Result<serde_json::Value, AppError> {
    let candidate = strip_fence(text.trim());
    let object_str = find_first_object(candidate).ok_or_else(|| malformed(text))?;
    serde_json::from_str(object_str).map_err(|e| AppError::MalformedAgentOutput {
        reason: e.to_string(),
        raw_excerpt: excerpt(text),
    })
}

fn malformed(text: &str) -> AppError {
    AppError::MalformedAgentOutput {
        reason: "no balanced top-level JSON object found".to_string(),
        raw_excerpt: excerpt(text),
    }
}

fn excerpt(text: &str) -> String {
    if text.len() <= RAW_EXCERPT_LIMIT {
        text.to_string()
    } else {
        let mut end = RAW_EXCERPT_LIMIT;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &text[..end])
    }
}

/// Strip a leading/trailing ``` fence if the first non-whitespace token is one.
fn strip_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    // Skip an optional language tag up to the first newline.
    let after_tag = match rest.find('\n') {
        Some(idx) => &rest[idx + 1..],
        None => return text,
    };
    match after_tag.rfind("```") {
        Some(end) => after_tag[..end].trim(),
        None => after_tag.trim(),
    }
}

/// Walk `text` tracking brace depth, skipping characters inside
/// double-quoted strings (respecting backslash escapes). Returns the
/// substring from the first `{` that reaches depth 1 to the matching `}`
/// that returns depth to 0.
fn find_first_object(text: &str) -> Option<&str> {
    let bytes = text.as_bytes();
    let mut depth: i32 = 0;
    let mut in_string = false;
    let mut escaped = false;
    let mut start: Option<usize> = None;

    for (i, &b) in bytes.iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }

        match b {
            b'"' => in_string = true,
            b'{' => {
                if depth == 0 {
                    start = Some(i);
                }
                depth += 1;
            }
            b'}' => {
                if depth > 0 {
                    depth -= 1;
                    if depth == 0 {
                        if let Some(s) = start {
                            return Some(&text[s..=i]);
                        }
                    }
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_bare_object() {
        let value = extract(r#"{"a": 1}"#).unwrap();
        assert_eq!(value["a"], 1);
    }

    #[test]
    fn extracts_with_prose_prefix_and_postscript() {
        let text = "Here is your plan:\n{\"a\": 1}\nLet me know if this works.";
        let value = extract(text).unwrap();
        assert_eq!(value["a"], 1);
    }

    #[test]
    fn extracts_fenced_block_with_language_tag() {
        let text = "```json\n{\"a\": 1}\n```";
        let value = extract(text).unwrap();
        assert_eq!(value["a"], 1);
    }

    #[test]
    fn extracts_fenced_block_without_language_tag() {
        let text = "```\n{\"a\": 1}\n```";
        let value = extract(text).unwrap();
        assert_eq!(value["a"], 1);
    }

    #[test]
    fn respects_braces_inside_strings() {
        let text = r#"{"note": "use {curly} braces carefully"}"#;
        let value = extract(text).unwrap();
        assert_eq!(value["note"], "use {curly} braces carefully");
    }

    #[test]
    fn respects_escaped_quotes_inside_strings() {
        let text = r#"{"note": "she said \"hi {there}\""}"#;
        let value = extract(text).unwrap();
        assert_eq!(value["note"], "she said \"hi {there}\"");
    }

    #[test]
    fn fails_with_malformed_agent_output_when_no_braces() {
        let err = extract("no json here at all").unwrap_err();
        assert_eq!(err.kind(), "MalformedAgentOutput");
    }

    #[test]
    fn fails_gracefully_on_unbalanced_braces() {
        let err = extract("prose { \"a\": 1").unwrap_err();
        assert_eq!(err.kind(), "MalformedAgentOutput");
    }

    #[test]
    fn takes_first_complete_object_when_multiple_present() {
        let text = r#"{"first": true} followed by {"second": true}"#;
        let value = extract(text).unwrap();
        assert_eq!(value["first"], true);
        assert!(value.get("second").is_none());
    }

    #[test]
    fn excerpt_is_truncated_for_long_inputs() {
        let long = "x".repeat(10_000);
        let err = extract(&long).unwrap_err();
        match err {
            AppError::MalformedAgentOutput { raw_excerpt, .. } => {
                assert!(raw_excerpt.len() < long.len());
                assert!(raw_excerpt.ends_with("..."));
            }
            other => panic!("unexpected error kind: {other:?}"),
        }
    }
}
