//! Best-effort extraction of structured data from free-text model answers.
//!
//! Nothing here fails: every function returns `None` when the text does not
//! carry what it looks for, and callers keep the raw text.

use serde_json::Value;

/// Decode the first JSON object carried by `text`.
///
/// Accepts, in order: the whole text, a fenced ```` ```json ```` block, and
/// the first balanced `{ ... }` span. When the whole text is valid JSON
/// that is not an object, the answer is `None`.
pub fn extract_json(text: &str) -> Option<Value> {
    let trimmed = text.trim();

    // A text that is JSON on its own is never searched for nested objects
    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        return value.is_object().then_some(value);
    }

    if let Some(block) = fenced_block(trimmed) {
        if let Ok(value) = serde_json::from_str::<Value>(block) {
            if value.is_object() {
                return Some(value);
            }
        }
    }

    first_object_span(trimmed).and_then(|span| serde_json::from_str::<Value>(span).ok())
}

/// The `file` field of an answer, when the answer decodes to an object that
/// names one.
pub fn report_file(text: &str) -> Option<String> {
    file_field(&extract_json(text)?).map(str::to_string)
}

/// The non-blank `file` string of a decoded answer.
pub fn file_field(payload: &Value) -> Option<&str> {
    payload
        .get("file")?
        .as_str()
        .map(str::trim)
        .filter(|f| !f.is_empty())
}

/// Content of the first `<reason>...</reason>` tag, trimmed.
pub fn extract_reason(text: &str) -> Option<String> {
    const OPEN: &str = "<reason>";
    const CLOSE: &str = "</reason>";

    let start = text.find(OPEN)? + OPEN.len();
    let len = text[start..].find(CLOSE)?;
    Some(text[start..start + len].trim().to_string())
}

fn fenced_block(text: &str) -> Option<&str> {
    for marker in ["```json", "```"] {
        let Some(open) = text.find(marker) else {
            continue;
        };
        let body_start = open + marker.len();
        let rest = &text[body_start..];
        // Skip the remainder of the opening fence line
        let Some(newline) = rest.find('\n') else {
            continue;
        };
        let body = &rest[newline + 1..];
        if let Some(close) = body.find("```") {
            return Some(body[..close].trim());
        }
    }
    None
}

fn first_object_span(text: &str) -> Option<&str> {
    let mut depth = 0usize;
    let mut start = None;
    let mut in_string = false;
    let mut escaped = false;

    for (i, ch) in text.char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match ch {
            '"' if depth > 0 => in_string = true,
            '{' => {
                if depth == 0 {
                    start = Some(i);
                }
                depth += 1;
            }
            '}' if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    return start.map(|s| &text[s..=i]);
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
    fn whole_text_object() {
        let value = extract_json(r#"{"file": "report.md"}"#).unwrap();
        assert_eq!(value["file"], "report.md");
    }

    #[test]
    fn fenced_block_with_language() {
        let text = "Done.\n```json\n{\"file\": \"q3.md\", \"pdf_file\": \"q3.pdf\"}\n```\n";
        assert_eq!(report_file(text).as_deref(), Some("q3.md"));
    }

    #[test]
    fn embedded_object_after_prose() {
        let text = "The report is saved: {\"file\": \"nvda_outlook.md\"} - enjoy";
        assert_eq!(report_file(text).as_deref(), Some("nvda_outlook.md"));
    }

    #[test]
    fn braces_inside_strings_do_not_confuse_scanner() {
        let text = r#"note {"summary": "range {low} to {high}", "file": "r.md"}"#;
        assert_eq!(report_file(text).as_deref(), Some("r.md"));
    }

    #[test]
    fn plain_text_has_no_json() {
        assert!(extract_json("The market looks frothy. No file was written.").is_none());
        assert!(report_file("just words").is_none());
    }

    #[test]
    fn object_without_file_key() {
        assert!(extract_json(r#"{"status": "ok"}"#).is_some());
        assert!(report_file(r#"{"status": "ok"}"#).is_none());
        assert!(report_file(r#"{"file": 42}"#).is_none());
        assert!(report_file(r#"{"file": "  "}"#).is_none());
    }

    #[test]
    fn top_level_array_is_not_an_answer() {
        assert!(extract_json("[1, 2, 3]").is_none());
    }

    #[test]
    fn objects_nested_in_valid_json_are_not_extracted() {
        assert!(extract_json(r#"[{"file": "report.md"}]"#).is_none());
        assert!(report_file(r#"[{"file": "report.md"}]"#).is_none());
        assert!(extract_json(r#""{\"file\": \"report.md\"}""#).is_none());
    }

    #[test]
    fn reason_tag_is_trimmed() {
        let text = "I could not plot.\n<reason>\n  Column 'Close' missing from prices.csv \n</reason>";
        assert_eq!(
            extract_reason(text).as_deref(),
            Some("Column 'Close' missing from prices.csv")
        );
    }

    #[test]
    fn reason_tag_spans_lines_and_stops_at_first_close() {
        let text = "<reason>line one\nline two</reason> trailing <reason>second</reason>";
        assert_eq!(extract_reason(text).as_deref(), Some("line one\nline two"));
    }

    #[test]
    fn unterminated_reason_tag() {
        assert!(extract_reason("<reason>never closed").is_none());
        assert!(extract_reason("no tag here").is_none());
    }
}
