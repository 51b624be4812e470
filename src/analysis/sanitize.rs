// Tolerant recovery of structured data from free-text AI responses.
// Handles code fences, surrounding prose, smart quotes, and double-encoded JSON.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use super::types::ParsedAiResponse;

/// Characters of raw input kept in the failure diagnostic.
const DIAGNOSTIC_PREFIX_CHARS: usize = 200;

const FENCE: &str = "```";

static LEADING_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\A```(?:json)?\s*").unwrap());

static TRAILING_FENCE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s*```\z").unwrap());

/// Recover a structured response from raw AI text.
///
/// Returns `None` for empty input, for text with no parseable JSON, and for
/// JSON that is not an object. Never panics.
pub fn sanitize_response<'a>(raw: impl Into<Option<&'a str>>) -> Option<ParsedAiResponse> {
    let raw = raw.into()?;
    let value = extract_json(raw)?;
    let parsed = ParsedAiResponse::from_value(&value);
    if parsed.is_none() {
        tracing::warn!(
            kind = json_kind(&value),
            raw_prefix = %diagnostic_prefix(raw),
            "AI response parsed to a non-object JSON value"
        );
    }
    parsed
}

/// Best-effort JSON extraction. A bare JSON string that is not itself JSON
/// is wrapped as `{"overview": <string>}`.
pub fn extract_json(raw: &str) -> Option<Value> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    let unfenced = strip_code_fences(trimmed);
    let narrowed = narrow_to_braces(&unfenced);

    let mut candidates = vec![narrowed.to_string(), smart_to_straight(narrowed)];
    // Properly escaped double-encoded JSON breaks when narrowed; retry the whole text.
    if narrowed.len() != unfenced.len() {
        candidates.push(unfenced.clone());
        candidates.push(smart_to_straight(&unfenced));
    }

    for candidate in &candidates {
        match serde_json::from_str::<Value>(candidate) {
            Ok(Value::String(inner)) => return Some(unwrap_string(inner)),
            Ok(value) => return Some(value),
            Err(_) => continue,
        }
    }

    tracing::warn!(
        raw_prefix = %diagnostic_prefix(raw),
        raw_len = raw.len(),
        "Failed to parse JSON from AI response"
    );
    None
}

/// Remove one leading (optionally `json`-tagged) and one trailing fence;
/// if fences remain anywhere, remove them all.
fn strip_code_fences(text: &str) -> String {
    let text = LEADING_FENCE.replace(text, "");
    let text = TRAILING_FENCE.replace(&text, "");
    let text = text.trim();
    if text.contains(FENCE) {
        text.replace(FENCE, "").trim().to_string()
    } else {
        text.to_string()
    }
}

/// First `{` through last `}`, when both exist in that order.
fn narrow_to_braces(text: &str) -> &str {
    match (text.find('{'), text.rfind('}')) {
        (Some(start), Some(end)) if end > start => &text[start..=end],
        _ => text,
    }
}

/// Curly double and single quotes to ASCII.
fn smart_to_straight(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '\u{201C}' | '\u{201D}' => '"',
            '\u{2018}' | '\u{2019}' => '\'',
            other => other,
        })
        .collect()
}

/// The service sometimes returns a JSON string containing JSON.
fn unwrap_string(inner: String) -> Value {
    match serde_json::from_str::<Value>(&inner) {
        Ok(nested) => nested,
        Err(_) => serde_json::json!({ "overview": inner }),
    }
}

fn diagnostic_prefix(raw: &str) -> String {
    raw.chars().take(DIAGNOSTIC_PREFIX_CHARS).collect()
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::types::AdviceItem;
    use serde_json::json;

    const CLEAN: &str = r#"{"overview":"Stable vitals","risks":["Mild tachycardia"],"recommendations":[{"title":"Hydrate","description":"2L water"}]}"#;

    fn expected_clean() -> ParsedAiResponse {
        ParsedAiResponse::from_value(&serde_json::from_str(CLEAN).unwrap()).unwrap()
    }

    #[test]
    fn empty_and_absent_input_is_none() {
        assert_eq!(sanitize_response(""), None);
        assert_eq!(sanitize_response("   \n\t"), None);
        assert_eq!(sanitize_response(None::<&str>), None);
    }

    #[test]
    fn plain_json_parses() {
        assert_eq!(sanitize_response(CLEAN), Some(expected_clean()));
    }

    #[test]
    fn json_fence_stripped() {
        let raw = format!("```json\n{CLEAN}\n```");
        assert_eq!(sanitize_response(raw.as_str()), Some(expected_clean()));
    }

    #[test]
    fn untagged_and_uppercase_fences_stripped() {
        let raw = format!("```\n{CLEAN}\n```");
        assert_eq!(sanitize_response(raw.as_str()), Some(expected_clean()));
        let raw = format!("```JSON {CLEAN}```");
        assert_eq!(sanitize_response(raw.as_str()), Some(expected_clean()));
    }

    #[test]
    fn stray_inner_fences_removed() {
        assert_eq!(strip_code_fences("```json\n{\"a\":1}\n```\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("x ```y``` z"), "x y z");
    }

    #[test]
    fn surrounding_prose_tolerated() {
        let raw = format!("Here is the analysis you asked for:\n{CLEAN}\nLet me know if you need more.");
        assert_eq!(sanitize_response(raw.as_str()), Some(expected_clean()));
    }

    #[test]
    fn smart_quotes_normalized() {
        let raw = "{\u{201C}overview\u{201D}: \u{201C}Patient\u{2019}s vitals are stable\u{201D}}";
        let parsed = sanitize_response(raw).unwrap();
        assert_eq!(parsed.overview.as_deref(), Some("Patient's vitals are stable"));
    }

    #[test]
    fn fenced_smart_quoted_json_parses() {
        let raw = "```json\n{\u{201C}overview\u{201D}: \u{201C}ok\u{201D}, \u{201C}risks\u{201D}: []}\n```";
        let parsed = sanitize_response(raw).unwrap();
        assert_eq!(parsed.overview.as_deref(), Some("ok"));
        assert_eq!(parsed.risks, Some(vec![]));
    }

    #[test]
    fn quoted_payload_with_unescaped_json_recovers() {
        let parsed = sanitize_response(r#""{"overview":"ok"}""#).unwrap();
        assert_eq!(parsed.overview.as_deref(), Some("ok"));
    }

    #[test]
    fn double_encoded_json_takes_nested_path() {
        let raw = serde_json::to_string(&json!({"overview": "ok", "risks": ["a"]}).to_string()).unwrap();
        let parsed = sanitize_response(raw.as_str()).unwrap();
        assert_eq!(parsed.overview.as_deref(), Some("ok"));
        assert_eq!(parsed.risk_items(), &[AdviceItem::Text("a".into())]);
    }

    #[test]
    fn json_string_of_prose_becomes_overview() {
        let parsed = sanitize_response(r#""Vitals look fine overall.""#).unwrap();
        assert_eq!(parsed.overview.as_deref(), Some("Vitals look fine overall."));
        assert!(parsed.risk_items().is_empty());
    }

    #[test]
    fn prose_without_json_is_none() {
        assert_eq!(sanitize_response("no json here"), None);
        assert_eq!(extract_json("no json here"), None);
    }

    #[test]
    fn broken_json_is_none() {
        assert_eq!(sanitize_response("{\"overview\": \"unterminated"), None);
        assert_eq!(sanitize_response("{overview: nope}"), None);
    }

    #[test]
    fn non_object_json_is_none() {
        assert_eq!(sanitize_response("[1, 2, 3]"), None);
        assert_eq!(sanitize_response("42"), None);
    }

    #[test]
    fn stray_brace_in_trailing_prose_misnarrows() {
        // First `{` to last `}` includes the prose brace; accepted limitation.
        let raw = format!("{CLEAN} note: use {{caution}}");
        assert_eq!(sanitize_response(raw.as_str()), None);
    }

    #[test]
    fn error_payload_passes_through() {
        let parsed = sanitize_response(r#"{"error":"Model overloaded","details":"retry in 30s"}"#).unwrap();
        assert_eq!(parsed.error.as_deref(), Some("Model overloaded"));
        assert_eq!(parsed.details, Some(json!("retry in 30s")));
    }

    #[test]
    fn diagnostic_prefix_is_bounded() {
        let raw = "é".repeat(500);
        assert_eq!(diagnostic_prefix(&raw).chars().count(), DIAGNOSTIC_PREFIX_CHARS);
        assert_eq!(diagnostic_prefix("short"), "short");
    }

    #[test]
    fn narrowing_requires_ordered_braces() {
        assert_eq!(narrow_to_braces("} then {"), "} then {");
        assert_eq!(narrow_to_braces("a {b} c"), "{b}");
    }
}
