//! Pulls a PDF text selection out of host model-context text.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

static SELECTION: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?is)<pdf-selection>(.*?)</pdf-selection>").ok());
static TRUNCATED: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?i)<truncated-content\s*/>").ok());

/// Text between the first `<pdf-selection>` tags, with truncation markers
/// removed and whitespace collapsed. `None` when absent or blank.
pub fn extract_pdf_selection(context: &str) -> Option<String> {
    let selection = SELECTION.as_ref()?;
    let raw = selection.captures(context)?.get(1)?.as_str();
    let raw = match TRUNCATED.as_ref() {
        Some(truncated) => truncated.replace_all(raw, "").into_owned(),
        None => raw.to_owned(),
    };
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    (!collapsed.is_empty()).then_some(collapsed)
}

/// Joins the `text` entries of a model-context `content` array and extracts
/// the selection from the result.
pub fn extract_selection_from_model_context(content: &[Value]) -> Option<String> {
    let text = content
        .iter()
        .filter(|entry| entry.get("type").and_then(Value::as_str) == Some("text"))
        .filter_map(|entry| entry.get("text").and_then(Value::as_str))
        .collect::<Vec<_>>()
        .join("\n");
    if text.is_empty() {
        return None;
    }
    extract_pdf_selection(&text)
}
