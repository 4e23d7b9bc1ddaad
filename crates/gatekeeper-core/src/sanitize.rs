//! Secret and PII redaction for logs and error reports

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

/// Redaction rules, applied in order
static PATTERNS: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    [
        (r"(?i)gh[pous]_[A-Za-z0-9]{24,}", "[REDACTED_GITHUB_TOKEN]"),
        (r"(?i)sk-[A-Za-z0-9]{16,}", "[REDACTED_API_KEY]"),
        (r"(?i)CWS_[A-Za-z0-9_-]+", "[REDACTED_CWS_CREDENTIAL]"),
        (r"(?i)AMO_[A-Za-z0-9_-]+", "[REDACTED_AMO_CREDENTIAL]"),
        (r"(?i)EDGE_[A-Za-z0-9_-]+", "[REDACTED_EDGE_CREDENTIAL]"),
        (
            r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}",
            "[REDACTED_EMAIL]",
        ),
        (r"\b[A-Za-z0-9]{40,}\b", "[REDACTED_TOKEN]"),
    ]
    .into_iter()
    .map(|(pattern, replacement)| (Regex::new(pattern).expect("Invalid regex"), replacement))
    .collect()
});

/// Replace secrets and e-mail addresses in `text` with placeholders
pub fn redact(text: &str) -> String {
    PATTERNS
        .iter()
        .fold(text.to_string(), |acc, (regex, replacement)| {
            regex.replace_all(&acc, *replacement).into_owned()
        })
}

/// Deep copy of `value` with every string redacted
pub fn redact_value(value: &Value) -> Value {
    match value {
        Value::String(s) => Value::String(redact(s)),
        Value::Array(items) => Value::Array(items.iter().map(redact_value).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, val)| (key.clone(), redact_value(val)))
                .collect(),
        ),
        other => other.clone(),
    }
}
