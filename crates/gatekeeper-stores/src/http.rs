//! Shared HTTP response classification for store APIs

use gatekeeper_core::{PublishError, Result};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde_json::{json, Value};
use tracing::debug;

/// Messages used when a store API rejects a request
#[derive(Debug, Clone, Copy)]
pub(crate) struct ApiMessages {
    pub authentication: &'static str,
    pub quota: &'static str,
    pub api: &'static str,
    pub network: &'static str,
}

/// Send a request, mapping transport failures to Network errors
pub(crate) async fn send(request: RequestBuilder, messages: &ApiMessages) -> Result<Response> {
    request.send().await.map_err(|e| {
        debug!(error = %e, "request failed before a response");
        PublishError::network(format!("{}: {}", messages.network, e))
    })
}

/// Read the response body and fail on non-2xx statuses
///
/// The body is parsed as JSON when possible; otherwise the payload is `None`.
pub(crate) async fn read_payload(response: Response, messages: &ApiMessages) -> Result<Option<Value>> {
    let status = response.status();
    let payload = safe_json(response).await;

    if status.is_success() {
        Ok(payload)
    } else {
        Err(classify_status(status, payload, messages))
    }
}

/// Map an unsuccessful status to the error kind callers retry on
pub(crate) fn classify_status(
    status: StatusCode,
    payload: Option<Value>,
    messages: &ApiMessages,
) -> PublishError {
    let error = match status.as_u16() {
        401 | 403 => PublishError::authentication(messages.authentication),
        429 => PublishError::quota_exceeded(messages.quota),
        _ => PublishError::api(messages.api),
    };

    error
        .with_status(status.as_u16())
        .with_context("statusText", status.canonical_reason().unwrap_or_default())
        .with_context("body", payload.unwrap_or(Value::Null))
}

/// First string field found under any of `keys`
pub(crate) fn string_field(payload: Option<&Value>, keys: &[&str]) -> Option<String> {
    let payload = payload?;
    keys.iter().find_map(|key| match payload.get(*key) {
        Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

async fn safe_json(response: Response) -> Option<Value> {
    let text = response.text().await.ok()?;
    if text.trim().is_empty() {
        return None;
    }
    serde_json::from_str(&text)
        .ok()
        .or_else(|| Some(json!(text)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use gatekeeper_core::ErrorKind;

    const MESSAGES: ApiMessages = ApiMessages {
        authentication: "auth failed",
        quota: "quota exceeded",
        api: "request failed",
        network: "network failed",
    };

    #[test]
    fn test_status_mapping() {
        let cases = [
            (401, ErrorKind::Authentication),
            (403, ErrorKind::Authentication),
            (429, ErrorKind::QuotaExceeded),
            (404, ErrorKind::Api),
            (500, ErrorKind::Api),
            (503, ErrorKind::Api),
        ];

        for (status, kind) in cases {
            let error = classify_status(StatusCode::from_u16(status).unwrap(), None, &MESSAGES);
            assert_eq!(error.kind(), kind, "status {}", status);
            assert_eq!(error.status(), Some(status));
        }
    }

    #[test]
    fn test_context_carries_status_text_and_body() {
        let error = classify_status(
            StatusCode::SERVICE_UNAVAILABLE,
            Some(json!({ "error": "down" })),
            &MESSAGES,
        );

        assert_eq!(error.message(), "request failed");
        assert_eq!(error.context()["statusText"], json!("Service Unavailable"));
        assert_eq!(error.context()["body"], json!({ "error": "down" }));
    }

    #[test]
    fn test_string_field() {
        let payload = json!({ "id": "abc", "submissionId": "" , "count": 7 });
        assert_eq!(string_field(Some(&payload), &["submissionId", "id"]), Some("abc".into()));
        assert_eq!(string_field(Some(&payload), &["count"]), Some("7".into()));
        assert_eq!(string_field(Some(&payload), &["missing"]), None);
        assert_eq!(string_field(None, &["id"]), None);
    }
}
