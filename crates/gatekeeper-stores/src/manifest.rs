//! `manifest.json` loading and shared checks

use std::path::Path;

use gatekeeper_core::{PublishError, Result};
use serde_json::{Map, Value};
use tracing::debug;

/// Read and parse a manifest file
pub async fn read_manifest(path: &Path) -> Result<Value> {
    debug!(path = %path.display(), "reading manifest");

    let content = tokio::fs::read_to_string(path).await.map_err(|e| {
        PublishError::validation(format!("Manifest not found at {}: {}", path.display(), e))
            .with_context("path", path.display().to_string())
    })?;

    serde_json::from_str(&content).map_err(|e| {
        PublishError::validation(format!("Manifest is not valid JSON: {}", e))
            .with_context("path", path.display().to_string())
    })
}

/// The manifest as a JSON object
pub fn as_object(manifest: &Value) -> Result<&Map<String, Value>> {
    manifest
        .as_object()
        .ok_or_else(|| PublishError::validation("Manifest must be an object"))
}

/// Fail unless every field is present and truthy
pub fn require_fields(manifest: &Map<String, Value>, fields: &[&str]) -> Result<()> {
    let missing: Vec<&str> = fields
        .iter()
        .copied()
        .filter(|field| !manifest.get(*field).is_some_and(is_truthy))
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(PublishError::validation(format!(
            "Manifest missing required fields: {}",
            missing.join(", ")
        ))
        .with_context("missing", missing))
    }
}

/// `manifest_version` as a number
pub fn manifest_version(manifest: &Map<String, Value>) -> Result<f64> {
    manifest
        .get("manifest_version")
        .and_then(Value::as_f64)
        .ok_or_else(|| PublishError::validation("manifest_version must be a number"))
}

/// Fail unless `icons` is a non-empty object
pub fn require_icons(manifest: &Map<String, Value>, message: &str) -> Result<()> {
    match manifest.get("icons").and_then(Value::as_object) {
        Some(icons) if !icons.is_empty() => Ok(()),
        _ => Err(PublishError::validation(message)),
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}
