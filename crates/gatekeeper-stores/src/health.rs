//! Reachability checks for the store and GitHub APIs

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use chrono::Utc;
use reqwest::Client;
use serde::Serialize;
use tracing::{debug, instrument};

use gatekeeper_core::redact;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3);

/// An endpoint to ping
#[derive(Debug, Clone)]
pub struct Endpoint {
    pub name: String,
    pub url: String,
    /// Count 4xx responses as reachable; for APIs that require auth
    pub allow_client_errors: bool,
}

impl Endpoint {
    pub fn new(name: impl Into<String>, url: impl Into<String>, allow_client_errors: bool) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            allow_client_errors,
        }
    }
}

/// Result of pinging one endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PingResult {
    pub available: bool,
    pub latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Aggregated health report
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    /// `healthy` when every endpoint is reachable, `degraded` otherwise
    pub status: String,
    pub timestamp: String,
    pub version: String,
    pub checks: BTreeMap<String, PingResult>,
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        self.checks.values().all(|c| c.available)
    }
}

/// Pings each endpoint in turn
pub struct HealthCheck {
    client: Client,
    endpoints: Vec<Endpoint>,
    timeout: Duration,
}

impl Default for HealthCheck {
    fn default() -> Self {
        Self::new(default_endpoints())
    }
}

impl HealthCheck {
    pub fn new(endpoints: Vec<Endpoint>) -> Self {
        Self {
            client: Client::new(),
            endpoints,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[instrument(skip(self))]
    pub async fn check(&self) -> HealthReport {
        let mut checks = BTreeMap::new();
        for endpoint in &self.endpoints {
            checks.insert(endpoint.name.clone(), self.ping(endpoint).await);
        }

        let status = if checks.values().all(|c: &PingResult| c.available) {
            "healthy"
        } else {
            "degraded"
        };

        HealthReport {
            status: status.to_string(),
            timestamp: Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            version: env!("CARGO_PKG_VERSION").to_string(),
            checks,
        }
    }

    pub async fn ping(&self, endpoint: &Endpoint) -> PingResult {
        let started = Instant::now();
        let response = self
            .client
            .get(&endpoint.url)
            .header("User-Agent", "gatekeeper-health-check")
            .timeout(self.timeout)
            .send()
            .await;

        match response {
            Ok(response) => {
                let status = response.status();
                let available =
                    status.is_success() || (endpoint.allow_client_errors && status.is_client_error());
                debug!(endpoint = %endpoint.name, status = status.as_u16(), available, "pinged");
                PingResult {
                    available,
                    latency_ms: Some(started.elapsed().as_millis() as u64),
                    status: Some(status.as_u16()),
                    error: None,
                }
            }
            Err(e) => {
                debug!(endpoint = %endpoint.name, error = %e, "ping failed");
                PingResult {
                    available: false,
                    latency_ms: None,
                    status: None,
                    error: Some(redact(&e.to_string())),
                }
            }
        }
    }
}

/// Chrome discovery, AMO search, Edge products and GitHub rate limit
pub fn default_endpoints() -> Vec<Endpoint> {
    vec![
        Endpoint::new(
            "chrome",
            "https://www.googleapis.com/discovery/v1/apis/chromewebstore/v1/rest",
            false,
        ),
        Endpoint::new(
            "firefox",
            "https://addons.mozilla.org/api/v5/addons/search/?q=gatekeeper",
            false,
        ),
        Endpoint::new("edge", "https://api.addons.microsoftedge.microsoft.com/v1/products", true),
        Endpoint::new("github", "https://api.github.com/rate_limit", true),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn mount(server: &MockServer, route: &str, response: ResponseTemplate) {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(response)
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_all_available_is_healthy() {
        let server = MockServer::start().await;
        mount(&server, "/ok", ResponseTemplate::new(200)).await;
        mount(&server, "/auth", ResponseTemplate::new(401)).await;

        let check = HealthCheck::new(vec![
            Endpoint::new("ok", format!("{}/ok", server.uri()), false),
            Endpoint::new("auth", format!("{}/auth", server.uri()), true),
        ]);
        let report = check.check().await;

        assert_eq!(report.status, "healthy");
        assert!(report.is_healthy());
        assert_eq!(report.checks["auth"].status, Some(401));
        assert!(report.checks["ok"].latency_ms.is_some());
    }

    #[tokio::test]
    async fn test_client_errors_only_count_when_allowed() {
        let server = MockServer::start().await;
        mount(&server, "/missing", ResponseTemplate::new(404)).await;

        let check = HealthCheck::new(vec![Endpoint::new(
            "strict",
            format!("{}/missing", server.uri()),
            false,
        )]);
        let report = check.check().await;

        assert_eq!(report.status, "degraded");
        assert!(!report.checks["strict"].available);
    }

    #[tokio::test]
    async fn test_server_errors_are_unavailable_even_when_lenient() {
        let server = MockServer::start().await;
        mount(&server, "/down", ResponseTemplate::new(503)).await;

        let endpoint = Endpoint::new("edge", format!("{}/down", server.uri()), true);
        let result = HealthCheck::new(vec![]).ping(&endpoint).await;

        assert!(!result.available);
        assert_eq!(result.status, Some(503));
    }

    #[tokio::test]
    async fn test_timeout_reports_error() {
        let server = MockServer::start().await;
        mount(
            &server,
            "/slow",
            ResponseTemplate::new(200).set_delay(Duration::from_millis(500)),
        )
        .await;

        let endpoint = Endpoint::new("slow", format!("{}/slow", server.uri()), false);
        let result = HealthCheck::new(vec![])
            .with_timeout(Duration::from_millis(50))
            .ping(&endpoint)
            .await;

        assert!(!result.available);
        assert!(result.latency_ms.is_none());
        assert!(result.error.is_some());
    }

    #[test]
    fn test_default_endpoints() {
        let names: Vec<_> = default_endpoints().into_iter().map(|e| e.name).collect();
        assert_eq!(names, vec!["chrome", "firefox", "edge", "github"]);
    }
}
