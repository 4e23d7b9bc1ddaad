//! GitHub issue reports for failed publishes
//!
//! Each failure becomes one issue in the configured repository. Everything
//! that ends up in the title, body or labels goes through the redactor first.

use std::path::PathBuf;

use chrono::Utc;
use gatekeeper_core::{redact, redact_value, Config, PublishError, Result, StoreKind};
use reqwest::Client;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use tracing::{info, instrument};

use crate::auth::validate_token;
use crate::http::{self, ApiMessages};
use crate::pipeline::{Stage, StoreOutcome};

const GITHUB_API_URL: &str = "https://api.github.com";
const USER_AGENT: &str = concat!("gatekeeper/", env!("CARGO_PKG_VERSION"));
const TITLE_MESSAGE_LIMIT: usize = 100;

const MESSAGES: ApiMessages = ApiMessages {
    authentication: "GitHub authentication failed",
    quota: "GitHub API rate limit exceeded",
    api: "GitHub issue creation failed",
    network: "GitHub network request failed",
};

/// What was known about the run when it failed
#[derive(Debug, Clone, Default)]
pub struct ReportContext {
    pub extension: Option<String>,
    pub version: Option<String>,
    pub store: Option<StoreKind>,
    pub phase: Option<Stage>,
    pub item_id: Option<String>,
    pub manifest_validated: bool,
    pub packaged: bool,
    pub package_path: Option<PathBuf>,
    pub uploaded: bool,
    pub submitted: bool,
}

impl ReportContext {
    /// Context for a failed pipeline run
    pub fn from_outcome(extension: Option<String>, version: Option<String>, outcome: &StoreOutcome) -> Self {
        let phase = outcome.failure().map(|f| f.stage);
        let past = |stage: Stage| phase.is_some_and(|p| stage_index(p) > stage_index(stage));

        Self {
            extension,
            version,
            store: Some(outcome.store),
            phase,
            item_id: outcome.upload_id.clone(),
            manifest_validated: past(Stage::Validate),
            packaged: outcome.artifact.is_some(),
            package_path: outcome.artifact.clone(),
            uploaded: outcome.upload_id.is_some(),
            submitted: false,
        }
    }

    fn extension(&self) -> &str {
        self.extension.as_deref().filter(|s| !s.is_empty()).unwrap_or("Unknown Extension")
    }

    fn version(&self) -> &str {
        self.version.as_deref().filter(|s| !s.is_empty()).unwrap_or("0.0.0")
    }

    fn store(&self) -> &str {
        self.store.map(StoreKind::as_str).unwrap_or("unknown")
    }

    fn phase(&self) -> &str {
        self.phase.map(Stage::as_str).unwrap_or("unknown")
    }
}

fn stage_index(stage: Stage) -> u8 {
    match stage {
        Stage::Validate => 0,
        Stage::Package => 1,
        Stage::Upload => 2,
        Stage::Publish => 3,
        Stage::Cancel => 4,
    }
}

/// CI details read from the GitHub Actions environment
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CiInfo {
    pub ci: bool,
    pub run_url: Option<String>,
    pub commit: Option<String>,
}

impl CiInfo {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
        let set = |key: &str| get(key).filter(|v| !v.is_empty());

        let run_url = set("GITHUB_ACTIONS").and_then(|_| {
            Some(format!(
                "{}/{}/actions/runs/{}",
                set("GITHUB_SERVER_URL")?,
                set("GITHUB_REPOSITORY")?,
                set("GITHUB_RUN_ID")?
            ))
        });

        Self {
            ci: set("CI").is_some(),
            run_url,
            commit: set("GITHUB_SHA").map(|sha| sha.chars().take(7).collect()),
        }
    }
}

/// Files publish failures as GitHub issues
pub struct IssueReporter {
    client: Client,
    token: String,
    owner: String,
    repo: String,
    api_base: String,
    ci: CiInfo,
}

impl IssueReporter {
    /// Create a reporter from `githubToken` and `repo`
    ///
    /// The token is checked offline first so a malformed or expired token
    /// fails here rather than at the API.
    pub fn new(config: &Config) -> Result<Self> {
        let token_check = validate_token(&config.github_token);
        if !token_check.valid {
            return Err(PublishError::authentication(format!(
                "GitHub token rejected: {}",
                token_check.reason.unwrap_or_default()
            )));
        }

        let (owner, repo) = config
            .repo_parts()
            .ok_or_else(|| PublishError::validation("repo must be in owner/name form"))?;

        Ok(Self {
            client: Client::new(),
            token: config.github_token.clone(),
            owner: owner.to_string(),
            repo: repo.to_string(),
            api_base: GITHUB_API_URL.to_string(),
            ci: CiInfo::from_env(),
        })
    }

    /// Point the reporter at a different API root
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_ci(mut self, ci: CiInfo) -> Self {
        self.ci = ci;
        self
    }

    /// Create the issue and return its URL
    #[instrument(skip_all, fields(store = context.store(), phase = context.phase()))]
    pub async fn report(&self, error: &PublishError, context: &ReportContext) -> Result<String> {
        let issue = build_issue(error, context, &self.ci);
        let url = format!("{}/repos/{}/{}/issues", self.api_base, self.owner, self.repo);

        let request = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .header("Accept", "application/vnd.github+json")
            .header("User-Agent", USER_AGENT)
            .json(&issue);

        let response = http::send(request, &MESSAGES).await?;
        let payload = http::read_payload(response, &MESSAGES).await?;

        let html_url = http::string_field(payload.as_ref(), &["html_url"])
            .ok_or_else(|| PublishError::api("GitHub issue response missing html_url"))?;
        info!(issue = %html_url, "error report filed");
        Ok(html_url)
    }
}

/// Stable identifier for grouping identical failures
pub fn fingerprint(message: &str, store: &str, phase: &str) -> String {
    let digest = Sha256::digest(format!("{}|{}|{}", message, store, phase));
    let hex = format!("{:x}", digest);
    hex[..12].to_string()
}

/// Lowercase label with runs of other characters collapsed into `-`
pub fn slugify(extension: &str) -> String {
    let mut slug = String::with_capacity(extension.len());
    for c in extension.to_lowercase().chars() {
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            slug.push(c);
        } else if !slug.ends_with('-') {
            slug.push('-');
        }
    }

    let slug = slug.trim_matches('-');
    if slug.is_empty() {
        "unknown-extension".to_string()
    } else {
        slug.to_string()
    }
}

/// Title, body and labels for one failure
pub fn build_issue(error: &PublishError, context: &ReportContext, ci: &CiInfo) -> Value {
    let extension = redact(context.extension());
    let message = redact(error.message());
    let type_name = error.type_name();
    let store = context.store();
    let phase = context.phase();
    let fingerprint = fingerprint(error.message(), store, phase);

    let title_message: String = message.chars().take(TITLE_MESSAGE_LIMIT).collect();
    let title = format!("[{}] {}: {}", extension, type_name, title_message);

    let context_json = serde_json::to_string_pretty(&redact_value(&Value::Object(error.context().clone())))
        .unwrap_or_default();

    let breadcrumbs = breadcrumbs(context, &extension)
        .iter()
        .enumerate()
        .map(|(i, crumb)| format!("{}. {}", i + 1, crumb))
        .collect::<Vec<_>>()
        .join("\n");

    let body = format!(
        "## Error Details
- Extension: {extension} v{version}
- Error Type: {type_name}
- Message: {message}
- Timestamp: {timestamp}
- Fingerprint: {fingerprint}

## API Response
```
{store} context:
{context_json}
```

## Breadcrumbs
{breadcrumbs}

## Publishing Context
- Store: {store}
- Phase: {phase}
- Item ID: {item_id}
- CI Environment: {ci_env}
- Run URL: {run_url}
- Commit: {commit}
",
        version = redact(context.version()),
        timestamp = Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
        item_id = redact(context.item_id.as_deref().unwrap_or("N/A")),
        ci_env = if ci.ci { "GitHub Actions" } else { "Local" },
        run_url = ci.run_url.as_deref().unwrap_or("N/A"),
        commit = ci.commit.as_deref().unwrap_or("unknown"),
    );

    json!({
        "title": title,
        "body": body,
        "labels": [
            "robot",
            slugify(&extension),
            "gatekeeper",
            format!("store:{}", store),
            format!("phase:{}", phase),
        ],
    })
}

fn breadcrumbs(context: &ReportContext, extension: &str) -> Vec<String> {
    let store = context.store();
    let mut crumbs = vec![
        "Started Gatekeeper publish workflow".to_string(),
        format!("Loaded extension manifest ({} v{})", extension, redact(context.version())),
    ];

    if context.manifest_validated {
        crumbs.push(format!("Validated manifest for {}", store));
    }
    if context.packaged {
        let path = context
            .package_path
            .as_ref()
            .map(|p| redact(&p.display().to_string()))
            .unwrap_or_else(|| "unknown path".to_string());
        crumbs.push(format!("Packaged extension to {}", path));
    }
    if context.uploaded {
        crumbs.push(format!("Uploaded to {} API", store));
    }
    if context.submitted {
        crumbs.push(format!("Submitted for review on {}", store));
    }

    crumbs.push(format!("Publishing failed at {} phase", context.phase()));
    crumbs
}
