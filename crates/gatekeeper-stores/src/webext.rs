//! `web-ext` command runner
//!
//! Mozilla's `web-ext` tool lints extension sources and signs add-ons on AMO.
//! Both Chrome and Firefox validation can lint with it; Firefox publishing
//! signs with it.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::LazyLock;

use gatekeeper_core::{redact, PublishError, Result};
use regex::Regex;
use tokio::process::Command;
use tracing::{debug, info, instrument};

/// Default program name
pub const WEB_EXT: &str = "web-ext";

static URL_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)https?://\S+").expect("Invalid regex"));
static AUTH_FAILURE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)401|unauthorized|invalid credentials").expect("Invalid regex"));
static RATE_LIMITED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)429|too many requests|rate limit").expect("Invalid regex"));

/// Captured output of a finished `web-ext` run
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// Trimmed stdout and stderr, joined by a newline
    pub fn combined(&self) -> String {
        [self.stdout.trim(), self.stderr.trim()]
            .into_iter()
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Arguments for `web-ext sign`
#[derive(Debug, Clone)]
pub struct SignRequest<'a> {
    pub source_dir: &'a Path,
    pub channel: &'a str,
    pub artifacts_dir: &'a Path,
    pub addon_id: Option<&'a str>,
    pub api_key: &'a str,
    pub api_secret: &'a str,
}

/// Runs the `web-ext` CLI
#[derive(Debug, Clone)]
pub struct WebExt {
    program: PathBuf,
}

impl Default for WebExt {
    fn default() -> Self {
        Self::new(WEB_EXT)
    }
}

impl WebExt {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Whether the program can be found
    pub fn is_installed(&self) -> bool {
        which::which(&self.program).is_ok()
    }

    /// `web-ext lint` over a source directory
    ///
    /// A failing lint becomes a Validation error carrying the tool output.
    #[instrument(skip(self), fields(source = %source_dir.display()))]
    pub async fn lint(&self, source_dir: &Path, artifacts_dir: &Path) -> Result<()> {
        tokio::fs::create_dir_all(artifacts_dir).await?;

        let mut cmd = Command::new(&self.program);
        cmd.arg("lint")
            .arg("--source-dir")
            .arg(source_dir)
            .arg("--artifacts-dir")
            .arg(artifacts_dir)
            .arg("--boring");

        let output = match self.run(cmd).await {
            Ok(output) => output,
            Err(e) => {
                return Err(PublishError::validation("Manifest lint failed to run")
                    .with_context("output", e.to_string()))
            }
        };

        if output.success {
            debug!("lint passed");
            return Ok(());
        }

        Err(PublishError::validation("Manifest validation failed")
            .with_context("output", redact(&output.combined())))
    }

    /// `web-ext sign`, returning the first URL printed on success
    #[instrument(skip(self, request), fields(source = %request.source_dir.display(), channel = request.channel))]
    pub async fn sign(&self, request: &SignRequest<'_>) -> Result<Option<String>> {
        tokio::fs::create_dir_all(request.artifacts_dir).await?;

        let mut cmd = Command::new(&self.program);
        cmd.arg("sign")
            .arg("--source-dir")
            .arg(request.source_dir)
            .arg("--channel")
            .arg(request.channel)
            .arg("--artifacts-dir")
            .arg(request.artifacts_dir);
        if let Some(id) = request.addon_id {
            cmd.arg("--id").arg(id);
        }
        cmd.env("WEB_EXT_API_KEY", request.api_key)
            .env("WEB_EXT_API_SECRET", request.api_secret);

        let output = match self.run(cmd).await {
            Ok(output) => output,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(PublishError::network("Failed to execute web-ext command")
                    .with_context("output", e.to_string()))
            }
            Err(e) => return Err(classify_sign_failure(&e.to_string())),
        };

        if !output.success {
            return Err(classify_sign_failure(&output.combined()));
        }

        let url = URL_PATTERN.find(&output.stdout).map(|m| m.as_str().to_string());
        info!(url = ?url, "add-on signed");
        Ok(url)
    }

    async fn run(&self, mut cmd: Command) -> std::io::Result<CommandOutput> {
        debug!(program = %self.program.display(), "running web-ext");
        let output = cmd
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await?;

        Ok(CommandOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Classify failing `web-ext sign` output
pub fn classify_sign_failure(output: &str) -> PublishError {
    let error = if AUTH_FAILURE.is_match(output) {
        PublishError::authentication("Firefox AMO authentication failed")
    } else if RATE_LIMITED.is_match(output) {
        PublishError::quota_exceeded("Firefox AMO rate limit exceeded")
    } else {
        PublishError::api("Firefox AMO signing failed")
    };
    error.with_context("output", redact(output))
}
