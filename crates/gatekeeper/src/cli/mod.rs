//! CLI definition and command handling

pub mod commands;
pub mod output;

use std::future::Future;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::{debug, warn};

use gatekeeper_core::config::{load_config, load_config_from_dir};
use gatekeeper_core::{CancelToken, Config, PublishError, StoreKind};

use crate::exit_codes;
use commands::{
    CancelCommand, CompletionsCommand, HealthCommand, InitCommand, PublishCommand, ValidateCommand,
};

/// Gatekeeper - publish browser extensions to the Chrome, Firefox and Edge stores
#[derive(Debug, Parser)]
#[command(name = "gatekeeper")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Output format
    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// Working directory
    #[arg(short = 'C', long, global = true)]
    pub directory: Option<PathBuf>,

    /// Configuration file (default: nearest .gatekeeperrc.json)
    #[arg(long, global = true, env = "GATEKEEPER_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Output format for CLI
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output
    #[default]
    Text,
    /// JSON output
    Json,
}

/// Available commands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Validate, package, upload and publish to each store
    Publish(PublishCommand),

    /// Check the manifest against each store's rules
    Validate(ValidateCommand),

    /// Withdraw a pending submission
    Cancel(CancelCommand),

    /// Check that the store and GitHub APIs are reachable
    Health(HealthCommand),

    /// Create a configuration file
    Init(InitCommand),

    /// Generate shell completions
    Completions(CompletionsCommand),
}

impl Cli {
    /// Execute the CLI command, returning the process exit code
    pub fn execute(&self) -> anyhow::Result<i32> {
        if let Some(dir) = &self.directory {
            std::env::set_current_dir(dir)?;
        }

        match &self.command {
            Commands::Publish(cmd) => cmd.execute(self),
            Commands::Validate(cmd) => cmd.execute(self),
            Commands::Cancel(cmd) => cmd.execute(self),
            Commands::Health(cmd) => cmd.execute(self),
            Commands::Init(cmd) => cmd.execute(self),
            Commands::Completions(cmd) => cmd.execute(self),
        }
    }

    /// Whether human-readable progress should be printed
    pub fn is_interactive_text(&self) -> bool {
        !self.quiet && self.format == OutputFormat::Text
    }

    /// Load the `--config` file, or the nearest one above the working directory
    pub fn load_config(&self) -> anyhow::Result<(Config, PathBuf)> {
        let loaded = match &self.config {
            Some(path) => (load_config(path)?, path.clone()),
            None => load_config_from_dir(&std::env::current_dir()?)?,
        };
        debug!(path = %loaded.1.display(), "configuration loaded");
        Ok(loaded)
    }
}

/// Resolve `--stores`, defaulting to the config's `browsers`
///
/// Unknown names are returned as failures rather than aborting the run.
pub fn resolve_stores(requested: &[String], config: &Config) -> (Vec<StoreKind>, Vec<(String, PublishError)>) {
    let names: Vec<String> = if requested.is_empty() {
        config.browsers.clone()
    } else {
        requested.to_vec()
    };

    let mut stores = Vec::new();
    let mut unknown = Vec::new();
    for name in names {
        match name.parse::<StoreKind>() {
            Ok(store) if !stores.contains(&store) => stores.push(store),
            Ok(_) => {}
            Err(e) => unknown.push((name, e)),
        }
    }
    (stores, unknown)
}

/// Cancel `token` when Ctrl-C is pressed; a second Ctrl-C exits immediately
///
/// Must be called from inside the runtime.
pub fn cancel_on_ctrl_c(token: &CancelToken) {
    tokio::spawn(watch_interrupts(
        token.clone(),
        || async { tokio::signal::ctrl_c().await.is_ok() },
        || std::process::exit(exit_codes::CANCELLED),
    ));
}

async fn watch_interrupts<S, Fut>(token: CancelToken, mut interrupted: S, force_exit: impl FnOnce())
where
    S: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    if !interrupted().await {
        return;
    }
    warn!("interrupt received, cancelling");
    token.cancel_with(PublishError::aborted().with_context("reason", "interrupted"));

    if interrupted().await {
        warn!("second interrupt received, exiting");
        force_exit();
    }
}

/// Multi-threaded runtime for async commands
pub fn runtime() -> anyhow::Result<tokio::runtime::Runtime> {
    Ok(tokio::runtime::Builder::new_multi_thread().enable_all().build()?)
}
