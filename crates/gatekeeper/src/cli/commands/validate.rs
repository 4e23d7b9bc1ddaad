//! Validate command

use std::path::PathBuf;
use std::sync::Arc;

use clap::Args;
use console::style;
use tracing::info;

use gatekeeper_core::{redact, CancelToken, MetricsCollector, RetryPolicy};
use gatekeeper_stores::{PublishPipeline, StoreRegistry};

use crate::cli::{output, resolve_stores, runtime, Cli, OutputFormat};
use crate::exit_codes;

/// Check the manifest against each store's rules
#[derive(Debug, Args)]
pub struct ValidateCommand {
    /// Path to the extension's manifest.json
    #[arg(short, long, default_value = "manifest.json")]
    pub manifest: PathBuf,

    /// Stores to validate for (default: the config's browsers)
    #[arg(short, long, value_delimiter = ',')]
    pub stores: Vec<String>,

    /// Also run web-ext lint over the extension source
    #[arg(long)]
    pub lint: bool,
}

impl ValidateCommand {
    /// Execute the validate command
    pub fn execute(&self, cli: &Cli) -> anyhow::Result<i32> {
        info!(manifest = %self.manifest.display(), lint = self.lint, "executing validate command");
        runtime()?.block_on(self.execute_async(cli))
    }

    async fn execute_async(&self, cli: &Cli) -> anyhow::Result<i32> {
        let (config, config_path) = cli.load_config()?;
        let (stores, unknown) = resolve_stores(&self.stores, &config);

        let pipeline = PublishPipeline::new(
            RetryPolicy::new(config.retry_config()),
            Arc::new(MetricsCollector::new()),
            CancelToken::new(),
        );

        let (registry, unconfigured) = StoreRegistry::from_config(&config, &stores);

        let mut errors: Vec<(String, String)> = unknown
            .iter()
            .map(|(name, e)| (name.clone(), redact(e.message())))
            .chain(
                unconfigured
                    .iter()
                    .map(|(store, e)| (store.as_str().to_string(), redact(e.message()))),
            )
            .collect();
        let mut passed: Vec<String> = Vec::new();

        for client in registry.all() {
            let store = client.store();
            match pipeline.validate_only(client.as_ref(), &self.manifest, self.lint).await {
                Ok(()) => passed.push(store.as_str().to_string()),
                Err(e) => {
                    let mut message = redact(e.message());
                    if let Some(out) = e.context().get("output").and_then(|o| o.as_str()) {
                        message = format!("{}\n{}", message, redact(out));
                    }
                    errors.push((store.as_str().to_string(), message));
                }
            }
        }

        let valid = errors.is_empty();

        match cli.format {
            OutputFormat::Json => {
                let output = serde_json::json!({
                    "valid": valid,
                    "config_path": config_path.to_string_lossy(),
                    "manifest": self.manifest.to_string_lossy(),
                    "passed": passed,
                    "errors": errors
                        .iter()
                        .map(|(store, message)| serde_json::json!({ "store": store, "message": message }))
                        .collect::<Vec<_>>(),
                });
                println!("{}", serde_json::to_string_pretty(&output)?);
            }
            OutputFormat::Text => {
                if !cli.quiet {
                    println!("{}", style("Validation Results").bold());
                    println!();
                    println!("Manifest: {}", output::path_style().apply_to(self.manifest.display()));
                    println!();

                    for store in &passed {
                        println!("  {} {}", style("✓").green(), store);
                    }
                    for (store, message) in &errors {
                        println!("  {} {}: {}", style("✗").red(), store, message);
                    }
                    println!();

                    if valid {
                        println!("{}", style("✓ All checks passed").green().bold());
                    } else {
                        println!(
                            "{} with {} error(s)",
                            style("✗ Validation failed").red().bold(),
                            errors.len()
                        );
                    }
                }
            }
        }

        Ok(if valid {
            exit_codes::SUCCESS
        } else {
            exit_codes::VALIDATION_ERROR
        })
    }
}
