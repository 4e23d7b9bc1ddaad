//! Health command

use clap::Args;
use console::style;
use tracing::info;

use gatekeeper_stores::HealthCheck;

use crate::cli::{output, runtime, Cli, OutputFormat};
use crate::exit_codes;

/// Check that the store and GitHub APIs are reachable
#[derive(Debug, Args)]
pub struct HealthCommand {}

impl HealthCommand {
    /// Execute the health command
    pub fn execute(&self, cli: &Cli) -> anyhow::Result<i32> {
        info!("executing health command");

        let spinner = output::spinner("Checking APIs...", cli.is_interactive_text());
        let report = runtime()?.block_on(HealthCheck::default().check());
        spinner.finish_and_clear();

        match cli.format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
            OutputFormat::Text => {
                if !cli.quiet {
                    println!("{} ({})", output::header("API Health"), report.status);
                    println!();
                    for (name, check) in &report.checks {
                        let detail = match (check.status, &check.error) {
                            (Some(status), _) => format!(
                                "HTTP {} in {}ms",
                                status,
                                check.latency_ms.unwrap_or_default()
                            ),
                            (None, Some(error)) => error.clone(),
                            (None, None) => String::new(),
                        };
                        let mark = if check.available {
                            style("✓").green()
                        } else {
                            style("✗").red()
                        };
                        println!("  {} {}: {}", mark, name, style(detail).dim());
                    }
                }
            }
        }

        Ok(if report.is_healthy() {
            exit_codes::SUCCESS
        } else {
            exit_codes::ERROR
        })
    }
}
