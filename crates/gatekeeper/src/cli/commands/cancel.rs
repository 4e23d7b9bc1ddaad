//! Cancel command

use std::sync::Arc;

use clap::Args;
use console::style;
use dialoguer::Confirm;
use tracing::info;

use gatekeeper_core::{CancelToken, MetricsCollector, RetryPolicy, StoreKind};
use gatekeeper_stores::registry::build_client;
use gatekeeper_stores::PublishPipeline;

use crate::cli::{cancel_on_ctrl_c, output, runtime, Cli, OutputFormat};
use crate::exit_codes;

/// Withdraw a pending submission
#[derive(Debug, Args)]
pub struct CancelCommand {
    /// Store holding the submission
    #[arg(long)]
    pub store: StoreKind,

    /// Upload or submission id (Edge cancels the current draft when omitted)
    #[arg(long)]
    pub upload_id: Option<String>,

    /// Skip the confirmation prompt
    #[arg(short = 'y', long)]
    pub yes: bool,
}

impl CancelCommand {
    /// Execute the cancel command
    pub fn execute(&self, cli: &Cli) -> anyhow::Result<i32> {
        info!(store = %self.store, upload_id = ?self.upload_id, "executing cancel command");

        if !self.yes {
            let target = self.upload_id.as_deref().unwrap_or("the current draft");
            let confirmed = Confirm::new()
                .with_prompt(format!(
                    "Cancel {} on {}?",
                    target,
                    self.store.display_name()
                ))
                .default(false)
                .interact()?;

            if !confirmed {
                println!("{}", style("Aborted.").yellow());
                return Ok(exit_codes::CANCELLED);
            }
        }

        runtime()?.block_on(self.execute_async(cli))
    }

    async fn execute_async(&self, cli: &Cli) -> anyhow::Result<i32> {
        let (config, _) = cli.load_config()?;
        let client = build_client(&config, self.store)?;

        let cancel = CancelToken::new();
        cancel_on_ctrl_c(&cancel);
        let pipeline = PublishPipeline::new(
            RetryPolicy::new(config.retry_config()),
            Arc::new(MetricsCollector::new()),
            cancel,
        );

        let spinner = output::spinner(
            format!("Cancelling on {}...", self.store.display_name()),
            cli.is_interactive_text(),
        );
        let result = pipeline
            .cancel_submission(client.as_ref(), self.upload_id.as_deref())
            .await;
        spinner.finish_and_clear();
        let result = result?;

        match cli.format {
            OutputFormat::Json => {
                let output = serde_json::json!({
                    "store": self.store.as_str(),
                    "uploadId": self.upload_id,
                    "cancelled": result.cancelled,
                });
                println!("{}", serde_json::to_string_pretty(&output)?);
            }
            OutputFormat::Text => {
                if !cli.quiet {
                    output::success(&format!(
                        "Cancelled submission on {}",
                        output::store_style().apply_to(self.store.display_name())
                    ));
                }
            }
        }

        Ok(exit_codes::SUCCESS)
    }
}
