//! Init command

use std::path::{Path, PathBuf};

use clap::Args;
use console::style;
use dialoguer::Confirm;
use tracing::info;

use gatekeeper_core::config::{default_config_json, DEFAULT_CONFIG_FILE};

use crate::cli::Cli;
use crate::exit_codes;

/// Create a configuration file
#[derive(Debug, Args)]
pub struct InitCommand {
    /// Force overwrite existing configuration
    #[arg(short, long)]
    pub force: bool,

    /// Use defaults without prompting
    #[arg(short = 'y', long)]
    pub yes: bool,

    /// Output file path
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

impl InitCommand {
    /// Execute the init command
    pub fn execute(&self, cli: &Cli) -> anyhow::Result<i32> {
        info!(force = self.force, yes = self.yes, "executing init command");
        let cwd = std::env::current_dir()?;
        let config_path = self
            .output
            .clone()
            .unwrap_or_else(|| cwd.join(DEFAULT_CONFIG_FILE));

        if config_path.exists() && !self.force {
            if self.yes {
                anyhow::bail!(
                    "Configuration file already exists at {}. Use --force to overwrite.",
                    config_path.display()
                );
            }

            let overwrite = Confirm::new()
                .with_prompt(format!(
                    "Configuration file already exists at {}. Overwrite?",
                    config_path.display()
                ))
                .default(false)
                .interact()?;

            if !overwrite {
                println!("{}", style("Aborted.").yellow());
                return Ok(exit_codes::CANCELLED);
            }
        }

        write_template(&config_path)?;

        if !cli.quiet {
            println!(
                "{} Created configuration at {}",
                style("✓").green().bold(),
                style(config_path.display()).cyan()
            );
            println!();
            println!("Next steps:");
            println!("  1. Fill in githubToken, repo, browsers and credentials in {}", config_path.display());
            println!("  2. Run {} to check your manifest", style("gatekeeper validate").cyan());
            println!("  3. Run {} to release", style("gatekeeper publish").cyan());
        }

        Ok(exit_codes::SUCCESS)
    }
}

fn write_template(path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, default_config_json())?;
    Ok(())
}
