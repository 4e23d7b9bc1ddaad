//! Shell completions generation command

use std::io;
use std::path::{Path, PathBuf};

use clap::{Args, CommandFactory};
use clap_complete::{generate, generate_to, Shell};
use tracing::{debug, info};

use crate::cli::Cli;
use crate::exit_codes;

const BIN_NAME: &str = "gatekeeper";

/// Generate shell completions
#[derive(Debug, Args)]
pub struct CompletionsCommand {
    /// Shell to generate completions for (default: detected from $SHELL)
    #[arg(value_enum)]
    pub shell: Option<Shell>,

    /// Write to this file, or into this directory under the shell's
    /// conventional file name
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

impl CompletionsCommand {
    /// Execute the completions command
    pub fn execute(&self, cli: &Cli) -> anyhow::Result<i32> {
        let shell = resolve_shell(self.shell, std::env::var_os("SHELL").as_deref().map(Path::new))?;
        info!(shell = %shell, "executing completions command");

        match &self.output {
            Some(output) => {
                let written = write_completions(shell, output)?;
                if !cli.quiet {
                    println!("Completions written to {}", written.display());
                }
            }
            None => generate(shell, &mut Cli::command(), BIN_NAME, &mut io::stdout()),
        }

        Ok(exit_codes::SUCCESS)
    }
}

/// Explicit shell first, then the login shell's path
fn resolve_shell(explicit: Option<Shell>, shell_path: Option<&Path>) -> anyhow::Result<Shell> {
    if let Some(shell) = explicit {
        return Ok(shell);
    }
    let detected = shell_path.and_then(Shell::from_shell_path);
    debug!(shell_path = ?shell_path, detected = ?detected, "detecting shell");
    detected.ok_or_else(|| {
        anyhow::anyhow!("Unable to detect shell from $SHELL; pass one of bash, zsh, fish, powershell, elvish")
    })
}

fn write_completions(shell: Shell, output: &Path) -> anyhow::Result<PathBuf> {
    let mut cmd = Cli::command();
    if output.is_dir() {
        return Ok(generate_to(shell, &mut cmd, BIN_NAME, output)?);
    }

    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = std::fs::File::create(output)?;
    generate(shell, &mut cmd, BIN_NAME, &mut file);
    Ok(output.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_shell_wins() {
        let shell = resolve_shell(Some(Shell::Fish), Some(Path::new("/bin/zsh"))).unwrap();
        assert_eq!(shell, Shell::Fish);
    }

    #[test]
    fn test_detects_shell_from_path() {
        assert_eq!(resolve_shell(None, Some(Path::new("/usr/bin/zsh"))).unwrap(), Shell::Zsh);
        assert_eq!(resolve_shell(None, Some(Path::new("/bin/bash"))).unwrap(), Shell::Bash);
        assert!(resolve_shell(None, Some(Path::new("/bin/tcsh"))).is_err());
        assert!(resolve_shell(None, None).is_err());
    }

    #[test]
    fn test_writes_into_directory_with_conventional_name() {
        let dir = tempfile::TempDir::new().unwrap();

        let written = write_completions(Shell::Zsh, dir.path()).unwrap();

        assert_eq!(written, dir.path().join("_gatekeeper"));
        let script = std::fs::read_to_string(&written).unwrap();
        assert!(script.contains("publish"));
    }

    #[test]
    fn test_writes_to_file_path() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("completions").join("gatekeeper.bash");

        let written = write_completions(Shell::Bash, &path).unwrap();

        assert_eq!(written, path);
        assert!(std::fs::read_to_string(&path).unwrap().contains("gatekeeper"));
    }
}
