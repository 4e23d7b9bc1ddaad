//! Gatekeeper - browser extension publishing CLI

mod cli;
mod exit_codes;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry};

use cli::Cli;

fn main() {
    let guard = init_tracing();

    let cli = Cli::parse();
    let code = match cli.execute() {
        Ok(code) => code,
        Err(e) => {
            cli::output::error(&gatekeeper_core::redact(&format!("{:#}", e)));
            exit_codes::for_error(&e)
        }
    };

    // process::exit skips destructors, so flush the file log first
    drop(guard);
    std::process::exit(code);
}

/// Set up tracing with two layers:
/// - Console: RUST_LOG, then GATEKEEPER_LOG_LEVEL (default: warn); JSON when
///   GATEKEEPER_LOG_FORMAT=json
/// - File: always debug-level JSON to ~/.gatekeeper/logs/
fn init_tracing() -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let console_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_from_env("GATEKEEPER_LOG_LEVEL"))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let json_console = std::env::var("GATEKEEPER_LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json"));
    let console: Box<dyn Layer<Registry> + Send + Sync> = if json_console {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_filter(console_filter)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
            .with_filter(console_filter)
            .boxed()
    };

    if let Some(log_dir) = log_directory() {
        let file_appender = tracing_appender::rolling::daily(&log_dir, "gatekeeper.log");
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        tracing_subscriber::registry()
            .with(console)
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(non_blocking)
                    .with_target(true)
                    .with_filter(EnvFilter::new("debug")),
            )
            .init();

        return Some(guard);
    }

    // Fallback: console only
    tracing_subscriber::registry().with(console).init();

    None
}

/// Returns the log directory path, creating it if needed.
fn log_directory() -> Option<std::path::PathBuf> {
    let log_dir = dirs::home_dir()?.join(".gatekeeper").join("logs");
    std::fs::create_dir_all(&log_dir).ok()?;
    Some(log_dir)
}
