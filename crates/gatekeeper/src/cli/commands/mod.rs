//! CLI commands

mod cancel;
mod completions;
mod health;
mod init;
mod publish;
mod validate;

pub use cancel::CancelCommand;
pub use completions::CompletionsCommand;
pub use health::HealthCommand;
pub use init::InitCommand;
pub use publish::PublishCommand;
pub use validate::ValidateCommand;
