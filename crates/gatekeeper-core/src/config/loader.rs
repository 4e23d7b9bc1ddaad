//! Configuration loading

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::ConfigError;

use super::defaults::{config_file_names, GITHUB_TOKEN_ENV};
use super::types::Config;
use super::validation::validate_config;

/// Load and validate configuration from a file
///
/// `GATEKEEPER_GITHUB_TOKEN`, when set, replaces the file's `githubToken`.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    info!(path = %path.display(), "loading config");

    let content = std::fs::read_to_string(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => ConfigError::NotFound(path.to_path_buf()),
        _ => ConfigError::Io(e),
    })?;

    let mut config = parse_config(path, &content)?;
    config.apply_overrides(std::env::var(GITHUB_TOKEN_ENV).ok());

    validate_config(&config)?;
    debug!(path = %path.display(), "config loaded and validated");
    Ok(config)
}

/// Parse configuration without validating it
pub fn parse_config(path: &Path, content: &str) -> Result<Config, ConfigError> {
    serde_json::from_str(content).map_err(|e| ConfigError::ParseError {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

/// Find configuration file in directory or parent directories.
///
/// At each directory level the search checks `<dir>/<name>` and then
/// `<dir>/.github/<name>`. The first match wins.
pub fn find_config(start_dir: &Path) -> Option<PathBuf> {
    debug!(start_dir = %start_dir.display(), "searching for config file");
    let mut current = start_dir.to_path_buf();

    loop {
        for name in config_file_names() {
            let config_path = current.join(name);
            if config_path.is_file() {
                info!(path = %config_path.display(), "found config file");
                return Some(config_path);
            }

            let github_path = current.join(".github").join(name);
            if github_path.is_file() {
                info!(path = %github_path.display(), "found config file in .github/");
                return Some(github_path);
            }
        }

        if !current.pop() {
            break;
        }
    }

    debug!("no config file found");
    None
}

/// Load configuration from directory (searching parent directories)
pub fn load_config_from_dir(dir: &Path) -> Result<(Config, PathBuf), ConfigError> {
    let config_path = find_config(dir).ok_or_else(|| ConfigError::NotFound(dir.to_path_buf()))?;

    let config = load_config(&config_path)?;
    Ok((config, config_path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const VALID: &str = r#"{
        "githubToken": "ghp_abcdef123456",
        "repo": "acme/extension",
        "browsers": ["firefox"],
        "credentials": { "firefox": { "apiKey": "key", "apiSecret": "secret" } }
    }"#;

    #[test]
    fn test_find_config_in_dir() {
        let temp = TempDir::new().unwrap();
        let config_path = temp.path().join(".gatekeeperrc.json");
        std::fs::write(&config_path, VALID).unwrap();

        assert_eq!(find_config(temp.path()), Some(config_path));
    }

    #[test]
    fn test_find_config_walks_parents() {
        let temp = TempDir::new().unwrap();
        let config_path = temp.path().join(".gatekeeperrc.json");
        std::fs::write(&config_path, VALID).unwrap();
        let nested = temp.path().join("src").join("popup");
        std::fs::create_dir_all(&nested).unwrap();

        assert_eq!(find_config(&nested), Some(config_path));
    }

    #[test]
    fn test_root_level_preferred_over_github_dir() {
        let temp = TempDir::new().unwrap();
        let root_path = temp.path().join(".gatekeeperrc.json");
        let github_dir = temp.path().join(".github");
        std::fs::create_dir_all(&github_dir).unwrap();
        std::fs::write(&root_path, VALID).unwrap();
        std::fs::write(github_dir.join(".gatekeeperrc.json"), VALID).unwrap();

        assert_eq!(find_config(temp.path()), Some(root_path));
    }

    #[test]
    fn test_find_config_in_github_dir() {
        let temp = TempDir::new().unwrap();
        let github_dir = temp.path().join(".github");
        std::fs::create_dir_all(&github_dir).unwrap();
        let config_path = github_dir.join("gatekeeper.json");
        std::fs::write(&config_path, VALID).unwrap();

        assert_eq!(find_config(temp.path()), Some(config_path));
    }

    #[test]
    fn test_load_config() {
        let temp = TempDir::new().unwrap();
        let config_path = temp.path().join(".gatekeeperrc.json");
        std::fs::write(&config_path, VALID).unwrap();

        let config = load_config(&config_path).unwrap();
        assert_eq!(config.repo, "acme/extension");
        assert_eq!(config.browsers, vec!["firefox".to_string()]);
    }

    #[test]
    fn test_load_missing_file() {
        let temp = TempDir::new().unwrap();
        let err = load_config(&temp.path().join("missing.json")).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(_)));
    }

    #[test]
    fn test_load_malformed_json() {
        let temp = TempDir::new().unwrap();
        let config_path = temp.path().join(".gatekeeperrc.json");
        std::fs::write(&config_path, "{ not json").unwrap();

        let err = load_config(&config_path).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }

    #[test]
    fn test_load_invalid_config() {
        let temp = TempDir::new().unwrap();
        let config_path = temp.path().join(".gatekeeperrc.json");
        std::fs::write(&config_path, r#"{ "githubToken": "nope" }"#).unwrap();

        let err = load_config(&config_path).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn test_load_from_dir_without_config() {
        let temp = TempDir::new().unwrap();
        assert!(matches!(
            load_config_from_dir(temp.path()),
            Err(ConfigError::NotFound(_))
        ));
    }
}
