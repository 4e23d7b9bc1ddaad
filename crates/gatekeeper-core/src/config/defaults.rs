//! Default configuration values

use super::types::Config;

/// Default configuration file name
pub const DEFAULT_CONFIG_FILE: &str = ".gatekeeperrc.json";

/// Alternative configuration file name
pub const ALT_CONFIG_FILE: &str = "gatekeeper.json";

/// Environment variable overriding `githubToken`
pub const GITHUB_TOKEN_ENV: &str = "GATEKEEPER_GITHUB_TOKEN";

/// Get list of config file names to search for
pub fn config_file_names() -> Vec<&'static str> {
    vec![DEFAULT_CONFIG_FILE, ALT_CONFIG_FILE]
}

/// Pretty-printed default configuration
pub fn default_config_json() -> String {
    let mut json = serde_json::to_string_pretty(&Config::template())
        .unwrap_or_else(|_| "{}".to_string());
    json.push('\n');
    json
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_round_trips() {
        let parsed: Config = serde_json::from_str(&default_config_json()).unwrap();
        assert_eq!(parsed, Config::template());
    }
}
