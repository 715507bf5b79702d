//! Configuration loading

use std::path::Path;

use anyhow::Result;
use tracing::info;

use crate::Config;

/// Environment variable naming an explicit config file
pub const CONFIG_PATH_ENV: &str = "EASYSTREAMER_CONFIG_PATH";

const DEFAULT_CONFIG_FILE: &str = "config.yaml";

/// Load configuration from a config file and environment variables
///
/// Config file search order:
/// 1. `path_override` (the `--config` flag); it must exist
/// 2. `EASYSTREAMER_CONFIG_PATH` environment variable
/// 3. ./config.yaml (current working directory)
/// 4. Fall back to environment variables only
pub fn load_config(path_override: Option<&str>) -> Result<Config> {
    if let Some(path) = path_override {
        if !Path::new(path).exists() {
            anyhow::bail!("Config file not found: {path}");
        }
    }

    let config_path = path_override
        .map(str::to_string)
        .or_else(|| {
            std::env::var(CONFIG_PATH_ENV)
                .ok()
                .filter(|p| Path::new(p).exists())
        })
        .or_else(|| {
            Path::new(DEFAULT_CONFIG_FILE)
                .exists()
                .then(|| DEFAULT_CONFIG_FILE.to_string())
        });

    let config = if let Some(path) = config_path {
        eprintln!("Loading config from {path}");
        Config::load(Some(&path))?
    } else {
        Config::from_env().unwrap_or_else(|e| {
            eprintln!("Failed to load config from environment: {e}");
            eprintln!("Using default configuration");
            Config::default()
        })
    };

    // Fail fast on misconfigurations
    if let Err(errors) = config.validate() {
        for error in &errors {
            tracing::error!("Config validation error: {}", error);
        }
        return Err(anyhow::anyhow!(
            "Configuration validation failed with {} error(s): {}",
            errors.len(),
            errors.join("; ")
        ));
    }

    info!(server = %config.server.base_url, "Configuration loaded and validated");

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_missing_explicit_path_is_an_error() {
        assert!(load_config(Some("/nonexistent/easystreamer.yaml")).is_err());
    }

    #[test]
    fn test_explicit_path_is_loaded_and_validated() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(file, "server:\n  base_url: \"http://10.0.0.2:8080\"").unwrap();

        let config = load_config(file.path().to_str()).unwrap();
        assert_eq!(config.server.base_url, "http://10.0.0.2:8080");
    }

    #[test]
    fn test_invalid_file_fails_validation() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(file, "catalog:\n  streams_poll_interval_ms: 0").unwrap();

        assert!(load_config(file.path().to_str()).is_err());
    }
}
