//! Config file discovery and environment overrides.
//!
//! Resolution order:
//! 1. Explicit path (CLI `--config`)
//! 2. `PORTCULLIS_CONFIG` environment variable
//! 3. `./portcullis.toml`
//!
//! Secrets may then be overridden from the environment so they stay out of
//! the file: `PORTCULLIS_CLIENT_SECRET`, `PORTCULLIS_ENCRYPTION_KEY`.

use std::path::{Path, PathBuf};

use crate::{ConfigError, GatewayConfig, Result};

/// Default config filename in the working directory.
const PROJECT_CONFIG_FILE: &str = "portcullis.toml";

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "PORTCULLIS_CONFIG";

/// Environment variable overriding `client_secret`.
const CLIENT_SECRET_ENV: &str = "PORTCULLIS_CLIENT_SECRET";

/// Environment variable overriding `encryption_key`.
const ENCRYPTION_KEY_ENV: &str = "PORTCULLIS_ENCRYPTION_KEY";

/// Locate, load and validate the gateway configuration.
pub fn load_config(path: Option<&Path>) -> Result<GatewayConfig> {
    let path = resolve_path(path, |key| std::env::var(key).ok());
    let mut config = load_config_file(&path)?;
    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    config.validate()?;
    Ok(config)
}

/// Load config from a specific file path (no discovery, no validation).
pub fn load_config_file(path: &Path) -> Result<GatewayConfig> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.display().to_string(),
        source: e,
    })?;
    GatewayConfig::from_toml(&contents)
}

fn resolve_path(explicit: Option<&Path>, env: impl Fn(&str) -> Option<String>) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }
    if let Some(path) = env(CONFIG_ENV)
        && !path.is_empty()
    {
        return PathBuf::from(path);
    }
    PathBuf::from(PROJECT_CONFIG_FILE)
}

fn apply_env_overrides(config: &mut GatewayConfig, env: impl Fn(&str) -> Option<String>) {
    if let Some(secret) = env(CLIENT_SECRET_ENV).filter(|s| !s.is_empty()) {
        config.client_secret = secret;
    }
    if let Some(key) = env(ENCRYPTION_KEY_ENV).filter(|s| !s.is_empty()) {
        config.encryption_key = key;
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
