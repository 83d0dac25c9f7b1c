//! CLI command handlers.

use std::path::PathBuf;

use anyhow::{Context as _, Result};
use portcullis_config::GatewayConfig;

pub mod check;
pub mod serve;

/// Shared context for all commands.
#[derive(Debug, Clone)]
pub struct Context {
    /// Explicit config file, if one was given.
    pub config_path: Option<PathBuf>,
    /// Verbose output enabled.
    pub verbose: bool,
}

impl Context {
    /// Load and validate the gateway configuration.
    pub fn load_config(&self) -> Result<GatewayConfig> {
        let path = self.config_path.as_deref();
        portcullis_config::load_config(path).with_context(|| match path {
            Some(path) => format!("failed to load config from {}", path.display()),
            None => "failed to load config".to_string(),
        })
    }
}
