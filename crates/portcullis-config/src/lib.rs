//! Configuration system for the Portcullis gateway.
//!
//! Provides the TOML-backed [`GatewayConfig`]:
//! - IdP endpoints and client credentials
//! - Cookie names and the refresh-token encryption key
//! - Feature switches (`enable_login_handler`, `no_redirects`, refresh)
//! - Protected [`ResourceRule`]s

pub mod discovery;
pub mod error;
pub mod types;

pub use discovery::{CONFIG_ENV, load_config, load_config_file};
pub use error::{ConfigError, Result};
pub use types::*;
