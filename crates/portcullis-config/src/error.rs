//! Configuration error types.

/// Result type alias for config operations.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Errors that can occur while loading or validating the gateway configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read a config file.
    #[error("failed to read config file '{path}': {source}")]
    ReadFile {
        path: String,
        source: std::io::Error,
    },

    /// Failed to parse TOML.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// Failed to serialize config.
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// Missing required field.
    #[error("missing required field '{field}'")]
    MissingField { field: String },

    /// A URL field could not be parsed.
    #[error("invalid url for '{field}': {reason}")]
    InvalidUrl { field: String, reason: String },

    /// The cookie encryption key has the wrong length.
    #[error("encryption_key must be exactly 32 bytes, got {0}")]
    InvalidEncryptionKey(usize),

    /// A resource rule is malformed.
    #[error("invalid resource '{uri}': {reason}")]
    InvalidResource { uri: String, reason: String },
}
