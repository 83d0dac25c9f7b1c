//! Error types for identity provider calls.

/// Result type alias for this crate.
pub type Result<T> = std::result::Result<T, ProviderError>;

/// Errors that can occur while talking to the identity provider.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// The IdP could not be reached, or the call timed out.
    #[error("Network error: {0}")]
    Network(String),

    /// The IdP refused the grant or request (4xx).
    #[error("Rejected by identity provider ({status}): {error}")]
    Rejected {
        status: u16,
        error: String,
        description: Option<String>,
    },

    /// The IdP failed or answered with something unusable.
    #[error("Backend error: {0}")]
    Backend(String),

    /// The client is not configured for the requested operation.
    #[error("Config error: {0}")]
    Config(String),
}

impl ProviderError {
    /// Whether the IdP refused the request, as opposed to failing to answer.
    pub fn is_rejection(&self) -> bool {
        matches!(self, ProviderError::Rejected { .. })
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ProviderError::Network(format!("request timed out: {}", e))
        } else {
            ProviderError::Network(e.to_string())
        }
    }
}
