//! Identity provider interface.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Tokens issued by the IdP token endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_expires_in: Option<u64>,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

/// The operations the gateway needs from an OpenID Connect provider.
///
/// Signature verification and discovery are the provider's concern; the
/// gateway only drives the grants and reads the returned tokens.
#[async_trait]
pub trait IdentityProvider: Send + Sync + std::fmt::Debug {
    /// Build the browser redirect into the provider's login page.
    fn authorization_url(&self, redirect_uri: &str, state: &str) -> String;

    /// Exchange an authorization code (Authorization Code grant).
    async fn exchange_code(&self, code: &str, redirect_uri: &str) -> Result<TokenResponse>;

    /// Resource Owner Password Credentials grant.
    async fn password_grant(&self, username: &str, password: &str) -> Result<TokenResponse>;

    /// Obtain new tokens from a refresh token.
    async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse>;

    /// Whether [`IdentityProvider::revoke`] talks to anything.
    fn supports_revocation(&self) -> bool;

    /// Revoke a token, ending the provider-side session.
    async fn revoke(&self, token: &str) -> Result<()>;
}

/// Shared provider for use across handlers.
pub type SharedProvider = Arc<dyn IdentityProvider>;
