//! `reqwest`-backed OpenID Connect client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::error::{ProviderError, Result};
use crate::provider::{IdentityProvider, TokenResponse};

/// Endpoints and credentials of the OAuth client.
#[derive(Debug, Clone)]
pub struct OidcConfig {
    pub client_id: String,
    pub client_secret: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub revocation_endpoint: Option<String>,
    pub scopes: Vec<String>,
    pub timeout: Duration,
}

/// OAuth error body (RFC 6749 §5.2).
#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

/// OpenID Connect client talking to the IdP over HTTP.
#[derive(Debug, Clone)]
pub struct OidcClient {
    http: Client,
    config: OidcConfig,
}

impl OidcClient {
    /// Create a client. Every request is bounded by `config.timeout`.
    pub fn new(config: OidcConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ProviderError::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { http, config })
    }

    /// Get the config.
    pub fn config(&self) -> &OidcConfig {
        &self.config
    }

    async fn token_request(&self, grant: &str, params: &[(&str, &str)]) -> Result<TokenResponse> {
        let mut form: Vec<(&str, &str)> = vec![
            ("grant_type", grant),
            ("client_id", &self.config.client_id),
            ("client_secret", &self.config.client_secret),
        ];
        form.extend_from_slice(params);

        tracing::debug!(grant, endpoint = %self.config.token_endpoint, "Token request");

        let response = self
            .http
            .post(&self.config.token_endpoint)
            .form(&form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(error_from_response(status.as_u16(), &body));
        }

        response
            .json::<TokenResponse>()
            .await
            .map_err(|e| ProviderError::Backend(format!("Failed to parse token response: {}", e)))
    }
}

/// Map a non-success IdP answer onto a [`ProviderError`].
fn error_from_response(status: u16, body: &str) -> ProviderError {
    if status >= 500 {
        return ProviderError::Backend(format!("identity provider returned {}", status));
    }

    match serde_json::from_str::<ErrorBody>(body) {
        Ok(err) => ProviderError::Rejected {
            status,
            error: err.error,
            description: err.error_description,
        },
        Err(_) => ProviderError::Rejected {
            status,
            error: "invalid_request".to_string(),
            description: (!body.is_empty()).then(|| body.to_string()),
        },
    }
}

#[async_trait]
impl IdentityProvider for OidcClient {
    fn authorization_url(&self, redirect_uri: &str, state: &str) -> String {
        let scope = self.config.scopes.join(" ");
        let params = [
            ("client_id", self.config.client_id.as_str()),
            ("redirect_uri", redirect_uri),
            ("response_type", "code"),
            ("scope", scope.as_str()),
            ("state", state),
        ];

        let query = params
            .iter()
            .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&");

        let separator = if self.config.authorization_endpoint.contains('?') {
            '&'
        } else {
            '?'
        };
        format!("{}{}{}", self.config.authorization_endpoint, separator, query)
    }

    async fn exchange_code(&self, code: &str, redirect_uri: &str) -> Result<TokenResponse> {
        self.token_request(
            "authorization_code",
            &[("code", code), ("redirect_uri", redirect_uri)],
        )
        .await
    }

    async fn password_grant(&self, username: &str, password: &str) -> Result<TokenResponse> {
        let scope = self.config.scopes.join(" ");
        self.token_request(
            "password",
            &[
                ("username", username),
                ("password", password),
                ("scope", &scope),
            ],
        )
        .await
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse> {
        self.token_request("refresh_token", &[("refresh_token", refresh_token)])
            .await
    }

    fn supports_revocation(&self) -> bool {
        self.config.revocation_endpoint.is_some()
    }

    async fn revoke(&self, token: &str) -> Result<()> {
        let Some(ref endpoint) = self.config.revocation_endpoint else {
            return Err(ProviderError::Config(
                "no revocation endpoint configured".to_string(),
            ));
        };

        let form = [
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("token", token),
        ];

        let response = self.http.post(endpoint).form(&form).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(error_from_response(status.as_u16(), &body));
        }

        tracing::debug!("Token revoked");
        Ok(())
    }
}
