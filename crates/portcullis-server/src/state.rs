//! Application state shared across handlers.

use std::sync::Arc;

use axum::http::{HeaderMap, header::HOST};
use portcullis_config::GatewayConfig;
use portcullis_oidc::{OidcClient, OidcConfig, SharedProvider};

use crate::enforce::{SharedDenialPolicy, denial_policy};
use crate::error::{GatewayError, Result};
use crate::session::SessionStore;
use crate::upstream::Upstream;

/// Path of the OAuth callback, appended to the gateway's public URL.
pub const CALLBACK_PATH: &str = "/oauth/callback";

/// Header a TLS-terminating proxy uses to report the original scheme.
const FORWARDED_PROTO: &str = "x-forwarded-proto";

/// Application state shared across all handlers.
///
/// Everything here is built once at startup and never mutated.
#[derive(Clone)]
pub struct AppState {
    /// Gateway configuration.
    pub config: Arc<GatewayConfig>,

    /// Identity provider client.
    pub provider: SharedProvider,

    /// Session cookie codec.
    pub sessions: Arc<SessionStore>,

    /// Response for unauthenticated requests.
    pub denial: SharedDenialPolicy,

    /// Upstream forwarder (`None` answers authorised requests locally).
    pub upstream: Option<Arc<Upstream>>,
}

impl AppState {
    /// Create state around an existing provider.
    pub fn new(config: GatewayConfig, provider: SharedProvider) -> Result<Self> {
        let sessions = SessionStore::new(&config)?;
        let denial = denial_policy(&config);
        let upstream = match config.upstream_url {
            Some(ref url) => Some(Arc::new(Upstream::new(
                url,
                vec![
                    config.cookie_access_name.clone(),
                    config.cookie_refresh_name.clone(),
                ],
            )?)),
            None => None,
        };

        Ok(Self {
            config: Arc::new(config),
            provider,
            sessions: Arc::new(sessions),
            denial,
            upstream,
        })
    }

    /// Create state with an [`OidcClient`] talking to the configured endpoints.
    pub fn from_config(config: GatewayConfig) -> Result<Self> {
        let client = OidcClient::new(OidcConfig {
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            authorization_endpoint: config.authorization_endpoint.clone(),
            token_endpoint: config.token_endpoint.clone(),
            revocation_endpoint: config.revocation_endpoint.clone(),
            scopes: config.scopes.clone(),
            timeout: config.idp_timeout(),
        })
        .map_err(|e| GatewayError::Config(e.to_string()))?;

        Self::new(config, Arc::new(client))
    }

    /// Replace the denial policy.
    pub fn with_denial_policy(mut self, denial: SharedDenialPolicy) -> Self {
        self.denial = denial;
        self
    }

    /// Get the gateway configuration.
    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// The `redirect_uri` registered with the IdP.
    ///
    /// Uses `redirection_url` when configured, otherwise the request's own
    /// scheme and host.
    pub fn redirect_uri(&self, headers: &HeaderMap) -> String {
        if let Some(ref base) = self.config.redirection_url {
            return format!("{}{}", base.trim_end_matches('/'), CALLBACK_PATH);
        }

        let scheme = headers
            .get(FORWARDED_PROTO)
            .and_then(|v| v.to_str().ok())
            .filter(|v| *v == "https" || *v == "http")
            .unwrap_or("http");
        let host = headers
            .get(HOST)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("localhost");
        format!("{scheme}://{host}{CALLBACK_PATH}")
    }
}
