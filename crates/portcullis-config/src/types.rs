//! Configuration types mapping to the TOML schema.
//!
//! ```toml
//! listen = "0.0.0.0:3000"
//! upstream_url = "http://127.0.0.1:8080"
//! client_id = "gateway"
//! client_secret = "secret"
//! authorization_endpoint = "https://idp.example.com/auth/realms/main/protocol/openid-connect/auth"
//! token_endpoint = "https://idp.example.com/auth/realms/main/protocol/openid-connect/token"
//! encryption_key = "AgXa7xRcoClDEU0ZDSH4X0XhL5Qy2Z2j"
//!
//! [[resources]]
//! uri = "/admin"
//! roles = ["admin"]
//! ```

use std::net::SocketAddr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{ConfigError, Result};

/// Default port the gateway listens on (loopback only).
pub const DEFAULT_PORT: u16 = 3000;

/// Default name of the cookie carrying the access token.
pub const DEFAULT_ACCESS_COOKIE: &str = "kc-access";

/// Default name of the cookie carrying the encrypted refresh token.
pub const DEFAULT_REFRESH_COOKIE: &str = "kc-state";

/// Default lifetime of the refresh cookie when the refresh token has no `exp` (8 hours).
pub const DEFAULT_REFRESH_SESSION_TTL_SECS: u64 = 8 * 60 * 60;

/// Default bound on every IdP call.
pub const DEFAULT_IDP_TIMEOUT_SECS: u64 = 10;

// ─────────────────────────────────────────────────────────────────────────────
// Gateway Config
// ─────────────────────────────────────────────────────────────────────────────

/// Root configuration structure.
///
/// Built once at startup and shared read-only by every request handler.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Address to bind the gateway to.
    pub listen: SocketAddr,

    /// Upstream service that authorised requests are forwarded to.
    /// `None` makes the gateway answer authorised requests itself.
    pub upstream_url: Option<String>,

    /// Public base URL of the gateway, used to build the OAuth `redirect_uri`.
    /// When unset the `Host` header of the request is used.
    pub redirection_url: Option<String>,

    /// OAuth client id registered with the IdP.
    pub client_id: String,

    /// OAuth client secret registered with the IdP.
    pub client_secret: String,

    /// IdP authorization endpoint (browser redirect target).
    pub authorization_endpoint: String,

    /// IdP token endpoint (code exchange, password grant, refresh).
    pub token_endpoint: String,

    /// IdP revocation/logout endpoint. Logout skips revocation when unset.
    pub revocation_endpoint: Option<String>,

    /// Scopes requested on the authorization redirect.
    pub scopes: Vec<String>,

    /// Symmetric key (32 bytes) used to encrypt the refresh-token cookie.
    pub encryption_key: String,

    /// Name of the access-token cookie.
    pub cookie_access_name: String,

    /// Name of the refresh-token cookie.
    pub cookie_refresh_name: String,

    /// Mark session cookies `Secure`.
    pub secure_cookie: bool,

    /// Enable `POST /oauth/login` (resource owner password grant).
    pub enable_login_handler: bool,

    /// Answer denials with `401` instead of redirecting into the OAuth flow.
    pub no_redirects: bool,

    /// Use the refresh token to renew expired access tokens.
    pub enable_refresh_tokens: bool,

    /// Refresh cookie lifetime when the refresh token carries no `exp`.
    pub refresh_session_ttl_secs: u64,

    /// Timeout applied to every IdP call, in seconds.
    pub idp_timeout_secs: u64,

    /// Protected resources.
    pub resources: Vec<ResourceRule>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([127, 0, 0, 1], DEFAULT_PORT)),
            upstream_url: None,
            redirection_url: None,
            client_id: String::new(),
            client_secret: String::new(),
            authorization_endpoint: String::new(),
            token_endpoint: String::new(),
            revocation_endpoint: None,
            scopes: vec![
                "openid".to_string(),
                "email".to_string(),
                "profile".to_string(),
            ],
            encryption_key: String::new(),
            cookie_access_name: DEFAULT_ACCESS_COOKIE.to_string(),
            cookie_refresh_name: DEFAULT_REFRESH_COOKIE.to_string(),
            secure_cookie: true,
            enable_login_handler: false,
            no_redirects: false,
            enable_refresh_tokens: false,
            refresh_session_ttl_secs: DEFAULT_REFRESH_SESSION_TTL_SECS,
            idp_timeout_secs: DEFAULT_IDP_TIMEOUT_SECS,
            resources: Vec::new(),
        }
    }
}

impl GatewayConfig {
    /// Create an empty config with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Serialize to a TOML string.
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Check that the config is usable by the gateway.
    pub fn validate(&self) -> Result<()> {
        require("client_id", &self.client_id)?;
        require("authorization_endpoint", &self.authorization_endpoint)?;
        require("token_endpoint", &self.token_endpoint)?;

        check_url("authorization_endpoint", &self.authorization_endpoint)?;
        check_url("token_endpoint", &self.token_endpoint)?;
        if let Some(ref url) = self.revocation_endpoint {
            check_url("revocation_endpoint", url)?;
        }
        if let Some(ref url) = self.upstream_url {
            check_url("upstream_url", url)?;
        }
        if let Some(ref url) = self.redirection_url {
            check_url("redirection_url", url)?;
        }

        if self.encryption_key.len() != 32 {
            return Err(ConfigError::InvalidEncryptionKey(self.encryption_key.len()));
        }

        for resource in &self.resources {
            resource.validate()?;
        }

        Ok(())
    }

    /// Find the resource rule governing a request.
    ///
    /// The most specific (longest) matching URI wins.
    pub fn find_resource(&self, method: &str, path: &str) -> Option<&ResourceRule> {
        self.resources
            .iter()
            .filter(|r| r.matches(method, path))
            .max_by_key(|r| r.prefix().len())
    }

    /// Timeout for IdP calls.
    pub fn idp_timeout(&self) -> Duration {
        Duration::from_secs(self.idp_timeout_secs)
    }

    /// Refresh cookie lifetime fallback.
    pub fn refresh_session_ttl(&self) -> Duration {
        Duration::from_secs(self.refresh_session_ttl_secs)
    }

    /// Set the listen address.
    pub fn with_listen(mut self, addr: SocketAddr) -> Self {
        self.listen = addr;
        self
    }

    /// Set the upstream URL.
    pub fn with_upstream_url(mut self, url: impl Into<String>) -> Self {
        self.upstream_url = Some(url.into());
        self
    }

    /// Set the OAuth client credentials.
    pub fn with_client(mut self, id: impl Into<String>, secret: impl Into<String>) -> Self {
        self.client_id = id.into();
        self.client_secret = secret.into();
        self
    }

    /// Point every IdP endpoint at a provider rooted at `base`.
    ///
    /// Uses Keycloak's `protocol/openid-connect` layout.
    pub fn with_provider_base(mut self, base: &str) -> Self {
        let base = base.trim_end_matches('/');
        self.authorization_endpoint = format!("{base}/protocol/openid-connect/auth");
        self.token_endpoint = format!("{base}/protocol/openid-connect/token");
        self.revocation_endpoint = Some(format!("{base}/protocol/openid-connect/revoke"));
        self
    }

    /// Set the refresh cookie encryption key.
    pub fn with_encryption_key(mut self, key: impl Into<String>) -> Self {
        self.encryption_key = key.into();
        self
    }

    /// Enable or disable the password-grant login handler.
    pub fn with_login_handler(mut self, enabled: bool) -> Self {
        self.enable_login_handler = enabled;
        self
    }

    /// Enable or disable no-redirect mode.
    pub fn with_no_redirects(mut self, enabled: bool) -> Self {
        self.no_redirects = enabled;
        self
    }

    /// Enable or disable access token renewal.
    pub fn with_refresh_tokens(mut self, enabled: bool) -> Self {
        self.enable_refresh_tokens = enabled;
        self
    }

    /// Mark cookies `Secure` or not.
    pub fn with_secure_cookie(mut self, secure: bool) -> Self {
        self.secure_cookie = secure;
        self
    }

    /// Add a protected resource.
    pub fn with_resource(mut self, resource: ResourceRule) -> Self {
        self.resources.push(resource);
        self
    }
}

fn require(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(ConfigError::MissingField {
            field: field.to_string(),
        });
    }
    Ok(())
}

fn check_url(field: &str, value: &str) -> Result<()> {
    Url::parse(value)
        .map(|_| ())
        .map_err(|e| ConfigError::InvalidUrl {
            field: field.to_string(),
            reason: e.to_string(),
        })
}

// ─────────────────────────────────────────────────────────────────────────────
// Resource Rule
// ─────────────────────────────────────────────────────────────────────────────

/// A URL prefix and the protection applied to it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceRule {
    /// Path prefix, e.g. `/admin`. A trailing `/*` is accepted and ignored.
    pub uri: String,

    /// HTTP methods the rule applies to. Empty means every method.
    pub methods: Vec<String>,

    /// Roles the caller must hold, all of them.
    pub roles: Vec<String>,

    /// Forward without authentication.
    pub white_listed: bool,
}

impl ResourceRule {
    /// Create a rule protecting `uri` with no role requirement.
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            ..Default::default()
        }
    }

    /// Require roles.
    pub fn with_roles(mut self, roles: Vec<String>) -> Self {
        self.roles = roles;
        self
    }

    /// Restrict to methods.
    pub fn with_methods(mut self, methods: Vec<String>) -> Self {
        self.methods = methods;
        self
    }

    /// Let requests through without authentication.
    pub fn white_listed(mut self) -> Self {
        self.white_listed = true;
        self
    }

    /// The normalised path prefix.
    pub fn prefix(&self) -> &str {
        self.uri.trim_end_matches("/*").trim_end_matches('/')
    }

    /// Whether the rule covers this request.
    pub fn matches(&self, method: &str, path: &str) -> bool {
        if !self.methods.is_empty() && !self.methods.iter().any(|m| m.eq_ignore_ascii_case(method))
        {
            return false;
        }

        let prefix = self.prefix();
        if prefix.is_empty() {
            return true;
        }
        path == prefix
            || path
                .strip_prefix(prefix)
                .is_some_and(|rest| rest.starts_with('/'))
    }

    /// Whether `roles` satisfies every required role.
    pub fn permits(&self, roles: &[String]) -> bool {
        self.roles.iter().all(|required| roles.contains(required))
    }

    fn validate(&self) -> Result<()> {
        if !self.uri.starts_with('/') {
            return Err(ConfigError::InvalidResource {
                uri: self.uri.clone(),
                reason: "uri must start with '/'".to_string(),
            });
        }
        let prefix = self.prefix();
        if prefix == "/oauth" || prefix.starts_with("/oauth/") {
            return Err(ConfigError::InvalidResource {
                uri: self.uri.clone(),
                reason: "the /oauth prefix is reserved".to_string(),
            });
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
