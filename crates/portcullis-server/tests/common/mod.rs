//! Common test utilities for integration tests.
//!
//! Spins up a fake identity provider and a fake upstream on loopback ports
//! and runs a real gateway between them.

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::Result;
use axum::{
    Form, Json, Router,
    extract::{Query, Request, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use portcullis_config::{GatewayConfig, ResourceRule};
use portcullis_server::Server;
use reqwest::Client;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio::time::timeout;

pub const CLIENT_ID: &str = "test";
pub const CLIENT_SECRET: &str = "secret";
pub const ENCRYPTION_KEY: &str = "AgXa7xRcoClDEU0ZDSH4X0XhL5Qy2Z2j";
pub const REALM_PATH: &str = "/realms/hod-test";
pub const GOOD_CODE: &str = "good-code";
pub const REFRESH_TOKEN: &str = "refresh-token-1";
/// Refresh token the fake IdP trades for an already expired access token.
pub const STALE_REFRESH_TOKEN: &str = "refresh-token-stale";

// ─────────────────────────────────────────────────────────────────────────────
// Tokens
// ─────────────────────────────────────────────────────────────────────────────

/// Build an unsigned JWT carrying `claims`.
pub fn jwt(claims: serde_json::Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"RS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{header}.{payload}.c2lnbmF0dXJl")
}

/// A user token expiring `ttl_secs` from now, holding realm role `user`.
pub fn user_token(ttl_secs: i64) -> String {
    jwt(serde_json::json!({
        "sub": "1e11e539-8256-4b3b-bda8-cc0d56cddb48",
        "iss": "http://127.0.0.1/realms/hod-test",
        "aud": CLIENT_ID,
        "email": "gambol99@gmail.com",
        "name": "Rohith Jayawardene",
        "preferred_username": "rjayawardene",
        "exp": chrono::Utc::now().timestamp() + ttl_secs,
        "realm_access": {"roles": ["user"]},
        "resource_access": {"test": {"roles": ["viewer"]}},
    }))
}

// ─────────────────────────────────────────────────────────────────────────────
// Fake identity provider
// ─────────────────────────────────────────────────────────────────────────────

/// Call counters of the fake IdP.
#[derive(Debug, Default)]
pub struct IdpCalls {
    pub code_exchanges: AtomicUsize,
    pub password_grants: AtomicUsize,
    pub refreshes: AtomicUsize,
    pub revocations: AtomicUsize,
}

/// A Keycloak-shaped IdP running on loopback.
pub struct FakeIdp {
    pub addr: SocketAddr,
    pub calls: Arc<IdpCalls>,
    _handle: JoinHandle<()>,
}

impl FakeIdp {
    pub async fn start() -> Result<Self> {
        let calls = Arc::new(IdpCalls::default());
        let protocol = format!("{REALM_PATH}/protocol/openid-connect");
        let app = Router::new()
            .route(&format!("{protocol}/auth"), get(idp_authorize))
            .route(&format!("{protocol}/token"), post(idp_token))
            .route(&format!("{protocol}/revoke"), post(idp_revoke))
            .with_state(calls.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });

        Ok(Self {
            addr,
            calls,
            _handle: handle,
        })
    }

    /// Realm base URL, as handed to `GatewayConfig::with_provider_base`.
    pub fn realm_url(&self) -> String {
        format!("http://{}{}", self.addr, REALM_PATH)
    }
}

/// Log the user in without asking: straight back to the client with a code.
async fn idp_authorize(Query(params): Query<HashMap<String, String>>) -> Response {
    let Some(redirect_uri) = params.get("redirect_uri") else {
        return (StatusCode::BAD_REQUEST, "missing redirect_uri").into_response();
    };
    if params.get("client_id").map(String::as_str) != Some(CLIENT_ID)
        || params.get("response_type").map(String::as_str) != Some("code")
    {
        return (StatusCode::BAD_REQUEST, "bad client").into_response();
    }

    let state = params.get("state").cloned().unwrap_or_default();
    let location = format!(
        "{}?code={}&state={}",
        redirect_uri,
        GOOD_CODE,
        urlencoding::encode(&state)
    );
    (StatusCode::TEMPORARY_REDIRECT, [(header::LOCATION, location)]).into_response()
}

fn issue_tokens() -> Response {
    issue_tokens_expiring_in(300)
}

fn issue_tokens_expiring_in(ttl_secs: i64) -> Response {
    Json(serde_json::json!({
        "access_token": user_token(ttl_secs),
        "refresh_token": REFRESH_TOKEN,
        "expires_in": 300,
        "token_type": "Bearer",
    }))
    .into_response()
}

fn invalid_grant(status: StatusCode) -> Response {
    (
        status,
        Json(serde_json::json!({
            "error": "invalid_grant",
            "error_description": "rejected by fake idp",
        })),
    )
        .into_response()
}

async fn idp_token(
    State(calls): State<Arc<IdpCalls>>,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    if form.get("client_id").map(String::as_str) != Some(CLIENT_ID)
        || form.get("client_secret").map(String::as_str) != Some(CLIENT_SECRET)
    {
        return invalid_grant(StatusCode::UNAUTHORIZED);
    }

    let field = |name: &str| form.get(name).map(String::as_str);
    match field("grant_type") {
        Some("authorization_code") => {
            calls.code_exchanges.fetch_add(1, Ordering::SeqCst);
            if field("code") == Some(GOOD_CODE) && field("redirect_uri").is_some() {
                issue_tokens()
            } else {
                invalid_grant(StatusCode::BAD_REQUEST)
            }
        }
        Some("password") => {
            calls.password_grants.fetch_add(1, Ordering::SeqCst);
            if field("username") == Some("test") && field("password") == Some("test") {
                issue_tokens()
            } else {
                invalid_grant(StatusCode::UNAUTHORIZED)
            }
        }
        Some("refresh_token") => {
            calls.refreshes.fetch_add(1, Ordering::SeqCst);
            match field("refresh_token") {
                Some(REFRESH_TOKEN) => issue_tokens(),
                Some(STALE_REFRESH_TOKEN) => issue_tokens_expiring_in(-60),
                _ => invalid_grant(StatusCode::BAD_REQUEST),
            }
        }
        _ => invalid_grant(StatusCode::BAD_REQUEST),
    }
}

async fn idp_revoke(
    State(calls): State<Arc<IdpCalls>>,
    Form(form): Form<HashMap<String, String>>,
) -> StatusCode {
    calls.revocations.fetch_add(1, Ordering::SeqCst);
    if form.get("token").is_some_and(|t| !t.is_empty()) {
        StatusCode::OK
    } else {
        StatusCode::BAD_REQUEST
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Fake upstream
// ─────────────────────────────────────────────────────────────────────────────

/// Echoes what it received as JSON.
pub struct FakeUpstream {
    pub addr: SocketAddr,
    _handle: JoinHandle<()>,
}

impl FakeUpstream {
    pub async fn start() -> Result<Self> {
        let app = Router::new().fallback(echo);
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });
        Ok(Self {
            addr,
            _handle: handle,
        })
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }
}

async fn echo(request: Request) -> Response {
    let (parts, body) = request.into_parts();
    let body = axum::body::to_bytes(body, usize::MAX)
        .await
        .unwrap_or_default();
    let headers: HashMap<String, String> = parts
        .headers
        .iter()
        .filter_map(|(k, v)| Some((k.to_string(), v.to_str().ok()?.to_string())))
        .collect();

    (
        [("x-upstream", "fake")],
        Json(serde_json::json!({
            "method": parts.method.as_str(),
            "uri": parts.uri.to_string(),
            "headers": headers,
            "body": String::from_utf8_lossy(&body),
        })),
    )
        .into_response()
}

// ─────────────────────────────────────────────────────────────────────────────
// Gateway
// ─────────────────────────────────────────────────────────────────────────────

/// Base config pointing at `idp`, protecting `/admin` with realm role `user`.
pub fn base_config(idp: &FakeIdp) -> GatewayConfig {
    GatewayConfig::new()
        .with_client(CLIENT_ID, CLIENT_SECRET)
        .with_provider_base(&idp.realm_url())
        .with_encryption_key(ENCRYPTION_KEY)
        .with_secure_cookie(false)
        .with_resource(ResourceRule::new("/admin").with_roles(vec!["user".to_string()]))
}

/// A gateway that runs in the background.
pub struct TestGateway {
    /// The gateway's address.
    pub addr: SocketAddr,
    /// HTTP client that does not follow redirects.
    pub client: Client,
    /// The IdP behind the gateway.
    pub idp: FakeIdp,
    /// Upstream, when configured.
    pub upstream: Option<FakeUpstream>,
    _handle: JoinHandle<()>,
}

impl TestGateway {
    /// Start with the base config.
    pub async fn start() -> Result<Self> {
        Self::start_with(|config| config).await
    }

    /// Start with a customised config.
    pub async fn start_with(customise: impl FnOnce(GatewayConfig) -> GatewayConfig) -> Result<Self> {
        let idp = FakeIdp::start().await?;
        let config = customise(base_config(&idp));
        Self::launch(idp, None, config).await
    }

    /// Start in front of a fake upstream.
    pub async fn start_with_upstream(
        customise: impl FnOnce(GatewayConfig) -> GatewayConfig,
    ) -> Result<Self> {
        let idp = FakeIdp::start().await?;
        let upstream = FakeUpstream::start().await?;
        let config = customise(base_config(&idp).with_upstream_url(upstream.url()));
        Self::launch(idp, Some(upstream), config).await
    }

    async fn launch(
        idp: FakeIdp,
        upstream: Option<FakeUpstream>,
        config: GatewayConfig,
    ) -> Result<Self> {
        let addr = find_available_port().await?;
        let server = Server::new(config.with_listen(addr))?;
        let handle = tokio::spawn(async move {
            let _ = server.run().await;
        });

        let client = Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()?;
        wait_for_server(&client, addr).await?;

        Ok(Self {
            addr,
            client,
            idp,
            upstream,
            _handle: handle,
        })
    }

    /// Get the base URL for the gateway.
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn get(&self, path: &str) -> reqwest::RequestBuilder {
        self.client.get(format!("{}{}", self.base_url(), path))
    }

    pub fn post(&self, path: &str) -> reqwest::RequestBuilder {
        self.client.post(format!("{}{}", self.base_url(), path))
    }

    /// Password login, returning the response.
    pub async fn login(&self, username: &str, password: &str) -> Result<reqwest::Response> {
        Ok(self
            .post("/oauth/login")
            .form(&[("username", username), ("password", password)])
            .send()
            .await?)
    }
}

/// Value of cookie `name` set by `headers`, if any.
pub fn set_cookie(headers: &reqwest::header::HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(reqwest::header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter_map(|v| v.split(';').next())
        .filter_map(|pair| pair.split_once('='))
        .find(|(n, _)| *n == name)
        .map(|(_, value)| value.to_string())
}

/// The full `Set-Cookie` line for `name`, attributes included.
pub fn set_cookie_line(headers: &reqwest::header::HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(reqwest::header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find(|v| v.starts_with(&format!("{name}=")))
        .map(str::to_string)
}

/// Find an available port for the test gateway.
async fn find_available_port() -> Result<SocketAddr> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    drop(listener);
    Ok(addr)
}

/// Wait for the gateway to become ready.
async fn wait_for_server(client: &Client, addr: SocketAddr) -> Result<()> {
    let url = format!("http://{}/oauth/health", addr);

    let result = timeout(Duration::from_secs(5), async {
        loop {
            match client.get(&url).send().await {
                Ok(resp) if resp.status().is_success() => return Ok(()),
                _ => tokio::time::sleep(Duration::from_millis(50)).await,
            }
        }
    })
    .await;

    match result {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(e),
        Err(_) => anyhow::bail!("Timeout waiting for gateway to start"),
    }
}
