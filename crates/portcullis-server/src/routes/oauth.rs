//! OAuth endpoints.
//!
//! Every handler is stateless: continuation data rides in the `state` query
//! parameter or in the session cookies.

use axum::{
    Json, Router,
    extract::{FromRequest, Query, Request, State},
    http::HeaderMap,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use axum_extra::extract::cookie::CookieJar;
use chrono::Utc;
use portcullis_oidc::TokenResponse;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::enforce::temporary_redirect;
use crate::error::{GatewayError, Result};
use crate::redirect_state;
use crate::session::Session;
use crate::state::AppState;
use crate::token::{Token, TokenError};

#[derive(Debug, Deserialize)]
pub struct AuthorizeQuery {
    pub state: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    /// Set by the IdP when the user or the IdP aborted the flow.
    pub error: Option<String>,
    pub error_description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LogoutQuery {
    /// Local path to send the browser to once logged out.
    pub redirect: Option<String>,
}

/// Body of a successful `/oauth/expiration` check.
#[derive(Debug, Serialize, Deserialize)]
pub struct ExpirationResponse {
    pub subject: Option<String>,
    pub expires_at: Option<chrono::DateTime<Utc>>,
    pub expires_in: i64,
}

/// Create the `/oauth/*` routes.
pub fn oauth_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/oauth/authorize",
            get(authorize_handler).post(authorize_handler),
        )
        .route("/oauth/callback", get(callback_handler))
        .route("/oauth/login", post(login_handler))
        .route("/oauth/logout", get(logout_handler))
        .route("/oauth/token", get(token_handler))
        .route("/oauth/expiration", get(expiration_handler))
}

/// Start the Authorization Code flow: `307` to the IdP login page.
pub async fn authorize_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<AuthorizeQuery>,
) -> Result<Response> {
    let raw_state = query.state.unwrap_or_default();

    // A destination we would refuse to serve is not worth a round trip.
    let destination = redirect_state::decode(Some(&raw_state));
    if !destination.is_fallback()
        && state
            .config
            .find_resource("GET", destination.path())
            .is_none()
    {
        return Err(GatewayError::NotFound(format!(
            "no resource matches {}",
            destination.path()
        )));
    }

    let redirect_uri = state.redirect_uri(&headers);
    let url = state.provider.authorization_url(&redirect_uri, &raw_state);
    tracing::debug!(redirect_uri = %redirect_uri, "Redirecting to identity provider");
    Ok(temporary_redirect(&url))
}

/// Finish the Authorization Code flow: exchange the code, set the session
/// cookies and send the user back where they started.
pub async fn callback_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
    Query(query): Query<CallbackQuery>,
) -> Result<Response> {
    if let Some(error) = query.error {
        return Err(GatewayError::BadRequest(format!(
            "identity provider returned {}: {}",
            error,
            query.error_description.unwrap_or_default()
        )));
    }

    let code = query
        .code
        .filter(|c| !c.is_empty())
        .ok_or_else(|| GatewayError::BadRequest("missing code parameter".to_string()))?;

    let redirect_uri = state.redirect_uri(&headers);
    let tokens = state
        .provider
        .exchange_code(&code, &redirect_uri)
        .await
        .map_err(GatewayError::from_provider)?;

    let access = idp_access_token(&tokens)?;
    let jar = state
        .sessions
        .save(jar, &access, tokens.refresh_token.as_deref(), Utc::now())?;

    let target = redirect_state::decode(query.state.as_deref());
    tracing::info!(
        subject = ?access.subject(),
        target = %target.target(),
        "User authenticated"
    );

    Ok((jar, temporary_redirect(target.target())).into_response())
}

/// Resource Owner Password Credentials login for machine clients.
pub async fn login_handler(
    State(state): State<AppState>,
    jar: CookieJar,
    request: Request,
) -> Result<Response> {
    if !state.config.enable_login_handler {
        return Err(GatewayError::NotFound("login handler is disabled".to_string()));
    }

    let axum::Form(form) = axum::Form::<LoginForm>::from_request(request, &())
        .await
        .map_err(|e| GatewayError::BadRequest(e.body_text()))?;

    let (Some(username), Some(password)) = (
        form.username.filter(|u| !u.is_empty()),
        form.password.filter(|p| !p.is_empty()),
    ) else {
        return Err(GatewayError::BadRequest(
            "username and password are required".to_string(),
        ));
    };

    let tokens = state
        .provider
        .password_grant(&username, &password)
        .await
        .map_err(GatewayError::from_credentials)?;

    let access = idp_access_token(&tokens)?;
    let jar = state
        .sessions
        .save(jar, &access, tokens.refresh_token.as_deref(), Utc::now())?;

    tracing::info!(subject = ?access.subject(), "Password login");
    Ok((jar, Json(tokens)).into_response())
}

/// End the session: revoke at the IdP where possible and clear the cookies.
///
/// Cookies are cleared on every outcome.
pub async fn logout_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
    Query(query): Query<LogoutQuery>,
) -> Response {
    let session = state.sessions.load(&headers, &jar);
    let cleared = state.sessions.clear(jar);

    match logout(&state, session, query.redirect.as_deref()).await {
        Ok(response) => (cleared, response).into_response(),
        Err(e) => (cleared, e).into_response(),
    }
}

async fn logout(
    state: &AppState,
    session: Option<Session>,
    redirect: Option<&str>,
) -> Result<Response> {
    let session =
        session.ok_or_else(|| GatewayError::BadRequest("no session to log out".to_string()))?;
    let access = session.token()?;

    if let Some(redirect) = redirect
        && !redirect_state::is_local_path(redirect)
    {
        return Err(GatewayError::BadRequest(
            "redirect must be a local path".to_string(),
        ));
    }

    if state.provider.supports_revocation() {
        let token = session.refresh.as_deref().unwrap_or(access.encode());
        state
            .provider
            .revoke(token)
            .await
            .map_err(GatewayError::from_provider)?;
    }

    tracing::info!(subject = ?access.subject(), "User logged out");

    Ok(match redirect {
        Some(redirect) => temporary_redirect(redirect),
        None => Json(serde_json::json!({"status": "logged_out"})).into_response(),
    })
}

/// Claims of the presented access token.
pub async fn token_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
) -> Result<Json<Map<String, Value>>> {
    let raw = state
        .sessions
        .access_token(&headers, &jar)
        .ok_or_else(|| GatewayError::BadRequest("no access token presented".to_string()))?;
    let token = Token::decode(&raw)?;
    Ok(Json(token.claims().clone()))
}

/// `200` while the presented access token is well-formed and unexpired.
pub async fn expiration_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
) -> Result<Json<ExpirationResponse>> {
    let raw = state
        .sessions
        .access_token(&headers, &jar)
        .ok_or_else(|| GatewayError::Unauthorized("no access token presented".to_string()))?;

    let now = Utc::now();
    let token = Token::decode_valid(&raw, now).map_err(|e| match e {
        TokenError::Malformed(msg) => GatewayError::Unauthorized(msg),
        TokenError::Expired => GatewayError::Token(TokenError::Expired),
    })?;

    Ok(Json(ExpirationResponse {
        subject: token.subject().map(str::to_string),
        expires_at: token.expires_at(),
        expires_in: token.remaining(now).num_seconds(),
    }))
}

/// The access token from an IdP answer. Garbage here is the IdP's fault.
fn idp_access_token(tokens: &TokenResponse) -> Result<Token> {
    Token::decode(&tokens.access_token).map_err(|e| {
        GatewayError::BadGateway(format!("identity provider issued an unusable token: {e}"))
    })
}
