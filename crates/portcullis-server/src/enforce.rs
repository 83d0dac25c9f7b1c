//! Authorization enforcement middleware.
//!
//! Runs in front of every proxied request. `/oauth/*` endpoints are routed
//! before this middleware and never reach it.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Request, State},
    http::{Method, StatusCode, Uri, header::LOCATION},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::CookieJar;
use chrono::{DateTime, Utc};
use portcullis_config::{GatewayConfig, ResourceRule};
use url::Url;

use crate::error::GatewayError;
use crate::redirect_state;
use crate::session::Session;
use crate::state::AppState;
use crate::token::Token;

/// Path of the authorize endpoint unauthenticated browsers are sent to.
pub const AUTHORIZE_PATH: &str = "/oauth/authorize";

// ─────────────────────────────────────────────────────────────────────────────
// Denial policy
// ─────────────────────────────────────────────────────────────────────────────

/// What an unauthenticated request gets back.
pub trait DenialPolicy: Send + Sync + std::fmt::Debug {
    fn deny(&self, method: &Method, uri: &Uri) -> Response;
}

/// Shared denial policy.
pub type SharedDenialPolicy = Arc<dyn DenialPolicy>;

/// Plain `401`, for API clients.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unauthorized;

impl DenialPolicy for Unauthorized {
    fn deny(&self, _method: &Method, uri: &Uri) -> Response {
        GatewayError::Unauthorized(format!("authentication required for {}", uri.path()))
            .into_response()
    }
}

/// `307` into the OAuth flow, remembering where the user was headed.
#[derive(Debug, Clone, Copy, Default)]
pub struct RedirectToAuthorize;

impl DenialPolicy for RedirectToAuthorize {
    fn deny(&self, _method: &Method, uri: &Uri) -> Response {
        let state = redirect_state::encode(uri.path(), uri.query());
        tracing::debug!(path = %uri.path(), "Redirecting to authorization");
        temporary_redirect(&format!("{AUTHORIZE_PATH}?state={state}"))
    }
}

/// Pick the policy once, from configuration.
pub fn denial_policy(config: &GatewayConfig) -> SharedDenialPolicy {
    if config.no_redirects {
        Arc::new(Unauthorized)
    } else {
        Arc::new(RedirectToAuthorize)
    }
}

/// A bare `307` with a `Location` header.
pub(crate) fn temporary_redirect(location: &str) -> Response {
    match axum::http::HeaderValue::from_str(location) {
        Ok(value) => {
            let mut response = StatusCode::TEMPORARY_REDIRECT.into_response();
            response.headers_mut().insert(LOCATION, value);
            response
        }
        Err(_) => GatewayError::Internal(format!("invalid redirect location: {location}"))
            .into_response(),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Middleware
// ─────────────────────────────────────────────────────────────────────────────

/// Gate a request on its resource rules and session.
///
/// Rules are resolved for the path as requested and for the path the
/// upstream will serve once dot segments are resolved; both must be
/// satisfied. The request continues with the resolved path.
pub async fn enforce_middleware(
    State(state): State<AppState>,
    jar: CookieJar,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();

    let Some(served_path) = forwarded_path(uri.path()) else {
        return GatewayError::BadRequest(format!("unsupported path {}", uri.path()))
            .into_response();
    };
    match forwarded_uri(&served_path, uri.query()) {
        Ok(forwarded) => *request.uri_mut() = forwarded,
        Err(e) => return e.into_response(),
    }

    let requested = state.config.find_resource(method.as_str(), uri.path()).cloned();
    let served = state.config.find_resource(method.as_str(), &served_path).cloned();
    let served_exists = served.is_some();
    let mut rules: Vec<ResourceRule> = requested.iter().cloned().collect();
    if served != requested {
        rules.extend(served);
    }

    if rules.is_empty() {
        return not_found(&uri);
    }

    if rules.iter().all(|rule| rule.white_listed) {
        if !served_exists {
            return not_found(&uri);
        }
        tracing::debug!(path = %served_path, "White-listed resource");
        return next.run(request).await;
    }

    let Some(session) = state.sessions.load(request.headers(), &jar) else {
        tracing::debug!(path = %uri.path(), "No session");
        return state.denial.deny(&method, &uri);
    };

    let now = Utc::now();
    let token = match session.token() {
        Ok(token) => token,
        Err(e) => {
            tracing::debug!(path = %uri.path(), error = %e, "Unusable access token");
            return state.denial.deny(&method, &uri);
        }
    };

    if !token.is_expired(now) {
        return admit(&state, &rules, served_exists, &token, request, next).await;
    }

    if !state.config.enable_refresh_tokens || session.refresh.is_none() {
        tracing::debug!(path = %uri.path(), subject = ?token.subject(), "Access token expired");
        return state.denial.deny(&method, &uri);
    }

    match refresh_session(&state, &session, now).await {
        Ok((token, refresh)) => {
            let jar = match state.sessions.save(jar, &token, refresh.as_deref(), now) {
                Ok(jar) => jar,
                Err(e) => return e.into_response(),
            };
            tracing::info!(subject = ?token.subject(), "Access token refreshed");
            let response = admit(&state, &rules, served_exists, &token, request, next).await;
            (jar, response).into_response()
        }
        Err(e) => {
            tracing::warn!(path = %uri.path(), error = %e, "Token refresh failed");
            (state.sessions.clear(jar), state.denial.deny(&method, &uri)).into_response()
        }
    }
}

fn not_found(uri: &Uri) -> Response {
    GatewayError::NotFound(format!("no resource matches {}", uri.path())).into_response()
}

/// Check roles against every applicable rule, attach the identity and forward.
async fn admit(
    state: &AppState,
    rules: &[ResourceRule],
    served_exists: bool,
    token: &Token,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let identity = token.identity(&state.config.client_id);

    for rule in rules.iter().filter(|rule| !rule.white_listed) {
        if rule.permits(&identity.roles) {
            continue;
        }
        let missing: Vec<&str> = rule
            .roles
            .iter()
            .filter(|r| !identity.roles.contains(r))
            .map(String::as_str)
            .collect();
        return GatewayError::Forbidden(format!(
            "{} lacks role(s) {} for {}",
            identity.username,
            missing.join(","),
            rule.uri
        ))
        .into_response();
    }

    // Authorised for what was asked, but the resolved path leads nowhere.
    if !served_exists {
        return GatewayError::NotFound(format!(
            "no resource matches {}",
            request.uri().path()
        ))
        .into_response();
    }

    tracing::debug!(subject = %identity.subject, path = %request.uri().path(), "Access granted");
    request.extensions_mut().insert(identity);
    next.run(request).await
}

/// Trade the refresh token for a new access token. Keeps the old refresh
/// token when the IdP does not rotate it.
async fn refresh_session(
    state: &AppState,
    session: &Session,
    now: DateTime<Utc>,
) -> Result<(Token, Option<String>), GatewayError> {
    let Some(ref refresh) = session.refresh else {
        return Err(GatewayError::Unauthorized("no refresh token".to_string()));
    };

    let tokens = state
        .provider
        .refresh(refresh)
        .await
        .map_err(GatewayError::from_credentials)?;
    let token = Token::decode_valid(&tokens.access_token, now)?;
    let refresh = tokens.refresh_token.or_else(|| session.refresh.clone());
    Ok((token, refresh))
}

// ─────────────────────────────────────────────────────────────────────────────
// Path resolution
// ─────────────────────────────────────────────────────────────────────────────

/// The path as an upstream resolves it: dot segments (plain or
/// percent-encoded) and backslashes resolved, empty segments collapsed.
///
/// `None` for encoded separators, which upstreams disagree on.
pub(crate) fn forwarded_path(raw: &str) -> Option<String> {
    let lowered = raw.to_ascii_lowercase();
    if lowered.contains("%2f") || lowered.contains("%5c") {
        return None;
    }

    let url = Url::parse(&format!("http://gateway.invalid{raw}")).ok()?;
    let resolved = url.path();
    let segments: Vec<&str> = resolved.split('/').filter(|s| !s.is_empty()).collect();

    let mut path = format!("/{}", segments.join("/"));
    if resolved.ends_with('/') && !segments.is_empty() {
        path.push('/');
    }
    Some(path)
}

fn forwarded_uri(path: &str, query: Option<&str>) -> Result<Uri, GatewayError> {
    let target = match query {
        Some(query) => format!("{path}?{query}"),
        None => path.to_string(),
    };
    target
        .parse()
        .map_err(|e| GatewayError::BadRequest(format!("unsupported path {path}: {e}")))
}
