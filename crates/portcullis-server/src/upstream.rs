//! Forwarding authorised requests to the upstream service.

use axum::{
    Json,
    body::{Body, HttpBody},
    extract::{Request, State},
    http::{HeaderMap, HeaderValue, header},
    response::{IntoResponse, Response},
};
use futures::StreamExt;
use reqwest::Client;

use crate::error::{GatewayError, Result};
use crate::state::AppState;
use crate::token::Identity;

pub const SUBJECT_HEADER: &str = "x-auth-subject";
pub const EMAIL_HEADER: &str = "x-auth-email";
pub const USERNAME_HEADER: &str = "x-auth-username";
pub const ROLES_HEADER: &str = "x-auth-roles";
pub const TOKEN_HEADER: &str = "x-auth-token";

/// Connection-scoped headers that must not cross the proxy (RFC 9110 §7.6.1).
const HOP_BY_HOP: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Client for the protected upstream.
#[derive(Debug, Clone)]
pub struct Upstream {
    http: Client,
    base: String,
    session_cookies: Vec<String>,
}

impl Upstream {
    /// `session_cookies` are removed from the `Cookie` header before forwarding.
    pub fn new(base: &str, session_cookies: Vec<String>) -> Result<Self> {
        url::Url::parse(base)
            .map_err(|e| GatewayError::Config(format!("invalid upstream url {base}: {e}")))?;

        let http = Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| GatewayError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base: base.trim_end_matches('/').to_string(),
            session_cookies,
        })
    }

    /// Send `request` upstream and stream the answer back.
    pub async fn forward(
        &self,
        request: Request<Body>,
        identity: Option<&Identity>,
    ) -> Result<Response> {
        let (parts, body) = request.into_parts();
        let path_and_query = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");
        let target = format!("{}{}", self.base, path_and_query);

        let mut headers = self.outbound_headers(&parts.headers);
        if let Some(identity) = identity {
            insert_identity(&mut headers, identity);
        }

        tracing::debug!(method = %parts.method, target = %target, "Forwarding upstream");

        let mut outbound = self.http.request(parts.method, &target).headers(headers);
        if body.size_hint().exact() != Some(0) {
            outbound = outbound.body(reqwest::Body::wrap_stream(body.into_data_stream()));
        }

        let upstream_response = outbound
            .send()
            .await
            .map_err(|e| GatewayError::BadGateway(format!("upstream request failed: {}", e)))?;

        let status = upstream_response.status();
        let mut response_headers = upstream_response.headers().clone();
        strip_hop_by_hop(&mut response_headers);

        let stream = upstream_response
            .bytes_stream()
            .map(|result| result.map_err(std::io::Error::other));

        let mut response = Response::new(Body::from_stream(stream));
        *response.status_mut() = status;
        *response.headers_mut() = response_headers;
        Ok(response)
    }

    fn outbound_headers(&self, inbound: &HeaderMap) -> HeaderMap {
        let mut headers = inbound.clone();
        strip_hop_by_hop(&mut headers);
        headers.remove(header::HOST);
        headers.remove(header::CONTENT_LENGTH);

        // Never trust identity headers from the client.
        for name in [
            SUBJECT_HEADER,
            EMAIL_HEADER,
            USERNAME_HEADER,
            ROLES_HEADER,
            TOKEN_HEADER,
        ] {
            headers.remove(name);
        }

        let cookies: Vec<String> = headers
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .filter_map(|v| self.strip_session_cookies(v))
            .collect();
        headers.remove(header::COOKIE);
        for cookie in cookies {
            if let Ok(value) = HeaderValue::from_str(&cookie) {
                headers.append(header::COOKIE, value);
            }
        }

        headers
    }

    fn strip_session_cookies(&self, value: &str) -> Option<String> {
        let kept: Vec<&str> = value
            .split(';')
            .map(str::trim)
            .filter(|pair| !pair.is_empty())
            .filter(|pair| {
                let name = pair.split_once('=').map_or(*pair, |(name, _)| name);
                !self.session_cookies.iter().any(|c| c == name)
            })
            .collect();
        (!kept.is_empty()).then(|| kept.join("; "))
    }
}

fn strip_hop_by_hop(headers: &mut HeaderMap) {
    for name in HOP_BY_HOP {
        headers.remove(name);
    }
}

fn insert_identity(headers: &mut HeaderMap, identity: &Identity) {
    let mut set = |name: &'static str, value: &str| {
        if let Ok(value) = HeaderValue::from_str(value) {
            headers.insert(name, value);
        }
    };
    set(SUBJECT_HEADER, &identity.subject);
    set(USERNAME_HEADER, &identity.username);
    if let Some(ref email) = identity.email {
        set(EMAIL_HEADER, email);
    }
    set(ROLES_HEADER, &identity.roles.join(","));
    set(TOKEN_HEADER, &identity.token);
}

/// Fallback handler for everything that passed enforcement.
///
/// Without an upstream the gateway answers with the caller's identity.
pub async fn forward_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let identity = request.extensions().get::<Identity>().cloned();

    let Some(ref upstream) = state.upstream else {
        return Json(serde_json::json!({
            "path": request.uri().path(),
            "identity": identity,
        }))
        .into_response();
    };

    match upstream.forward(request, identity.as_ref()).await {
        Ok(response) => response,
        Err(e) => e.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upstream() -> Upstream {
        Upstream::new(
            "http://127.0.0.1:8080/",
            vec!["kc-access".to_string(), "kc-state".to_string()],
        )
        .unwrap()
    }

    #[test]
    fn test_new_rejects_bad_url() {
        assert!(matches!(
            Upstream::new("not a url", Vec::new()),
            Err(GatewayError::Config(_))
        ));
    }

    #[test]
    fn test_strip_session_cookies() {
        let upstream = upstream();
        assert_eq!(
            upstream.strip_session_cookies("kc-access=a.b.c; theme=dark; kc-state=xyz"),
            Some("theme=dark".to_string())
        );
        assert_eq!(upstream.strip_session_cookies("kc-access=a.b.c"), None);
    }

    #[test]
    fn test_outbound_headers() {
        let upstream = upstream();
        let mut inbound = HeaderMap::new();
        inbound.insert(header::HOST, HeaderValue::from_static("gw.local"));
        inbound.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
        inbound.insert(SUBJECT_HEADER, HeaderValue::from_static("spoofed"));
        inbound.insert(header::COOKIE, HeaderValue::from_static("kc-access=t; lang=en"));
        inbound.insert(header::ACCEPT, HeaderValue::from_static("text/html"));

        let headers = upstream.outbound_headers(&inbound);
        assert!(headers.get(header::HOST).is_none());
        assert!(headers.get(header::CONNECTION).is_none());
        assert!(headers.get(SUBJECT_HEADER).is_none());
        assert_eq!(headers[header::COOKIE], "lang=en");
        assert_eq!(headers[header::ACCEPT], "text/html");
    }

    #[test]
    fn test_insert_identity() {
        let identity = Identity {
            subject: "abc".to_string(),
            email: Some("user@example.com".to_string()),
            username: "user".to_string(),
            name: None,
            roles: vec!["user".to_string(), "test:admin".to_string()],
            expires_at: None,
            token: "h.p.s".to_string(),
        };
        let mut headers = HeaderMap::new();
        insert_identity(&mut headers, &identity);

        assert_eq!(headers[SUBJECT_HEADER], "abc");
        assert_eq!(headers[EMAIL_HEADER], "user@example.com");
        assert_eq!(headers[USERNAME_HEADER], "user");
        assert_eq!(headers[ROLES_HEADER], "user,test:admin");
        assert_eq!(headers[TOKEN_HEADER], "h.p.s");
    }
}
