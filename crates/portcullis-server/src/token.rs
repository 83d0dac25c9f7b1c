//! Access and identity tokens.
//!
//! Tokens are parsed, never verified: the gateway only ever holds tokens the
//! IdP handed it over a server-to-server channel (code exchange, password
//! grant, refresh) or that a client presents, which the upstream must not
//! trust beyond what the IdP itself enforces on introspection.

use base64::Engine;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

/// base64url that accepts segments with or without padding.
pub(crate) const BASE64_URL_LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Token errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    /// Not a three-segment JWT with JSON header and object payload.
    #[error("Malformed token: {0}")]
    Malformed(String),

    /// `exp` is missing or in the past.
    #[error("Token expired")]
    Expired,
}

/// A decoded JWT.
#[derive(Debug, Clone)]
pub struct Token {
    raw: String,
    claims: Map<String, Value>,
}

impl Token {
    /// Parse the three-segment structure and extract the claims.
    ///
    /// The signature segment is not checked.
    pub fn decode(raw: &str) -> Result<Self, TokenError> {
        let raw = raw.trim();
        let mut segments = raw.split('.');
        let (Some(header), Some(payload), Some(signature), None) = (
            segments.next(),
            segments.next(),
            segments.next(),
            segments.next(),
        ) else {
            return Err(TokenError::Malformed(
                "expected three dot-separated segments".to_string(),
            ));
        };

        if header.is_empty() || payload.is_empty() {
            return Err(TokenError::Malformed("empty segment".to_string()));
        }
        if !signature.is_empty() && BASE64_URL_LENIENT.decode(signature).is_err() {
            return Err(TokenError::Malformed("signature is not base64url".to_string()));
        }

        let header = decode_object(header, "header")?;
        if !header.contains_key("alg") {
            return Err(TokenError::Malformed("header has no alg".to_string()));
        }
        let claims = decode_object(payload, "payload")?;

        Ok(Self {
            raw: raw.to_string(),
            claims,
        })
    }

    /// Decode and reject expired tokens.
    pub fn decode_valid(raw: &str, now: DateTime<Utc>) -> Result<Self, TokenError> {
        let token = Self::decode(raw)?;
        if token.is_expired(now) {
            return Err(TokenError::Expired);
        }
        Ok(token)
    }

    /// `now >= exp`. A token without `exp` is always expired.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self.exp() {
            Some(exp) => now.timestamp() >= exp,
            None => true,
        }
    }

    /// The original wire form.
    pub fn encode(&self) -> &str {
        &self.raw
    }

    /// All claims, untyped.
    pub fn claims(&self) -> &Map<String, Value> {
        &self.claims
    }

    /// A single claim.
    pub fn claim(&self, name: &str) -> Option<&Value> {
        self.claims.get(name)
    }

    fn exp(&self) -> Option<i64> {
        let exp = self.claims.get("exp")?;
        exp.as_i64().or_else(|| exp.as_f64().map(|f| f as i64))
    }

    fn string_claim(&self, name: &str) -> Option<&str> {
        self.claims.get(name).and_then(Value::as_str)
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.exp()
            .and_then(|exp| Utc.timestamp_opt(exp, 0).single())
    }

    /// Time left before expiry, zero once expired.
    pub fn remaining(&self, now: DateTime<Utc>) -> chrono::Duration {
        match self.expires_at() {
            Some(at) if at > now => at - now,
            _ => chrono::Duration::zero(),
        }
    }

    pub fn subject(&self) -> Option<&str> {
        self.string_claim("sub")
    }

    pub fn issuer(&self) -> Option<&str> {
        self.string_claim("iss")
    }

    /// `aud` may be a single string or an array.
    pub fn audience(&self) -> Vec<String> {
        match self.claims.get("aud") {
            Some(Value::String(aud)) => vec![aud.clone()],
            Some(Value::Array(auds)) => auds
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect(),
            _ => Vec::new(),
        }
    }

    pub fn email(&self) -> Option<&str> {
        self.string_claim("email")
    }

    pub fn name(&self) -> Option<&str> {
        self.string_claim("name")
    }

    pub fn preferred_username(&self) -> Option<&str> {
        self.string_claim("preferred_username")
    }

    /// Realm roles plus the roles granted for `client_id`, the latter
    /// reported as `client:role`.
    pub fn roles(&self, client_id: &str) -> Vec<String> {
        let mut roles: Vec<String> = self
            .claims
            .get("realm_access")
            .and_then(|v| v.get("roles"))
            .and_then(Value::as_array)
            .map(|roles| {
                roles
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        if let Some(client_roles) = self
            .claims
            .get("resource_access")
            .and_then(|v| v.get(client_id))
            .and_then(|v| v.get("roles"))
            .and_then(Value::as_array)
        {
            roles.extend(
                client_roles
                    .iter()
                    .filter_map(Value::as_str)
                    .map(|role| format!("{}:{}", client_id, role)),
            );
        }

        roles
    }

    /// The identity attached to forwarded requests.
    pub fn identity(&self, client_id: &str) -> Identity {
        Identity {
            subject: self.subject().unwrap_or_default().to_string(),
            email: self.email().map(str::to_string),
            username: self
                .preferred_username()
                .or_else(|| self.email())
                .unwrap_or_default()
                .to_string(),
            name: self.name().map(str::to_string),
            roles: self.roles(client_id),
            expires_at: self.expires_at(),
            token: self.raw.clone(),
        }
    }
}

fn decode_object(segment: &str, what: &str) -> Result<Map<String, Value>, TokenError> {
    let bytes = BASE64_URL_LENIENT
        .decode(segment)
        .map_err(|e| TokenError::Malformed(format!("{what} is not base64url: {e}")))?;
    match serde_json::from_slice::<Value>(&bytes) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(TokenError::Malformed(format!("{what} is not a JSON object"))),
        Err(e) => Err(TokenError::Malformed(format!("{what} is not JSON: {e}"))),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Identity
// ─────────────────────────────────────────────────────────────────────────────

/// Authenticated user, inserted into request extensions by the enforcement
/// middleware.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Identity {
    pub subject: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub roles: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(skip)]
    pub token: String,
}
