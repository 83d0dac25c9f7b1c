//! Cookie-carried sessions.
//!
//! The access token travels in plain form (the upstream needs it and it is
//! short-lived). The refresh token is sealed with AES-256-GCM under the
//! process-wide key as base64url(`nonce || ciphertext`).

use std::time::Duration;

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use axum::http::{HeaderMap, header::AUTHORIZATION};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use portcullis_config::GatewayConfig;
use rand::RngCore;

use crate::error::{GatewayError, Result};
use crate::token::Token;

const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

/// Tokens recovered from a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// Raw access token, not yet decoded.
    pub access: String,
    /// Decrypted refresh token.
    pub refresh: Option<String>,
}

impl Session {
    /// Decode the access token.
    pub fn token(&self) -> std::result::Result<Token, crate::token::TokenError> {
        Token::decode(&self.access)
    }
}

/// Reads and writes the session cookies.
#[derive(Clone)]
pub struct SessionStore {
    cipher: Aes256Gcm,
    access_cookie: String,
    refresh_cookie: String,
    secure: bool,
    refresh_ttl: Duration,
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("access_cookie", &self.access_cookie)
            .field("refresh_cookie", &self.refresh_cookie)
            .field("secure", &self.secure)
            .field("refresh_ttl", &self.refresh_ttl)
            .finish_non_exhaustive()
    }
}

impl SessionStore {
    /// Build the store from the gateway config. The key must be 32 bytes.
    pub fn new(config: &GatewayConfig) -> Result<Self> {
        let cipher = Aes256Gcm::new_from_slice(config.encryption_key.as_bytes()).map_err(|_| {
            GatewayError::Config(format!(
                "encryption key must be 32 bytes, got {}",
                config.encryption_key.len()
            ))
        })?;

        Ok(Self {
            cipher,
            access_cookie: config.cookie_access_name.clone(),
            refresh_cookie: config.cookie_refresh_name.clone(),
            secure: config.secure_cookie,
            refresh_ttl: config.refresh_session_ttl(),
        })
    }

    pub fn access_cookie_name(&self) -> &str {
        &self.access_cookie
    }

    /// The presented access token: `Authorization: Bearer` first, then the
    /// access cookie.
    pub fn access_token(&self, headers: &HeaderMap, jar: &CookieJar) -> Option<String> {
        bearer_token(headers).or_else(|| {
            jar.get(&self.access_cookie)
                .map(|c| c.value().to_string())
                .filter(|v| !v.is_empty())
        })
    }

    /// Recover the session. A refresh cookie that fails to decrypt is ignored.
    pub fn load(&self, headers: &HeaderMap, jar: &CookieJar) -> Option<Session> {
        let access = self.access_token(headers, jar)?;
        let refresh = jar.get(&self.refresh_cookie).and_then(|cookie| {
            let decrypted = self.decrypt(cookie.value());
            if decrypted.is_none() {
                tracing::debug!("Discarding undecryptable refresh cookie");
            }
            decrypted
        });
        Some(Session { access, refresh })
    }

    /// Write the session cookies.
    ///
    /// The access cookie lives exactly as long as the token. The refresh
    /// cookie is only written when there is a refresh token.
    pub fn save(
        &self,
        jar: CookieJar,
        access: &Token,
        refresh: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<CookieJar> {
        let access_ttl = access.remaining(now).num_seconds();
        let mut jar = jar.add(self.cookie(
            self.access_cookie.clone(),
            access.encode().to_string(),
            time::Duration::seconds(access_ttl),
        ));

        if let Some(refresh) = refresh {
            let sealed = self.encrypt(refresh)?;
            jar = jar.add(self.cookie(
                self.refresh_cookie.clone(),
                sealed,
                self.refresh_lifetime(refresh, now),
            ));
        }

        Ok(jar)
    }

    /// Remove both cookies. Works with or without a session.
    pub fn clear(&self, jar: CookieJar) -> CookieJar {
        jar.add(self.cookie(self.access_cookie.clone(), String::new(), time::Duration::ZERO))
            .add(self.cookie(self.refresh_cookie.clone(), String::new(), time::Duration::ZERO))
    }

    fn cookie(&self, name: String, value: String, max_age: time::Duration) -> Cookie<'static> {
        Cookie::build((name, value))
            .http_only(true)
            .secure(self.secure)
            .same_site(SameSite::Lax)
            .path("/")
            .max_age(max_age)
            .build()
    }

    /// The refresh token's own `exp` when it is a JWT, else the configured TTL.
    fn refresh_lifetime(&self, refresh: &str, now: DateTime<Utc>) -> time::Duration {
        let secs = match Token::decode(refresh) {
            Ok(token) if token.expires_at().is_some() => token.remaining(now).num_seconds(),
            _ => i64::try_from(self.refresh_ttl.as_secs()).unwrap_or(i64::MAX),
        };
        time::Duration::seconds(secs)
    }

    fn encrypt(&self, plaintext: &str) -> Result<String> {
        let mut nonce = [0u8; NONCE_LEN];
        rand::rng().fill_bytes(&mut nonce);

        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext.as_bytes())
            .map_err(|_| GatewayError::Internal("failed to encrypt refresh token".to_string()))?;

        let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&ciphertext);
        Ok(URL_SAFE_NO_PAD.encode(out))
    }

    fn decrypt(&self, sealed: &str) -> Option<String> {
        let raw = URL_SAFE_NO_PAD.decode(sealed).ok()?;
        if raw.len() < NONCE_LEN + TAG_LEN {
            return None;
        }
        let (nonce, ciphertext) = raw.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .ok()?;
        String::from_utf8(plaintext).ok()
    }
}

/// Token from an `Authorization: Bearer` header.
pub fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then(|| token.to_string())
}
