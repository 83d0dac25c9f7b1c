//! Pre-authentication destination carried through the IdP round trip.
//!
//! The original path and query are packed into the OAuth `state` parameter as
//! padded base64url. Decoding never fails: anything unusable collapses into
//! [`RedirectState::Fallback`], which sends the user to `/`.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE;

use crate::token::BASE64_URL_LENIENT;

/// Where the user lands once authentication completes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RedirectState {
    /// A local target, `path` optionally followed by `?query`.
    Restored(String),
    /// Nothing usable was carried; go to `/`.
    Fallback,
}

impl RedirectState {
    /// Full target, path and query.
    pub fn target(&self) -> &str {
        match self {
            RedirectState::Restored(target) => target,
            RedirectState::Fallback => "/",
        }
    }

    pub fn path(&self) -> &str {
        let target = self.target();
        target.split_once('?').map_or(target, |(path, _)| path)
    }

    /// Raw query, empty when there is none.
    pub fn query(&self) -> &str {
        self.target()
            .split_once('?')
            .map_or("", |(_, query)| query)
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, RedirectState::Fallback)
    }
}

/// Pack a path and raw query into a `state` value.
///
/// Relative components such as `..` are kept literally.
pub fn encode(path: &str, raw_query: Option<&str>) -> String {
    match raw_query.filter(|q| !q.is_empty()) {
        Some(query) => URL_SAFE.encode(format!("{path}?{query}")),
        None => URL_SAFE.encode(path),
    }
}

/// Recover the destination from a `state` value.
pub fn decode(state: Option<&str>) -> RedirectState {
    let Some(state) = state.map(str::trim).filter(|s| !s.is_empty()) else {
        return RedirectState::Fallback;
    };

    let Ok(bytes) = BASE64_URL_LENIENT.decode(state) else {
        tracing::debug!("state is not base64url, falling back to /");
        return RedirectState::Fallback;
    };
    let Ok(target) = String::from_utf8(bytes) else {
        tracing::debug!("state is not UTF-8, falling back to /");
        return RedirectState::Fallback;
    };

    if !is_local_path(&target) {
        tracing::warn!(target = %target, "state does not name a local path, falling back to /");
        return RedirectState::Fallback;
    }

    RedirectState::Restored(target)
}

/// An absolute path on this host: leading `/`, not protocol-relative,
/// printable ASCII only so it can go straight into a `Location` header.
pub(crate) fn is_local_path(target: &str) -> bool {
    let mut chars = target.chars();
    chars.next() == Some('/')
        && !matches!(chars.next(), Some('/') | Some('\\'))
        && target.bytes().all(|b| (0x20..0x7f).contains(&b))
}
