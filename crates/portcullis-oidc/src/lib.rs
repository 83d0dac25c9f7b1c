//! OpenID Connect identity provider client for Portcullis.
//!
//! The gateway never verifies token signatures itself; it drives the OAuth
//! grants against the provider and trusts what the token endpoint returns.
//!
//! # Components
//!
//! - [`provider`]: the [`IdentityProvider`] trait the gateway is written against
//! - [`client`]: [`OidcClient`], the `reqwest` implementation

pub mod client;
pub mod error;
pub mod provider;

pub use client::{OidcClient, OidcConfig};
pub use error::{ProviderError, Result};
pub use provider::{IdentityProvider, SharedProvider, TokenResponse};
