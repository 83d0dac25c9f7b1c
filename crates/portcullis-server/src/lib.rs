//! OIDC authenticating gateway for Portcullis.
//!
//! Sits in front of an upstream service and only forwards requests that
//! carry a valid identity. Browsers are walked through the Authorization
//! Code flow; machine clients present a bearer token or use the password
//! grant on `/oauth/login`.
//!
//! # Components
//!
//! - [`token`]: decoded JWTs and their validity window
//! - [`redirect_state`]: the pre-login destination carried in `state`
//! - [`session`]: session cookies, refresh token sealed with AES-256-GCM
//! - [`routes`]: the `/oauth/*` endpoints
//! - [`enforce`]: the middleware gating everything else
//! - [`upstream`]: forwarding to the protected service
//!
//! # Example
//!
//! ```ignore
//! use portcullis_config::load_config;
//! use portcullis_server::Server;
//!
//! let config = load_config(None)?;
//! Server::new(config)?.run().await?;
//! ```

pub mod enforce;
pub mod error;
pub mod redirect_state;
pub mod routes;
pub mod session;
pub mod state;
pub mod token;
pub mod upstream;

pub use enforce::{DenialPolicy, RedirectToAuthorize, SharedDenialPolicy, Unauthorized};
pub use error::{GatewayError, Result};
pub use redirect_state::RedirectState;
pub use session::{Session, SessionStore};
pub use state::AppState;
pub use token::{Identity, Token, TokenError};

use std::future::Future;
use std::net::SocketAddr;

use axum::{Router, middleware, routing::any};
use portcullis_config::GatewayConfig;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

/// The Portcullis gateway server.
pub struct Server {
    /// Application state.
    state: AppState,
}

impl Server {
    /// Create a server talking to the IdP described by `config`.
    pub fn new(config: GatewayConfig) -> Result<Self> {
        Ok(Self {
            state: AppState::from_config(config)?,
        })
    }

    /// Create a server from a pre-built application state.
    pub fn from_state(state: AppState) -> Self {
        Self { state }
    }

    /// Build the router.
    ///
    /// `/oauth/*` is routed directly; everything else falls through to the
    /// enforcement middleware and then upstream.
    pub fn router(&self) -> Router {
        let protected = any(upstream::forward_handler).layer(middleware::from_fn_with_state(
            self.state.clone(),
            enforce::enforce_middleware,
        ));

        Router::new()
            .merge(routes::health_routes())
            .merge(routes::oauth_routes())
            .fallback(protected)
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    /// Run the server on the configured listen address.
    pub async fn run(self) -> Result<()> {
        let addr = self.state.config.listen;
        self.run_on(addr).await
    }

    /// Run the server on a specific address (useful for testing).
    pub async fn run_on(self, addr: SocketAddr) -> Result<()> {
        self.run_with_shutdown(addr, std::future::pending()).await
    }

    /// Run until `shutdown` resolves, then drain in-flight requests.
    pub async fn run_with_shutdown(
        self,
        addr: SocketAddr,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> Result<()> {
        let router = self.router();

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| GatewayError::Internal(format!("Failed to bind: {}", e)))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| GatewayError::Internal(format!("Failed to bind: {}", e)))?;

        info!(
            addr = %local_addr,
            upstream = ?self.state.config.upstream_url,
            "Starting gateway"
        );

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| GatewayError::Internal(format!("Server error: {}", e)))?;

        info!("Gateway stopped");
        Ok(())
    }

    /// Get the configured listen address.
    pub fn listen_address(&self) -> SocketAddr {
        self.state.config.listen
    }
}
