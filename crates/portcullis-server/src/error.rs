//! Error types for the gateway.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use portcullis_oidc::ProviderError;
use serde::Serialize;
use thiserror::Error;

use crate::token::TokenError;

/// Gateway error type.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Request is missing something required or carries junk.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// No credential presented, or it is expired.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Authenticated but lacking a required role.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// No resource rule matches, or the feature is disabled.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The IdP or the upstream could not be reached or answered garbage.
    #[error("Bad gateway: {0}")]
    BadGateway(String),

    /// Token errors.
    #[error(transparent)]
    Token(#[from] TokenError),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl GatewayError {
    /// Map an IdP failure for endpoints where a rejection is the caller's fault.
    pub fn from_provider(e: ProviderError) -> Self {
        match e {
            ProviderError::Rejected { .. } => GatewayError::BadRequest(e.to_string()),
            ProviderError::Config(msg) => GatewayError::Config(msg),
            ProviderError::Network(_) | ProviderError::Backend(_) => {
                GatewayError::BadGateway(e.to_string())
            }
        }
    }

    /// Like [`GatewayError::from_provider`], but a rejection means bad credentials.
    pub fn from_credentials(e: ProviderError) -> Self {
        if e.is_rejection() {
            GatewayError::Unauthorized(e.to_string())
        } else {
            Self::from_provider(e)
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::BadRequest(_) | GatewayError::Token(TokenError::Malformed(_)) => {
                StatusCode::BAD_REQUEST
            }
            GatewayError::Unauthorized(_) | GatewayError::Token(TokenError::Expired) => {
                StatusCode::UNAUTHORIZED
            }
            GatewayError::Forbidden(_) => StatusCode::FORBIDDEN,
            GatewayError::NotFound(_) => StatusCode::NOT_FOUND,
            GatewayError::BadGateway(_) => StatusCode::BAD_GATEWAY,
            GatewayError::Internal(_) | GatewayError::Config(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn code(&self) -> &'static str {
        match self {
            GatewayError::BadRequest(_) => "bad_request",
            GatewayError::Unauthorized(_) => "unauthorized",
            GatewayError::Forbidden(_) => "forbidden",
            GatewayError::NotFound(_) => "not_found",
            GatewayError::BadGateway(_) => "bad_gateway",
            GatewayError::Token(TokenError::Malformed(_)) => "malformed_token",
            GatewayError::Token(TokenError::Expired) => "expired_token",
            GatewayError::Internal(_) => "internal_error",
            GatewayError::Config(_) => "config_error",
        }
    }
}

/// Result type for gateway operations.
pub type Result<T> = std::result::Result<T, GatewayError>;

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error code for programmatic handling.
    pub code: String,
    /// Human-readable error message.
    pub message: String,
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.code();
        let message = self.to_string();

        if status.is_server_error() {
            tracing::error!(status = %status, code, error = %message, "Gateway error");
        } else {
            tracing::warn!(status = %status, code, error = %message, "Client error");
        }

        let body = ErrorResponse {
            code: code.to_string(),
            message,
        };

        (status, Json(body)).into_response()
    }
}
