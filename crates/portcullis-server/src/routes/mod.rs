//! Gateway routes.

pub mod health;
pub mod oauth;

pub use health::{HealthResponse, VERSION_HEADER, health_routes};
pub use oauth::{
    ExpirationResponse, authorize_handler, callback_handler, expiration_handler, login_handler,
    logout_handler, oauth_routes, token_handler,
};
