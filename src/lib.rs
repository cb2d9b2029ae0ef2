//! Token Lifecycle Engine
//!
//! Signed, typed tokens and the auth flows built on them:
//! - HS256 token codec with a `type` claim that is checked on every use
//! - Stateful token storage (one live token per user and type)
//! - Refresh token rotation with replay rejection
//! - Single-use password reset and email verification tokens
//! - Argon2id password hashing
//! - Google login with a state nonce cookie
//!
//! # Configuration
//!
//! Loaded from environment variables by [`AuthConfig::from_env`]:
//! - `JWT_SECRET` - Secret key for signing tokens (required, min 32 chars)
//! - `JWT_ACCESS_EXPIRATION_MINUTES` - Access token lifetime (default: 30)
//! - `JWT_REFRESH_EXPIRATION_DAYS` - Refresh token lifetime (default: 30)
//! - `JWT_RESET_PASSWORD_EXPIRATION_MINUTES` - Reset token lifetime (default: 10)
//! - `JWT_VERIFY_EMAIL_EXPIRATION_MINUTES` - Verify-email token lifetime (default: 10)
//! - `APP_URL` - Base URL for emailed links
//! - `GOOGLE_CLIENT_ID`, `GOOGLE_CLIENT_SECRET`, `GOOGLE_REDIRECT_URL` - Google login (optional)
//! - `SMTP_HOST`, `SMTP_PORT`, `SMTP_USERNAME`, `SMTP_PASSWORD`, `EMAIL_FROM` - Outbound mail (optional)
//!
//! # Usage
//!
//! ```rust,ignore
//! use token_lifecycle::{activate, create_routes};
//!
//! let auth = activate(db_pool).await?;
//! let app = axum::Router::new().merge(create_routes(auth));
//! ```

pub mod codec;
pub mod config;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod issuer;
pub mod models;
pub mod notify;
pub mod oauth;
pub mod password;
pub mod service;
pub mod store;
pub mod users;

// Re-export commonly used types
pub use codec::TokenCodec;
pub use config::{AuthConfig, TokenLifetimes};
pub use error::{AuthError, TokenError};
pub use extractors::{AuthUser, StateCookie};
pub use handlers::AuthState;
pub use issuer::TokenIssuer;
pub use models::*;
pub use notify::Notifier;
pub use oauth::IdentityProvider;
pub use service::AuthService;
pub use store::{MemoryTokenStore, PgTokenStore, TokenStore};
pub use users::{MemoryUserDirectory, PgUserDirectory, UserDirectory};

use axum::Router;
use sqlx::PgPool;
use std::sync::Arc;

/// Load configuration from the environment, create the tables, and wire the
/// PostgreSQL-backed service.
pub async fn activate(db: PgPool) -> Result<AuthState, AuthError> {
    tracing::info!("Activating token lifecycle engine");

    let config = AuthConfig::from_env()?;
    config.validate()?;

    let service = AuthService::postgres(db, config).await?;

    tracing::info!(
        google = service.config().google.is_some(),
        smtp = service.config().smtp.is_some(),
        "Token lifecycle engine activated"
    );
    Ok(Arc::new(service))
}

/// Create authentication routes
pub fn create_routes(auth_service: AuthState) -> Router {
    handlers::create_routes(auth_service)
}
