//! Authentication Error Types
//!
//! Two layers: [`TokenError`] is what the codec reports about a presented
//! token, [`AuthError`] is what flows report to their callers.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

/// Failures decoding or checking a signed token
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("Token is malformed")]
    Malformed,

    #[error("Token signature is invalid")]
    InvalidSignature,

    #[error("Token has expired")]
    Expired,

    #[error("Token type does not match")]
    WrongType,

    #[error("Token could not be signed: {0}")]
    Signing(String),
}

impl From<jsonwebtoken::errors::Error> for TokenError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        match err.kind() {
            ErrorKind::InvalidSignature => TokenError::InvalidSignature,
            ErrorKind::ExpiredSignature => TokenError::Expired,
            _ => TokenError::Malformed,
        }
    }
}

/// Authentication errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum AuthError {
    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Invalid or expired token")]
    InvalidToken(#[from] TokenError),

    #[error("Token not found")]
    NotFound,

    #[error("User not found")]
    UserNotFound,

    #[error("Email already taken")]
    EmailExists,

    #[error("Password does not meet requirements")]
    WeakPassword,

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Notification error: {0}")]
    Notification(String),

    #[error("Identity provider error: {0}")]
    IdentityProvider(String),

    #[error("Third-party login is not configured")]
    ProviderDisabled,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error")]
    Internal,
}

impl AuthError {
    /// Collapse every token-consumption failure into a single `Unauthorized`.
    ///
    /// Callers of refresh, reset and verify must not learn which check failed.
    pub fn into_unauthorized(self) -> Self {
        match self {
            AuthError::InvalidToken(_) | AuthError::NotFound | AuthError::UserNotFound => {
                AuthError::Unauthorized
            }
            other => other,
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match &self {
            AuthError::InvalidCredentials => (
                StatusCode::UNAUTHORIZED,
                "invalid_credentials",
                self.to_string(),
            ),
            AuthError::Unauthorized | AuthError::InvalidToken(_) | AuthError::NotFound => (
                StatusCode::UNAUTHORIZED,
                "unauthorized",
                "Please authenticate".to_string(),
            ),
            AuthError::UserNotFound => (
                StatusCode::NOT_FOUND,
                "user_not_found",
                self.to_string(),
            ),
            AuthError::EmailExists => (
                StatusCode::CONFLICT,
                "email_exists",
                self.to_string(),
            ),
            AuthError::WeakPassword => (
                StatusCode::BAD_REQUEST,
                "weak_password",
                self.to_string(),
            ),
            AuthError::Validation(msg) => (
                StatusCode::BAD_REQUEST,
                "validation_error",
                msg.clone(),
            ),
            AuthError::ProviderDisabled => (
                StatusCode::NOT_FOUND,
                "provider_disabled",
                self.to_string(),
            ),
            AuthError::IdentityProvider(_) => (
                StatusCode::BAD_GATEWAY,
                "identity_provider_error",
                "The identity provider could not be reached".to_string(),
            ),
            AuthError::Persistence(_)
            | AuthError::Notification(_)
            | AuthError::Config(_)
            | AuthError::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                "An internal error occurred".to_string(),
            ),
        };

        (
            status,
            Json(serde_json::json!({
                "code": status.as_u16(),
                "error": error_code,
                "message": message
            })),
        )
            .into_response()
    }
}

impl From<sqlx::Error> for AuthError {
    fn from(err: sqlx::Error) -> Self {
        tracing::error!("Database error: {:?}", err);
        AuthError::Persistence(err.to_string())
    }
}

impl From<argon2::password_hash::Error> for AuthError {
    fn from(err: argon2::password_hash::Error) -> Self {
        tracing::error!("Password hashing error: {:?}", err);
        AuthError::Internal
    }
}

impl From<reqwest::Error> for AuthError {
    fn from(err: reqwest::Error) -> Self {
        tracing::error!("Identity provider request failed: {:?}", err);
        AuthError::IdentityProvider(err.to_string())
    }
}
