//! Authentication Models
//!
//! Token and user entities, claims, and the request/response DTOs used by the
//! HTTP binding.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

// ============================================
// Token Types
// ============================================

/// Type tag carried in every token's claims
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TokenType {
    #[serde(rename = "access")]
    Access,
    #[serde(rename = "refresh")]
    Refresh,
    #[serde(rename = "reset-password")]
    ResetPassword,
    #[serde(rename = "verify-email")]
    VerifyEmail,
}

impl TokenType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenType::Access => "access",
            TokenType::Refresh => "refresh",
            TokenType::ResetPassword => "reset-password",
            TokenType::VerifyEmail => "verify-email",
        }
    }

    /// Whether tokens of this type must be present in the store to be honored
    pub fn is_stateful(&self) -> bool {
        !matches!(self, TokenType::Access)
    }
}

impl std::fmt::Display for TokenType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TokenType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "access" => Ok(TokenType::Access),
            "refresh" => Ok(TokenType::Refresh),
            "reset-password" => Ok(TokenType::ResetPassword),
            "verify-email" => Ok(TokenType::VerifyEmail),
            other => Err(format!("unknown token type: {other}")),
        }
    }
}

/// Claims embedded in a signed token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user ID)
    pub sub: Uuid,
    /// Issued at timestamp
    pub iat: i64,
    /// Expiration timestamp
    pub exp: i64,
    /// Token ID, unique per issued token
    pub jti: Uuid,
    #[serde(rename = "type")]
    pub token_type: TokenType,
}

// ============================================
// Database Entities
// ============================================

/// Live stateful token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub token: String,
    pub user_id: Uuid,
    pub token_type: TokenType,
    pub expires: DateTime<Utc>,
}

/// Row shape of the `tokens` table
#[derive(Debug, FromRow)]
pub(crate) struct TokenRow {
    pub token: String,
    pub user_id: Uuid,
    #[sqlx(rename = "type")]
    pub token_type: String,
    pub expires: DateTime<Utc>,
}

impl TryFrom<TokenRow> for Token {
    type Error = String;

    fn try_from(row: TokenRow) -> Result<Self, Self::Error> {
        Ok(Token {
            token: row.token,
            user_id: row.user_id,
            token_type: row.token_type.parse()?,
            expires: row.expires,
        })
    }
}

/// User entity from database
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    /// Absent for accounts created through third-party login
    #[serde(skip_serializing)]
    pub password_hash: Option<String>,
    pub role: String,
    pub verified_email: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// New user record handed to the user directory
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password_hash: Option<String>,
    pub verified_email: bool,
}

/// Identity returned by a third-party provider
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RemoteIdentity {
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub verified_email: bool,
    #[serde(default)]
    pub name: String,
}

// ============================================
// Request DTOs
// ============================================

/// Registration request
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(length(min = 1, max = 100, message = "Name must be 1-100 characters"))]
    pub name: String,

    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: String,
}

/// Login request
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

/// Refresh token request, also used for logout
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RefreshTokenRequest {
    #[validate(length(min = 1, message = "Refresh token is required"))]
    pub refresh_token: String,
}

/// Password reset request (initiate)
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ForgotPasswordRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
}

/// Password reset request (complete); the token travels in the query string
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ResetPasswordRequest {
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: String,
}

/// `?token=` query parameter
#[derive(Debug, Clone, Deserialize)]
pub struct TokenQuery {
    #[serde(default)]
    pub token: String,
}

/// Query parameters echoed back by the provider callback
#[derive(Debug, Clone, Deserialize)]
pub struct OAuthCallbackQuery {
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub code: String,
}

// ============================================
// Response DTOs
// ============================================

/// A token with its expiry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenExpires {
    pub token: String,
    pub expires: DateTime<Utc>,
}

/// Access + refresh pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthTokens {
    pub access: TokenExpires,
    pub refresh: TokenExpires,
}

/// Register/login success body
#[derive(Debug, Clone, Serialize)]
pub struct AuthResponse {
    pub code: u16,
    pub status: &'static str,
    pub message: String,
    pub user_id: Uuid,
    pub tokens: AuthTokens,
}

/// Refresh success body
#[derive(Debug, Clone, Serialize)]
pub struct RefreshResponse {
    pub code: u16,
    pub status: &'static str,
    pub tokens: AuthTokens,
}

/// Simple message response
#[derive(Debug, Clone, Serialize)]
pub struct MessageResponse {
    pub code: u16,
    pub status: &'static str,
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            code: 200,
            status: "success",
            message: message.into(),
        }
    }
}
