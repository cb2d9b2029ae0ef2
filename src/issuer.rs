//! Token Issuer
//!
//! Mints the token kinds used by the auth flows, applies per-kind expiry,
//! and persists the stateful ones.

use crate::codec::TokenCodec;
use crate::config::TokenLifetimes;
use crate::error::{AuthError, TokenError};
use crate::models::{AuthTokens, Claims, TokenExpires, TokenType, User};
use crate::store::TokenStore;
use crate::users::UserDirectory;

use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

/// Signing is server-side; its failures are never the caller's fault
fn signing_failure(user_id: Uuid, token_type: TokenType, err: TokenError) -> AuthError {
    tracing::error!(user_id = %user_id, token_type = %token_type, "Failed to generate token: {}", err);
    AuthError::Internal
}

pub struct TokenIssuer {
    codec: TokenCodec,
    store: Arc<dyn TokenStore>,
    users: Arc<dyn UserDirectory>,
    lifetimes: TokenLifetimes,
}

impl TokenIssuer {
    pub fn new(
        codec: TokenCodec,
        store: Arc<dyn TokenStore>,
        users: Arc<dyn UserDirectory>,
        lifetimes: TokenLifetimes,
    ) -> Self {
        Self {
            codec,
            store,
            users,
            lifetimes,
        }
    }

    fn mint(
        &self,
        user_id: Uuid,
        token_type: TokenType,
    ) -> Result<(String, DateTime<Utc>), AuthError> {
        let lifetime = match token_type {
            TokenType::Access => self.lifetimes.access,
            TokenType::Refresh => self.lifetimes.refresh,
            TokenType::ResetPassword => self.lifetimes.reset_password,
            TokenType::VerifyEmail => self.lifetimes.verify_email,
        };
        let expires = Utc::now() + lifetime;

        let token = self
            .codec
            .encode(user_id, expires, token_type)
            .map_err(|e| signing_failure(user_id, token_type, e))?;

        Ok((token, expires))
    }

    /// Decode a presented token and require its type tag
    pub fn verify(&self, token: &str, expected: TokenType) -> Result<Claims, TokenError> {
        self.codec.decode_as(token, expected)
    }

    /// Access + refresh pair; the refresh token replaces any live one
    pub async fn generate_auth_tokens(&self, user: &User) -> Result<AuthTokens, AuthError> {
        let (access, access_expires) = self.mint(user.id, TokenType::Access)?;
        let (refresh, refresh_expires) = self.mint(user.id, TokenType::Refresh)?;

        self.store
            .save(&refresh, user.id, TokenType::Refresh, refresh_expires)
            .await?;

        Ok(AuthTokens {
            access: TokenExpires {
                token: access,
                expires: access_expires,
            },
            refresh: TokenExpires {
                token: refresh,
                expires: refresh_expires,
            },
        })
    }

    /// Swap a live refresh token for a fresh pair.
    ///
    /// `AuthError::NotFound` if `old_refresh` is no longer live; nothing is
    /// changed in that case.
    pub async fn rotate_auth_tokens(
        &self,
        user: &User,
        old_refresh: &str,
    ) -> Result<AuthTokens, AuthError> {
        let (access, access_expires) = self.mint(user.id, TokenType::Access)?;
        let (refresh, refresh_expires) = self.mint(user.id, TokenType::Refresh)?;

        self.store
            .rotate(
                old_refresh,
                user.id,
                TokenType::Refresh,
                &refresh,
                refresh_expires,
            )
            .await?;

        Ok(AuthTokens {
            access: TokenExpires {
                token: access,
                expires: access_expires,
            },
            refresh: TokenExpires {
                token: refresh,
                expires: refresh_expires,
            },
        })
    }

    /// Reset token for the account owning `email`.
    ///
    /// Fails with `AuthError::UserNotFound` for an unknown email; callers
    /// facing the public must mask that.
    pub async fn generate_reset_password_token(&self, email: &str) -> Result<String, AuthError> {
        let user = self.users.find_by_email(email).await?;

        let (token, expires) = self.mint(user.id, TokenType::ResetPassword)?;
        self.store
            .save(&token, user.id, TokenType::ResetPassword, expires)
            .await?;

        Ok(token)
    }

    pub async fn generate_verify_email_token(&self, user: &User) -> Result<String, AuthError> {
        let (token, expires) = self.mint(user.id, TokenType::VerifyEmail)?;
        self.store
            .save(&token, user.id, TokenType::VerifyEmail, expires)
            .await?;

        Ok(token)
    }
}
