//! Authentication Extractors
//!
//! Axum extractors for the bearer access token and the OAuth state cookie.

use crate::error::AuthError;
use crate::handlers::AuthState;
use crate::models::User;
use crate::oauth::STATE_COOKIE;

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{header, request::Parts},
};

/// Authenticated user resolved from a bearer access token
#[derive(Debug, Clone)]
pub struct AuthUser(pub User);

fn bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    AuthState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts).ok_or(AuthError::Unauthorized)?;

        let service = AuthState::from_ref(state);
        let user = service.authenticate(token).await?;

        Ok(AuthUser(user))
    }
}

/// Value of the `oauth_state` cookie, if the browser sent one
#[derive(Debug, Clone, Default)]
pub struct StateCookie(pub Option<String>);

fn find_cookie<'a>(parts: &'a Parts, name: &str) -> Option<&'a str> {
    parts
        .headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|h| h.to_str().ok())
        .flat_map(|h| h.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value)
}

#[async_trait]
impl<S> FromRequestParts<S> for StateCookie
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(StateCookie(
            find_cookie(parts, STATE_COOKIE).map(String::from),
        ))
    }
}
