//! Authentication HTTP Handlers
//!
//! Thin REST binding over [`AuthService`]: request validation, cookie
//! handling and response shapes. No token logic lives here.

use crate::error::AuthError;
use crate::extractors::{AuthUser, StateCookie};
use crate::models::*;
use crate::oauth::STATE_COOKIE;
use crate::service::AuthService;

use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;
use validator::Validate;

/// Shared auth service state
pub type AuthState = Arc<AuthService>;

fn validate(req: &impl Validate) -> Result<(), AuthError> {
    req.validate()
        .map_err(|e| AuthError::Validation(e.to_string()))
}

// ============================================
// Route Builder
// ============================================

/// Create authentication routes
pub fn create_routes(auth_service: AuthState) -> Router {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/logout", post(logout))
        .route("/auth/refresh-tokens", post(refresh_tokens))
        .route("/auth/forgot-password", post(forgot_password))
        .route("/auth/reset-password", post(reset_password))
        .route("/auth/send-verification-email", post(send_verification_email))
        .route("/auth/verify-email", post(verify_email))
        .route("/auth/google", get(google_login))
        .route("/auth/google-callback", get(google_callback))
        .with_state(auth_service)
}

fn auth_response(status: StatusCode, message: &str, user: &User, tokens: AuthTokens) -> impl IntoResponse {
    (
        status,
        Json(AuthResponse {
            code: status.as_u16(),
            status: "success",
            message: message.to_string(),
            user_id: user.id,
            tokens,
        }),
    )
}

// ============================================
// Registration / Login / Logout
// ============================================

/// POST /auth/register
pub async fn register(
    State(auth): State<AuthState>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, AuthError> {
    validate(&req)?;

    let (user, tokens) = auth.register(req).await?;

    Ok(auth_response(
        StatusCode::CREATED,
        "Registration successful",
        &user,
        tokens,
    ))
}

/// POST /auth/login
pub async fn login(
    State(auth): State<AuthState>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, AuthError> {
    validate(&req)?;

    let (user, tokens) = auth.login(req).await?;

    Ok(auth_response(StatusCode::OK, "Login successful", &user, tokens))
}

/// POST /auth/logout
pub async fn logout(
    State(auth): State<AuthState>,
    Json(req): Json<RefreshTokenRequest>,
) -> Result<impl IntoResponse, AuthError> {
    validate(&req)?;

    auth.logout(&req.refresh_token).await?;

    Ok(Json(MessageResponse::new("Logged out successfully")))
}

// ============================================
// Token Refresh
// ============================================

/// POST /auth/refresh-tokens
pub async fn refresh_tokens(
    State(auth): State<AuthState>,
    Json(req): Json<RefreshTokenRequest>,
) -> Result<impl IntoResponse, AuthError> {
    validate(&req)?;

    let tokens = auth.refresh_auth(&req.refresh_token).await?;

    Ok(Json(RefreshResponse {
        code: 200,
        status: "success",
        tokens,
    }))
}

// ============================================
// Password Management
// ============================================

/// POST /auth/forgot-password
///
/// Same response whether or not the email belongs to an account.
pub async fn forgot_password(
    State(auth): State<AuthState>,
    Json(req): Json<ForgotPasswordRequest>,
) -> Result<impl IntoResponse, AuthError> {
    validate(&req)?;

    auth.forgot_password(&req.email).await?;

    Ok(Json(MessageResponse::new(
        "If the email exists, a password reset link has been sent",
    )))
}

/// POST /auth/reset-password?token=
pub async fn reset_password(
    State(auth): State<AuthState>,
    Query(query): Query<TokenQuery>,
    Json(req): Json<ResetPasswordRequest>,
) -> Result<impl IntoResponse, AuthError> {
    validate(&req)?;

    auth.reset_password(&query.token, &req.password).await?;

    Ok(Json(MessageResponse::new("Password reset successfully")))
}

// ============================================
// Email Verification
// ============================================

/// POST /auth/send-verification-email
pub async fn send_verification_email(
    State(auth): State<AuthState>,
    user: AuthUser,
) -> Result<impl IntoResponse, AuthError> {
    auth.send_verification_email(&user.0).await?;

    Ok(Json(MessageResponse::new("Verification email sent")))
}

/// POST /auth/verify-email?token=
pub async fn verify_email(
    State(auth): State<AuthState>,
    Query(query): Query<TokenQuery>,
) -> Result<impl IntoResponse, AuthError> {
    auth.verify_email(&query.token).await?;

    Ok(Json(MessageResponse::new("Email verified successfully")))
}

// ============================================
// Google Login
// ============================================

fn state_cookie(value: &str, max_age: i64) -> String {
    format!("{STATE_COOKIE}={value}; Max-Age={max_age}; Path=/; HttpOnly; SameSite=Lax")
}

/// GET /auth/google
///
/// Redirects to Google and stores the state nonce in a short-lived cookie.
pub async fn google_login(State(auth): State<AuthState>) -> Result<impl IntoResponse, AuthError> {
    let redirect = auth.google_login()?;
    let cookie = state_cookie(&redirect.state, auth.config().oauth_state_max_age);

    Ok((
        [(header::SET_COOKIE, cookie)],
        Redirect::to(&redirect.url),
    ))
}

/// GET /auth/google-callback?state=&code=
///
/// The state nonce is single-use: the cookie is cleared on every outcome.
pub async fn google_callback(
    State(auth): State<AuthState>,
    StateCookie(stored): StateCookie,
    Query(query): Query<OAuthCallbackQuery>,
) -> Response {
    let clear = [(header::SET_COOKIE, state_cookie("", 0))];

    match auth
        .google_callback(stored.as_deref(), &query.state, &query.code)
        .await
    {
        Ok((user, tokens)) => (
            clear,
            auth_response(StatusCode::OK, "Login successful", &user, tokens),
        )
            .into_response(),
        Err(e) => (clear, e).into_response(),
    }
}
