//! Third-party Login
//!
//! State nonce handling for the redirect round trip and the Google
//! authorization-code exchange.

use crate::config::GoogleConfig;
use crate::error::AuthError;
use crate::models::RemoteIdentity;

use async_trait::async_trait;
use rand::Rng;
use serde::Deserialize;
use url::Url;

const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/auth";
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const GOOGLE_USERINFO_URL: &str = "https://www.googleapis.com/oauth2/v2/userinfo";
const GOOGLE_SCOPES: &str =
    "https://www.googleapis.com/auth/userinfo.email https://www.googleapis.com/auth/userinfo.profile";

/// Name of the cookie carrying the state nonce
pub const STATE_COOKIE: &str = "oauth_state";

/// Fresh random state nonce, hex encoded
pub fn generate_state() -> String {
    let bytes: [u8; 32] = rand::thread_rng().gen();
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Exact comparison of the stored nonce with the echoed one.
///
/// A missing or empty stored nonce never matches.
pub fn state_matches(stored: Option<&str>, echoed: &str) -> bool {
    match stored {
        Some(stored) if !stored.is_empty() => stored == echoed,
        _ => false,
    }
}

/// Authorization-code provider
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Where to send the browser, bound to `state`
    fn authorization_url(&self, state: &str) -> Result<String, AuthError>;

    /// Exchange an authorization code for the remote identity.
    ///
    /// A code the provider refuses yields `AuthError::Unauthorized`;
    /// transport failures yield `AuthError::IdentityProvider`.
    async fn exchange_code(&self, code: &str) -> Result<RemoteIdentity, AuthError>;
}

#[derive(Debug, Deserialize)]
struct GoogleTokenResponse {
    access_token: String,
}

/// Google OAuth2 client
pub struct GoogleProvider {
    config: GoogleConfig,
    http: reqwest::Client,
}

impl GoogleProvider {
    pub fn new(config: GoogleConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl IdentityProvider for GoogleProvider {
    fn authorization_url(&self, state: &str) -> Result<String, AuthError> {
        let url = Url::parse_with_params(
            GOOGLE_AUTH_URL,
            &[
                ("client_id", self.config.client_id.as_str()),
                ("redirect_uri", self.config.redirect_url.as_str()),
                ("response_type", "code"),
                ("scope", GOOGLE_SCOPES),
                ("state", state),
            ],
        )
        .map_err(|e| AuthError::Config(format!("invalid authorization URL: {e}")))?;

        Ok(url.into())
    }

    async fn exchange_code(&self, code: &str) -> Result<RemoteIdentity, AuthError> {
        if code.is_empty() {
            return Err(AuthError::Unauthorized);
        }

        let response = self
            .http
            .post(GOOGLE_TOKEN_URL)
            .form(&[
                ("code", code),
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("redirect_uri", self.config.redirect_url.as_str()),
                ("grant_type", "authorization_code"),
            ])
            .send()
            .await?;

        if response.status().is_client_error() {
            tracing::warn!(status = %response.status(), "Google rejected authorization code");
            return Err(AuthError::Unauthorized);
        }

        let token: GoogleTokenResponse = response.error_for_status()?.json().await?;

        let identity: RemoteIdentity = self
            .http
            .get(GOOGLE_USERINFO_URL)
            .bearer_auth(&token.access_token)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if identity.email.is_empty() {
            return Err(AuthError::IdentityProvider(
                "identity has no email".to_string(),
            ));
        }

        Ok(identity)
    }
}
