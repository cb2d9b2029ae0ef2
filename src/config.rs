//! Authentication Configuration
//!
//! All configuration values are loaded from environment variables once at
//! startup and then passed around explicitly.

use crate::error::AuthError;
use chrono::Duration;
use std::env;

/// Per-kind token lifetimes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenLifetimes {
    pub access: Duration,
    pub refresh: Duration,
    pub reset_password: Duration,
    pub verify_email: Duration,
}

impl Default for TokenLifetimes {
    fn default() -> Self {
        Self {
            access: Duration::minutes(30),
            refresh: Duration::days(30),
            reset_password: Duration::minutes(10),
            verify_email: Duration::minutes(10),
        }
    }
}

/// Google OAuth client settings
#[derive(Debug, Clone)]
pub struct GoogleConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_url: String,
}

/// SMTP settings for outbound mail
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from: String,
}

/// Authentication configuration loaded from environment
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// JWT secret key for signing tokens (from JWT_SECRET env var)
    pub jwt_secret: String,

    pub lifetimes: TokenLifetimes,

    /// Argon2 memory cost in KiB (from ARGON2_MEMORY_COST env var)
    pub argon2_memory_cost: u32,

    /// Argon2 time cost (iterations) (from ARGON2_TIME_COST env var)
    pub argon2_time_cost: u32,

    /// Argon2 parallelism (from ARGON2_PARALLELISM env var)
    pub argon2_parallelism: u32,

    /// Minimum password length (from MIN_PASSWORD_LENGTH env var)
    pub min_password_length: usize,

    /// Base URL used for links in outbound mail (from APP_URL env var)
    pub app_url: String,

    /// Lifetime of the oauth_state cookie in seconds (from OAUTH_STATE_MAX_AGE env var)
    pub oauth_state_max_age: i64,

    pub google: Option<GoogleConfig>,

    pub smtp: Option<SmtpConfig>,
}

fn parsed<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl AuthConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, AuthError> {
        let jwt_secret = env::var("JWT_SECRET")
            .map_err(|_| AuthError::Config("JWT_SECRET must be set".to_string()))?;

        let defaults = TokenLifetimes::default();
        let lifetimes = TokenLifetimes {
            access: Duration::minutes(parsed(
                "JWT_ACCESS_EXPIRATION_MINUTES",
                defaults.access.num_minutes(),
            )),
            refresh: Duration::days(parsed(
                "JWT_REFRESH_EXPIRATION_DAYS",
                defaults.refresh.num_days(),
            )),
            reset_password: Duration::minutes(parsed(
                "JWT_RESET_PASSWORD_EXPIRATION_MINUTES",
                defaults.reset_password.num_minutes(),
            )),
            verify_email: Duration::minutes(parsed(
                "JWT_VERIFY_EMAIL_EXPIRATION_MINUTES",
                defaults.verify_email.num_minutes(),
            )),
        };

        let google = match (
            env::var("GOOGLE_CLIENT_ID"),
            env::var("GOOGLE_CLIENT_SECRET"),
            env::var("GOOGLE_REDIRECT_URL"),
        ) {
            (Ok(client_id), Ok(client_secret), Ok(redirect_url)) => Some(GoogleConfig {
                client_id,
                client_secret,
                redirect_url,
            }),
            _ => None,
        };

        let smtp = match (
            env::var("SMTP_HOST"),
            env::var("SMTP_USERNAME"),
            env::var("SMTP_PASSWORD"),
        ) {
            (Ok(host), Ok(username), Ok(password)) => Some(SmtpConfig {
                host,
                port: parsed("SMTP_PORT", 587),
                from: env::var("EMAIL_FROM").unwrap_or_else(|_| username.clone()),
                username,
                password,
            }),
            _ => None,
        };

        Ok(Self {
            jwt_secret,
            lifetimes,
            argon2_memory_cost: parsed("ARGON2_MEMORY_COST", 65536), // 64 MiB
            argon2_time_cost: parsed("ARGON2_TIME_COST", 3),
            argon2_parallelism: parsed("ARGON2_PARALLELISM", 4),
            min_password_length: parsed("MIN_PASSWORD_LENGTH", 8),
            app_url: env::var("APP_URL").unwrap_or_else(|_| "http://localhost:3000".to_string()),
            oauth_state_max_age: parsed("OAUTH_STATE_MAX_AGE", 30),
            google,
            smtp,
        })
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), AuthError> {
        if self.jwt_secret.len() < 32 {
            return Err(AuthError::Config(
                "JWT_SECRET must be at least 32 characters".to_string(),
            ));
        }

        let l = &self.lifetimes;
        if l.access <= Duration::zero()
            || l.reset_password <= Duration::zero()
            || l.verify_email <= Duration::zero()
        {
            return Err(AuthError::Config(
                "token lifetimes must be positive".to_string(),
            ));
        }

        if l.refresh <= l.access {
            return Err(AuthError::Config(
                "refresh token lifetime must exceed access token lifetime".to_string(),
            ));
        }

        if self.min_password_length < 8 {
            return Err(AuthError::Config(
                "MIN_PASSWORD_LENGTH must be at least 8".to_string(),
            ));
        }

        if self.oauth_state_max_age <= 0 {
            return Err(AuthError::Config(
                "OAUTH_STATE_MAX_AGE must be positive".to_string(),
            ));
        }

        if let Some(google) = &self.google {
            url::Url::parse(&google.redirect_url).map_err(|e| {
                AuthError::Config(format!("GOOGLE_REDIRECT_URL is not a valid URL: {e}"))
            })?;
        }

        Ok(())
    }

    /// Configuration suitable for tests: cheap argon2 params, fixed secret
    #[cfg(test)]
    pub(crate) fn for_tests() -> Self {
        Self {
            jwt_secret: "test-secret-test-secret-test-secret".to_string(),
            lifetimes: TokenLifetimes::default(),
            argon2_memory_cost: 1024,
            argon2_time_cost: 1,
            argon2_parallelism: 1,
            min_password_length: 8,
            app_url: "http://localhost:3000".to_string(),
            oauth_state_max_age: 30,
            google: None,
            smtp: None,
        }
    }
}
