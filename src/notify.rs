//! Outbound Notifications
//!
//! Delivers reset and verification links. A failed delivery fails the
//! enclosing flow.

use crate::config::{AuthConfig, SmtpConfig};
use crate::error::AuthError;

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_reset_password_email(&self, email: &str, token: &str) -> Result<(), AuthError>;

    async fn send_verification_email(&self, email: &str, token: &str) -> Result<(), AuthError>;
}

fn reset_password_body(app_url: &str, token: &str) -> String {
    format!(
        "Dear user,\n\n\
        To reset your password, click on this link: {app_url}/reset-password?token={token}\n\n\
        If you did not request any password resets, then ignore this email."
    )
}

fn verification_body(app_url: &str, token: &str) -> String {
    format!(
        "Dear user,\n\n\
        To verify your email, click on this link: {app_url}/verify-email?token={token}\n\n\
        If you did not create an account, then ignore this email."
    )
}

/// SMTP delivery through lettre
pub struct SmtpNotifier {
    smtp: SmtpConfig,
    app_url: String,
}

impl SmtpNotifier {
    pub fn new(smtp: SmtpConfig, app_url: impl Into<String>) -> Self {
        Self {
            smtp,
            app_url: app_url.into(),
        }
    }

    async fn send(&self, to: &str, subject: &str, body: String) -> Result<(), AuthError> {
        let email = Message::builder()
            .from(
                self.smtp
                    .from
                    .parse()
                    .map_err(|e| AuthError::Notification(format!("Invalid from address: {e}")))?,
            )
            .to(to
                .parse()
                .map_err(|e| AuthError::Notification(format!("Invalid to address: {e}")))?)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body)
            .map_err(|e| AuthError::Notification(format!("Failed to create email: {e}")))?;

        let mailer = SmtpTransport::relay(&self.smtp.host)
            .map_err(|e| AuthError::Notification(format!("Failed to create SMTP transport: {e}")))?
            .credentials(Credentials::new(
                self.smtp.username.clone(),
                self.smtp.password.clone(),
            ))
            .port(self.smtp.port)
            .timeout(Some(std::time::Duration::from_secs(10)))
            .build();

        // lettre's SmtpTransport blocks
        let result = tokio::task::spawn_blocking(move || mailer.send(&email))
            .await
            .map_err(|e| AuthError::Notification(format!("Mail task failed: {e}")))?;

        result.map(|_| ()).map_err(|e| {
            tracing::error!(to = %to, error = %e, "Failed to send email");
            AuthError::Notification(e.to_string())
        })
    }
}

#[async_trait]
impl Notifier for SmtpNotifier {
    async fn send_reset_password_email(&self, email: &str, token: &str) -> Result<(), AuthError> {
        self.send(
            email,
            "Reset password",
            reset_password_body(&self.app_url, token),
        )
        .await
    }

    async fn send_verification_email(&self, email: &str, token: &str) -> Result<(), AuthError> {
        self.send(
            email,
            "Email Verification",
            verification_body(&self.app_url, token),
        )
        .await
    }
}

/// Logs the links instead of sending mail; for development setups without SMTP
pub struct LogNotifier {
    app_url: String,
}

impl LogNotifier {
    pub fn new(app_url: impl Into<String>) -> Self {
        Self {
            app_url: app_url.into(),
        }
    }
}

#[async_trait]
impl Notifier for LogNotifier {
    async fn send_reset_password_email(&self, email: &str, token: &str) -> Result<(), AuthError> {
        tracing::info!(
            to = %email,
            link = %format!("{}/reset-password?token={}", self.app_url, token),
            "Reset password email (not sent, SMTP not configured)"
        );
        Ok(())
    }

    async fn send_verification_email(&self, email: &str, token: &str) -> Result<(), AuthError> {
        tracing::info!(
            to = %email,
            link = %format!("{}/verify-email?token={}", self.app_url, token),
            "Verification email (not sent, SMTP not configured)"
        );
        Ok(())
    }
}

/// SMTP when configured, log output otherwise
pub fn from_config(config: &AuthConfig) -> Box<dyn Notifier> {
    match &config.smtp {
        Some(smtp) => Box::new(SmtpNotifier::new(smtp.clone(), config.app_url.clone())),
        None => {
            tracing::warn!("SMTP not configured, emails will only be logged");
            Box::new(LogNotifier::new(config.app_url.clone()))
        }
    }
}
