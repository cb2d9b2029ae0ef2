//! Authentication Service
//!
//! The auth flows: register, login, logout, refresh, password reset, email
//! verification and Google login. Each flow is a short transaction built on
//! the token issuer and the injected collaborators.

use crate::codec::TokenCodec;
use crate::config::AuthConfig;
use crate::error::AuthError;
use crate::issuer::TokenIssuer;
use crate::models::*;
use crate::notify::{self, Notifier};
use crate::oauth::{self, GoogleProvider, IdentityProvider};
use crate::password::PasswordHasher;
use crate::store::{PgTokenStore, TokenStore};
use crate::users::{PgUserDirectory, UserDirectory};

use chrono::Utc;
use sqlx::PgPool;
use std::sync::Arc;

/// Redirect target plus the nonce the caller must keep out-of-band
#[derive(Debug, Clone)]
pub struct ProviderRedirect {
    pub url: String,
    pub state: String,
}

/// Authentication service
pub struct AuthService {
    config: AuthConfig,
    issuer: TokenIssuer,
    store: Arc<dyn TokenStore>,
    users: Arc<dyn UserDirectory>,
    passwords: PasswordHasher,
    notifier: Arc<dyn Notifier>,
    identity: Option<Arc<dyn IdentityProvider>>,
}

impl AuthService {
    /// Wire the service from explicit collaborators
    pub fn new(
        config: AuthConfig,
        store: Arc<dyn TokenStore>,
        users: Arc<dyn UserDirectory>,
        notifier: Arc<dyn Notifier>,
        identity: Option<Arc<dyn IdentityProvider>>,
    ) -> Result<Self, AuthError> {
        config.validate()?;

        let codec = TokenCodec::new(config.jwt_secret.as_bytes());
        let issuer = TokenIssuer::new(codec, store.clone(), users.clone(), config.lifetimes);
        let passwords = PasswordHasher::new(&config)?;

        Ok(Self {
            config,
            issuer,
            store,
            users,
            passwords,
            notifier,
            identity,
        })
    }

    /// PostgreSQL-backed service with SMTP/Google taken from the config
    pub async fn postgres(db: PgPool, config: AuthConfig) -> Result<Self, AuthError> {
        let users = PgUserDirectory::new(db.clone());
        let store = PgTokenStore::new(db);
        users.migrate().await?;
        store.migrate().await?;

        let notifier: Arc<dyn Notifier> = Arc::from(notify::from_config(&config));
        let identity = config
            .google
            .clone()
            .map(|google| Arc::new(GoogleProvider::new(google)) as Arc<dyn IdentityProvider>);

        Self::new(config, Arc::new(store), Arc::new(users), notifier, identity)
    }

    /// Get reference to config
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    // ============================================
    // Registration / Login / Logout
    // ============================================

    /// Create the account and issue its first token pair
    pub async fn register(&self, req: RegisterRequest) -> Result<(User, AuthTokens), AuthError> {
        self.passwords.validate(&req.password)?;
        let password_hash = self.passwords.hash(&req.password)?;

        let user = self
            .users
            .create(NewUser {
                name: req.name,
                email: req.email,
                password_hash: Some(password_hash),
                verified_email: false,
            })
            .await?;

        // Undo the account if no session could be issued, so a retry can succeed
        let tokens = match self.issuer.generate_auth_tokens(&user).await {
            Ok(tokens) => tokens,
            Err(e) => {
                if let Err(cleanup) = self.users.delete(user.id).await {
                    tracing::error!(user_id = %user.id, error = %cleanup, "Failed to remove user after failed registration");
                }
                return Err(e);
            }
        };

        tracing::info!(user_id = %user.id, "User registered");
        Ok((user, tokens))
    }

    pub async fn login(&self, req: LoginRequest) -> Result<(User, AuthTokens), AuthError> {
        let user = match self.users.find_by_email(&req.email).await {
            Ok(user) => user,
            Err(AuthError::UserNotFound) => return Err(AuthError::InvalidCredentials),
            Err(e) => return Err(e),
        };

        // Accounts created through Google have no password
        let hash = user
            .password_hash
            .as_deref()
            .ok_or(AuthError::InvalidCredentials)?;

        if !self.passwords.verify(&req.password, hash)? {
            tracing::debug!(user_id = %user.id, "Login with wrong password");
            return Err(AuthError::InvalidCredentials);
        }

        let tokens = self.issuer.generate_auth_tokens(&user).await?;

        tracing::info!(user_id = %user.id, "User logged in");
        Ok((user, tokens))
    }

    /// Revoke the session the refresh token belongs to
    pub async fn logout(&self, refresh_token: &str) -> Result<(), AuthError> {
        let claims = self
            .issuer
            .verify(refresh_token, TokenType::Refresh)
            .map_err(|_| AuthError::Unauthorized)?;

        self.store
            .consume(refresh_token, claims.sub, TokenType::Refresh)
            .await
            .map_err(AuthError::into_unauthorized)?;

        tracing::info!(user_id = %claims.sub, "User logged out");
        Ok(())
    }

    // ============================================
    // Token Refresh
    // ============================================

    /// Rotate a live refresh token into a new pair; the presented one dies
    pub async fn refresh_auth(&self, refresh_token: &str) -> Result<AuthTokens, AuthError> {
        let claims = self
            .issuer
            .verify(refresh_token, TokenType::Refresh)
            .map_err(|_| AuthError::Unauthorized)?;

        let user = self
            .users
            .find_by_id(claims.sub)
            .await
            .map_err(AuthError::into_unauthorized)?;

        let tokens = self
            .issuer
            .rotate_auth_tokens(&user, refresh_token)
            .await
            .map_err(|e| {
                if matches!(e, AuthError::NotFound) {
                    tracing::warn!(user_id = %user.id, "Refresh token replay rejected");
                }
                e.into_unauthorized()
            })?;

        Ok(tokens)
    }

    // ============================================
    // Password Management
    // ============================================

    /// Send a reset link if the account exists; behaves the same either way
    pub async fn forgot_password(&self, email: &str) -> Result<(), AuthError> {
        match self.issuer.generate_reset_password_token(email).await {
            Ok(token) => {
                self.notifier.send_reset_password_email(email, &token).await?;
                tracing::info!("Password reset requested");
                Ok(())
            }
            Err(AuthError::UserNotFound) => {
                tracing::debug!("Password reset requested for unknown email");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Consume a reset token and set the new password.
    ///
    /// The token is consumed before the password write; if that write then
    /// fails the user has to request a new token.
    pub async fn reset_password(&self, token: &str, new_password: &str) -> Result<(), AuthError> {
        self.passwords.validate(new_password)?;

        let claims = self
            .issuer
            .verify(token, TokenType::ResetPassword)
            .map_err(|_| AuthError::Unauthorized)?;

        let user = self
            .users
            .find_by_id(claims.sub)
            .await
            .map_err(AuthError::into_unauthorized)?;

        let password_hash = self.passwords.hash(new_password)?;

        self.store
            .consume(token, user.id, TokenType::ResetPassword)
            .await
            .map_err(AuthError::into_unauthorized)?;

        self.users.update_password(user.id, &password_hash).await?;

        // New credential: every other outstanding session goes too
        self.store.delete_all_for_user(user.id).await?;

        tracing::info!(user_id = %user.id, "Password reset completed");
        Ok(())
    }

    // ============================================
    // Email Verification
    // ============================================

    pub async fn send_verification_email(&self, user: &User) -> Result<(), AuthError> {
        let token = self.issuer.generate_verify_email_token(user).await?;
        self.notifier
            .send_verification_email(&user.email, &token)
            .await?;

        tracing::info!(user_id = %user.id, "Verification email sent");
        Ok(())
    }

    pub async fn verify_email(&self, token: &str) -> Result<(), AuthError> {
        let claims = self
            .issuer
            .verify(token, TokenType::VerifyEmail)
            .map_err(|_| AuthError::Unauthorized)?;

        let user = self
            .users
            .find_by_id(claims.sub)
            .await
            .map_err(AuthError::into_unauthorized)?;

        self.store
            .consume(token, user.id, TokenType::VerifyEmail)
            .await
            .map_err(AuthError::into_unauthorized)?;

        self.users.mark_verified(user.id).await?;

        tracing::info!(user_id = %user.id, "Email verified");
        Ok(())
    }

    // ============================================
    // Google Login
    // ============================================

    fn identity_provider(&self) -> Result<&Arc<dyn IdentityProvider>, AuthError> {
        self.identity.as_ref().ok_or(AuthError::ProviderDisabled)
    }

    /// Fresh state nonce and the provider URL bound to it
    pub fn google_login(&self) -> Result<ProviderRedirect, AuthError> {
        let provider = self.identity_provider()?;
        let state = oauth::generate_state();
        let url = provider.authorization_url(&state)?;

        Ok(ProviderRedirect { url, state })
    }

    /// Check the echoed state, exchange the code, and sign the user in
    pub async fn google_callback(
        &self,
        stored_state: Option<&str>,
        state: &str,
        code: &str,
    ) -> Result<(User, AuthTokens), AuthError> {
        let provider = self.identity_provider()?;

        if !oauth::state_matches(stored_state, state) {
            tracing::warn!("OAuth state mismatch");
            return Err(AuthError::Unauthorized);
        }

        let identity = provider.exchange_code(code).await?;
        let user = self.users.upsert_by_remote_identity(&identity).await?;
        let tokens = self.issuer.generate_auth_tokens(&user).await?;

        tracing::info!(user_id = %user.id, "User logged in with Google");
        Ok((user, tokens))
    }

    // ============================================
    // Access Tokens
    // ============================================

    /// Resolve a bearer access token to its user
    pub async fn authenticate(&self, access_token: &str) -> Result<User, AuthError> {
        let claims = self
            .issuer
            .verify(access_token, TokenType::Access)
            .map_err(|_| AuthError::Unauthorized)?;

        self.users
            .find_by_id(claims.sub)
            .await
            .map_err(AuthError::into_unauthorized)
    }

    /// Drop stateful tokens past their expiry
    pub async fn purge_expired_tokens(&self) -> Result<u64, AuthError> {
        let purged = self.store.purge_expired(Utc::now()).await?;
        if purged > 0 {
            tracing::info!(purged, "Expired tokens purged");
        }
        Ok(purged)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::issuer::tests::BrokenStore;
    use crate::store::MemoryTokenStore;
    use crate::users::MemoryUserDirectory;
    use async_trait::async_trait;
    use tokio::sync::Mutex;

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub(crate) enum Sent {
        Reset { email: String, token: String },
        Verify { email: String, token: String },
    }

    #[derive(Default)]
    pub(crate) struct RecordingNotifier {
        pub sent: Mutex<Vec<Sent>>,
    }

    impl RecordingNotifier {
        pub async fn last_token(&self) -> Option<String> {
            self.sent.lock().await.last().map(|s| match s {
                Sent::Reset { token, .. } | Sent::Verify { token, .. } => token.clone(),
            })
        }
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn send_reset_password_email(&self, email: &str, token: &str) -> Result<(), AuthError> {
            self.sent.lock().await.push(Sent::Reset {
                email: email.into(),
                token: token.into(),
            });
            Ok(())
        }

        async fn send_verification_email(&self, email: &str, token: &str) -> Result<(), AuthError> {
            self.sent.lock().await.push(Sent::Verify {
                email: email.into(),
                token: token.into(),
            });
            Ok(())
        }
    }

    struct FailingNotifier;

    #[async_trait]
    impl Notifier for FailingNotifier {
        async fn send_reset_password_email(&self, _: &str, _: &str) -> Result<(), AuthError> {
            Err(AuthError::Notification("smtp down".into()))
        }

        async fn send_verification_email(&self, _: &str, _: &str) -> Result<(), AuthError> {
            Err(AuthError::Notification("smtp down".into()))
        }
    }

    pub(crate) const GOOD_CODE: &str = "good-code";

    /// Accepts only `GOOD_CODE`
    pub(crate) struct FakeProvider;

    #[async_trait]
    impl IdentityProvider for FakeProvider {
        fn authorization_url(&self, state: &str) -> Result<String, AuthError> {
            Ok(format!("https://provider.example/auth?state={state}"))
        }

        async fn exchange_code(&self, code: &str) -> Result<RemoteIdentity, AuthError> {
            if code != GOOD_CODE {
                return Err(AuthError::Unauthorized);
            }
            Ok(RemoteIdentity {
                id: "remote-1".into(),
                email: "g@x.com".into(),
                verified_email: true,
                name: "Gee".into(),
            })
        }
    }

    pub(crate) struct Harness {
        pub service: Arc<AuthService>,
        pub store: Arc<MemoryTokenStore>,
        pub users: Arc<MemoryUserDirectory>,
        pub notifier: Arc<RecordingNotifier>,
    }

    pub(crate) fn harness() -> Harness {
        let store = Arc::new(MemoryTokenStore::new());
        let users = Arc::new(MemoryUserDirectory::new());
        let notifier = Arc::new(RecordingNotifier::default());
        let service = AuthService::new(
            AuthConfig::for_tests(),
            store.clone(),
            users.clone(),
            notifier.clone(),
            Some(Arc::new(FakeProvider)),
        )
        .unwrap();

        Harness {
            service: Arc::new(service),
            store,
            users,
            notifier,
        }
    }

    pub(crate) fn register_req(email: &str, password: &str) -> RegisterRequest {
        RegisterRequest {
            name: "Ana".into(),
            email: email.into(),
            password: password.into(),
        }
    }

    fn login_req(email: &str, password: &str) -> LoginRequest {
        LoginRequest {
            email: email.into(),
            password: password.into(),
        }
    }

    #[tokio::test]
    async fn test_register_then_refresh_rotates() {
        let h = harness();
        let (user, tokens) = h
            .service
            .register(register_req("a@x.com", "password1"))
            .await
            .unwrap();

        let rotated = h.service.refresh_auth(&tokens.refresh.token).await.unwrap();
        assert_ne!(rotated.refresh.token, tokens.refresh.token);

        assert!(matches!(
            h.service.refresh_auth(&tokens.refresh.token).await,
            Err(AuthError::Unauthorized)
        ));
        assert!(h.service.refresh_auth(&rotated.refresh.token).await.is_ok());
        assert_eq!(h.store.live_count(user.id, TokenType::Refresh).await, 1);
    }

    #[tokio::test]
    async fn test_register_duplicate_email() {
        let h = harness();
        h.service
            .register(register_req("a@x.com", "password1"))
            .await
            .unwrap();

        assert!(matches!(
            h.service.register(register_req("a@x.com", "password2")).await,
            Err(AuthError::EmailExists)
        ));
    }

    #[tokio::test]
    async fn test_register_weak_password() {
        let h = harness();
        assert!(matches!(
            h.service.register(register_req("a@x.com", "p")).await,
            Err(AuthError::WeakPassword)
        ));
    }

    #[tokio::test]
    async fn test_login() {
        let h = harness();
        h.service
            .register(register_req("a@x.com", "password1"))
            .await
            .unwrap();

        assert!(h.service.login(login_req("a@x.com", "password1")).await.is_ok());
        assert!(matches!(
            h.service.login(login_req("a@x.com", "password9")).await,
            Err(AuthError::InvalidCredentials)
        ));
        assert!(matches!(
            h.service.login(login_req("b@x.com", "password1")).await,
            Err(AuthError::InvalidCredentials)
        ));
    }

    #[tokio::test]
    async fn test_access_token_is_not_a_refresh_token() {
        let h = harness();
        let (_, tokens) = h
            .service
            .register(register_req("a@x.com", "password1"))
            .await
            .unwrap();

        assert!(matches!(
            h.service.refresh_auth(&tokens.access.token).await,
            Err(AuthError::Unauthorized)
        ));
        assert!(h.service.authenticate(&tokens.access.token).await.is_ok());
        assert!(matches!(
            h.service.authenticate(&tokens.refresh.token).await,
            Err(AuthError::Unauthorized)
        ));
    }

    #[tokio::test]
    async fn test_logout_revokes_session() {
        let h = harness();
        let (_, tokens) = h
            .service
            .register(register_req("a@x.com", "password1"))
            .await
            .unwrap();

        h.service.logout(&tokens.refresh.token).await.unwrap();

        assert!(matches!(
            h.service.refresh_auth(&tokens.refresh.token).await,
            Err(AuthError::Unauthorized)
        ));
        assert!(matches!(
            h.service.logout(&tokens.refresh.token).await,
            Err(AuthError::Unauthorized)
        ));
    }

    #[tokio::test]
    async fn test_logout_keeps_other_token_types() {
        let h = harness();
        let (user, tokens) = h
            .service
            .register(register_req("a@x.com", "password1"))
            .await
            .unwrap();
        h.service.send_verification_email(&user).await.unwrap();

        h.service.logout(&tokens.refresh.token).await.unwrap();

        assert_eq!(h.store.live_count(user.id, TokenType::Refresh).await, 0);
        assert_eq!(h.store.live_count(user.id, TokenType::VerifyEmail).await, 1);
    }

    #[tokio::test]
    async fn test_forgot_and_reset_password() {
        let h = harness();
        let (_, old_tokens) = h
            .service
            .register(register_req("a@x.com", "password1"))
            .await
            .unwrap();

        h.service.forgot_password("a@x.com").await.unwrap();
        let token = h.notifier.last_token().await.unwrap();

        h.service.reset_password(&token, "password2").await.unwrap();

        assert!(matches!(
            h.service.login(login_req("a@x.com", "password1")).await,
            Err(AuthError::InvalidCredentials)
        ));
        assert!(h.service.login(login_req("a@x.com", "password2")).await.is_ok());

        // single use
        assert!(matches!(
            h.service.reset_password(&token, "password3").await,
            Err(AuthError::Unauthorized)
        ));
        // sessions from before the reset are gone
        assert!(matches!(
            h.service.refresh_auth(&old_tokens.refresh.token).await,
            Err(AuthError::Unauthorized)
        ));
    }

    #[tokio::test]
    async fn test_forgot_password_unknown_email_is_silent() {
        let h = harness();

        assert!(h.service.forgot_password("nobody@x.com").await.is_ok());
        assert!(h.notifier.sent.lock().await.is_empty());
        assert!(h.store.is_empty().await);
    }

    #[tokio::test]
    async fn test_forgot_password_notification_failure_is_hard() {
        let store = Arc::new(MemoryTokenStore::new());
        let users = Arc::new(MemoryUserDirectory::new());
        let service = AuthService::new(
            AuthConfig::for_tests(),
            store,
            users,
            Arc::new(FailingNotifier),
            None,
        )
        .unwrap();
        service
            .register(register_req("a@x.com", "password1"))
            .await
            .unwrap();

        assert!(matches!(
            service.forgot_password("a@x.com").await,
            Err(AuthError::Notification(_))
        ));
    }

    #[tokio::test]
    async fn test_reset_token_rejected_for_other_purposes() {
        let h = harness();
        h.service
            .register(register_req("a@x.com", "password1"))
            .await
            .unwrap();
        h.service.forgot_password("a@x.com").await.unwrap();
        let reset = h.notifier.last_token().await.unwrap();

        assert!(matches!(
            h.service.refresh_auth(&reset).await,
            Err(AuthError::Unauthorized)
        ));
        assert!(matches!(
            h.service.verify_email(&reset).await,
            Err(AuthError::Unauthorized)
        ));
        // still usable for its own purpose
        assert!(h.service.reset_password(&reset, "password2").await.is_ok());
    }

    #[tokio::test]
    async fn test_superseded_reset_token_rejected() {
        let h = harness();
        h.service
            .register(register_req("a@x.com", "password1"))
            .await
            .unwrap();

        h.service.forgot_password("a@x.com").await.unwrap();
        let first = h.notifier.last_token().await.unwrap();
        h.service.forgot_password("a@x.com").await.unwrap();
        let second = h.notifier.last_token().await.unwrap();

        assert!(matches!(
            h.service.reset_password(&first, "password2").await,
            Err(AuthError::Unauthorized)
        ));
        assert!(h.service.reset_password(&second, "password2").await.is_ok());
    }

    #[tokio::test]
    async fn test_send_and_verify_email() {
        let h = harness();
        let (user, _) = h
            .service
            .register(register_req("a@x.com", "password1"))
            .await
            .unwrap();

        h.service.send_verification_email(&user).await.unwrap();
        let sent = h.notifier.sent.lock().await.clone();
        let token = match sent.last() {
            Some(Sent::Verify { email, token }) => {
                assert_eq!(email, "a@x.com");
                token.clone()
            }
            other => panic!("expected verification email, got {other:?}"),
        };

        h.service.verify_email(&token).await.unwrap();
        assert!(h.users.find_by_id(user.id).await.unwrap().verified_email);

        assert!(matches!(
            h.service.verify_email(&token).await,
            Err(AuthError::Unauthorized)
        ));
    }

    #[tokio::test]
    async fn test_tampered_token_unauthorized() {
        let h = harness();
        let (_, tokens) = h
            .service
            .register(register_req("a@x.com", "password1"))
            .await
            .unwrap();
        let mut tampered = tokens.refresh.token.clone();
        tampered.push('x');

        assert!(matches!(
            h.service.refresh_auth(&tampered).await,
            Err(AuthError::Unauthorized)
        ));
    }

    #[tokio::test]
    async fn test_concurrent_refresh_has_one_winner() {
        let h = harness();
        let (_, tokens) = h
            .service
            .register(register_req("a@x.com", "password1"))
            .await
            .unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let service = h.service.clone();
                let token = tokens.refresh.token.clone();
                tokio::spawn(async move { service.refresh_auth(&token).await.is_ok() })
            })
            .collect();

        let mut wins = 0;
        for handle in handles {
            if handle.await.unwrap() {
                wins += 1;
            }
        }
        assert_eq!(wins, 1);
    }

    #[tokio::test]
    async fn test_google_round_trip() {
        let h = harness();
        let redirect = h.service.google_login().unwrap();
        assert!(redirect.url.contains(&redirect.state));

        let (user, tokens) = h
            .service
            .google_callback(Some(&redirect.state), &redirect.state, GOOD_CODE)
            .await
            .unwrap();

        assert_eq!(user.email, "g@x.com");
        assert!(user.verified_email);
        assert!(user.password_hash.is_none());
        assert!(h.service.refresh_auth(&tokens.refresh.token).await.is_ok());

        // same remote identity maps to the same local user
        let (again, _) = h
            .service
            .google_callback(Some("s"), "s", GOOD_CODE)
            .await
            .unwrap();
        assert_eq!(again.id, user.id);
    }

    #[tokio::test]
    async fn test_google_state_mismatch() {
        let h = harness();
        let redirect = h.service.google_login().unwrap();

        for (stored, echoed) in [
            (Some(redirect.state.as_str()), "forged"),
            (None, redirect.state.as_str()),
            (Some(""), ""),
        ] {
            assert!(matches!(
                h.service.google_callback(stored, echoed, GOOD_CODE).await,
                Err(AuthError::Unauthorized)
            ));
        }
        assert!(h.store.is_empty().await);
    }

    #[tokio::test]
    async fn test_google_bad_code() {
        let h = harness();
        assert!(matches!(
            h.service.google_callback(Some("s"), "s", "bad-code").await,
            Err(AuthError::Unauthorized)
        ));
    }

    #[tokio::test]
    async fn test_google_disabled() {
        let service = AuthService::new(
            AuthConfig::for_tests(),
            Arc::new(MemoryTokenStore::new()),
            Arc::new(MemoryUserDirectory::new()),
            Arc::new(RecordingNotifier::default()),
            None,
        )
        .unwrap();

        assert!(matches!(
            service.google_login(),
            Err(AuthError::ProviderDisabled)
        ));
    }

    #[tokio::test]
    async fn test_register_fails_when_store_fails() {
        let service = AuthService::new(
            AuthConfig::for_tests(),
            Arc::new(BrokenStore),
            Arc::new(MemoryUserDirectory::new()),
            Arc::new(RecordingNotifier::default()),
            None,
        )
        .unwrap();

        assert!(matches!(
            service.register(register_req("a@x.com", "password1")).await,
            Err(AuthError::Persistence(_))
        ));
    }

    #[tokio::test]
    async fn test_failed_register_leaves_email_free() {
        let users = Arc::new(MemoryUserDirectory::new());
        let service = AuthService::new(
            AuthConfig::for_tests(),
            Arc::new(BrokenStore),
            users.clone(),
            Arc::new(RecordingNotifier::default()),
            None,
        )
        .unwrap();

        assert!(service
            .register(register_req("a@x.com", "password1"))
            .await
            .is_err());
        assert!(matches!(
            users.find_by_email("a@x.com").await,
            Err(AuthError::UserNotFound)
        ));
        // a retry reports the store failure again, not EmailExists
        assert!(matches!(
            service.register(register_req("a@x.com", "password1")).await,
            Err(AuthError::Persistence(_))
        ));
    }

    #[tokio::test]
    async fn test_logout_with_superseded_token_keeps_live_session() {
        let h = harness();
        let (_, first) = h
            .service
            .register(register_req("a@x.com", "password1"))
            .await
            .unwrap();
        let (_, second) = h
            .service
            .login(login_req("a@x.com", "password1"))
            .await
            .unwrap();

        assert!(matches!(
            h.service.logout(&first.refresh.token).await,
            Err(AuthError::Unauthorized)
        ));
        assert!(h.service.refresh_auth(&second.refresh.token).await.is_ok());
    }

    #[tokio::test]
    async fn test_purge_expired_tokens() {
        let h = harness();
        let (user, _) = h
            .service
            .register(register_req("a@x.com", "password1"))
            .await
            .unwrap();
        h.store
            .save(
                "stale",
                user.id,
                TokenType::VerifyEmail,
                Utc::now() - chrono::Duration::minutes(1),
            )
            .await
            .unwrap();

        assert_eq!(h.service.purge_expired_tokens().await.unwrap(), 1);
        assert_eq!(h.service.purge_expired_tokens().await.unwrap(), 0);
        assert_eq!(h.store.live_count(user.id, TokenType::Refresh).await, 1);
    }

    #[tokio::test]
    async fn test_google_unverified_email_cannot_take_over_account() {
        struct UnverifiedProvider;

        #[async_trait]
        impl IdentityProvider for UnverifiedProvider {
            fn authorization_url(&self, state: &str) -> Result<String, AuthError> {
                Ok(format!("https://provider.example/auth?state={state}"))
            }

            async fn exchange_code(&self, _: &str) -> Result<RemoteIdentity, AuthError> {
                Ok(RemoteIdentity {
                    id: "remote-2".into(),
                    email: "a@x.com".into(),
                    verified_email: false,
                    name: "Mallory".into(),
                })
            }
        }

        let store = Arc::new(MemoryTokenStore::new());
        let service = AuthService::new(
            AuthConfig::for_tests(),
            store.clone(),
            Arc::new(MemoryUserDirectory::new()),
            Arc::new(RecordingNotifier::default()),
            Some(Arc::new(UnverifiedProvider)),
        )
        .unwrap();
        let (user, _) = service
            .register(register_req("a@x.com", "password1"))
            .await
            .unwrap();

        assert!(matches!(
            service.google_callback(Some("s"), "s", "any").await,
            Err(AuthError::Unauthorized)
        ));
        assert_eq!(store.live_count(user.id, TokenType::Refresh).await, 1);
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let config = AuthConfig {
            jwt_secret: "short".into(),
            ..AuthConfig::for_tests()
        };

        assert!(AuthService::new(
            config,
            Arc::new(MemoryTokenStore::new()),
            Arc::new(MemoryUserDirectory::new()),
            Arc::new(RecordingNotifier::default()),
            None,
        )
        .is_err());
    }
}
