//! Token Store
//!
//! Persistence for stateful tokens (refresh, reset-password, verify-email).
//! At most one live token exists per (user, type); every mutation that
//! touches a key is a single statement, a single transaction, or runs under
//! a single lock.

use crate::error::AuthError;
use crate::models::{Token, TokenRow, TokenType};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Storage for stateful tokens
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Replace any live token for (user, type) with this one
    async fn save(
        &self,
        token: &str,
        user_id: Uuid,
        token_type: TokenType,
        expires: DateTime<Utc>,
    ) -> Result<(), AuthError>;

    /// Remove the (user, type) token if present
    async fn delete_by_type_and_user(
        &self,
        token_type: TokenType,
        user_id: Uuid,
    ) -> Result<(), AuthError>;

    /// Remove every token owned by the user
    async fn delete_all_for_user(&self, user_id: Uuid) -> Result<(), AuthError>;

    /// Exact lookup; `AuthError::NotFound` when the token is not live
    async fn find_by_value_and_user(&self, token: &str, user_id: Uuid)
        -> Result<Token, AuthError>;

    /// Atomically remove a presented single-use token.
    ///
    /// Returns `AuthError::NotFound` if it was not live, so at most one
    /// concurrent caller can consume a given token.
    async fn consume(
        &self,
        token: &str,
        user_id: Uuid,
        token_type: TokenType,
    ) -> Result<(), AuthError>;

    /// Atomically swap a presented token for a new one of the same type.
    ///
    /// Either the old token is gone and the new one live, or nothing changed
    /// and `AuthError::NotFound` is returned.
    async fn rotate(
        &self,
        old_token: &str,
        user_id: Uuid,
        token_type: TokenType,
        new_token: &str,
        expires: DateTime<Utc>,
    ) -> Result<(), AuthError>;

    /// Delete rows whose expiry is before `now`, returning how many went
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, AuthError>;
}

fn persistence_error(
    operation: &'static str,
    token_type: Option<TokenType>,
    user_id: Uuid,
) -> impl FnOnce(sqlx::Error) -> AuthError {
    move |err| {
        tracing::error!(
            operation,
            token_type = token_type.map(|t| t.as_str()).unwrap_or("*"),
            user_id = %user_id,
            error = %err,
            "Token store operation failed"
        );
        AuthError::Persistence(err.to_string())
    }
}

// ============================================
// PostgreSQL
// ============================================

/// `tokens` table in PostgreSQL
#[derive(Clone)]
pub struct PgTokenStore {
    db: PgPool,
}

impl PgTokenStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Create the `tokens` table if missing
    pub async fn migrate(&self) -> Result<(), AuthError> {
        tracing::info!("Running token store migrations");

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS tokens (
                id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
                token TEXT NOT NULL UNIQUE,
                user_id UUID NOT NULL,
                type VARCHAR(32) NOT NULL,
                expires TIMESTAMPTZ NOT NULL,
                created_at TIMESTAMPTZ DEFAULT NOW(),
                CONSTRAINT tokens_user_type_key UNIQUE (user_id, type)
            );
            "#,
        )
        .execute(&self.db)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_tokens_expires ON tokens(expires);")
            .execute(&self.db)
            .await?;

        Ok(())
    }
}

const UPSERT_TOKEN: &str = r#"
    INSERT INTO tokens (token, user_id, type, expires)
    VALUES ($1, $2, $3, $4)
    ON CONFLICT (user_id, type)
    DO UPDATE SET token = EXCLUDED.token, expires = EXCLUDED.expires, created_at = NOW()
"#;

#[async_trait]
impl TokenStore for PgTokenStore {
    async fn save(
        &self,
        token: &str,
        user_id: Uuid,
        token_type: TokenType,
        expires: DateTime<Utc>,
    ) -> Result<(), AuthError> {
        // The unique (user_id, type) constraint turns replace-on-issue into one statement
        sqlx::query(UPSERT_TOKEN)
            .bind(token)
            .bind(user_id)
            .bind(token_type.as_str())
            .bind(expires)
            .execute(&self.db)
            .await
            .map_err(persistence_error("save", Some(token_type), user_id))?;

        Ok(())
    }

    async fn delete_by_type_and_user(
        &self,
        token_type: TokenType,
        user_id: Uuid,
    ) -> Result<(), AuthError> {
        sqlx::query("DELETE FROM tokens WHERE type = $1 AND user_id = $2")
            .bind(token_type.as_str())
            .bind(user_id)
            .execute(&self.db)
            .await
            .map_err(persistence_error("delete", Some(token_type), user_id))?;

        Ok(())
    }

    async fn delete_all_for_user(&self, user_id: Uuid) -> Result<(), AuthError> {
        sqlx::query("DELETE FROM tokens WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.db)
            .await
            .map_err(persistence_error("delete_all", None, user_id))?;

        Ok(())
    }

    async fn find_by_value_and_user(
        &self,
        token: &str,
        user_id: Uuid,
    ) -> Result<Token, AuthError> {
        let row: Option<TokenRow> = sqlx::query_as(
            "SELECT token, user_id, type, expires FROM tokens WHERE token = $1 AND user_id = $2",
        )
        .bind(token)
        .bind(user_id)
        .fetch_optional(&self.db)
        .await
        .map_err(persistence_error("find", None, user_id))?;

        let row = row.ok_or(AuthError::NotFound)?;
        Token::try_from(row).map_err(|e| {
            tracing::error!(user_id = %user_id, "Corrupt token row: {}", e);
            AuthError::Persistence(e)
        })
    }

    async fn consume(
        &self,
        token: &str,
        user_id: Uuid,
        token_type: TokenType,
    ) -> Result<(), AuthError> {
        let result =
            sqlx::query("DELETE FROM tokens WHERE token = $1 AND user_id = $2 AND type = $3")
                .bind(token)
                .bind(user_id)
                .bind(token_type.as_str())
                .execute(&self.db)
                .await
                .map_err(persistence_error("consume", Some(token_type), user_id))?;

        if result.rows_affected() == 0 {
            return Err(AuthError::NotFound);
        }

        Ok(())
    }

    async fn rotate(
        &self,
        old_token: &str,
        user_id: Uuid,
        token_type: TokenType,
        new_token: &str,
        expires: DateTime<Utc>,
    ) -> Result<(), AuthError> {
        let on_err = || persistence_error("rotate", Some(token_type), user_id);

        // Dropping the transaction without commit rolls it back, so a
        // cancelled rotation leaves the old token in place.
        let mut tx = self.db.begin().await.map_err(on_err())?;

        let removed =
            sqlx::query("DELETE FROM tokens WHERE token = $1 AND user_id = $2 AND type = $3")
                .bind(old_token)
                .bind(user_id)
                .bind(token_type.as_str())
                .execute(&mut *tx)
                .await
                .map_err(on_err())?;

        if removed.rows_affected() == 0 {
            tx.rollback().await.map_err(on_err())?;
            return Err(AuthError::NotFound);
        }

        sqlx::query(UPSERT_TOKEN)
            .bind(new_token)
            .bind(user_id)
            .bind(token_type.as_str())
            .bind(expires)
            .execute(&mut *tx)
            .await
            .map_err(on_err())?;

        tx.commit().await.map_err(on_err())?;

        Ok(())
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, AuthError> {
        let result = sqlx::query("DELETE FROM tokens WHERE expires < $1")
            .bind(now)
            .execute(&self.db)
            .await
            .map_err(persistence_error("purge_expired", None, Uuid::nil()))?;

        Ok(result.rows_affected())
    }
}

// ============================================
// In-memory
// ============================================

/// Process-local store keyed by (user, type).
///
/// Every operation takes the one map lock, which serializes all mutations.
#[derive(Default)]
pub struct MemoryTokenStore {
    tokens: RwLock<HashMap<(Uuid, TokenType), Token>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live tokens for (user, type): zero or one
    pub async fn live_count(&self, user_id: Uuid, token_type: TokenType) -> usize {
        let tokens = self.tokens.read().await;
        tokens
            .values()
            .filter(|t| t.user_id == user_id && t.token_type == token_type)
            .count()
    }

    pub async fn len(&self) -> usize {
        self.tokens.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.tokens.read().await.is_empty()
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn save(
        &self,
        token: &str,
        user_id: Uuid,
        token_type: TokenType,
        expires: DateTime<Utc>,
    ) -> Result<(), AuthError> {
        let mut tokens = self.tokens.write().await;
        tokens.insert(
            (user_id, token_type),
            Token {
                token: token.to_string(),
                user_id,
                token_type,
                expires,
            },
        );
        Ok(())
    }

    async fn delete_by_type_and_user(
        &self,
        token_type: TokenType,
        user_id: Uuid,
    ) -> Result<(), AuthError> {
        self.tokens.write().await.remove(&(user_id, token_type));
        Ok(())
    }

    async fn delete_all_for_user(&self, user_id: Uuid) -> Result<(), AuthError> {
        self.tokens
            .write()
            .await
            .retain(|(owner, _), _| *owner != user_id);
        Ok(())
    }

    async fn find_by_value_and_user(
        &self,
        token: &str,
        user_id: Uuid,
    ) -> Result<Token, AuthError> {
        let tokens = self.tokens.read().await;
        tokens
            .values()
            .find(|t| t.user_id == user_id && t.token == token)
            .cloned()
            .ok_or(AuthError::NotFound)
    }

    async fn consume(
        &self,
        token: &str,
        user_id: Uuid,
        token_type: TokenType,
    ) -> Result<(), AuthError> {
        let mut tokens = self.tokens.write().await;
        let key = (user_id, token_type);

        if !matches!(tokens.get(&key), Some(live) if live.token == token) {
            return Err(AuthError::NotFound);
        }

        tokens.remove(&key);
        Ok(())
    }

    async fn rotate(
        &self,
        old_token: &str,
        user_id: Uuid,
        token_type: TokenType,
        new_token: &str,
        expires: DateTime<Utc>,
    ) -> Result<(), AuthError> {
        let mut tokens = self.tokens.write().await;
        let key = (user_id, token_type);

        if !matches!(tokens.get(&key), Some(live) if live.token == old_token) {
            return Err(AuthError::NotFound);
        }

        tokens.insert(
            key,
            Token {
                token: new_token.to_string(),
                user_id,
                token_type,
                expires,
            },
        );
        Ok(())
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, AuthError> {
        let mut tokens = self.tokens.write().await;
        let before = tokens.len();
        tokens.retain(|_, t| t.expires >= now);
        Ok((before - tokens.len()) as u64)
    }
}
