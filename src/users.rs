//! User Directory
//!
//! The user-record collaborator the flows consume: lookup, creation,
//! credential updates and third-party identity provisioning.

use crate::error::AuthError;
use crate::models::{NewUser, RemoteIdentity, User};

use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_by_email(&self, email: &str) -> Result<User, AuthError>;

    async fn find_by_id(&self, id: Uuid) -> Result<User, AuthError>;

    /// Insert a user; `AuthError::EmailExists` if the email is taken
    async fn create(&self, user: NewUser) -> Result<User, AuthError>;

    async fn update_password(&self, id: Uuid, password_hash: &str) -> Result<(), AuthError>;

    async fn mark_verified(&self, id: Uuid) -> Result<(), AuthError>;

    /// Remove a user record; absence is not an error
    async fn delete(&self, id: Uuid) -> Result<(), AuthError>;

    /// Return the user owning the identity's email, creating it if needed.
    ///
    /// An existing account is only linked when the provider vouches for the
    /// email; otherwise `AuthError::Unauthorized`.
    async fn upsert_by_remote_identity(&self, identity: &RemoteIdentity)
        -> Result<User, AuthError>;
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

// ============================================
// PostgreSQL
// ============================================

#[derive(Clone)]
pub struct PgUserDirectory {
    db: PgPool,
}

impl PgUserDirectory {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Create the `users` table if missing
    pub async fn migrate(&self) -> Result<(), AuthError> {
        tracing::info!("Running user directory migrations");

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
                name VARCHAR(100) NOT NULL,
                email VARCHAR(255) NOT NULL UNIQUE,
                password_hash VARCHAR(255),
                role VARCHAR(32) NOT NULL DEFAULT 'user',
                verified_email BOOLEAN NOT NULL DEFAULT FALSE,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            );
            "#,
        )
        .execute(&self.db)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl UserDirectory for PgUserDirectory {
    async fn find_by_email(&self, email: &str) -> Result<User, AuthError> {
        sqlx::query_as("SELECT * FROM users WHERE email = $1")
            .bind(normalize_email(email))
            .fetch_optional(&self.db)
            .await?
            .ok_or(AuthError::UserNotFound)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<User, AuthError> {
        sqlx::query_as("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.db)
            .await?
            .ok_or(AuthError::UserNotFound)
    }

    async fn create(&self, user: NewUser) -> Result<User, AuthError> {
        let result = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (name, email, password_hash, verified_email)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(&user.name)
        .bind(normalize_email(&user.email))
        .bind(&user.password_hash)
        .bind(user.verified_email)
        .fetch_one(&self.db)
        .await;

        match result {
            Ok(user) => Ok(user),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Err(AuthError::EmailExists)
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn update_password(&self, id: Uuid, password_hash: &str) -> Result<(), AuthError> {
        let result = sqlx::query(
            "UPDATE users SET password_hash = $1, updated_at = NOW() WHERE id = $2",
        )
        .bind(password_hash)
        .bind(id)
        .execute(&self.db)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AuthError::UserNotFound);
        }
        Ok(())
    }

    async fn mark_verified(&self, id: Uuid) -> Result<(), AuthError> {
        let result = sqlx::query(
            "UPDATE users SET verified_email = TRUE, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .execute(&self.db)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AuthError::UserNotFound);
        }
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<(), AuthError> {
        sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await?;

        Ok(())
    }

    async fn upsert_by_remote_identity(
        &self,
        identity: &RemoteIdentity,
    ) -> Result<User, AuthError> {
        // The conditional DO UPDATE returns no row when an unverified
        // identity collides with an existing account
        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (name, email, verified_email)
            VALUES ($1, $2, $3)
            ON CONFLICT (email) DO UPDATE SET
                verified_email = TRUE,
                updated_at = NOW()
            WHERE EXCLUDED.verified_email
            RETURNING *
            "#,
        )
        .bind(&identity.name)
        .bind(normalize_email(&identity.email))
        .bind(identity.verified_email)
        .fetch_optional(&self.db)
        .await?;

        user.ok_or_else(|| {
            tracing::warn!(remote_id = %identity.id, "Unverified remote email matches an existing account");
            AuthError::Unauthorized
        })
    }
}

// ============================================
// In-memory
// ============================================

#[derive(Default)]
pub struct MemoryUserDirectory {
    users: RwLock<HashMap<Uuid, User>>,
}

impl MemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }
}

fn new_record(name: String, email: String, password_hash: Option<String>, verified: bool) -> User {
    let now = Utc::now();
    User {
        id: Uuid::new_v4(),
        name,
        email,
        password_hash,
        role: "user".to_string(),
        verified_email: verified,
        created_at: now,
        updated_at: now,
    }
}

#[async_trait]
impl UserDirectory for MemoryUserDirectory {
    async fn find_by_email(&self, email: &str) -> Result<User, AuthError> {
        let email = normalize_email(email);
        self.users
            .read()
            .await
            .values()
            .find(|u| u.email == email)
            .cloned()
            .ok_or(AuthError::UserNotFound)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<User, AuthError> {
        self.users
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(AuthError::UserNotFound)
    }

    async fn create(&self, user: NewUser) -> Result<User, AuthError> {
        let email = normalize_email(&user.email);
        let mut users = self.users.write().await;

        if users.values().any(|u| u.email == email) {
            return Err(AuthError::EmailExists);
        }

        let record = new_record(user.name, email, user.password_hash, user.verified_email);
        users.insert(record.id, record.clone());
        Ok(record)
    }

    async fn update_password(&self, id: Uuid, password_hash: &str) -> Result<(), AuthError> {
        let mut users = self.users.write().await;
        let user = users.get_mut(&id).ok_or(AuthError::UserNotFound)?;
        user.password_hash = Some(password_hash.to_string());
        user.updated_at = Utc::now();
        Ok(())
    }

    async fn mark_verified(&self, id: Uuid) -> Result<(), AuthError> {
        let mut users = self.users.write().await;
        let user = users.get_mut(&id).ok_or(AuthError::UserNotFound)?;
        user.verified_email = true;
        user.updated_at = Utc::now();
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<(), AuthError> {
        self.users.write().await.remove(&id);
        Ok(())
    }

    async fn upsert_by_remote_identity(
        &self,
        identity: &RemoteIdentity,
    ) -> Result<User, AuthError> {
        let email = normalize_email(&identity.email);
        let mut users = self.users.write().await;

        if let Some(existing) = users.values_mut().find(|u| u.email == email) {
            if !identity.verified_email {
                tracing::warn!(remote_id = %identity.id, "Unverified remote email matches an existing account");
                return Err(AuthError::Unauthorized);
            }
            if !existing.verified_email {
                existing.verified_email = true;
                existing.updated_at = Utc::now();
            }
            return Ok(existing.clone());
        }

        let record = new_record(identity.name.clone(), email, None, identity.verified_email);
        users.insert(record.id, record.clone());
        Ok(record)
    }
}
