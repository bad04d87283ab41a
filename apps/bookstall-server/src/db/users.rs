//! User database operations

use chrono::Utc;
use serde::Serialize;
use sqlx::SqlitePool;

use crate::auth::VerifiedIdentity;
use crate::error::{AppError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub email: String,
    pub name: Option<String>,
    pub picture: Option<String>,
    pub created_at: String,
    pub last_login_at: Option<String>,
}

/// User repository
pub struct UserRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> UserRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, id: &str) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, email, name, picture, created_at, last_login_at FROM users WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        Ok(user)
    }

    pub async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, email, name, picture, created_at, last_login_at FROM users WHERE email = ?",
        )
        .bind(email)
        .fetch_optional(self.pool)
        .await?;

        Ok(user)
    }

    /// Record a login. Users are matched by email; an existing user keeps
    /// its id and gets its profile fields refreshed.
    pub async fn upsert_login(&self, identity: &VerifiedIdentity) -> Result<User> {
        let now = Utc::now().to_rfc3339();
        let email = identity.email.trim().to_lowercase();

        sqlx::query(
            r#"
            INSERT INTO users (id, email, name, picture, created_at, last_login_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(email) DO UPDATE SET
                name = COALESCE(excluded.name, users.name),
                picture = COALESCE(excluded.picture, users.picture),
                last_login_at = excluded.last_login_at
            "#,
        )
        .bind(&identity.subject)
        .bind(&email)
        .bind(&identity.name)
        .bind(&identity.picture)
        .bind(&now)
        .bind(&now)
        .execute(self.pool)
        .await?;

        self.find_by_email(&email)
            .await?
            .ok_or_else(|| AppError::Internal("Failed to fetch upserted user".to_string()))
    }
}
