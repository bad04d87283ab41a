//! Reading progress database operations

use chrono::Utc;
use serde::Serialize;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::error::{AppError, Result};

/// Reading progress record
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ReadingProgress {
    #[serde(skip)]
    pub id: String,
    pub user_id: String,
    pub book_id: i64,
    pub page: i64,
    pub updated_at: String,
}

/// Progress repository
pub struct ProgressRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> ProgressRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Get a user's progress for one book
    pub async fn get(&self, user_id: &str, book_id: i64) -> Result<Option<ReadingProgress>> {
        let progress = sqlx::query_as::<_, ReadingProgress>(
            r#"
            SELECT id, user_id, book_id, page, updated_at
            FROM reading_progress
            WHERE user_id = ? AND book_id = ?
            "#,
        )
        .bind(user_id)
        .bind(book_id)
        .fetch_optional(self.pool)
        .await?;

        Ok(progress)
    }

    /// All progress of a user, most recently updated first
    pub async fn list(&self, user_id: &str) -> Result<Vec<ReadingProgress>> {
        let progress = sqlx::query_as::<_, ReadingProgress>(
            r#"
            SELECT id, user_id, book_id, page, updated_at
            FROM reading_progress
            WHERE user_id = ?
            ORDER BY updated_at DESC, rowid DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(self.pool)
        .await?;

        Ok(progress)
    }

    /// Update or create the single progress row for `(user_id, book_id)`
    pub async fn upsert(&self, user_id: &str, book_id: i64, page: i64) -> Result<ReadingProgress> {
        let now = Utc::now().to_rfc3339();
        let id = Uuid::new_v4().to_string();

        sqlx::query(
            r#"
            INSERT INTO reading_progress (id, user_id, book_id, page, updated_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(user_id, book_id) DO UPDATE SET
                page = excluded.page,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&id)
        .bind(user_id)
        .bind(book_id)
        .bind(page)
        .bind(&now)
        .execute(self.pool)
        .await?;

        self.get(user_id, book_id)
            .await?
            .ok_or_else(|| AppError::Internal("Failed to fetch upserted progress".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::memory_pool;

    #[tokio::test]
    async fn test_upsert_keeps_one_row() {
        let pool = memory_pool().await;
        let repo = ProgressRepository::new(&pool);

        let first = repo.upsert("reader-1", 3, 4).await.unwrap();
        let second = repo.upsert("reader-1", 3, 9).await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(second.page, 9);
        assert_eq!(repo.list("reader-1").await.unwrap().len(), 1);
        assert!(repo.get("reader-2", 3).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_is_most_recent_first() {
        let pool = memory_pool().await;
        let repo = ProgressRepository::new(&pool);

        repo.upsert("reader-1", 1, 2).await.unwrap();
        repo.upsert("reader-1", 2, 2).await.unwrap();
        repo.upsert("reader-1", 1, 3).await.unwrap();

        let books: Vec<i64> = repo
            .list("reader-1")
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.book_id)
            .collect();
        assert_eq!(books, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_page_must_be_positive() {
        let pool = memory_pool().await;
        let repo = ProgressRepository::new(&pool);
        assert!(repo.upsert("reader-1", 1, 0).await.is_err());
    }
}
