//! Catalog database operations

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::error::{AppError, Result};

/// Catalog book
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Book {
    pub id: i64,
    pub title: String,
    pub subtitle: Option<String>,
    /// Minor currency units
    pub price: i64,
    pub currency: String,
    pub cover_url: String,
    pub category: String,
    pub pdf_url: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Create/replace request for a book
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookInput {
    pub title: String,
    #[serde(default)]
    pub subtitle: Option<String>,
    pub price: i64,
    #[serde(default)]
    pub currency: Option<String>,
    pub cover_url: String,
    pub category: String,
    #[serde(default)]
    pub pdf_url: Option<String>,
}

impl BookInput {
    pub fn validate(&self) -> Result<()> {
        if self.title.trim().is_empty() {
            return Err(AppError::BadRequest("title is required".to_string()));
        }
        if self.cover_url.trim().is_empty() {
            return Err(AppError::BadRequest("coverUrl is required".to_string()));
        }
        if self.category.trim().is_empty() {
            return Err(AppError::BadRequest("category is required".to_string()));
        }
        if self.price < 0 {
            return Err(AppError::BadRequest("price must not be negative".to_string()));
        }
        if let Some(url) = self.pdf_url() {
            if !is_http_url(url) {
                return Err(AppError::BadRequest("pdfUrl must be an http(s) URL".to_string()));
            }
        }
        Ok(())
    }

    fn currency(&self) -> &str {
        match self.currency.as_deref().map(str::trim) {
            Some(currency) if !currency.is_empty() => currency,
            _ => "$",
        }
    }

    fn pdf_url(&self) -> Option<&str> {
        self.pdf_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
    }
}

/// Whether `url` parses as an absolute http or https URL
pub fn is_http_url(url: &str) -> bool {
    reqwest::Url::parse(url)
        .map(|url| matches!(url.scheme(), "http" | "https") && url.has_host())
        .unwrap_or(false)
}

/// Book repository
pub struct BookRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> BookRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// List books, optionally restricted to one category
    pub async fn list(&self, category: Option<&str>) -> Result<Vec<Book>> {
        let books = sqlx::query_as::<_, Book>(
            r#"
            SELECT id, title, subtitle, price, currency, cover_url, category,
                   pdf_url, created_at, updated_at
            FROM books
            WHERE ? IS NULL OR category = ?
            ORDER BY id
            "#,
        )
        .bind(category)
        .bind(category)
        .fetch_all(self.pool)
        .await?;

        Ok(books)
    }

    pub async fn get(&self, id: i64) -> Result<Option<Book>> {
        let book = sqlx::query_as::<_, Book>(
            r#"
            SELECT id, title, subtitle, price, currency, cover_url, category,
                   pdf_url, created_at, updated_at
            FROM books
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        Ok(book)
    }

    pub async fn exists(&self, id: i64) -> Result<bool> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT id FROM books WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool)
            .await?;
        Ok(row.is_some())
    }

    pub async fn create(&self, input: &BookInput) -> Result<Book> {
        let now = Utc::now().to_rfc3339();

        let result = sqlx::query(
            r#"
            INSERT INTO books (title, subtitle, price, currency, cover_url, category, pdf_url, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(input.title.trim())
        .bind(&input.subtitle)
        .bind(input.price)
        .bind(input.currency())
        .bind(input.cover_url.trim())
        .bind(input.category.trim())
        .bind(input.pdf_url())
        .bind(&now)
        .bind(&now)
        .execute(self.pool)
        .await?;

        let id = result.last_insert_rowid();
        self.get(id)
            .await?
            .ok_or_else(|| AppError::Internal("Failed to fetch created book".to_string()))
    }

    /// Replace a book's fields. Returns `None` if it does not exist.
    pub async fn update(&self, id: i64, input: &BookInput) -> Result<Option<Book>> {
        let now = Utc::now().to_rfc3339();

        let result = sqlx::query(
            r#"
            UPDATE books
            SET title = ?, subtitle = ?, price = ?, currency = ?, cover_url = ?,
                category = ?, pdf_url = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(input.title.trim())
        .bind(&input.subtitle)
        .bind(input.price)
        .bind(input.currency())
        .bind(input.cover_url.trim())
        .bind(input.category.trim())
        .bind(input.pdf_url())
        .bind(&now)
        .bind(id)
        .execute(self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.get(id).await
    }

    /// Delete a book together with all reading progress for it
    pub async fn delete(&self, id: i64) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM reading_progress WHERE book_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM books WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }
}
