//! Database schema initialization

use sqlx::SqlitePool;

use crate::error::Result;

/// Initialize the database schema
pub async fn initialize_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(SCHEMA_SQL).execute(pool).await?;

    Ok(())
}

const SCHEMA_SQL: &str = r#"
-- Catalog
CREATE TABLE IF NOT EXISTS books (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    title TEXT NOT NULL,
    subtitle TEXT,
    price INTEGER NOT NULL,
    currency TEXT NOT NULL DEFAULT '$',
    cover_url TEXT NOT NULL,
    category TEXT NOT NULL,
    pdf_url TEXT,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_books_category ON books(category);

-- Users (id is the identity provider's subject)
CREATE TABLE IF NOT EXISTS users (
    id TEXT PRIMARY KEY,
    email TEXT NOT NULL UNIQUE,
    name TEXT,
    picture TEXT,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    last_login_at TEXT
);

-- Reading progress, one row per user and book
CREATE TABLE IF NOT EXISTS reading_progress (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    book_id INTEGER NOT NULL,
    page INTEGER NOT NULL CHECK (page >= 1),
    updated_at TEXT NOT NULL,
    UNIQUE(user_id, book_id)
);

CREATE INDEX IF NOT EXISTS idx_progress_user ON reading_progress(user_id, updated_at);
CREATE INDEX IF NOT EXISTS idx_progress_book ON reading_progress(book_id);

-- Knowledge cards (self-referencing tree)
CREATE TABLE IF NOT EXISTS cards (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    parent_id TEXT,
    is_leaf INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_cards_parent ON cards(parent_id);
"#;
