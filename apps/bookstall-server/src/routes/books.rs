//! Catalog API endpoints
//!
//! Reads are public. Create, update and delete require an admin session.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::auth::AdminUser;
use crate::db::{Book, BookInput, BookRepository};
use crate::error::{AppError, Result};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub category: Option<String>,
}

#[derive(Serialize)]
pub struct BookListResponse {
    pub data: Vec<Book>,
    pub total: usize,
}

#[derive(Serialize)]
pub struct BookResponse {
    pub data: Book,
}

/// Create the catalog router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_books).post(create_book))
        .route("/:id", get(get_book).put(update_book).delete(delete_book))
}

async fn list_books(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<BookListResponse>> {
    let category = query
        .category
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty());
    let books = BookRepository::new(state.db()).list(category).await?;
    Ok(Json(BookListResponse {
        total: books.len(),
        data: books,
    }))
}

async fn get_book(State(state): State<AppState>, Path(id): Path<i64>) -> Result<Json<BookResponse>> {
    let book = BookRepository::new(state.db())
        .get(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Book not found: {}", id)))?;
    Ok(Json(BookResponse { data: book }))
}

async fn create_book(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Json(input): Json<BookInput>,
) -> Result<(StatusCode, Json<BookResponse>)> {
    input.validate()?;
    let book = BookRepository::new(state.db()).create(&input).await?;
    tracing::info!(admin = %admin.email, "Created book {} '{}'", book.id, book.title);
    Ok((StatusCode::CREATED, Json(BookResponse { data: book })))
}

async fn update_book(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(id): Path<i64>,
    Json(input): Json<BookInput>,
) -> Result<Json<BookResponse>> {
    input.validate()?;
    let book = BookRepository::new(state.db())
        .update(id, &input)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Book not found: {}", id)))?;
    tracing::info!(admin = %admin.email, "Updated book {}", id);
    Ok(Json(BookResponse { data: book }))
}

async fn delete_book(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(id): Path<i64>,
) -> Result<StatusCode> {
    if BookRepository::new(state.db()).delete(id).await? {
        tracing::info!(admin = %admin.email, "Deleted book {}", id);
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound(format!("Book not found: {}", id)))
    }
}
