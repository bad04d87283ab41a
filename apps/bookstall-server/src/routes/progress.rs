//! Reading progress API routes
//!
//! Every request is scoped to the session user. A `userId` in the query or
//! body is accepted for compatibility but must name that same user.

use axum::{
    extract::{Query, State},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::auth::{CurrentUser, SessionUser};
use crate::db::{BookRepository, ProgressRepository};
use crate::error::{AppError, Result};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressQuery {
    pub book_id: Option<i64>,
    pub user_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressUpdate {
    #[serde(default)]
    pub user_id: Option<String>,
    pub book_id: i64,
    pub page: i64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageResponse {
    pub book_id: i64,
    pub page: i64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveResponse {
    pub success: bool,
    pub book_id: i64,
    pub page: i64,
    pub updated_at: String,
}

/// Create the progress router
pub fn router() -> Router<AppState> {
    Router::new().route("/", get(get_progress).post(save_progress))
}

fn ensure_same_user(user: &SessionUser, claimed: Option<&str>) -> Result<()> {
    match claimed {
        Some(claimed) if claimed != user.id => {
            tracing::warn!(user = %user.id, claimed, "Progress request for another user");
            Err(AppError::Forbidden("Cannot access another user's progress".to_string()))
        }
        _ => Ok(()),
    }
}

/// Progress for one book, or all of the user's progress without `bookId`
async fn get_progress(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(query): Query<ProgressQuery>,
) -> Result<Response> {
    ensure_same_user(&user, query.user_id.as_deref())?;
    let repo = ProgressRepository::new(state.db());

    let Some(book_id) = query.book_id else {
        let all = repo.list(&user.id).await?;
        return Ok(Json(all).into_response());
    };

    let progress = repo
        .get(&user.id, book_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("No progress for book: {}", book_id)))?;
    Ok(Json(PageResponse {
        book_id,
        page: progress.page,
    })
    .into_response())
}

async fn save_progress(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(update): Json<ProgressUpdate>,
) -> Result<Json<SaveResponse>> {
    ensure_same_user(&user, update.user_id.as_deref())?;
    if update.page < 1 {
        return Err(AppError::BadRequest("page must be at least 1".to_string()));
    }
    if !BookRepository::new(state.db()).exists(update.book_id).await? {
        return Err(AppError::NotFound(format!("Book not found: {}", update.book_id)));
    }

    let progress = ProgressRepository::new(state.db())
        .upsert(&user.id, update.book_id, update.page)
        .await?;
    tracing::debug!(user = %user.id, "Saved page {} of book {}", progress.page, progress.book_id);

    Ok(Json(SaveResponse {
        success: true,
        book_id: progress.book_id,
        page: progress.page,
        updated_at: progress.updated_at,
    }))
}
