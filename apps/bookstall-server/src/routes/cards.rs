//! Knowledge card tree endpoints

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::db::{Card, CardNode, CardRepository};
use crate::error::{AppError, Result};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardQuery {
    pub parent_id: Option<String>,
    #[serde(default)]
    pub export: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCard {
    pub name: String,
    #[serde(default)]
    pub is_leaf: bool,
    #[serde(default)]
    pub parent_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ImportRequest {
    pub tree: Vec<CardNode>,
}

#[derive(Debug, Deserialize)]
pub struct RenameCard {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct DeleteQuery {
    pub id: Option<String>,
}

#[derive(Serialize)]
pub struct TreeResponse {
    pub tree: Vec<CardNode>,
}

pub fn router() -> Router<AppState> {
    Router::new().route(
        "/",
        get(list_cards)
            .post(create_or_import)
            .patch(rename_card)
            .delete(delete_card),
    )
}

/// Roots, children of `parentId`, or the whole tree with `export=true`
async fn list_cards(State(state): State<AppState>, Query(query): Query<CardQuery>) -> Result<Response> {
    let repo = CardRepository::new(state.db());
    if query.export {
        let tree = repo.export_tree().await?;
        return Ok(Json(TreeResponse { tree }).into_response());
    }

    let cards: Vec<Card> = match query.parent_id.as_deref() {
        Some(parent_id) => repo.children(parent_id).await?,
        None => repo.roots().await?,
    };
    Ok(Json(cards).into_response())
}

/// `{type: "import", tree}` imports; anything else creates a single card
async fn create_or_import(State(state): State<AppState>, Json(body): Json<Value>) -> Result<Response> {
    let repo = CardRepository::new(state.db());

    if body.get("type").and_then(Value::as_str) == Some("import") {
        let request: ImportRequest = serde_json::from_value(body)
            .map_err(|e| AppError::BadRequest(format!("Invalid import: {}", e)))?;
        let imported = repo.import_tree(&request.tree).await?;
        return Ok(Json(json!({ "imported": imported })).into_response());
    }

    let card: NewCard = serde_json::from_value(body)
        .map_err(|e| AppError::BadRequest(format!("Invalid card: {}", e)))?;
    let created = repo
        .create(&card.name, card.parent_id.as_deref(), card.is_leaf)
        .await?;
    Ok((StatusCode::CREATED, Json(created)).into_response())
}

async fn rename_card(State(state): State<AppState>, Json(body): Json<RenameCard>) -> Result<Json<Card>> {
    let card = CardRepository::new(state.db())
        .rename(&body.id, &body.name)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Card not found: {}", body.id)))?;
    Ok(Json(card))
}

async fn delete_card(State(state): State<AppState>, Query(query): Query<DeleteQuery>) -> Result<StatusCode> {
    let id = query
        .id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| AppError::BadRequest("id is required".to_string()))?;

    let removed = CardRepository::new(state.db()).delete_tree(&id).await?;
    if removed == 0 {
        return Err(AppError::NotFound(format!("Card not found: {}", id)));
    }
    tracing::debug!("Deleted card {} with {} descendants", id, removed - 1);
    Ok(StatusCode::NO_CONTENT)
}
