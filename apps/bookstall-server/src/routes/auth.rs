//! Sign-in and session endpoints

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{AppendHeaders, IntoResponse},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;

use crate::auth::{clear_session_cookie, session_cookie, CurrentUser, SessionUser, VerifyError};
use crate::db::UserRepository;
use crate::error::{AppError, Result};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct GoogleLogin {
    #[serde(default)]
    pub credential: Option<String>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/google", post(google_login))
        .route("/me", get(me))
        .route("/logout", post(logout))
}

/// Exchange a Google ID token for a session cookie
async fn google_login(
    State(state): State<AppState>,
    Json(login): Json<GoogleLogin>,
) -> Result<impl IntoResponse> {
    let credential = login
        .credential
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .ok_or_else(|| AppError::BadRequest("credential is required".to_string()))?;

    let identity = state.verifier().verify(credential).await.map_err(|e| match e {
        VerifyError::Invalid(msg) => AppError::Unauthorized(msg),
        VerifyError::Unavailable(msg) => AppError::BadGateway(msg),
    })?;

    let user = UserRepository::new(state.db()).upsert_login(&identity).await?;
    let user = SessionUser::from(user);
    let value = state.signer().sign(&user)?;
    tracing::info!(user = %user.id, "User signed in");

    Ok((
        AppendHeaders([(
            header::SET_COOKIE,
            session_cookie(&value, state.config().auth.cookie_secure),
        )]),
        Json(user),
    ))
}

async fn me(CurrentUser(user): CurrentUser) -> Json<SessionUser> {
    Json(user)
}

async fn logout(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::NO_CONTENT,
        AppendHeaders([(
            header::SET_COOKIE,
            clear_session_cookie(state.config().auth.cookie_secure),
        )]),
    )
}
