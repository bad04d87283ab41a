//! Authentication: identity verification, signed sessions and request
//! extractors.
//!
//! - [`MaybeUser`]: session user if the cookie verifies, never rejects
//! - [`CurrentUser`]: requires a session (401)
//! - [`AdminUser`]: requires a session whose email is an admin (401/403)

mod google;
mod session;

pub use google::*;
pub use session::*;

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};

use crate::error::AppError;
use crate::state::AppState;

/// Session user, if any
pub struct MaybeUser(pub Option<SessionUser>);

/// Authenticated session user
pub struct CurrentUser(pub SessionUser);

/// Authenticated catalog administrator
pub struct AdminUser(pub SessionUser);

#[async_trait]
impl FromRequestParts<AppState> for MaybeUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let user = cookie_value(&parts.headers, SESSION_COOKIE)
            .and_then(|value| state.signer().verify(value));
        Ok(MaybeUser(user))
    }
}

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let MaybeUser(user) = MaybeUser::from_request_parts(parts, state).await?;
        user.map(CurrentUser)
            .ok_or_else(|| AppError::Unauthorized("Login required".to_string()))
    }
}

#[async_trait]
impl FromRequestParts<AppState> for AdminUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let CurrentUser(user) = CurrentUser::from_request_parts(parts, state).await?;
        if !state.config().auth.is_admin(&user.email) {
            tracing::warn!(user = %user.id, "Non-admin attempted a catalog change");
            return Err(AppError::Forbidden("Admin access required".to_string()));
        }
        Ok(AdminUser(user))
    }
}
