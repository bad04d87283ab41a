//! Bookstall Server Library
//!
//! Catalog, Google sign-in sessions, per-user reading progress, the
//! knowledge card tree and a streaming PDF proxy. The binary in main.rs
//! wires configuration, the database pool and [`build_router`].

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod routes;
pub mod state;

#[cfg(test)]
mod testing;

use axum::{http::header, routing::get, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use state::AppState;

/// Build the full application router
pub fn build_router(state: AppState) -> Router {
    // Range metadata must be readable by the browser-side loader
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
        .expose_headers([
            header::CONTENT_RANGE,
            header::ACCEPT_RANGES,
            header::CONTENT_LENGTH,
        ]);

    Router::new()
        .route("/health", get(routes::health::liveness))
        .route("/api/health", get(routes::health::health_check))
        .nest("/api/books", routes::books::router())
        .nest("/api/auth", routes::auth::router())
        .nest("/api/progress", routes::progress::router())
        .nest("/api/cards", routes::cards::router())
        .nest("/api/proxy-pdf", routes::proxy::router())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
