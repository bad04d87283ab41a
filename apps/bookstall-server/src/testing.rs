//! Shared helpers for unit and router tests

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use serde_json::Value;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use tower::ServiceExt;

use crate::auth::{IdentityVerifier, SessionUser, VerifiedIdentity, VerifyError, SESSION_COOKIE};
use crate::config::Config;
use crate::db::{initialize_schema, Book, BookInput, BookRepository, User, UserRepository};
use crate::state::AppState;

pub const ADMIN_EMAIL: &str = "admin@bookstall.test";

/// Single-connection in-memory database with the schema applied
pub async fn memory_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .expect("open in-memory database");
    initialize_schema(&pool).await.expect("schema");
    pool
}

/// Serve `app` on an ephemeral local port, returning its base URL
pub async fn spawn_http(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind test listener");
    let addr = listener.local_addr().expect("listener address");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("test server");
    });
    format!("http://{}", addr)
}

/// Verifier that accepts a fixed set of credentials
#[derive(Default)]
pub struct StaticVerifier {
    identities: HashMap<String, VerifiedIdentity>,
    unavailable: bool,
}

impl StaticVerifier {
    pub fn with(mut self, credential: &str, subject: &str, email: &str) -> Self {
        self.identities.insert(
            credential.to_string(),
            VerifiedIdentity {
                subject: subject.to_string(),
                email: email.to_string(),
                name: Some("Test Reader".to_string()),
                picture: None,
            },
        );
        self
    }

    pub fn unavailable() -> Self {
        Self {
            unavailable: true,
            ..Self::default()
        }
    }
}

#[async_trait]
impl IdentityVerifier for StaticVerifier {
    async fn verify(&self, credential: &str) -> Result<VerifiedIdentity, VerifyError> {
        if self.unavailable {
            return Err(VerifyError::Unavailable("identity provider down".to_string()));
        }
        self.identities
            .get(credential)
            .cloned()
            .ok_or_else(|| VerifyError::Invalid("unknown credential".to_string()))
    }
}

pub fn test_config() -> Config {
    let mut config = Config::default();
    config.auth.session_secret = "test-secret".to_string();
    config.auth.admin_emails = vec![ADMIN_EMAIL.to_string()];
    config
}

pub async fn test_state() -> AppState {
    test_state_with(StaticVerifier::default()).await
}

pub async fn test_state_with(verifier: StaticVerifier) -> AppState {
    AppState::with_verifier(
        test_config(),
        memory_pool().await,
        reqwest::Client::new(),
        Arc::new(verifier),
    )
}

pub async fn seed_user(state: &AppState, subject: &str, email: &str) -> User {
    UserRepository::new(state.db())
        .upsert_login(&VerifiedIdentity {
            subject: subject.to_string(),
            email: email.to_string(),
            name: None,
            picture: None,
        })
        .await
        .expect("seed user")
}

pub async fn seed_book(state: &AppState, title: &str, pdf_url: Option<&str>) -> Book {
    BookRepository::new(state.db())
        .create(&BookInput {
            title: title.to_string(),
            subtitle: None,
            price: 999,
            currency: None,
            cover_url: "https://img.example.com/cover.jpg".to_string(),
            category: "fiction".to_string(),
            pdf_url: pdf_url.map(str::to_string),
        })
        .await
        .expect("seed book")
}

/// `Cookie` header value carrying a valid session for `user`
pub fn session_cookie_for(state: &AppState, user: &User) -> String {
    let value = state
        .signer()
        .sign(&SessionUser::from(user.clone()))
        .expect("sign session");
    format!("{}={}", SESSION_COOKIE, value)
}

/// Buffered response used by router tests
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: axum::http::HeaderMap,
    pub body: Vec<u8>,
}

impl TestResponse {
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body).expect("JSON body")
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn header(&self, name: header::HeaderName) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// One request against the full router
pub async fn send(
    state: &AppState,
    method: Method,
    uri: &str,
    cookie: Option<&str>,
    body: Option<Value>,
) -> TestResponse {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string())),
        None => builder.body(Body::empty()),
    }
    .expect("request");

    let response = crate::build_router(state.clone())
        .oneshot(request)
        .await
        .expect("router is infallible");
    let status = response.status();
    let headers = response.headers().clone();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body")
        .to_vec();
    TestResponse {
        status,
        headers,
        body,
    }
}

pub async fn get(state: &AppState, uri: &str, cookie: Option<&str>) -> TestResponse {
    send(state, Method::GET, uri, cookie, None).await
}
