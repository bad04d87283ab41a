//! Test doubles shared by the reader's unit tests

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use parking_lot::Mutex;
use serde_json::{json, Value};

use crate::engine::{EngineDocument, EngineError, PageGeometry, PdfEngine, Raster};
use crate::loader::DocumentHandle;
use crate::progress::Session;
use crate::render::CancellationToken;

/// Bytes of a synthetic document understood by [`SyntheticEngine`]
pub fn synthetic_pdf(pages: u32, width: f32, height: f32) -> Vec<u8> {
    format!("%PDF-1.7 synthetic pages={} width={} height={}\n", pages, width, height).into_bytes()
}

#[derive(Default)]
struct EngineState {
    delays: Mutex<HashMap<u32, Duration>>,
    failing: Mutex<HashSet<u32>>,
    paints: Mutex<HashMap<u32, usize>>,
}

/// Engine producing solid-colour pages with controllable latency and failures
#[derive(Clone, Default)]
pub struct SyntheticEngine {
    state: Arc<EngineState>,
}

impl SyntheticEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_delay(&self, page: u32, delay: Duration) {
        self.state.delays.lock().insert(page, delay);
    }

    pub fn fail_page(&self, page: u32) {
        self.state.failing.lock().insert(page);
    }

    /// Number of paints that ran to completion for `page`
    pub fn completed_paints(&self, page: u32) -> usize {
        self.state.paints.lock().get(&page).copied().unwrap_or(0)
    }
}

#[async_trait]
impl PdfEngine for SyntheticEngine {
    async fn open(&self, data: Vec<u8>) -> Result<Arc<dyn EngineDocument>, EngineError> {
        let text = String::from_utf8(data).map_err(|e| EngineError::InvalidDocument(e.to_string()))?;
        let field = |name: &str| -> Result<f32, EngineError> {
            text.split_whitespace()
                .find_map(|part| part.strip_prefix(name).and_then(|v| v.strip_prefix('=')))
                .and_then(|v| v.parse().ok())
                .ok_or_else(|| EngineError::InvalidDocument(format!("missing {}", name)))
        };

        Ok(Arc::new(SyntheticDocument {
            pages: field("pages")? as u32,
            width: field("width")?,
            height: field("height")?,
            state: self.state.clone(),
        }))
    }
}

struct SyntheticDocument {
    pages: u32,
    width: f32,
    height: f32,
    state: Arc<EngineState>,
}

#[async_trait]
impl EngineDocument for SyntheticDocument {
    fn page_count(&self) -> u32 {
        self.pages
    }

    async fn page_geometry(&self, page: u32) -> Result<PageGeometry, EngineError> {
        if page == 0 || page > self.pages {
            return Err(EngineError::PageNotFound(page));
        }
        Ok(PageGeometry {
            number: page,
            width: self.width,
            height: self.height,
        })
    }

    async fn render(
        &self,
        page: u32,
        scale: f32,
        cancel: &CancellationToken,
    ) -> Result<Raster, EngineError> {
        let delay = self.state.delays.lock().get(&page).copied();
        if let Some(delay) = delay {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = cancel.cancelled() => return Err(EngineError::Cancelled),
            }
        }
        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }
        if self.state.failing.lock().contains(&page) {
            return Err(EngineError::Render(format!("page {} is corrupt", page)));
        }

        let width = (self.width * scale).round() as u32;
        let height = (self.height * scale).round() as u32;
        *self.state.paints.lock().entry(page).or_default() += 1;

        Ok(Raster {
            width,
            height,
            pixels: vec![page as u8; (width * height * 4) as usize],
        })
    }
}

/// Open a synthetic document directly, bypassing HTTP
pub async fn open_synthetic(engine: &SyntheticEngine, pages: u32, width: f32, height: f32) -> DocumentHandle {
    let document = engine
        .open(synthetic_pdf(pages, width, height))
        .await
        .expect("synthetic document opens");
    DocumentHandle::new("synthetic://document.pdf", document, 64)
}

/// Serve `app` on an ephemeral local port and return its base URL
pub async fn spawn_http(app: axum::Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind test listener");
    let addr = listener.local_addr().expect("listener address");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("test server");
    });
    format!("http://{}", addr)
}

/// Session whose cookie [`StubBackend`] accepts for `user_id`
pub fn session(user_id: &str) -> Session {
    Session::new(user_id, format!("signed-{}", user_id))
}

#[derive(Default)]
struct BackendState {
    document: Vec<u8>,
    progress: Mutex<HashMap<(String, i64), u32>>,
    saves: Mutex<usize>,
    range_requests: Mutex<usize>,
    reject_saves: Mutex<Option<StatusCode>>,
    save_delay: Mutex<Option<Duration>>,
}

/// In-process stand-in for the Bookstall backend: catalog, progress store
/// and a range-capable proxy that always serves the same document.
#[derive(Clone)]
pub struct StubBackend {
    state: Arc<BackendState>,
}

impl StubBackend {
    pub fn new(document: Vec<u8>) -> Self {
        Self {
            state: Arc::new(BackendState {
                document,
                ..BackendState::default()
            }),
        }
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/api/books/:id", get(stub_book))
            .route("/api/progress", get(stub_get_progress).post(stub_save_progress))
            .route("/api/proxy-pdf", get(stub_proxy))
            .with_state(self.clone())
    }

    /// Serve the stub and return its base URL
    pub async fn spawn(&self) -> String {
        spawn_http(self.router()).await
    }

    pub fn stored_page(&self, user_id: &str, book_id: i64) -> Option<u32> {
        self.state
            .progress
            .lock()
            .get(&(user_id.to_string(), book_id))
            .copied()
    }

    pub fn set_progress(&self, user_id: &str, book_id: i64, page: u32) {
        self.state
            .progress
            .lock()
            .insert((user_id.to_string(), book_id), page);
    }

    pub fn save_count(&self) -> usize {
        *self.state.saves.lock()
    }

    /// Proxy requests that carried a `Range` header
    pub fn range_requests(&self) -> usize {
        *self.state.range_requests.lock()
    }

    pub fn reject_saves(&self, status: StatusCode) {
        *self.state.reject_saves.lock() = Some(status);
    }

    pub fn delay_saves(&self, delay: Duration) {
        *self.state.save_delay.lock() = Some(delay);
    }
}

fn cookie_user(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::COOKIE)?
        .to_str()
        .ok()?
        .split(';')
        .map(str::trim)
        .find_map(|cookie| cookie.strip_prefix("user_session="))
        .and_then(|value| value.strip_prefix("signed-"))
        .map(str::to_string)
}

async fn stub_book(Path(id): Path<i64>) -> Response {
    if id <= 0 {
        return StatusCode::NOT_FOUND.into_response();
    }
    Json(json!({
        "data": {
            "id": id,
            "title": format!("Book {}", id),
            "price": 1500,
            "pdfUrl": "https://cdn.example.com/book.pdf"
        }
    }))
    .into_response()
}

async fn stub_get_progress(
    State(backend): State<StubBackend>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    let Some(user) = cookie_user(&headers) else {
        return StatusCode::UNAUTHORIZED.into_response();
    };
    if query.get("userId").is_some_and(|id| *id != user) {
        return StatusCode::FORBIDDEN.into_response();
    }
    let Some(book_id) = query.get("bookId").and_then(|id| id.parse::<i64>().ok()) else {
        return StatusCode::BAD_REQUEST.into_response();
    };
    match backend.stored_page(&user, book_id) {
        Some(page) => Json(json!({"bookId": book_id, "page": page})).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn stub_save_progress(
    State(backend): State<StubBackend>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let delay = *backend.state.save_delay.lock();
    if let Some(delay) = delay {
        tokio::time::sleep(delay).await;
    }
    let rejection = *backend.state.reject_saves.lock();
    if let Some(status) = rejection {
        return status.into_response();
    }
    let Some(user) = cookie_user(&headers) else {
        return StatusCode::UNAUTHORIZED.into_response();
    };
    if body["userId"].as_str() != Some(user.as_str()) {
        return StatusCode::FORBIDDEN.into_response();
    }
    let (Some(book_id), Some(page)) = (body["bookId"].as_i64(), body["page"].as_u64()) else {
        return StatusCode::BAD_REQUEST.into_response();
    };

    backend.set_progress(&user, book_id, page as u32);
    *backend.state.saves.lock() += 1;
    Json(json!({"success": true, "bookId": book_id, "page": page})).into_response()
}

async fn stub_proxy(State(backend): State<StubBackend>, headers: HeaderMap) -> Response {
    if headers.contains_key(header::RANGE) {
        *backend.state.range_requests.lock() += 1;
    }
    serve_range(&backend.state.document, &headers)
}

/// Answer like a static file server with single-range support
pub fn serve_range(document: &[u8], headers: &HeaderMap) -> Response {
    let Some(range) = headers.get(header::RANGE).and_then(|v| v.to_str().ok()) else {
        return ([(header::ACCEPT_RANGES, "bytes")], document.to_vec()).into_response();
    };

    let last = document.len().checked_sub(1);
    let bounds = range
        .strip_prefix("bytes=")
        .and_then(|r| r.split_once('-'))
        .and_then(|(start, end)| {
            let last = last?;
            let start: usize = start.parse().ok()?;
            let end: usize = if end.is_empty() { last } else { end.parse().ok()? };
            Some((start, end.min(last)))
        });

    match bounds {
        Some((start, end)) if start <= end => (
            StatusCode::PARTIAL_CONTENT,
            [
                (header::ACCEPT_RANGES, "bytes".to_string()),
                (
                    header::CONTENT_RANGE,
                    format!("bytes {}-{}/{}", start, end, document.len()),
                ),
            ],
            document[start..=end].to_vec(),
        )
            .into_response(),
        _ => (
            StatusCode::RANGE_NOT_SATISFIABLE,
            [(header::CONTENT_RANGE, format!("bytes */{}", document.len()))],
        )
            .into_response(),
    }
}
