//! Same-origin PDF proxy
//!
//! Lets the reader fetch documents hosted on servers that do not send CORS
//! headers. Range requests are forwarded so the reader can load
//! incrementally, and the upstream body is streamed through unbuffered.

use axum::{
    body::Body,
    extract::{Query, State},
    http::{header, HeaderMap, HeaderName, StatusCode},
    response::Response,
    routing::get,
    Router,
};
use serde::Deserialize;

use crate::error::{AppError, Result};
use crate::state::AppState;

/// Request headers passed to the upstream server
const FORWARDED_REQUEST_HEADERS: [HeaderName; 2] = [header::RANGE, header::IF_RANGE];

/// Upstream response headers copied to the client
const COPIED_RESPONSE_HEADERS: [HeaderName; 3] =
    [header::CONTENT_LENGTH, header::CONTENT_RANGE, header::ACCEPT_RANGES];

#[derive(Debug, Deserialize)]
pub struct ProxyQuery {
    pub url: Option<String>,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(proxy_pdf))
}

/// Parse and check the target, allowing only absolute http(s) URLs
fn parse_target(raw: Option<&str>) -> Result<reqwest::Url> {
    let raw = raw
        .map(str::trim)
        .filter(|url| !url.is_empty())
        .ok_or_else(|| AppError::BadRequest("url is required".to_string()))?;

    let url = reqwest::Url::parse(raw)
        .map_err(|_| AppError::BadRequest(format!("Invalid url: {}", raw)))?;
    if !matches!(url.scheme(), "http" | "https") || !url.has_host() {
        return Err(AppError::BadRequest("Only http and https urls can be proxied".to_string()));
    }
    Ok(url)
}

async fn proxy_pdf(
    State(state): State<AppState>,
    Query(query): Query<ProxyQuery>,
    headers: HeaderMap,
) -> Result<Response> {
    let target = parse_target(query.url.as_deref())?;

    let mut request = state.http().get(target.clone());
    for name in FORWARDED_REQUEST_HEADERS {
        if let Some(value) = headers.get(&name) {
            request = request.header(name, value.clone());
        }
    }

    let upstream = tokio::time::timeout(state.config().proxy.timeout, request.send())
        .await
        .map_err(|_| AppError::BadGateway(format!("Timed out fetching {}", target)))?
        .map_err(|e| AppError::BadGateway(format!("Failed to fetch {}: {}", target, e)))?;

    let status = upstream.status();
    if !matches!(
        status,
        StatusCode::OK | StatusCode::PARTIAL_CONTENT | StatusCode::RANGE_NOT_SATISFIABLE
    ) {
        return Err(AppError::Upstream {
            status,
            message: "Failed to fetch source PDF".to_string(),
        });
    }
    tracing::debug!("Proxying {} ({})", target, status);

    let content_type = upstream
        .headers()
        .get(header::CONTENT_TYPE)
        .cloned()
        .unwrap_or_else(|| header::HeaderValue::from_static("application/pdf"));

    let mut response = Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, content_type);
    for name in COPIED_RESPONSE_HEADERS {
        if let Some(value) = upstream.headers().get(&name) {
            response = response.header(name, value.clone());
        }
    }

    response
        .body(Body::from_stream(upstream.bytes_stream()))
        .map_err(|e| AppError::Internal(e.to_string()))
}
