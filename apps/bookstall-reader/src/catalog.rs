//! Catalog lookups needed by the reader

use std::time::Duration;

use serde::Deserialize;

use crate::config::ReaderConfig;
use crate::error::ReaderError;

/// The subset of a catalog book the reader needs
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookRecord {
    pub id: i64,
    pub title: String,
    #[serde(default, alias = "pdf_url")]
    pub pdf_url: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum BookEnvelope {
    Wrapped { data: BookRecord },
    Bare(BookRecord),
}

impl From<BookEnvelope> for BookRecord {
    fn from(envelope: BookEnvelope) -> Self {
        match envelope {
            BookEnvelope::Wrapped { data } => data,
            BookEnvelope::Bare(book) => book,
        }
    }
}

#[derive(Clone)]
pub struct CatalogClient {
    http: reqwest::Client,
    backend: String,
    timeout: Duration,
}

impl CatalogClient {
    pub fn new(config: &ReaderConfig) -> Self {
        Self::with_client(reqwest::Client::new(), config)
    }

    pub fn with_client(http: reqwest::Client, config: &ReaderConfig) -> Self {
        Self {
            http,
            backend: config.backend().to_string(),
            timeout: config.load_timeout,
        }
    }

    /// Look up a book, giving up after the load timeout
    pub async fn fetch_book(&self, book_id: i64) -> Result<BookRecord, ReaderError> {
        match tokio::time::timeout(self.timeout, self.request_book(book_id)).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(book_id, "Catalog lookup timed out");
                Err(ReaderError::CatalogTimeout(self.timeout))
            }
        }
    }

    async fn request_book(&self, book_id: i64) -> Result<BookRecord, ReaderError> {
        let url = format!("{}/api/books/{}", self.backend, book_id);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| ReaderError::Catalog(format!("Failed to fetch book: {}", e)))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(ReaderError::BookNotFound(book_id));
        }
        if !status.is_success() {
            return Err(ReaderError::Catalog(format!("Catalog returned {}", status)));
        }

        let envelope: BookEnvelope = response
            .json()
            .await
            .map_err(|e| ReaderError::Catalog(format!("Failed to parse book: {}", e)))?;
        Ok(envelope.into())
    }

    /// URL of `pdf_url` routed through the backend's range-capable proxy
    pub fn proxy_url(&self, pdf_url: &str) -> String {
        format!(
            "{}/api/proxy-pdf?url={}",
            self.backend,
            urlencoding::encode(pdf_url)
        )
    }

    /// Proxied document URL of a book, or `NoDocument` when it has none
    pub fn document_url(&self, book: &BookRecord) -> Result<String, ReaderError> {
        match book.pdf_url.as_deref().map(str::trim) {
            Some(url) if !url.is_empty() => Ok(self.proxy_url(url)),
            _ => Err(ReaderError::NoDocument(book.id)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::spawn_http;
    use axum::{extract::Path, http::StatusCode, routing::get, Json, Router};
    use serde_json::json;

    use std::time::Instant;

    fn client(backend: &str) -> CatalogClient {
        CatalogClient::new(&ReaderConfig {
            backend_url: backend.to_string(),
            ..ReaderConfig::default()
        })
    }

    #[test]
    fn test_proxy_url_encodes_target() {
        let catalog = client("http://backend:3001/");
        assert_eq!(
            catalog.proxy_url("https://cdn.example.com/a b.pdf?x=1"),
            "http://backend:3001/api/proxy-pdf?url=https%3A%2F%2Fcdn.example.com%2Fa%20b.pdf%3Fx%3D1"
        );
    }

    #[test]
    fn test_book_accepts_wrapped_and_bare_bodies() {
        let wrapped: BookEnvelope =
            serde_json::from_value(json!({"data": {"id": 3, "title": "Dune", "pdfUrl": "https://x/d.pdf"}}))
                .unwrap();
        let bare: BookEnvelope =
            serde_json::from_value(json!({"id": 3, "title": "Dune", "pdf_url": "https://x/d.pdf"})).unwrap();
        assert_eq!(BookRecord::from(wrapped), BookRecord::from(bare));
    }

    #[test]
    fn test_document_url_requires_pdf() {
        let catalog = client("http://backend");
        let book = BookRecord {
            id: 9,
            title: "No file".to_string(),
            pdf_url: Some("  ".to_string()),
        };
        assert!(matches!(catalog.document_url(&book), Err(ReaderError::NoDocument(9))));
    }

    #[tokio::test]
    async fn test_fetch_book() {
        let app = Router::new().route(
            "/api/books/:id",
            get(|Path(id): Path<i64>| async move {
                if id == 1 {
                    Ok(Json(json!({"data": {"id": 1, "title": "Dune", "price": 1200, "pdfUrl": null}})))
                } else {
                    Err(StatusCode::NOT_FOUND)
                }
            }),
        );
        let base = spawn_http(app).await;
        let catalog = client(&base);

        let book = catalog.fetch_book(1).await.unwrap();
        assert_eq!(book.title, "Dune");
        assert_eq!(book.pdf_url, None);
        assert!(matches!(catalog.fetch_book(2).await, Err(ReaderError::BookNotFound(2))));
    }

    #[tokio::test]
    async fn test_fetch_book_times_out() {
        let app = Router::new().route(
            "/api/books/:id",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(3)).await;
                StatusCode::OK
            }),
        );
        let catalog = CatalogClient::new(&ReaderConfig {
            backend_url: spawn_http(app).await,
            load_timeout: Duration::from_millis(100),
            ..ReaderConfig::default()
        });

        let started = Instant::now();
        let result = catalog.fetch_book(1).await;
        assert!(matches!(result, Err(ReaderError::CatalogTimeout(_))));
        assert!(started.elapsed() < Duration::from_secs(1));
    }
}
