//! Document loader
//!
//! Fetches a PDF over HTTP (normally through the backend's range-capable
//! proxy) and hands the bytes to the engine once complete. When the server
//! answers the first ranged request with `206 Partial Content`, the rest of
//! the document is fetched in `chunk_size` ranges; otherwise the plain
//! response body is streamed. Either way progress is reported as bytes
//! arrive, and a body that is not a PDF is rejected as soon as its header
//! window is in. Pages are not touched here; geometry is fetched lazily
//! through [`DocumentHandle::get_page`].

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use lru::LruCache;
use parking_lot::Mutex;
use reqwest::header::{CONTENT_RANGE, RANGE};
use reqwest::StatusCode;

use crate::config::ReaderConfig;
use crate::engine::{looks_like_pdf, EngineDocument, EngineError, PageGeometry, PdfEngine, HEADER_WINDOW};
use crate::error::LoadError;

/// Largest up-front buffer reservation taken from `Content-Length`
const MAX_PREALLOCATION: u64 = 64 * 1024 * 1024;

/// Byte progress of one load
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadProgress {
    pub bytes_loaded: u64,
    pub bytes_total: Option<u64>,
}

impl LoadProgress {
    /// Percentage complete, when the total is known
    pub fn percent(&self) -> Option<f32> {
        match self.bytes_total {
            Some(0) => Some(100.0),
            Some(total) => Some((self.bytes_loaded as f64 / total as f64 * 100.0).min(100.0) as f32),
            None => None,
        }
    }
}

/// Filters progress updates so the reported percentage never decreases
#[derive(Debug, Default)]
struct MonotonicProgress {
    last_percent: Option<f32>,
    last_loaded: u64,
}

impl MonotonicProgress {
    fn admit(&mut self, progress: LoadProgress) -> bool {
        if progress.bytes_loaded < self.last_loaded {
            return false;
        }
        if let (Some(last), Some(next)) = (self.last_percent, progress.percent()) {
            if next < last {
                return false;
            }
        }
        self.last_loaded = progress.bytes_loaded;
        if let Some(percent) = progress.percent() {
            self.last_percent = Some(percent);
        }
        true
    }
}

/// Forwards admitted progress for one download to the caller
struct ProgressReporter<'a, F> {
    tracker: MonotonicProgress,
    total: Option<u64>,
    on_progress: &'a mut F,
}

impl<'a, F> ProgressReporter<'a, F>
where
    F: FnMut(LoadProgress),
{
    fn new(total: Option<u64>, on_progress: &'a mut F) -> Self {
        Self {
            tracker: MonotonicProgress::default(),
            total,
            on_progress,
        }
    }

    fn report(&mut self, bytes_loaded: u64) {
        let progress = LoadProgress {
            bytes_loaded,
            bytes_total: self.total,
        };
        if self.tracker.admit(progress) {
            (self.on_progress)(progress);
        }
    }
}

/// `Content-Range: bytes <start>-<end>/<total>` of a partial response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ContentRange {
    start: u64,
    end: u64,
    total: Option<u64>,
}

impl ContentRange {
    fn parse(value: &str) -> Option<Self> {
        let (span, total) = value.trim().strip_prefix("bytes ")?.split_once('/')?;
        let (start, end) = span.split_once('-')?;
        let range = ContentRange {
            start: start.trim().parse().ok()?,
            end: end.trim().parse().ok()?,
            total: total.trim().parse().ok(),
        };
        (range.start <= range.end).then_some(range)
    }

    fn of(response: &reqwest::Response) -> Option<Self> {
        if response.status() != StatusCode::PARTIAL_CONTENT {
            return None;
        }
        response
            .headers()
            .get(CONTENT_RANGE)
            .and_then(|value| value.to_str().ok())
            .and_then(Self::parse)
    }
}

struct DocumentInner {
    source_url: String,
    document: Arc<dyn EngineDocument>,
    geometry: Mutex<LruCache<u32, PageGeometry>>,
}

/// An opened document, owned by one reader session
#[derive(Clone)]
pub struct DocumentHandle {
    inner: Arc<DocumentInner>,
}

impl DocumentHandle {
    pub fn new(source_url: impl Into<String>, document: Arc<dyn EngineDocument>, cache_size: usize) -> Self {
        let capacity = NonZeroUsize::new(cache_size).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Arc::new(DocumentInner {
                source_url: source_url.into(),
                document,
                geometry: Mutex::new(LruCache::new(capacity)),
            }),
        }
    }

    pub fn page_count(&self) -> u32 {
        self.inner.document.page_count()
    }

    pub fn source_url(&self) -> &str {
        &self.inner.source_url
    }

    pub fn engine_document(&self) -> &Arc<dyn EngineDocument> {
        &self.inner.document
    }

    /// Geometry of a 1-based page. Repeated calls return equal values.
    pub async fn get_page(&self, page: u32) -> Result<PageGeometry, EngineError> {
        if page == 0 || page > self.page_count() {
            return Err(EngineError::PageNotFound(page));
        }
        if let Some(geometry) = self.inner.geometry.lock().get(&page) {
            return Ok(*geometry);
        }

        let geometry = self.inner.document.page_geometry(page).await?;
        self.inner.geometry.lock().put(page, geometry);
        Ok(geometry)
    }

    /// Geometry of every page, in order
    pub async fn page_geometries(&self) -> Result<Vec<PageGeometry>, EngineError> {
        let mut pages = Vec::with_capacity(self.page_count() as usize);
        for page in 1..=self.page_count() {
            pages.push(self.get_page(page).await?);
        }
        Ok(pages)
    }
}

impl std::fmt::Debug for DocumentHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentHandle")
            .field("source_url", &self.inner.source_url)
            .field("page_count", &self.page_count())
            .finish()
    }
}

/// Opens remote documents through an engine
#[derive(Clone)]
pub struct DocumentLoader {
    http: reqwest::Client,
    engine: Arc<dyn PdfEngine>,
    timeout: Duration,
    chunk_size: u64,
    geometry_cache_size: usize,
}

impl DocumentLoader {
    pub fn new(engine: Arc<dyn PdfEngine>, config: &ReaderConfig) -> Self {
        Self::with_client(reqwest::Client::new(), engine, config)
    }

    pub fn with_client(http: reqwest::Client, engine: Arc<dyn PdfEngine>, config: &ReaderConfig) -> Self {
        Self {
            http,
            engine,
            timeout: config.load_timeout,
            chunk_size: config.chunk_size.max(1),
            geometry_cache_size: config.geometry_cache_size,
        }
    }

    /// Download and open `source_url`, calling `on_progress` as bytes arrive.
    pub async fn open<F>(&self, source_url: &str, mut on_progress: F) -> Result<DocumentHandle, LoadError>
    where
        F: FnMut(LoadProgress) + Send,
    {
        tracing::debug!("Opening document {}", source_url);

        let load = async {
            let data = self.download(source_url, &mut on_progress).await?;
            self.parse(source_url, data).await
        };

        match tokio::time::timeout(self.timeout, load).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!("Document load timed out: {}", source_url);
                Err(LoadError::Timeout(self.timeout.as_secs()))
            }
        }
    }

    async fn download<F>(&self, source_url: &str, on_progress: &mut F) -> Result<Vec<u8>, LoadError>
    where
        F: FnMut(LoadProgress) + Send,
    {
        let first = self.fetch(source_url, Some((0, self.chunk_size - 1))).await?;
        if first.status() != StatusCode::PARTIAL_CONTENT {
            return read_whole(first, on_progress).await;
        }

        match ContentRange::of(&first) {
            Some(ContentRange {
                start: 0,
                end,
                total: Some(total),
            }) => {
                tracing::debug!(total, chunk_size = self.chunk_size, "Loading {} in ranges", source_url);
                self.read_ranges(source_url, first, end, total, on_progress).await
            }
            _ => {
                tracing::debug!("Unusable Content-Range, refetching {} whole", source_url);
                let whole = self.fetch(source_url, None).await?;
                read_whole(whole, on_progress).await
            }
        }
    }

    /// GET `url`, optionally for the inclusive byte range `range`
    async fn fetch(&self, url: &str, range: Option<(u64, u64)>) -> Result<reqwest::Response, LoadError> {
        let mut request = self.http.get(url);
        if let Some((start, end)) = range {
            request = request.header(RANGE, format!("bytes={}-{}", start, end));
        }
        let response = request
            .send()
            .await
            .map_err(|e| LoadError::Unreachable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(LoadError::Unreachable(format!("HTTP {}", status)));
        }
        Ok(response)
    }

    /// Fetch the rest of a `total`-byte document after the first partial
    /// response, which covers `0..=first_end`
    async fn read_ranges<F>(
        &self,
        source_url: &str,
        first: reqwest::Response,
        first_end: u64,
        total: u64,
        on_progress: &mut F,
    ) -> Result<Vec<u8>, LoadError>
    where
        F: FnMut(LoadProgress) + Send,
    {
        let mut data = Vec::with_capacity(total.min(MAX_PREALLOCATION) as usize);
        let mut progress = ProgressReporter::new(Some(total), on_progress);
        progress.report(0);

        let mut response = first;
        let mut end = first_end;
        let mut header_checked = false;
        loop {
            read_body(response, &mut data, &mut progress).await?;
            let loaded = data.len() as u64;
            let expected = end.saturating_add(1).min(total);
            if loaded != expected {
                return Err(LoadError::Interrupted {
                    loaded,
                    reason: format!("expected {} bytes", expected),
                });
            }

            if !header_checked && (data.len() >= HEADER_WINDOW || loaded == total) {
                if !looks_like_pdf(&data) {
                    return Err(LoadError::InvalidDocument("missing %PDF header".to_string()));
                }
                header_checked = true;
            }
            if loaded >= total {
                return Ok(data);
            }

            let requested = (loaded, loaded.saturating_add(self.chunk_size).min(total) - 1);
            response = self
                .fetch(source_url, Some(requested))
                .await
                .map_err(|e| LoadError::Interrupted {
                    loaded,
                    reason: e.to_string(),
                })?;
            end = match ContentRange::of(&response) {
                Some(range) if range.start == loaded => range.end,
                _ => {
                    return Err(LoadError::Interrupted {
                        loaded,
                        reason: format!("range {}-{} not honoured ({})", requested.0, requested.1, response.status()),
                    })
                }
            };
        }
    }

    async fn parse(&self, source_url: &str, data: Vec<u8>) -> Result<DocumentHandle, LoadError> {
        if !looks_like_pdf(&data) {
            return Err(LoadError::InvalidDocument("missing %PDF header".to_string()));
        }

        let document = self.engine.open(data).await.map_err(|e| match e {
            EngineError::InvalidDocument(msg) => LoadError::InvalidDocument(msg),
            other => LoadError::InvalidDocument(other.to_string()),
        })?;

        if document.page_count() == 0 {
            return Err(LoadError::InvalidDocument("document has no pages".to_string()));
        }

        tracing::info!("Opened {} ({} pages)", source_url, document.page_count());
        Ok(DocumentHandle::new(source_url, document, self.geometry_cache_size))
    }
}

/// Stream a complete (non-ranged) response body
async fn read_whole<F>(response: reqwest::Response, on_progress: &mut F) -> Result<Vec<u8>, LoadError>
where
    F: FnMut(LoadProgress) + Send,
{
    let total = response.content_length();
    let mut data = Vec::with_capacity(total.unwrap_or(0).min(MAX_PREALLOCATION) as usize);
    let mut progress = ProgressReporter::new(total, on_progress);
    progress.report(0);

    read_body(response, &mut data, &mut progress).await?;

    if let Some(total) = total {
        if (data.len() as u64) < total {
            return Err(LoadError::Interrupted {
                loaded: data.len() as u64,
                reason: format!("expected {} bytes", total),
            });
        }
    }
    Ok(data)
}

/// Append a response body to `data`, reporting progress per received chunk
async fn read_body<F>(
    response: reqwest::Response,
    data: &mut Vec<u8>,
    progress: &mut ProgressReporter<'_, F>,
) -> Result<(), LoadError>
where
    F: FnMut(LoadProgress) + Send,
{
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| LoadError::Interrupted {
            loaded: data.len() as u64,
            reason: e.to_string(),
        })?;
        data.extend_from_slice(&chunk);
        progress.report(data.len() as u64);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{serve_range, spawn_http, synthetic_pdf, SyntheticEngine};
    use axum::{
        body::Body,
        http::{header, HeaderMap},
        response::Response,
        routing::get,
        Router,
    };

    fn loader(engine: &SyntheticEngine) -> DocumentLoader {
        DocumentLoader::new(Arc::new(engine.clone()), &ReaderConfig::default())
    }

    fn chunked_loader(engine: &SyntheticEngine, chunk_size: u64) -> DocumentLoader {
        let config = ReaderConfig {
            chunk_size,
            ..ReaderConfig::default()
        };
        DocumentLoader::new(Arc::new(engine.clone()), &config)
    }

    /// Serves `document` at `/doc.pdf` with range support, recording every
    /// `Range` header it receives
    fn ranged_server(document: Vec<u8>, ranges: Arc<Mutex<Vec<String>>>) -> Router {
        Router::new().route(
            "/doc.pdf",
            get(move |headers: HeaderMap| {
                let document = document.clone();
                let ranges = ranges.clone();
                async move {
                    if let Some(range) = headers.get(header::RANGE).and_then(|v| v.to_str().ok()) {
                        ranges.lock().push(range.to_string());
                    }
                    serve_range(&document, &headers)
                }
            }),
        )
    }

    #[test]
    fn test_monotonic_progress_rejects_regressions() {
        let mut tracker = MonotonicProgress::default();
        let at = |loaded| LoadProgress {
            bytes_loaded: loaded,
            bytes_total: Some(100),
        };
        assert!(tracker.admit(at(10)));
        assert!(tracker.admit(at(50)));
        assert!(!tracker.admit(at(40)));
        assert!(tracker.admit(at(100)));
    }

    #[test]
    fn test_percent_caps_at_hundred() {
        let progress = LoadProgress {
            bytes_loaded: 150,
            bytes_total: Some(100),
        };
        assert_eq!(progress.percent(), Some(100.0));
        let unknown = LoadProgress {
            bytes_loaded: 10,
            bytes_total: None,
        };
        assert_eq!(unknown.percent(), None);
    }

    #[test]
    fn test_parse_content_range() {
        assert_eq!(
            ContentRange::parse("bytes 0-1023/4096"),
            Some(ContentRange {
                start: 0,
                end: 1023,
                total: Some(4096)
            })
        );
        assert_eq!(ContentRange::parse("bytes 5-9/*").and_then(|r| r.total), None);
        assert_eq!(ContentRange::parse("bytes 9-5/10"), None);
        assert_eq!(ContentRange::parse("bytes */10"), None);
    }

    #[tokio::test]
    async fn test_open_fetches_document_in_ranges() {
        let engine = SyntheticEngine::new();
        let document = synthetic_pdf(4, 600.0, 800.0);
        let total = document.len() as u64;
        let ranges = Arc::new(Mutex::new(Vec::new()));
        let base = spawn_http(ranged_server(document, ranges.clone())).await;

        let mut seen = Vec::new();
        let handle = chunked_loader(&engine, 16)
            .open(&format!("{}/doc.pdf", base), |p| seen.push(p))
            .await
            .unwrap();
        assert_eq!(handle.page_count(), 4);

        let ranges = ranges.lock().clone();
        assert_eq!(ranges.len() as u64, total.div_ceil(16));
        assert_eq!(ranges[0], "bytes=0-15");
        assert_eq!(ranges[1], "bytes=16-31");

        assert!(seen.iter().all(|p| p.bytes_total == Some(total)));
        assert!(seen.windows(2).all(|w| w[0].bytes_loaded <= w[1].bytes_loaded));
        assert_eq!(seen.last().map(|p| p.bytes_loaded), Some(total));
    }

    #[tokio::test]
    async fn test_ranged_open_stops_at_non_pdf_header() {
        let engine = SyntheticEngine::new();
        let page = format!("<html>{}</html>", "x".repeat(4000)).into_bytes();
        let ranges = Arc::new(Mutex::new(Vec::new()));
        let base = spawn_http(ranged_server(page, ranges.clone())).await;

        let result = chunked_loader(&engine, 256)
            .open(&format!("{}/doc.pdf", base), |_| {})
            .await;
        assert!(matches!(result, Err(LoadError::InvalidDocument(_))));
        // Stops once the first kilobyte is in
        assert_eq!(ranges.lock().len(), HEADER_WINDOW / 256);
    }

    #[tokio::test]
    async fn test_open_reports_interrupted_body() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                match socket.read(&mut buf).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => request.extend_from_slice(&buf[..n]),
                }
            }
            // Promises 1000 bytes, sends 48, then closes
            let head = "HTTP/1.1 200 OK\r\nContent-Type: application/pdf\r\nContent-Length: 1000\r\n\r\n";
            socket.write_all(head.as_bytes()).await.unwrap();
            socket.write_all(&[b'%'; 48]).await.unwrap();
            socket.shutdown().await.unwrap();
        });

        let engine = SyntheticEngine::new();
        let result = loader(&engine).open(&format!("http://{}/doc.pdf", addr), |_| {}).await;
        assert!(
            matches!(result, Err(LoadError::Interrupted { loaded: 48, .. })),
            "{:?}",
            result.err()
        );
    }

    #[tokio::test]
    async fn test_open_reports_monotonic_progress() {
        let engine = SyntheticEngine::new();
        let body = synthetic_pdf(4, 600.0, 800.0);
        let app = Router::new().route("/doc.pdf", get(move || async move { body }));
        let base = spawn_http(app).await;

        let mut seen = Vec::new();
        let handle = loader(&engine)
            .open(&format!("{}/doc.pdf", base), |p| seen.push(p))
            .await
            .unwrap();

        assert_eq!(handle.page_count(), 4);
        assert!(!seen.is_empty());
        let percents: Vec<f32> = seen.iter().filter_map(LoadProgress::percent).collect();
        assert!(percents.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(percents.last().copied(), Some(100.0));
    }

    #[tokio::test]
    async fn test_open_rejects_non_pdf() {
        let engine = SyntheticEngine::new();
        let app = Router::new().route("/doc.pdf", get(|| async { "<html>nope</html>" }));
        let base = spawn_http(app).await;

        let result = loader(&engine).open(&format!("{}/doc.pdf", base), |_| {}).await;
        assert!(matches!(result, Err(LoadError::InvalidDocument(_))));
    }

    #[tokio::test]
    async fn test_open_reports_unreachable_on_error_status() {
        let engine = SyntheticEngine::new();
        let app = Router::new().route(
            "/doc.pdf",
            get(|| async {
                Response::builder()
                    .status(StatusCode::NOT_FOUND)
                    .body(Body::empty())
                    .unwrap()
            }),
        );
        let base = spawn_http(app).await;

        let result = loader(&engine).open(&format!("{}/doc.pdf", base), |_| {}).await;
        assert!(matches!(result, Err(LoadError::Unreachable(_))));
    }

    #[tokio::test]
    async fn test_open_times_out() {
        let engine = SyntheticEngine::new();
        let app = Router::new().route(
            "/doc.pdf",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                "late"
            }),
        );
        let base = spawn_http(app).await;

        let config = ReaderConfig {
            load_timeout: Duration::from_millis(100),
            ..ReaderConfig::default()
        };
        let loader = DocumentLoader::new(Arc::new(engine), &config);
        let result = loader.open(&format!("{}/doc.pdf", base), |_| {}).await;
        assert!(matches!(result, Err(LoadError::Timeout(_))));
    }

    #[tokio::test]
    async fn test_get_page_is_idempotent() {
        let engine = SyntheticEngine::new();
        let handle = crate::testing::open_synthetic(&engine, 3, 612.0, 792.0).await;

        let first = handle.get_page(2).await.unwrap();
        let second = handle.get_page(2).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.number, 2);
        assert!(matches!(handle.get_page(4).await, Err(EngineError::PageNotFound(4))));
    }
}
