//! Reader configuration

use std::env;
use std::time::Duration;

/// Tunables for a reader session
#[derive(Debug, Clone)]
pub struct ReaderConfig {
    /// Base URL of the Bookstall backend (catalog, progress, PDF proxy)
    pub backend_url: String,
    /// Timeout for the catalog lookup and, separately, the whole document load
    pub load_timeout: Duration,
    /// Bytes requested per `Range` request when the server supports ranges
    pub chunk_size: u64,
    /// Timeout for each progress load/save request
    pub progress_timeout: Duration,
    /// Distance outside the viewport at which pages start rendering
    pub prefetch_margin_px: f64,
    /// Distance outside the viewport at which rendered pages are evicted.
    /// Must be larger than `prefetch_margin_px`.
    pub evict_margin_px: f64,
    /// Vertical gap between pages
    pub page_gap_px: f64,
    /// Horizontal padding on each side of the pages
    pub page_padding_px: f64,
    /// Delay before a width change (resize, zoom) triggers re-renders
    pub rerender_debounce: Duration,
    /// Delay before a scroll-driven autosave fires
    pub autosave_debounce: Duration,
    /// Number of page geometries kept per document
    pub geometry_cache_size: usize,
    /// Device pixels per layout pixel of the display
    pub device_pixel_ratio: f32,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        ReaderConfig {
            backend_url: "http://localhost:3001".to_string(),
            load_timeout: Duration::from_secs(60),
            chunk_size: 256 * 1024,
            progress_timeout: Duration::from_secs(10),
            prefetch_margin_px: 600.0,
            evict_margin_px: 2400.0,
            page_gap_px: 16.0,
            page_padding_px: 20.0,
            rerender_debounce: Duration::from_millis(100),
            autosave_debounce: Duration::from_secs(2),
            geometry_cache_size: 256,
            device_pixel_ratio: 1.0,
        }
    }
}

impl ReaderConfig {
    pub fn from_env() -> Self {
        let defaults = ReaderConfig::default();
        ReaderConfig {
            backend_url: env::var("BOOKSTALL_BACKEND_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or(defaults.backend_url),
            load_timeout: env::var("BOOKSTALL_LOAD_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.load_timeout),
            chunk_size: env::var("BOOKSTALL_CHUNK_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|size| *size > 0)
                .unwrap_or(defaults.chunk_size),
            progress_timeout: env::var("BOOKSTALL_PROGRESS_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.progress_timeout),
            ..defaults
        }
    }

    /// Backend URL with a single trailing slash stripped
    pub fn backend(&self) -> &str {
        self.backend_url.trim_end_matches('/')
    }
}
