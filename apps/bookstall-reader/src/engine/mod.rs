//! PDF engine seam
//!
//! The reader never parses PDF itself. It talks to an engine through two
//! traits: [`PdfEngine`] opens a document from bytes, [`EngineDocument`]
//! exposes page geometry and rasterization.

#[cfg(feature = "mupdf")]
pub mod mupdf;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::render::CancellationToken;

/// Engine-level failure
#[derive(Debug, Error)]
pub enum EngineError {
    /// The paint was aborted through its cancellation token
    #[error("Render cancelled")]
    Cancelled,

    #[error("Invalid document: {0}")]
    InvalidDocument(String),

    #[error("Page {0} not found")]
    PageNotFound(u32),

    #[error("Render failed: {0}")]
    Render(String),
}

impl EngineError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, EngineError::Cancelled)
    }
}

/// Native page size in PDF points at scale 1
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageGeometry {
    /// 1-based page number
    pub number: u32,
    pub width: f32,
    pub height: f32,
}

impl PageGeometry {
    /// Height over width
    pub fn aspect(&self) -> f64 {
        if self.width <= 0.0 {
            return 1.0;
        }
        self.height as f64 / self.width as f64
    }
}

/// RGBA pixels produced by one paint
#[derive(Clone, PartialEq)]
pub struct Raster {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl std::fmt::Debug for Raster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Raster")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.pixels.len())
            .finish()
    }
}

/// Opens documents from their raw bytes
#[async_trait]
pub trait PdfEngine: Send + Sync {
    /// Parse the document structure. Pages are not rendered here.
    async fn open(&self, data: Vec<u8>) -> Result<Arc<dyn EngineDocument>, EngineError>;
}

/// An opened document
#[async_trait]
pub trait EngineDocument: Send + Sync {
    /// Number of pages, always at least 1 for an opened document
    fn page_count(&self) -> u32;

    /// Native geometry of a 1-based page
    async fn page_geometry(&self, page: u32) -> Result<PageGeometry, EngineError>;

    /// Rasterize a 1-based page at `scale` (raster pixels per PDF point).
    ///
    /// Implementations check `cancel` at safe points and return
    /// [`EngineError::Cancelled`] once it fires.
    async fn render(
        &self,
        page: u32,
        scale: f32,
        cancel: &CancellationToken,
    ) -> Result<Raster, EngineError>;
}

/// Leading bytes searched for the `%PDF-` marker
pub const HEADER_WINDOW: usize = 1024;

/// Whether the bytes start with a PDF header, allowing leading junk the way
/// most readers do (the header must appear in the first kilobyte).
pub fn looks_like_pdf(data: &[u8]) -> bool {
    let window = &data[..data.len().min(HEADER_WINDOW)];
    window.windows(5).any(|w| w == b"%PDF-")
}
