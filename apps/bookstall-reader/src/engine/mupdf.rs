//! MuPDF-backed engine
//!
//! MuPDF documents are not thread-safe, so the engine keeps only the
//! document bytes and the page sizes measured at open time. Every render
//! opens a fresh document inside `spawn_blocking`, and a `parking_lot`
//! mutex serializes access to MuPDF for one document.

use std::sync::Arc;

use async_trait::async_trait;
use mupdf::{Colorspace, Document, Matrix};
use parking_lot::Mutex;

use super::{looks_like_pdf, EngineDocument, EngineError, PageGeometry, PdfEngine, Raster};
use crate::render::CancellationToken;

const PDF_MIME: &str = "application/pdf";

impl From<mupdf::Error> for EngineError {
    fn from(err: mupdf::Error) -> Self {
        EngineError::Render(err.to_string())
    }
}

/// Engine opening documents with MuPDF
#[derive(Debug, Default, Clone, Copy)]
pub struct MupdfEngine;

impl MupdfEngine {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl PdfEngine for MupdfEngine {
    async fn open(&self, data: Vec<u8>) -> Result<Arc<dyn EngineDocument>, EngineError> {
        if !looks_like_pdf(&data) {
            return Err(EngineError::InvalidDocument("missing %PDF header".to_string()));
        }

        let document = tokio::task::spawn_blocking(move || MupdfDocument::from_bytes(data))
            .await
            .map_err(|e| EngineError::Render(format!("Task join error: {}", e)))??;

        Ok(Arc::new(document))
    }
}

/// Thread-safe handle on a MuPDF document
pub struct MupdfDocument {
    data: Arc<Vec<u8>>,
    pages: Vec<PageGeometry>,
    lock: Arc<Mutex<()>>,
}

impl MupdfDocument {
    fn from_bytes(data: Vec<u8>) -> Result<Self, EngineError> {
        let doc = Document::from_bytes(&data, PDF_MIME)
            .map_err(|e| EngineError::InvalidDocument(e.to_string()))?;
        let count = doc
            .page_count()
            .map_err(|e| EngineError::InvalidDocument(e.to_string()))?;
        if count < 1 {
            return Err(EngineError::InvalidDocument("document has no pages".to_string()));
        }

        let mut pages = Vec::with_capacity(count as usize);
        for index in 0..count {
            let bounds = doc.load_page(index)?.bounds()?;
            pages.push(PageGeometry {
                number: index as u32 + 1,
                width: bounds.x1 - bounds.x0,
                height: bounds.y1 - bounds.y0,
            });
        }

        Ok(Self {
            data: Arc::new(data),
            pages,
            lock: Arc::new(Mutex::new(())),
        })
    }
}

#[async_trait]
impl EngineDocument for MupdfDocument {
    fn page_count(&self) -> u32 {
        self.pages.len() as u32
    }

    async fn page_geometry(&self, page: u32) -> Result<PageGeometry, EngineError> {
        page.checked_sub(1)
            .and_then(|index| self.pages.get(index as usize))
            .copied()
            .ok_or(EngineError::PageNotFound(page))
    }

    async fn render(
        &self,
        page: u32,
        scale: f32,
        cancel: &CancellationToken,
    ) -> Result<Raster, EngineError> {
        if page == 0 || page > self.page_count() {
            return Err(EngineError::PageNotFound(page));
        }

        let data = self.data.clone();
        let lock = self.lock.clone();
        let cancel = cancel.clone();

        tokio::task::spawn_blocking(move || {
            let _guard = lock.lock();
            if cancel.is_cancelled() {
                return Err(EngineError::Cancelled);
            }

            let doc = Document::from_bytes(&data, PDF_MIME)?;
            let mupdf_page = doc.load_page(page as i32 - 1)?;
            let matrix = Matrix::new_scale(scale, scale);
            let colorspace = Colorspace::device_rgb();
            let pixmap = mupdf_page.to_pixmap(&matrix, &colorspace, true, true)?;

            if cancel.is_cancelled() {
                return Err(EngineError::Cancelled);
            }

            Ok(pixmap_to_raster(&pixmap))
        })
        .await
        .map_err(|e| EngineError::Render(format!("Task join error: {}", e)))?
    }
}

fn pixmap_to_raster(pixmap: &mupdf::Pixmap) -> Raster {
    let width = pixmap.width() as u32;
    let height = pixmap.height() as u32;
    let samples = pixmap.samples();
    let n = pixmap.n() as usize;

    let mut pixels = Vec::with_capacity((width * height * 4) as usize);
    for y in 0..height as usize {
        for x in 0..width as usize {
            let offset = (y * width as usize + x) * n;
            let r = samples.get(offset).copied().unwrap_or(0);
            let g = samples.get(offset + 1).copied().unwrap_or(0);
            let b = samples.get(offset + 2).copied().unwrap_or(0);
            let a = if n >= 4 {
                samples.get(offset + 3).copied().unwrap_or(255)
            } else {
                255
            };
            pixels.extend_from_slice(&[r, g, b, a]);
        }
    }

    Raster { width, height, pixels }
}
