//! Reader session
//!
//! A mounted reading view for one book. The session owns the document, the
//! render scheduler and the viewport/zoom state, and is the single place
//! where scroll, zoom and resize events are turned into render and
//! eviction requests.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::catalog::{BookRecord, CatalogClient};
use crate::config::ReaderConfig;
use crate::engine::{PageGeometry, PdfEngine};
use crate::error::{LoadError, ProgressError, ReaderError};
use crate::layout::{PageLayout, Point, ScrollOffset, Size};
use crate::loader::{DocumentLoader, LoadProgress};
use crate::progress::{ProgressClient, SaveStatus, Session};
use crate::render::RenderScheduler;
use crate::viewport::ViewportController;
use crate::zoom::{ZoomChange, ZoomController, ZoomState};

/// Rendered widths closer than this to the layout width count as sharp
const WIDTH_TOLERANCE: f32 = 0.5;

/// Where the host should go after the reader closes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Navigation {
    Catalog,
}

struct ViewState {
    container: Size,
    layout: PageLayout,
    viewport: ViewportController,
    zoom: ZoomController,
    scroll: ScrollOffset,
}

struct SessionInner {
    config: ReaderConfig,
    book: BookRecord,
    pages: Vec<PageGeometry>,
    scheduler: RenderScheduler,
    progress: ProgressClient,
    view: Mutex<ViewState>,
    last_saved_page: Mutex<Option<u32>>,
    save_status: watch::Sender<SaveStatus>,
    rerender_task: Mutex<Option<JoinHandle<()>>>,
    autosave_task: Mutex<Option<JoinHandle<()>>>,
}

/// A mounted reader for one book
pub struct ReaderSession {
    inner: Arc<SessionInner>,
}

impl ReaderSession {
    /// Mount a reader for `book_id` inside a container of the given size
    pub async fn mount(
        config: ReaderConfig,
        engine: Arc<dyn PdfEngine>,
        book_id: i64,
        session: Option<Session>,
        container: Size,
    ) -> Result<Self, ReaderError> {
        Self::mount_with_progress(config, engine, book_id, session, container, |_| {}).await
    }

    /// Like [`ReaderSession::mount`], reporting document download progress
    pub async fn mount_with_progress<F>(
        config: ReaderConfig,
        engine: Arc<dyn PdfEngine>,
        book_id: i64,
        session: Option<Session>,
        container: Size,
        on_progress: F,
    ) -> Result<Self, ReaderError>
    where
        F: FnMut(LoadProgress) + Send,
    {
        let catalog = CatalogClient::new(&config);
        let book = catalog.fetch_book(book_id).await?;
        let document_url = catalog.document_url(&book)?;

        let loader = DocumentLoader::new(engine, &config);
        let progress = ProgressClient::new(&config, session);

        // Progress hydration runs alongside the download
        let (document, stored_page) = tokio::join!(
            loader.open(&document_url, on_progress),
            progress.load(book_id)
        );
        let document = document?;
        let pages = document
            .page_geometries()
            .await
            .map_err(|e| LoadError::InvalidDocument(e.to_string()))?;

        let layout = layout_for(&config, &pages, container, 1.0);
        let mut viewport = ViewportController::from_config(document.page_count(), &config);
        let current_page = viewport.set_current_page(stored_page);
        let (save_status, _) = watch::channel(SaveStatus::Idle);

        let inner = Arc::new(SessionInner {
            book,
            pages,
            scheduler: RenderScheduler::new(document),
            progress,
            view: Mutex::new(ViewState {
                container,
                layout,
                viewport,
                zoom: ZoomController::new(),
                scroll: ScrollOffset::default(),
            }),
            last_saved_page: Mutex::new(Some(current_page)),
            save_status,
            rerender_task: Mutex::new(None),
            autosave_task: Mutex::new(None),
            config,
        });

        inner.jump_to_page(current_page);
        tracing::info!(
            book_id,
            pages = inner.pages.len(),
            current_page,
            "Reader mounted"
        );
        Ok(Self { inner })
    }

    pub fn book(&self) -> &BookRecord {
        &self.inner.book
    }

    pub fn page_count(&self) -> u32 {
        self.inner.pages.len() as u32
    }

    pub fn current_page(&self) -> u32 {
        self.inner.view.lock().viewport.current_page()
    }

    pub fn scroll(&self) -> ScrollOffset {
        self.inner.view.lock().scroll
    }

    pub fn layout(&self) -> PageLayout {
        self.inner.view.lock().layout.clone()
    }

    pub fn zoom(&self) -> ZoomState {
        self.inner.view.lock().zoom.state()
    }

    /// Scheduler holding the page surfaces, for painting
    pub fn scheduler(&self) -> &RenderScheduler {
        &self.inner.scheduler
    }

    /// Stretch to paint `page`'s raster with at the current layout width.
    /// Differs from 1.0 while a zoom or resize waits for its re-render;
    /// `None` while the page has no raster.
    pub fn page_display_scale(&self, page: u32) -> Option<f32> {
        let width = self.inner.view.lock().layout.page_width() as f32;
        self.inner
            .scheduler
            .with_surface(page, |surface| surface.display_scale(width))
    }

    /// Scroll the container; returns the reading page afterwards
    pub fn scroll_to(&self, scroll: ScrollOffset) -> u32 {
        let mut view = self.inner.view.lock();
        view.scroll = view.layout.clamp_scroll(scroll, view.container);
        self.inner.refresh(&mut view);
        view.viewport.current_page()
    }

    pub fn jump_to_page(&self, page: u32) -> u32 {
        self.inner.jump_to_page(page)
    }

    pub fn next_page(&self) -> u32 {
        let current = self.current_page();
        self.inner.jump_to_page(current.saturating_add(1))
    }

    pub fn prev_page(&self) -> u32 {
        let current = self.current_page();
        self.inner.jump_to_page(current.saturating_sub(1))
    }

    /// Container size changed. Rasters are stretched until the debounced
    /// re-render replaces them.
    pub fn resize(&self, container: Size) {
        let mut view = self.inner.view.lock();
        SessionInner::schedule_rerender(&self.inner);
        let page = view.viewport.current_page();
        let within = match view.layout.page_span(page) {
            Some((top, bottom)) if bottom > top => (view.scroll.y - top) / (bottom - top),
            _ => 0.0,
        };

        view.container = container;
        view.layout = layout_for(&self.inner.config, &self.inner.pages, container, view.zoom.scale());
        if let Some((top, bottom)) = view.layout.page_span(page) {
            view.scroll.y = top + within * (bottom - top);
        }
        view.scroll = view.layout.clamp_scroll(view.scroll, container);
        self.inner.refresh(&mut view);
    }

    /// Zoom around `anchor` (viewport coordinates, default center)
    pub fn set_zoom(&self, scale: f64, anchor: Option<Point>) -> Option<ZoomChange> {
        let mut view = self.inner.view.lock();
        let (scroll, container) = (view.scroll, view.container);
        let change = view.zoom.set_zoom(scale, anchor, scroll, container)?;
        SessionInner::schedule_rerender(&self.inner);
        self.inner.apply_zoom(&mut view, change);
        Some(change)
    }

    pub fn pinch_start(&self, touches: [Point; 2]) -> bool {
        self.inner.view.lock().zoom.begin_pinch(touches)
    }

    pub fn pinch_move(&self, touches: [Point; 2]) -> Option<ZoomChange> {
        let mut view = self.inner.view.lock();
        let (scroll, container) = (view.scroll, view.container);
        let change = view.zoom.update_pinch(touches, scroll, container)?;
        SessionInner::schedule_rerender(&self.inner);
        self.inner.apply_zoom(&mut view, change);
        Some(change)
    }

    /// Finish the gesture and re-render at the settled width right away
    pub fn pinch_end(&self) {
        let ended = self.inner.view.lock().zoom.end_pinch().is_some();
        if ended {
            if let Some(task) = self.inner.rerender_task.lock().take() {
                task.abort();
            }
            self.inner.rerender_stale();
        }
    }

    pub fn save_status(&self) -> watch::Receiver<SaveStatus> {
        self.inner.save_status.subscribe()
    }

    /// Save the current page now
    pub async fn save_progress(&self) -> Result<(), ProgressError> {
        self.inner.save().await
    }

    /// Save the current page once scrolling has been quiet for the
    /// autosave delay. Does nothing for anonymous sessions.
    pub fn schedule_autosave(&self) {
        if !self.inner.progress.can_save() {
            return;
        }
        let weak = Arc::downgrade(&self.inner);
        let delay = self.inner.config.autosave_debounce;
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(inner) = weak.upgrade() {
                if inner.has_unsaved_page() {
                    // failures are already reported through the save status
                    let _ = inner.save().await;
                }
            }
        });
        if let Some(previous) = self.inner.autosave_task.lock().replace(task) {
            previous.abort();
        }
    }

    /// Tear the reader down: stop pending work, flush an unsaved page once
    /// and release every raster.
    pub async fn unmount(self) -> Navigation {
        let inner = self.inner;
        if let Some(task) = inner.autosave_task.lock().take() {
            task.abort();
        }
        if let Some(task) = inner.rerender_task.lock().take() {
            task.abort();
        }
        inner.scheduler.cancel_all();

        if inner.progress.can_save() && inner.has_unsaved_page() {
            if let Err(err) = inner.save().await {
                tracing::warn!(book_id = inner.book.id, "Progress not saved on close: {}", err);
            }
        }

        for page in inner.scheduler.allocated_pages() {
            inner.scheduler.evict(page);
        }
        tracing::debug!(book_id = inner.book.id, "Reader unmounted");
        Navigation::Catalog
    }

    /// Leave the reader for the catalog
    pub async fn back_to_catalog(self) -> Navigation {
        self.unmount().await
    }
}

impl SessionInner {
    fn jump_to_page(&self, page: u32) -> u32 {
        let mut view = self.view.lock();
        let page = page.clamp(1, view.layout.page_count().max(1));
        let top = view.layout.page_top(page).unwrap_or(0.0) - view.layout.gap();
        view.scroll = view
            .layout
            .clamp_scroll(ScrollOffset::new(view.scroll.x, top), view.container);
        self.refresh(&mut view);
        // The last pages may not reach the reading band; the jump target wins
        view.viewport.set_current_page(page)
    }

    fn apply_zoom(&self, view: &mut ViewState, change: ZoomChange) {
        view.layout = layout_for(&self.config, &self.pages, view.container, change.scale);
        view.scroll = view.layout.clamp_scroll(change.scroll, view.container);
        self.refresh(view);
    }

    /// Re-evaluate the viewport and issue the resulting renders/evictions
    fn refresh(&self, view: &mut ViewState) {
        let states = self.scheduler.page_states();
        let update = view
            .viewport
            .update(&view.layout, view.scroll.y, view.container.height, &states);

        for page in update.to_evict {
            self.scheduler.evict(page);
        }
        let width = view.layout.page_width() as f32;
        for page in update.to_render {
            self.request_render(page, width);
        }
        if !view.zoom.is_pinching() && !self.rerender_pending() {
            for page in self.stale_pages(view) {
                self.request_render(page, width);
            }
        }
        if let Some(page) = update.current_page {
            tracing::debug!(page, "Reading position changed");
        }
    }

    fn request_render(&self, page: u32, width: f32) {
        if let Err(err) = self
            .scheduler
            .render(page, width, self.config.device_pixel_ratio)
        {
            tracing::warn!("Render request rejected: {}", err);
        }
    }

    /// Visible pages whose raster does not match the current layout width
    fn stale_pages(&self, view: &ViewState) -> Vec<u32> {
        let width = view.layout.page_width() as f32;
        (1..=view.layout.page_count())
            .filter(|page| view.viewport.is_intersecting(*page))
            .filter(|page| {
                self.scheduler
                    .rendered_width(*page)
                    .is_some_and(|rendered| (rendered - width).abs() > WIDTH_TOLERANCE)
            })
            .collect()
    }

    fn rerender_stale(&self) {
        let view = self.view.lock();
        let width = view.layout.page_width() as f32;
        let stale = self.stale_pages(&view);
        if !stale.is_empty() {
            tracing::debug!(width, pages = stale.len(), "Re-rendering at new width");
        }
        for page in stale {
            self.request_render(page, width);
        }
    }

    fn rerender_pending(&self) -> bool {
        self.rerender_task
            .lock()
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    fn schedule_rerender(inner: &Arc<SessionInner>) {
        let weak: Weak<SessionInner> = Arc::downgrade(inner);
        let delay = inner.config.rerender_debounce;
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(inner) = weak.upgrade() {
                inner.rerender_stale();
            }
        });
        if let Some(previous) = inner.rerender_task.lock().replace(task) {
            previous.abort();
        }
    }

    fn has_unsaved_page(&self) -> bool {
        let current = self.view.lock().viewport.current_page();
        let last_saved = *self.last_saved_page.lock();
        last_saved != Some(current)
    }

    async fn save(&self) -> Result<(), ProgressError> {
        let page = self.view.lock().viewport.current_page();
        self.save_status.send_replace(SaveStatus::Saving);

        match self.progress.save(self.book.id, page).await {
            Ok(()) => {
                *self.last_saved_page.lock() = Some(page);
                self.save_status.send_replace(SaveStatus::Saved);
                Ok(())
            }
            Err(err) => {
                tracing::warn!(book_id = self.book.id, page, "Failed to save progress: {}", err);
                self.save_status.send_replace(SaveStatus::Failed(err.to_string()));
                Err(err)
            }
        }
    }
}

impl Drop for SessionInner {
    fn drop(&mut self) {
        if let Some(task) = self.rerender_task.get_mut().take() {
            task.abort();
        }
        if let Some(task) = self.autosave_task.get_mut().take() {
            task.abort();
        }
        self.scheduler.cancel_all();
    }
}

/// Layout for a container at zoom `scale`. Gaps and padding scale with the
/// pages so zooming stretches the whole content uniformly.
fn layout_for(config: &ReaderConfig, pages: &[PageGeometry], container: Size, scale: f64) -> PageLayout {
    let base_width = (container.width - 2.0 * config.page_padding_px).max(1.0);
    PageLayout::new(
        pages,
        base_width * scale,
        config.page_gap_px * scale,
        config.page_padding_px * scale,
    )
}
