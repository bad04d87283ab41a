//! Page render scheduler
//!
//! Each page owns a slot holding its raster surface and its active job.
//! Jobs paint into a fresh raster off to the side and swap it into the
//! slot only if they are still the page's active job when they finish, so
//! a surface is either the previous raster or the new one, never a mix.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;

use super::CancellationToken;
use crate::engine::EngineError;
use crate::error::RenderError;
use crate::loader::DocumentHandle;
use crate::surface::RasterSurface;
use crate::viewport::PageState;

/// Identifier of one render attempt
pub type JobId = u64;

/// Lifecycle of a render job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Pending,
    Rendering,
    Complete,
    Cancelled,
    Failed,
}

impl JobStatus {
    /// Whether the job can no longer change state
    pub fn is_final(self) -> bool {
        matches!(self, JobStatus::Complete | JobStatus::Cancelled | JobStatus::Failed)
    }
}

/// Caller's view of a render job
#[derive(Debug)]
pub struct RenderHandle {
    token: CancellationToken,
    status: watch::Receiver<JobStatus>,
}

impl RenderHandle {
    /// Current status without waiting
    pub fn status(&self) -> JobStatus {
        *self.status.borrow()
    }

    /// Abort the paint. The page keeps showing its previous raster.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Wait until the job reaches a final status
    pub async fn wait(&mut self) -> JobStatus {
        loop {
            let status = *self.status.borrow_and_update();
            if status.is_final() {
                return status;
            }
            if self.status.changed().await.is_err() {
                return *self.status.borrow();
            }
        }
    }
}

struct ActiveJob {
    id: JobId,
    target_width: f32,
    token: CancellationToken,
    status: watch::Sender<JobStatus>,
}

impl ActiveJob {
    fn cancel(&self) {
        self.token.cancel();
        transition(&self.status, JobStatus::Cancelled);
    }
}

#[derive(Default)]
struct PageSlot {
    surface: Option<RasterSurface>,
    active: Option<ActiveJob>,
    failed: bool,
}

impl PageSlot {
    fn state(&self) -> PageState {
        if self.active.is_some() {
            PageState::Rendering
        } else if self.surface.is_some() {
            PageState::Rendered
        } else if self.failed {
            PageState::Failed
        } else {
            PageState::Unloaded
        }
    }
}

struct SchedulerInner {
    document: DocumentHandle,
    slots: Mutex<HashMap<u32, PageSlot>>,
    next_job: AtomicU64,
}

struct JobSpec {
    id: JobId,
    page: u32,
    target_width: f32,
    device_pixel_ratio: f32,
}

/// Schedules and supersedes page render jobs for one document
#[derive(Clone)]
pub struct RenderScheduler {
    inner: Arc<SchedulerInner>,
}

impl RenderScheduler {
    pub fn new(document: DocumentHandle) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                document,
                slots: Mutex::new(HashMap::new()),
                next_job: AtomicU64::new(1),
            }),
        }
    }

    pub fn document(&self) -> &DocumentHandle {
        &self.inner.document
    }

    /// Start rendering `page` at `target_width` layout pixels.
    ///
    /// Any job already active for the page is cancelled first. Must be
    /// called from within a tokio runtime.
    pub fn render(
        &self,
        page: u32,
        target_width: f32,
        device_pixel_ratio: f32,
    ) -> Result<RenderHandle, RenderError> {
        let page_count = self.inner.document.page_count();
        if page == 0 || page > page_count {
            return Err(RenderError::PageOutOfRange { page, page_count });
        }
        if !target_width.is_finite() || target_width <= 0.0 {
            return Err(RenderError::InvalidWidth(target_width));
        }
        let device_pixel_ratio = if device_pixel_ratio.is_finite() {
            device_pixel_ratio.max(1.0)
        } else {
            1.0
        };

        let id = self.inner.next_job.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();
        let (status_tx, status_rx) = watch::channel(JobStatus::Pending);

        {
            let mut slots = self.inner.slots.lock();
            let slot = slots.entry(page).or_default();
            if let Some(previous) = slot.active.take() {
                tracing::debug!(page, superseded = previous.id, by = id, "Superseding render job");
                previous.cancel();
            }
            slot.active = Some(ActiveJob {
                id,
                target_width,
                token: token.clone(),
                status: status_tx.clone(),
            });
        }

        let spec = JobSpec {
            id,
            page,
            target_width,
            device_pixel_ratio,
        };
        tokio::spawn(run_job(self.inner.clone(), spec, token.clone(), status_tx));

        Ok(RenderHandle {
            token,
            status: status_rx,
        })
    }

    /// Cancel the page's active job, keeping its current raster
    pub fn cancel(&self, page: u32) -> bool {
        let mut slots = self.inner.slots.lock();
        match slots.get_mut(&page).and_then(|slot| slot.active.take()) {
            Some(job) => {
                job.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancel the page's active job and release its raster memory
    pub fn evict(&self, page: u32) {
        let removed = self.inner.slots.lock().remove(&page);
        if let Some(slot) = removed {
            if let Some(job) = slot.active {
                job.cancel();
            }
            tracing::debug!(page, "Evicted page raster");
        }
    }

    /// Cancel every active job. Rasters are kept.
    pub fn cancel_all(&self) {
        let mut slots = self.inner.slots.lock();
        for slot in slots.values_mut() {
            if let Some(job) = slot.active.take() {
                job.cancel();
            }
        }
    }

    pub fn page_state(&self, page: u32) -> PageState {
        self.inner
            .slots
            .lock()
            .get(&page)
            .map(PageSlot::state)
            .unwrap_or(PageState::Unloaded)
    }

    /// States of pages `1..=page_count`, index 0 being page 1
    pub fn page_states(&self) -> Vec<PageState> {
        let slots = self.inner.slots.lock();
        (1..=self.inner.document.page_count())
            .map(|page| slots.get(&page).map(PageSlot::state).unwrap_or(PageState::Unloaded))
            .collect()
    }

    /// Layout width the page is (or is about to be) rendered at
    pub fn rendered_width(&self, page: u32) -> Option<f32> {
        let slots = self.inner.slots.lock();
        let slot = slots.get(&page)?;
        slot.active
            .as_ref()
            .map(|job| job.target_width)
            .or_else(|| slot.surface.as_ref().map(RasterSurface::css_width))
    }

    /// Inspect a page's surface without copying its pixels
    pub fn with_surface<R>(&self, page: u32, f: impl FnOnce(&RasterSurface) -> R) -> Option<R> {
        let slots = self.inner.slots.lock();
        slots.get(&page).and_then(|slot| slot.surface.as_ref()).map(f)
    }

    /// Pages currently holding a raster surface, ascending
    pub fn allocated_pages(&self) -> Vec<u32> {
        let slots = self.inner.slots.lock();
        let mut pages: Vec<u32> = slots
            .iter()
            .filter(|(_, slot)| slot.surface.is_some())
            .map(|(page, _)| *page)
            .collect();
        pages.sort_unstable();
        pages
    }

    /// Total bytes held by raster surfaces
    pub fn allocated_bytes(&self) -> usize {
        self.inner
            .slots
            .lock()
            .values()
            .filter_map(|slot| slot.surface.as_ref())
            .map(RasterSurface::byte_size)
            .sum()
    }
}

fn transition(status: &watch::Sender<JobStatus>, next: JobStatus) -> bool {
    status.send_if_modified(|current| {
        if current.is_final() || *current == next {
            return false;
        }
        *current = next;
        true
    })
}

async fn run_job(
    inner: Arc<SchedulerInner>,
    spec: JobSpec,
    token: CancellationToken,
    status: watch::Sender<JobStatus>,
) {
    let result = if token.is_cancelled() {
        Err(EngineError::Cancelled)
    } else {
        transition(&status, JobStatus::Rendering);
        tokio::select! {
            biased;
            _ = token.cancelled() => Err(EngineError::Cancelled),
            painted = paint(&inner.document, &spec, &token) => painted,
        }
    };

    let next = settle(&inner, &spec, &token, result);
    transition(&status, next);
}

/// Release the page's slot if this job still owns it and apply the result.
///
/// Every exit of a job goes through here, so a finished job never leaves
/// the page reporting `Rendering`.
fn settle(
    inner: &SchedulerInner,
    spec: &JobSpec,
    token: &CancellationToken,
    result: Result<RasterSurface, EngineError>,
) -> JobStatus {
    let mut slots = inner.slots.lock();
    let owned = match slots.get_mut(&spec.page) {
        Some(slot) if slot.active.as_ref().is_some_and(|job| job.id == spec.id) => {
            slot.active = None;
            Some(slot)
        }
        _ => None,
    };

    match result {
        Ok(surface) => match owned {
            Some(slot) if !token.is_cancelled() => {
                slot.surface = Some(surface);
                slot.failed = false;
                tracing::debug!(page = spec.page, job = spec.id, "Page rendered");
                JobStatus::Complete
            }
            _ => JobStatus::Cancelled,
        },
        Err(err) if err.is_cancelled() => {
            tracing::debug!(page = spec.page, job = spec.id, "Render cancelled");
            JobStatus::Cancelled
        }
        Err(err) => {
            let err = RenderError::Engine {
                page: spec.page,
                source: err,
            };
            tracing::warn!(job = spec.id, "{}", err);
            match owned {
                Some(slot) => {
                    slot.failed = true;
                    JobStatus::Failed
                }
                None => JobStatus::Cancelled,
            }
        }
    }
}

async fn paint(
    document: &DocumentHandle,
    spec: &JobSpec,
    token: &CancellationToken,
) -> Result<RasterSurface, EngineError> {
    let geometry = document.get_page(spec.page).await?;
    if geometry.width <= 0.0 {
        return Err(EngineError::Render(format!(
            "page {} has zero width",
            spec.page
        )));
    }

    let scale = spec.target_width / geometry.width;
    let raster_scale = scale * spec.device_pixel_ratio;
    let raster = document
        .engine_document()
        .render(spec.page, raster_scale, token)
        .await?;

    Ok(RasterSurface::from_raster(raster, spec.target_width, geometry.aspect()))
}
