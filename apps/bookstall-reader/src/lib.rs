//! Bookstall Reader
//!
//! Headless PDF reader engine used by the Bookstall reading view.
//!
//! # Modules
//!
//! - `loader`: streams a proxied PDF and opens it through a [`PdfEngine`]
//! - `render`: per-page render jobs with supersession and cancellation
//! - `viewport`: lazy-load membership and current-page tracking
//! - `zoom`: clamped, anchor-preserving zoom and pinch gestures
//! - `progress`: reading progress load/save against the backend
//! - `session`: the mountable reader view composing all of the above

pub mod catalog;
pub mod config;
pub mod engine;
pub mod error;
pub mod layout;
pub mod loader;
pub mod progress;
pub mod render;
pub mod session;
pub mod surface;
pub mod viewport;
pub mod zoom;

#[cfg(test)]
pub(crate) mod testing;

pub use catalog::{BookRecord, CatalogClient};
pub use config::ReaderConfig;
pub use engine::{EngineDocument, EngineError, PageGeometry, PdfEngine, Raster};
pub use error::{LoadError, ProgressError, ReaderError, RenderError};
pub use layout::{PageLayout, Point, ScrollOffset, Size};
pub use loader::{DocumentHandle, DocumentLoader, LoadProgress};
pub use progress::{ProgressClient, SaveStatus, Session};
pub use render::{CancellationToken, JobStatus, RenderHandle, RenderScheduler};
pub use session::{Navigation, ReaderSession};
pub use surface::RasterSurface;
pub use viewport::{PageState, ViewportController, ViewportUpdate};
pub use zoom::{GestureSnapshot, ZoomChange, ZoomController, ZoomState};

#[cfg(feature = "mupdf")]
pub use engine::mupdf::MupdfEngine;
