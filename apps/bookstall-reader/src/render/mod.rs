//! Page rendering
//!
//! Render jobs are keyed by page. A page has at most one active job;
//! issuing a new one cancels the previous job before the new paint starts.

mod scheduler;

pub use tokio_util::sync::CancellationToken;
pub use scheduler::{JobId, JobStatus, RenderHandle, RenderScheduler};
