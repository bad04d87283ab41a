//! Reader error types
//!
//! Every async boundary of the reader (load, render, save) classifies its
//! own failures into one of these enums. None of them is allowed to escape
//! as a panic.

use std::time::Duration;

use thiserror::Error;

use crate::engine::EngineError;

/// Document-level load failure. Terminal for the reader session.
#[derive(Debug, Error)]
pub enum LoadError {
    /// Resource could not be reached or answered with an error status
    #[error("Document unreachable: {0}")]
    Unreachable(String),

    /// Bytes arrived but do not form a document the engine can open
    #[error("Invalid document: {0}")]
    InvalidDocument(String),

    /// Response stream broke off before the body was complete
    #[error("Download interrupted after {loaded} bytes: {reason}")]
    Interrupted { loaded: u64, reason: String },

    /// Load did not finish within the configured timeout
    #[error("Document load timed out after {0} seconds")]
    Timeout(u64),
}

/// Per-page paint failure (never a cancellation)
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Page {page} out of range (document has {page_count} pages)")]
    PageOutOfRange { page: u32, page_count: u32 },

    #[error("Invalid target width: {0}")]
    InvalidWidth(f32),

    #[error("Engine error on page {page}: {source}")]
    Engine {
        page: u32,
        #[source]
        source: EngineError,
    },
}

/// Progress store failure
#[derive(Debug, Error)]
pub enum ProgressError {
    /// No session, or the store refused the session
    #[error("Login required")]
    Unauthorized,

    /// Transport failure talking to the store
    #[error("Network error: {0}")]
    Network(String),

    /// Store did not answer within the configured timeout
    #[error("Progress request timed out")]
    Timeout,

    /// Store answered with an unexpected status
    #[error("Progress store rejected request with status {0}")]
    Rejected(u16),
}

impl From<reqwest::Error> for ProgressError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ProgressError::Timeout
        } else {
            ProgressError::Network(err.to_string())
        }
    }
}

/// Failure to mount a reader session
#[derive(Debug, Error)]
pub enum ReaderError {
    #[error("Book {0} not found")]
    BookNotFound(i64),

    #[error("Book {0} has no PDF available")]
    NoDocument(i64),

    #[error("Catalog unavailable: {0}")]
    Catalog(String),

    /// Catalog did not answer within the load timeout
    #[error("Catalog lookup timed out after {0:?}")]
    CatalogTimeout(Duration),

    #[error(transparent)]
    Load(#[from] LoadError),
}
