//! Reading progress persistence
//!
//! Progress is loaded once when a reader mounts and pushed back on explicit
//! or debounced saves. Loading never fails from the caller's point of
//! view: anything other than a stored page means "start at page 1".

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::ReaderConfig;
use crate::error::ProgressError;

/// Name of the backend's session cookie
pub const SESSION_COOKIE: &str = "user_session";

/// Authenticated user as seen by the reader
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub user_id: String,
    /// Raw `user_session` cookie value issued by the backend
    pub cookie: String,
}

impl Session {
    pub fn new(user_id: impl Into<String>, cookie: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            cookie: cookie.into(),
        }
    }

    fn cookie_header(&self) -> String {
        format!("{}={}", SESSION_COOKIE, self.cookie)
    }
}

/// Inline save indicator state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveStatus {
    Idle,
    Saving,
    Saved,
    Failed(String),
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SaveRequest<'a> {
    user_id: &'a str,
    book_id: i64,
    page: u32,
}

#[derive(Debug, Deserialize)]
struct StoredProgress {
    page: i64,
}

#[derive(Clone)]
pub struct ProgressClient {
    http: reqwest::Client,
    backend: String,
    session: Option<Session>,
    timeout: Duration,
}

impl ProgressClient {
    pub fn new(config: &ReaderConfig, session: Option<Session>) -> Self {
        Self::with_client(reqwest::Client::new(), config, session)
    }

    pub fn with_client(http: reqwest::Client, config: &ReaderConfig, session: Option<Session>) -> Self {
        Self {
            http,
            backend: config.backend().to_string(),
            session,
            timeout: config.progress_timeout,
        }
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    /// Whether saves can succeed at all
    pub fn can_save(&self) -> bool {
        self.session.is_some()
    }

    /// Stored page for `book_id`, or 1 when there is none or the store
    /// cannot be asked.
    pub async fn load(&self, book_id: i64) -> u32 {
        match self.try_load(book_id).await {
            Ok(Some(page)) => page,
            Ok(None) => 1,
            Err(err) => {
                tracing::debug!(book_id, "Progress unavailable, starting at page 1: {}", err);
                1
            }
        }
    }

    async fn try_load(&self, book_id: i64) -> Result<Option<u32>, ProgressError> {
        let Some(session) = &self.session else {
            return Ok(None);
        };

        let url = format!(
            "{}/api/progress?userId={}&bookId={}",
            self.backend,
            urlencoding::encode(&session.user_id),
            book_id
        );
        let request = self
            .http
            .get(&url)
            .header(reqwest::header::COOKIE, session.cookie_header())
            .send();
        let response = self.with_timeout(request).await??;

        match response.status() {
            reqwest::StatusCode::NOT_FOUND => Ok(None),
            reqwest::StatusCode::UNAUTHORIZED | reqwest::StatusCode::FORBIDDEN => {
                Err(ProgressError::Unauthorized)
            }
            status if !status.is_success() => Err(ProgressError::Rejected(status.as_u16())),
            _ => {
                let stored: StoredProgress = self.with_timeout(response.json()).await??;
                Ok(u32::try_from(stored.page).ok().filter(|page| *page >= 1))
            }
        }
    }

    /// Persist `page` for `book_id` under the session user
    pub async fn save(&self, book_id: i64, page: u32) -> Result<(), ProgressError> {
        let session = self.session.as_ref().ok_or(ProgressError::Unauthorized)?;

        let body = SaveRequest {
            user_id: &session.user_id,
            book_id,
            page,
        };
        let request = self
            .http
            .post(format!("{}/api/progress", self.backend))
            .header(reqwest::header::COOKIE, session.cookie_header())
            .json(&body)
            .send();
        let response = self.with_timeout(request).await??;

        match response.status() {
            reqwest::StatusCode::UNAUTHORIZED | reqwest::StatusCode::FORBIDDEN => {
                Err(ProgressError::Unauthorized)
            }
            status if !status.is_success() => Err(ProgressError::Rejected(status.as_u16())),
            _ => {
                tracing::debug!(book_id, page, "Progress saved");
                Ok(())
            }
        }
    }

    async fn with_timeout<T>(&self, future: impl Future<Output = T>) -> Result<T, ProgressError> {
        tokio::time::timeout(self.timeout, future)
            .await
            .map_err(|_| ProgressError::Timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{session, StubBackend};
    use axum::http::StatusCode;

    fn client(base: &str, session: Option<Session>) -> ProgressClient {
        let config = ReaderConfig {
            backend_url: base.to_string(),
            progress_timeout: Duration::from_millis(500),
            ..ReaderConfig::default()
        };
        ProgressClient::new(&config, session)
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let backend = StubBackend::new(Vec::new());
        let base = backend.spawn().await;
        let progress = client(&base, Some(session("reader-1")));

        assert_eq!(progress.load(4).await, 1);
        progress.save(4, 12).await.unwrap();
        assert_eq!(backend.stored_page("reader-1", 4), Some(12));
        assert_eq!(progress.load(4).await, 12);
    }

    #[tokio::test]
    async fn test_anonymous_session_cannot_save() {
        let backend = StubBackend::new(Vec::new());
        let base = backend.spawn().await;
        let progress = client(&base, None);

        assert!(!progress.can_save());
        assert_eq!(progress.load(4).await, 1);
        assert!(matches!(progress.save(4, 2).await, Err(ProgressError::Unauthorized)));
        assert_eq!(backend.save_count(), 0);
    }

    #[tokio::test]
    async fn test_rejected_cookie_is_unauthorized() {
        let backend = StubBackend::new(Vec::new());
        let base = backend.spawn().await;
        let progress = client(&base, Some(Session::new("reader-1", "forged")));

        assert!(matches!(progress.save(1, 3).await, Err(ProgressError::Unauthorized)));
        assert_eq!(progress.load(1).await, 1);
    }

    #[tokio::test]
    async fn test_store_errors_are_classified() {
        let backend = StubBackend::new(Vec::new());
        backend.reject_saves(StatusCode::INTERNAL_SERVER_ERROR);
        let base = backend.spawn().await;
        let progress = client(&base, Some(session("reader-1")));

        assert!(matches!(progress.save(1, 3).await, Err(ProgressError::Rejected(500))));
    }

    #[tokio::test]
    async fn test_slow_store_times_out() {
        let backend = StubBackend::new(Vec::new());
        backend.delay_saves(Duration::from_secs(5));
        let base = backend.spawn().await;
        let progress = client(&base, Some(session("reader-1")));

        assert!(matches!(progress.save(1, 3).await, Err(ProgressError::Timeout)));
    }

    #[tokio::test]
    async fn test_unreachable_store_loads_first_page() {
        let progress = client("http://127.0.0.1:9", Some(session("reader-1")));
        assert_eq!(progress.load(1).await, 1);
        assert!(matches!(progress.save(1, 2).await, Err(ProgressError::Network(_))));
    }
}
