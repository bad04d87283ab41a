//! Application state management

use std::sync::Arc;

use sqlx::SqlitePool;

use crate::auth::{GoogleTokenVerifier, IdentityVerifier, SessionSigner};
use crate::config::Config;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: Config,
    db: SqlitePool,
    http: reqwest::Client,
    signer: SessionSigner,
    verifier: Arc<dyn IdentityVerifier>,
}

impl AppState {
    /// Create the state with the Google token verifier
    pub fn new(config: Config, db: SqlitePool) -> Self {
        let http = reqwest::Client::new();
        let verifier = Arc::new(GoogleTokenVerifier::new(
            http.clone(),
            config.auth.tokeninfo_url.clone(),
            config.auth.google_client_id.clone(),
        ));
        Self::with_verifier(config, db, http, verifier)
    }

    pub fn with_verifier(
        config: Config,
        db: SqlitePool,
        http: reqwest::Client,
        verifier: Arc<dyn IdentityVerifier>,
    ) -> Self {
        let signer = SessionSigner::new(&config.auth.session_secret);
        Self {
            inner: Arc::new(AppStateInner {
                config,
                db,
                http,
                signer,
                verifier,
            }),
        }
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Get the database pool
    pub fn db(&self) -> &SqlitePool {
        &self.inner.db
    }

    /// Outbound HTTP client (proxy, token verification)
    pub fn http(&self) -> &reqwest::Client {
        &self.inner.http
    }

    pub fn signer(&self) -> &SessionSigner {
        &self.inner.signer
    }

    pub fn verifier(&self) -> &dyn IdentityVerifier {
        self.inner.verifier.as_ref()
    }
}
