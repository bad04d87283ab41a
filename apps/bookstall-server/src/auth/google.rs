//! Google ID token verification

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

/// Identity asserted by a verified credential
#[derive(Debug, Clone, PartialEq)]
pub struct VerifiedIdentity {
    /// Stable subject id from the identity provider
    pub subject: String,
    pub email: String,
    pub name: Option<String>,
    pub picture: Option<String>,
}

#[derive(Debug, Error)]
pub enum VerifyError {
    /// Credential was checked and rejected
    #[error("Invalid credential: {0}")]
    Invalid(String),

    /// Credential could not be checked
    #[error("Verification unavailable: {0}")]
    Unavailable(String),
}

/// Verifies a login credential from the sign-in widget
#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    async fn verify(&self, credential: &str) -> Result<VerifiedIdentity, VerifyError>;
}

/// Verifies Google ID tokens through the tokeninfo endpoint
pub struct GoogleTokenVerifier {
    http: reqwest::Client,
    tokeninfo_url: String,
    client_id: String,
}

#[derive(Debug, Deserialize)]
struct TokenInfo {
    aud: String,
    sub: String,
    email: Option<String>,
    /// Google sends this as the string "true"/"false"
    email_verified: Option<String>,
    name: Option<String>,
    picture: Option<String>,
}

impl GoogleTokenVerifier {
    pub fn new(http: reqwest::Client, tokeninfo_url: impl Into<String>, client_id: impl Into<String>) -> Self {
        Self {
            http,
            tokeninfo_url: tokeninfo_url.into(),
            client_id: client_id.into(),
        }
    }
}

#[async_trait]
impl IdentityVerifier for GoogleTokenVerifier {
    async fn verify(&self, credential: &str) -> Result<VerifiedIdentity, VerifyError> {
        if self.client_id.is_empty() {
            return Err(VerifyError::Unavailable("GOOGLE_CLIENT_ID is not configured".to_string()));
        }

        let url = format!("{}?id_token={}", self.tokeninfo_url, urlencoding::encode(credential));
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| VerifyError::Unavailable(format!("Failed to call tokeninfo: {}", e)))?;

        let status = response.status();
        if status.is_server_error() {
            return Err(VerifyError::Unavailable(format!("tokeninfo returned {}", status)));
        }
        if !status.is_success() {
            return Err(VerifyError::Invalid(format!("tokeninfo returned {}", status)));
        }

        let info: TokenInfo = response
            .json()
            .await
            .map_err(|e| VerifyError::Invalid(format!("Unexpected tokeninfo response: {}", e)))?;

        if info.aud != self.client_id {
            return Err(VerifyError::Invalid("token was issued for another client".to_string()));
        }
        if info.email_verified.as_deref() == Some("false") {
            return Err(VerifyError::Invalid("email is not verified".to_string()));
        }
        let email = info
            .email
            .filter(|email| !email.trim().is_empty())
            .ok_or_else(|| VerifyError::Invalid("token carries no email".to_string()))?;

        Ok(VerifiedIdentity {
            subject: info.sub,
            email,
            name: info.name,
            picture: info.picture,
        })
    }
}
