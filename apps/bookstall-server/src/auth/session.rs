//! Signed session cookies
//!
//! Cookie value: `base64url(json(claims)) "." hex(hmac_sha256(secret, payload))`.
//! A value that fails to parse, verify or is past its expiry is treated as
//! no session at all.

use axum::http::{header, HeaderMap};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{Duration, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::db::User;
use crate::error::{AppError, Result};

type HmacSha256 = Hmac<Sha256>;

pub const SESSION_COOKIE: &str = "user_session";

/// Session lifetime, also used as the cookie's Max-Age
pub const SESSION_TTL_SECS: i64 = 7 * 24 * 60 * 60;

/// The safe user object carried by the session and returned to clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionUser {
    pub id: String,
    pub email: String,
    pub name: Option<String>,
    pub picture: Option<String>,
}

impl From<User> for SessionUser {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            name: user.name,
            picture: user.picture,
        }
    }
}

#[derive(Serialize, Deserialize)]
struct SessionClaims {
    user: SessionUser,
    /// Unix seconds
    exp: i64,
}

/// Signs and verifies session cookie values
#[derive(Clone)]
pub struct SessionSigner {
    key: Vec<u8>,
}

impl SessionSigner {
    pub fn new(secret: &str) -> Self {
        Self {
            key: secret.as_bytes().to_vec(),
        }
    }

    fn mac(&self, payload: &str) -> Option<HmacSha256> {
        let mut mac = HmacSha256::new_from_slice(&self.key).ok()?;
        mac.update(payload.as_bytes());
        Some(mac)
    }

    pub fn sign(&self, user: &SessionUser) -> Result<String> {
        let claims = SessionClaims {
            user: user.clone(),
            exp: (Utc::now() + Duration::seconds(SESSION_TTL_SECS)).timestamp(),
        };
        let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims)?);
        let mac = self
            .mac(&payload)
            .ok_or_else(|| AppError::Internal("Invalid session key".to_string()))?;
        let signature = hex::encode(mac.finalize().into_bytes());
        Ok(format!("{}.{}", payload, signature))
    }

    pub fn verify(&self, value: &str) -> Option<SessionUser> {
        let (payload, signature) = value.rsplit_once('.')?;
        let signature = hex::decode(signature).ok()?;
        self.mac(payload)?.verify_slice(&signature).ok()?;

        let json = URL_SAFE_NO_PAD.decode(payload).ok()?;
        let claims: SessionClaims = serde_json::from_slice(&json).ok()?;
        if claims.exp <= Utc::now().timestamp() {
            return None;
        }
        Some(claims.user)
    }
}

/// `Set-Cookie` value establishing a session
pub fn session_cookie(value: &str, secure: bool) -> String {
    format!(
        "{}={}; HttpOnly; SameSite=Lax; Path=/; Max-Age={}{}",
        SESSION_COOKIE,
        value,
        SESSION_TTL_SECS,
        if secure { "; Secure" } else { "" }
    )
}

/// `Set-Cookie` value removing the session
pub fn clear_session_cookie(secure: bool) -> String {
    format!(
        "{}=; HttpOnly; SameSite=Lax; Path=/; Max-Age=0{}",
        SESSION_COOKIE,
        if secure { "; Secure" } else { "" }
    )
}

/// Value of the named cookie from the request's `Cookie` headers
pub fn cookie_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value)
}
