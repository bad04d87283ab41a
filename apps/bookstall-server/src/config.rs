//! Configuration management for Bookstall Server

use std::env;
use std::time::Duration;

use thiserror::Error;

/// Development-only secret used when `SESSION_SECRET` is unset in debug builds
const DEV_SESSION_SECRET: &str = "bookstall-dev-secret-change-me";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable {0}")]
    Missing(&'static str),

    #[error("Invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub proxy: ProxyConfig,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
}

#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// OAuth client id Google ID tokens must be issued for
    pub google_client_id: String,
    pub tokeninfo_url: String,
    pub session_secret: String,
    /// Lowercased emails allowed to manage the catalog
    pub admin_emails: Vec<String>,
    pub cookie_secure: bool,
}

impl AuthConfig {
    pub fn is_admin(&self, email: &str) -> bool {
        let email = email.trim().to_lowercase();
        self.admin_emails.iter().any(|admin| *admin == email)
    }
}

#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// Time allowed for the upstream to answer with headers
    pub timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 3001,
            },
            database: DatabaseConfig {
                url: "sqlite:./bookstall.db".to_string(),
            },
            auth: AuthConfig {
                google_client_id: String::new(),
                tokeninfo_url: "https://oauth2.googleapis.com/tokeninfo".to_string(),
                session_secret: DEV_SESSION_SECRET.to_string(),
                admin_emails: Vec::new(),
                cookie_secure: false,
            },
            proxy: ProxyConfig {
                timeout: Duration::from_secs(60),
            },
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Config::default();

        let port = match env::var("SERVER_PORT") {
            Ok(value) => value.parse().map_err(|_| ConfigError::Invalid {
                name: "SERVER_PORT",
                value,
            })?,
            Err(_) => defaults.server.port,
        };

        let session_secret = match env::var("SESSION_SECRET") {
            Ok(secret) if !secret.is_empty() => secret,
            _ if cfg!(debug_assertions) => {
                tracing::warn!("SESSION_SECRET not set, using development secret");
                defaults.auth.session_secret
            }
            _ => return Err(ConfigError::Missing("SESSION_SECRET")),
        };

        let proxy_timeout = match env::var("PROXY_TIMEOUT_SECS") {
            Ok(value) => value
                .parse()
                .map(Duration::from_secs)
                .map_err(|_| ConfigError::Invalid {
                    name: "PROXY_TIMEOUT_SECS",
                    value,
                })?,
            Err(_) => defaults.proxy.timeout,
        };

        Ok(Config {
            server: ServerConfig {
                host: env::var("SERVER_HOST").unwrap_or(defaults.server.host),
                port,
            },
            database: DatabaseConfig {
                url: env::var("DATABASE_URL").unwrap_or(defaults.database.url),
            },
            auth: AuthConfig {
                google_client_id: env::var("GOOGLE_CLIENT_ID").unwrap_or_default(),
                tokeninfo_url: env::var("GOOGLE_TOKENINFO_URL").unwrap_or(defaults.auth.tokeninfo_url),
                session_secret,
                admin_emails: env::var("ADMIN_EMAILS")
                    .map(|list| parse_emails(&list))
                    .unwrap_or_default(),
                cookie_secure: env::var("COOKIE_SECURE")
                    .map(|v| matches!(v.as_str(), "1" | "true" | "yes"))
                    .unwrap_or(false),
            },
            proxy: ProxyConfig {
                timeout: proxy_timeout,
            },
        })
    }
}

fn parse_emails(list: &str) -> Vec<String> {
    list.split(',')
        .map(|email| email.trim().to_lowercase())
        .filter(|email| !email.is_empty())
        .collect()
}
