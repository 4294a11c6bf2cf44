use std::env;
use std::path::PathBuf;
use std::time::Duration;

use axum::http::HeaderName;
use thiserror::Error;
use tiddly_core::{Credentials, MirrorSettings};

/// Request body limit when `MAX_BODY_BYTES` is unset.
pub const DEFAULT_MAX_BODY_BYTES: usize = 32 * 1024 * 1024;

/// API server configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Server host (default: 0.0.0.0)
    pub host: String,
    /// Server port (default: 8080)
    pub port: u16,
    /// Database file path (default: ./tiddly.db)
    pub database_path: PathBuf,
    /// Wiki shell served at `/` (default: ./index.html)
    pub index_path: PathBuf,
    /// Header carrying the identity set by the fronting proxy
    pub admin_header: HeaderName,
    /// Identities allowed to use the API; empty admits any identity the
    /// proxy forwards
    pub admin_emails: Vec<String>,
    /// CORS allowed origins (comma-separated)
    pub cors_origins: Vec<String>,
    /// Largest accepted request body in bytes (default: 32 MiB)
    pub max_body_bytes: usize,
}

/// Mirror job configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct MirrorConfig {
    /// Server host (default: 0.0.0.0)
    pub host: String,
    /// Server port (default: 8080)
    pub port: u16,
    /// Database file path shared with the API server (default: ./tiddly.db)
    pub database_path: PathBuf,
    /// Remote repository URL (required)
    pub remote_url: String,
    /// Basic auth for the remote (both required)
    pub credentials: Credentials,
    /// Local clone directory (default: /tmp/gitbackup)
    pub work_dir: PathBuf,
    /// Budget for one run (default: 120 seconds)
    pub timeout: Duration,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable {0}")]
    Missing(&'static str),
    #[error("Invalid {name} environment variable: {value:?}")]
    Invalid { name: &'static str, value: String },
}

/// Settings every binary shares.
struct Common {
    host: String,
    port: u16,
    database_path: PathBuf,
}

impl Common {
    fn load(var: &impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let host = var("HOST").unwrap_or_else(|| "0.0.0.0".to_string());
        let port = match var("PORT") {
            Some(value) => value
                .parse()
                .map_err(|_| ConfigError::Invalid { name: "PORT", value })?,
            None => 8080,
        };
        let database_path =
            PathBuf::from(var("DATABASE_PATH").unwrap_or_else(|| "./tiddly.db".to_string()));
        Ok(Common {
            host,
            port,
            database_path,
        })
    }
}

fn split_list(value: Option<String>) -> Vec<String> {
    value
        .unwrap_or_default()
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn required(
    var: &impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<String, ConfigError> {
    var(name)
        .filter(|v| !v.is_empty())
        .ok_or(ConfigError::Missing(name))
}

fn process_env(name: &str) -> Option<String> {
    env::var(name).ok()
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(process_env)
    }

    /// Load configuration from an arbitrary variable lookup
    pub fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let Common {
            host,
            port,
            database_path,
        } = Common::load(&var)?;

        let index_path =
            PathBuf::from(var("INDEX_PATH").unwrap_or_else(|| "./index.html".to_string()));

        let header = var("ADMIN_HEADER")
            .unwrap_or_else(|| "X-Goog-Authenticated-User-Email".to_string());
        let admin_header = HeaderName::from_bytes(header.as_bytes()).map_err(|_| {
            ConfigError::Invalid {
                name: "ADMIN_HEADER",
                value: header.clone(),
            }
        })?;

        let max_body_bytes = match var("MAX_BODY_BYTES") {
            Some(value) => value.parse().map_err(|_| ConfigError::Invalid {
                name: "MAX_BODY_BYTES",
                value,
            })?,
            None => DEFAULT_MAX_BODY_BYTES,
        };

        Ok(Config {
            host,
            port,
            database_path,
            index_path,
            admin_header,
            admin_emails: split_list(var("ADMIN_EMAILS")),
            cors_origins: split_list(var("CORS_ORIGINS")),
            max_body_bytes,
        })
    }

    /// Get the server address
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl MirrorConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(process_env)
    }

    /// Load configuration from an arbitrary variable lookup
    pub fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let Common {
            host,
            port,
            database_path,
        } = Common::load(&var)?;

        let remote_url = required(&var, "GITHTTP_URL")?;
        let credentials = Credentials {
            username: required(&var, "GITHTTP_USERNAME")?,
            password: required(&var, "GITHTTP_PASSWORD")?,
        };

        let work_dir =
            PathBuf::from(var("MIRROR_DIR").unwrap_or_else(|| "/tmp/gitbackup".to_string()));
        let timeout = match var("MIRROR_TIMEOUT_SECS") {
            Some(value) => Duration::from_secs(value.parse().map_err(|_| ConfigError::Invalid {
                name: "MIRROR_TIMEOUT_SECS",
                value,
            })?),
            None => Duration::from_secs(120),
        };

        Ok(MirrorConfig {
            host,
            port,
            database_path,
            remote_url,
            credentials,
            work_dir,
            timeout,
        })
    }

    /// Settings for the core mirror engine
    pub fn settings(&self) -> MirrorSettings {
        MirrorSettings {
            remote_url: self.remote_url.clone(),
            credentials: Some(self.credentials.clone()),
            work_dir: self.work_dir.clone(),
            timeout: self.timeout,
        }
    }

    /// Get the server address
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
