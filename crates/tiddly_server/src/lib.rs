//! Tiddly Server
//!
//! HTTP front end for a TiddlyWiki backed by [`tiddly_core`], plus the job
//! that mirrors the store into a git repository.
//!
//! ## Binaries
//!
//! - `tiddly-server`: the TiddlyWeb-compatible JSON API
//! - `tiddly-mirror`: `GET /` runs one mirror pass
//!
//! ## Environment Variables
//!
//! - `HOST`: Server host (default: 0.0.0.0)
//! - `PORT`: Server port (default: 8080)
//! - `DATABASE_PATH`: Path to SQLite database (default: ./tiddly.db)
//! - `INDEX_PATH`: Wiki shell served at `/` (default: ./index.html)
//! - `ADMIN_HEADER`: Identity header set by the fronting proxy
//!   (default: X-Goog-Authenticated-User-Email)
//! - `ADMIN_EMAILS`: Comma-separated admin identities (default: any)
//! - `CORS_ORIGINS`: Comma-separated list of allowed origins
//! - `MAX_BODY_BYTES`: Largest accepted request body (default: 32 MiB)
//! - `GITHTTP_URL`, `GITHTTP_USERNAME`, `GITHTTP_PASSWORD`: Mirror remote
//!   (required by `tiddly-mirror`)
//! - `MIRROR_DIR`: Local clone directory (default: /tmp/gitbackup)
//! - `MIRROR_TIMEOUT_SECS`: Budget for one mirror run (default: 120)

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod serve;

pub use config::{Config, MirrorConfig};
