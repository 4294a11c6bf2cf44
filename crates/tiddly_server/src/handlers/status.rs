use crate::auth::{Identity, RequireAdmin};
use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse, Json},
    routing::get,
};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::error;

const GUEST: &str = "GUEST";

/// Shared state for status handlers
#[derive(Clone)]
pub struct StatusState {
    pub index_path: Arc<PathBuf>,
}

/// Server status in the shape the TiddlyWeb client expects
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub username: String,
    pub space: Space,
}

#[derive(Debug, Serialize)]
pub struct Space {
    pub recipe: &'static str,
}

/// Create status routes
pub fn status_routes(state: StatusState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(|| async { "OK" }))
        .route("/status", get(get_status))
        .route("/auth", get(get_auth))
        .with_state(state)
}

/// GET / - The wiki shell
async fn index(State(state): State<StatusState>, RequireAdmin(_): RequireAdmin) -> impl IntoResponse {
    match tokio::fs::read_to_string(&*state.index_path).await {
        Ok(page) => Html(page).into_response(),
        Err(e) => {
            error!("Failed to read {:?}: {}", state.index_path, e);
            (StatusCode::NOT_FOUND, "not found").into_response()
        }
    }
}

/// GET /status - Who the client is logged in as
async fn get_status(Identity(identity): Identity) -> Json<StatusResponse> {
    Json(StatusResponse {
        username: identity.unwrap_or_else(|| GUEST.to_string()),
        space: Space { recipe: "all" },
    })
}

/// GET /auth - Human-readable login check
async fn get_auth(Identity(identity): Identity) -> Html<String> {
    let name = escape(identity.as_deref().unwrap_or(GUEST));
    Html(format!(
        "<html>\nYou are logged in as {name}.\n\n<a href=\"/\">Main page</a>.\n"
    ))
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
