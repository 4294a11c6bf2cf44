use crate::auth::RequireAdmin;
use crate::error::ApiError;
use axum::{
    Router,
    body::Bytes,
    extract::{DefaultBodyLimit, Path, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Json},
    routing::{delete, get},
};
use serde_json::{Map, Value};
use tiddly_core::fingerprint::parse_etag;
use tiddly_core::{Expect, TiddlyError, Wiki};
use tracing::debug;

/// Shared state for tiddler handlers
#[derive(Clone)]
pub struct TiddlerState {
    pub wiki: Wiki,
    /// Largest accepted request body, in bytes
    pub max_body_bytes: usize,
}

/// Create tiddler routes.
///
/// Both the short paths and the TiddlyWeb paths the client syncer uses are
/// served. Titles may contain `/`, so they are captured as a wildcard.
pub fn tiddler_routes(state: TiddlerState) -> Router {
    let body_limit = DefaultBodyLimit::max(state.max_body_bytes);
    Router::new()
        .route("/tiddlers.json", get(list_tiddlers))
        .route(
            "/tiddlers/{*title}",
            get(get_tiddler).put(put_tiddler).delete(delete_tiddler),
        )
        .route("/recipes/all/tiddlers.json", get(list_tiddlers))
        .route(
            "/recipes/all/tiddlers/{*title}",
            get(get_tiddler).put(put_tiddler),
        )
        .route("/bags/bag/tiddlers/{*title}", delete(delete_tiddler))
        .layer(body_limit)
        .with_state(state)
}

/// Run a blocking store call off the async runtime.
async fn blocking<T, F>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> tiddly_core::Result<T> + Send + 'static,
    T: Send + 'static,
{
    Ok(tokio::task::spawn_blocking(f).await??)
}

/// GET /tiddlers.json - Skinny listing of every live tiddler
async fn list_tiddlers(
    State(state): State<TiddlerState>,
    RequireAdmin(_): RequireAdmin,
) -> Result<Json<Vec<Map<String, Value>>>, ApiError> {
    let listing = blocking(move || Ok(state.wiki.list()?.collect::<Vec<_>>())).await?;
    debug!("Listing {} tiddlers", listing.len());
    Ok(Json(listing))
}

/// GET /tiddlers/{title} - Full tiddler with its body
async fn get_tiddler(
    State(state): State<TiddlerState>,
    RequireAdmin(_): RequireAdmin,
    Path(title): Path<String>,
) -> Result<Json<Map<String, Value>>, ApiError> {
    let tiddler = blocking({
        let title = title.clone();
        move || state.wiki.get(&title)
    })
    .await?;

    // A deleted tiddler is gone as far as the client is concerned.
    if tiddler.is_tombstone() {
        return Err(TiddlyError::NotFound(title).into());
    }
    Ok(Json(tiddler.to_json_object()))
}

/// PUT /tiddlers/{title} - Store a new revision
///
/// An `If-Match` header carrying an Etag from an earlier write makes the
/// write conditional on that revision still being current.
async fn put_tiddler(
    State(state): State<TiddlerState>,
    RequireAdmin(user): RequireAdmin,
    Path(title): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let expect = match headers.get(header::IF_MATCH) {
        Some(value) => {
            let value = value
                .to_str()
                .map_err(|_| TiddlyError::BadRequest("If-Match is not valid text".into()))?;
            let (etag_title, revision) = parse_etag(value)?;
            if etag_title != title {
                return Err(TiddlyError::BadRequest(format!(
                    "If-Match names '{etag_title}', not '{title}'"
                ))
                .into());
            }
            Expect::Revision(revision)
        }
        None => Expect::Any,
    };

    debug!("{} writing '{}'", user, title);
    let outcome = blocking(move || state.wiki.put(&title, &body, expect)).await?;
    Ok((StatusCode::OK, [(header::ETAG, outcome.etag)]))
}

/// DELETE /tiddlers/{title} - Tombstone a tiddler
async fn delete_tiddler(
    State(state): State<TiddlerState>,
    RequireAdmin(user): RequireAdmin,
    Path(title): Path<String>,
) -> Result<StatusCode, ApiError> {
    debug!("{} deleting '{}'", user, title);
    blocking(move || state.wiki.delete(&title)).await?;
    Ok(StatusCode::OK)
}
