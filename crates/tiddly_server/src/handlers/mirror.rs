use axum::{
    Router,
    extract::State,
    http::StatusCode,
    routing::get,
};
use std::sync::Arc;
use std::time::Duration;
use tiddly_core::MirrorEngine;
use tracing::{error, info, warn};

/// Shared state for the mirror trigger
#[derive(Clone)]
pub struct MirrorState {
    pub engine: Arc<MirrorEngine>,
    /// Upper bound on how long the trigger waits, including time spent
    /// queued behind a run already in progress.
    pub timeout: Duration,
}

/// Create mirror routes
pub fn mirror_routes(state: MirrorState) -> Router {
    Router::new()
        .route("/", get(trigger))
        .route("/health", get(|| async { "OK" }))
        .with_state(state)
}

/// GET / - Run one mirror pass (called by the scheduler)
async fn trigger(State(state): State<MirrorState>) -> (StatusCode, String) {
    let engine = state.engine.clone();
    let run = tokio::task::spawn_blocking(move || engine.run());

    match tokio::time::timeout(state.timeout, run).await {
        Ok(Ok(Ok(report))) => {
            info!(
                "Mirror run done: {} written, {} skipped, commit {:?}, pushed {}",
                report.written, report.skipped, report.commit, report.pushed
            );
            (StatusCode::OK, "OK\n".to_string())
        }
        Ok(Ok(Err(e))) if e.is_retryable() => {
            warn!("Mirror run failed, retryable: {}", e);
            (StatusCode::SERVICE_UNAVAILABLE, format!("{e}\n"))
        }
        Ok(Ok(Err(e))) => {
            error!("Mirror run failed: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, format!("{e}\n"))
        }
        Ok(Err(e)) => {
            error!("Mirror task panicked: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "mirror task failed\n".to_string())
        }
        Err(_) => {
            // The run keeps going in the background and still holds the
            // clone, so the next trigger waits for it.
            warn!("Mirror run exceeded {:?}", state.timeout);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                format!("mirror run exceeded {:?}\n", state.timeout),
            )
        }
    }
}
