use std::sync::Arc;
use tiddly_core::mirror::set_transport_timeouts;
use tiddly_core::{MirrorEngine, SqliteStore};
use tiddly_server::{
    config::MirrorConfig,
    handlers::{mirror::MirrorState, mirror_routes},
    serve::{init_tracing, shutdown_signal},
};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    init_tracing();

    // Load configuration; missing remote settings are fatal
    let config = match MirrorConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    info!("Starting Tiddly Mirror v{}", env!("CARGO_PKG_VERSION"));
    info!("Database path: {:?}", config.database_path);
    info!("Remote: {}", config.remote_url);
    info!("Clone directory: {:?}", config.work_dir);

    // Before any git work starts; the setting is process-wide.
    if let Err(e) = set_transport_timeouts(config.timeout) {
        error!("Failed to set git transport timeouts: {}", e);
        std::process::exit(1);
    }

    let store = match SqliteStore::open(&config.database_path) {
        Ok(s) => Arc::new(s),
        Err(e) => {
            error!("Failed to open database: {}", e);
            std::process::exit(1);
        }
    };

    let state = MirrorState {
        engine: Arc::new(MirrorEngine::new(store, config.settings())),
        timeout: config.timeout,
    };

    let app = mirror_routes(state).layer(TraceLayer::new_for_http());

    let addr = config.server_addr();
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            error!("Failed to bind to {}: {}", addr, e);
            std::process::exit(1);
        }
    };

    info!("Mirror listening on http://{}", addr);

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!("Server error: {}", e);
        std::process::exit(1);
    }

    info!("Mirror shut down gracefully");
}
