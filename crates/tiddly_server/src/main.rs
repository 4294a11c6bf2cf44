use axum::{
    Router,
    extract::Extension,
    http::{HeaderValue, Method, header},
};
use std::sync::Arc;
use tiddly_core::{SqliteStore, Wiki};
use tiddly_server::{
    auth::AdminGate,
    config::Config,
    handlers::{status::StatusState, status_routes, tiddler_routes, tiddlers::TiddlerState},
    serve::{init_tracing, shutdown_signal},
};
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{error, info};

#[tokio::main]
async fn main() {
    init_tracing();

    // Load configuration
    let config = match Config::from_env() {
        Ok(c) => Arc::new(c),
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    info!("Starting Tiddly Server v{}", env!("CARGO_PKG_VERSION"));
    info!("Database path: {:?}", config.database_path);
    info!("Admin header: {}", config.admin_header);
    info!("CORS origins: {:?}", config.cors_origins);

    // Open the store
    let store = match SqliteStore::open(&config.database_path) {
        Ok(s) => Arc::new(s),
        Err(e) => {
            error!("Failed to open database: {}", e);
            std::process::exit(1);
        }
    };

    let tiddler_state = TiddlerState {
        wiki: Wiki::new(store),
        max_body_bytes: config.max_body_bytes,
    };
    let status_state = StatusState {
        index_path: Arc::new(config.index_path.clone()),
    };
    let gate = AdminGate::new(config.admin_header.clone(), config.admin_emails.clone());

    // Build CORS layer
    let origins: Vec<HeaderValue> = config
        .cors_origins
        .iter()
        .filter_map(|o| o.parse().ok())
        .collect();
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::IF_MATCH])
        .expose_headers([header::ETAG]);
    let cors = if origins.is_empty() {
        cors.allow_origin(Any)
    } else {
        cors.allow_origin(AllowOrigin::list(origins))
    };

    // Build the router
    let app = Router::new()
        .merge(status_routes(status_state))
        .merge(tiddler_routes(tiddler_state))
        .layer(Extension(gate))
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    // Create listener
    let addr = config.server_addr();
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            error!("Failed to bind to {}: {}", addr, e);
            std::process::exit(1);
        }
    };

    info!("Server listening on http://{}", addr);

    // Run server with graceful shutdown
    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!("Server error: {}", e);
        std::process::exit(1);
    }

    info!("Server shut down gracefully");
}
