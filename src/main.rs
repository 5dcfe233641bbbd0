//! Job Application Backend
//!
//! A REST API server that runs job application workflows against the
//! extraction, retrieval and filling services and reports the outcome.

use axum::{
    extract::Request,
    middleware::Next,
    response::Response,
    routing::{get, post},
    Router,
};
use job_application_backend::api;
use job_application_backend::config::{Config, SessionBackend};
use job_application_backend::session::{InMemorySessionStore, SessionStore, SqliteSessionStore};
use job_application_backend::stages::{
    ChannelProvider, HttpChannelProvider, HttpCollaborator, LocalChannelProvider,
};
use job_application_backend::state::AppState;
use job_application_backend::workflow::{Collaborators, Orchestrator};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, info_span, Instrument};
use uuid::Uuid;

/// Request ID middleware - adds unique ID to each request for tracing
async fn request_id_middleware(request: Request, next: Next) -> Response {
    let request_id = Uuid::new_v4().to_string();
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = Instant::now();

    let span = info_span!(
        "request",
        request_id = %request_id,
        method = %method,
        uri = %uri,
    );

    let response = next.run(request).instrument(span).await;

    let duration = start.elapsed();
    info!(
        request_id = %request_id,
        method = %method,
        uri = %uri,
        status = %response.status().as_u16(),
        duration_ms = duration.as_millis(),
        "Request completed"
    );

    response
}

/// Build the collaborator clients from the configured service endpoints
fn build_collaborators(config: &Config) -> Collaborators {
    let client = reqwest::Client::new();
    let services = &config.services;

    let channels: Arc<dyn ChannelProvider> = match &services.automation_url {
        Some(url) => {
            info!("Using automation channel service at {}", url);
            Arc::new(HttpChannelProvider::with_client(client.clone(), url))
        }
        None => {
            info!("No automation channel service configured, minting channels locally");
            Arc::new(LocalChannelProvider::new())
        }
    };

    Collaborators {
        extraction: Arc::new(HttpCollaborator::with_client(
            client.clone(),
            &services.extraction_url,
        )),
        retrieval: Arc::new(HttpCollaborator::with_client(
            client.clone(),
            &services.retrieval_url,
        )),
        filling: Arc::new(HttpCollaborator::with_client(client, &services.filling_url)),
        channels,
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // Load configuration
    let config = Config::from_env()?;
    info!("Configuration loaded: {:?}", config);

    let store: Arc<dyn SessionStore> = match config.session.backend {
        SessionBackend::Memory => Arc::new(InMemorySessionStore::new()),
        SessionBackend::Sqlite => Arc::new(SqliteSessionStore::new(&config.session.db_path).await?),
    };

    let orchestrator = Orchestrator::new(
        build_collaborators(&config),
        store,
        config.orchestrator.clone(),
    )?;
    let app_state = Arc::new(AppState::new(Arc::new(orchestrator)));

    // Build our application with routes
    let app = Router::new()
        .route("/api/health", get(api::health))
        .route("/api/config", get(api::get_config))
        // Workflow runs
        .route("/api/apply", post(api::apply))
        .route("/api/apply/stream", post(api::apply_stream))
        .route("/api/runs/:id", get(api::get_run).delete(api::delete_run))
        .route("/api/runs/:id/cancel", post(api::cancel_run))
        // Middleware (order matters - request_id should be first)
        .layer(axum::middleware::from_fn(request_id_middleware))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                tracing::info_span!(
                    "http_request",
                    method = %request.method(),
                    uri = %request.uri(),
                )
            }),
        )
        .layer(CorsLayer::permissive()) // Allow CORS for development
        .with_state(app_state);

    // Bind to address from config
    let addr: SocketAddr = config
        .server_addr()
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid server address: {}", e))?;

    info!("Server running on http://{}", addr);
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let listener = tokio::net::TcpListener::bind(&addr).await?;

    // Setup graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Handle graceful shutdown signals (Ctrl+C, SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down gracefully...");
        },
        _ = terminate => {
            info!("Received SIGTERM, shutting down gracefully...");
        },
    }
}
