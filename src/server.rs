//! HTTP server: axum router around the request handler

use crate::{
    codec::DefaultImageCodec,
    config::ServerConfig,
    error::{BgRemovalError, Result},
    handler::{HandlerError, RequestHandler},
    remover::ModelRemover,
};
use axum::{
    body::{Body, Bytes},
    extract::{DefaultBodyLimit, State},
    http::{header, HeaderMap, Request},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use tower_http::trace::TraceLayer;

static NEXT_REQUEST_ID: AtomicU64 = AtomicU64::new(1);

/// Build the router serving `config.route` (POST, OPTIONS) and `GET /health`
pub fn router(handler: RequestHandler, config: &ServerConfig) -> Router {
    Router::new()
        .route(
            &config.route,
            post(remove_background).options(preflight),
        )
        .route("/health", get(health))
        .layer(DefaultBodyLimit::max(config.max_body_bytes))
        .layer(TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
            let request_id = NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed);
            tracing::info_span!(
                "request",
                request_id,
                method = %request.method(),
                uri = %request.uri(),
            )
        }))
        .with_state(handler)
}

async fn remove_background(
    State(handler): State<RequestHandler>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let content_length = headers.get(header::CONTENT_LENGTH).cloned();
    let span = tracing::Span::current();

    let result = tokio::task::spawn_blocking(move || {
        let _guard = span.enter();
        handler.handle_post(content_length.as_ref(), &body)
    })
    .await;

    match result {
        Ok(response) => response.into_response(),
        Err(e) => HandlerError::Worker(e.to_string())
            .to_response()
            .into_response(),
    }
}

async fn preflight(State(handler): State<RequestHandler>) -> Response {
    handler.handle_options().into_response()
}

async fn health() -> &'static str {
    "OK"
}

/// Create the model-backed handler described by `config`, loading the model
///
/// # Errors
/// - Invalid configuration
/// - Model loading failures
pub async fn build_handler(config: &ServerConfig) -> Result<RequestHandler> {
    config.validate()?;
    let removal = config.removal.clone();

    let remover = tokio::task::spawn_blocking(move || {
        let remover = ModelRemover::from_config(removal)?;
        remover.initialize()?;
        Ok::<_, BgRemovalError>(remover)
    })
    .await
    .map_err(|e| BgRemovalError::internal(format!("Model loading task failed: {e}")))??;

    Ok(RequestHandler::new(
        Arc::new(remover),
        Arc::new(DefaultImageCodec),
    ))
}

/// Load the model, bind the listener and serve until Ctrl+C or SIGTERM
///
/// # Errors
/// - Invalid configuration or model loading failures
/// - Bind or accept failures
pub async fn serve(config: ServerConfig) -> Result<()> {
    let handler = build_handler(&config).await?;
    serve_handler(handler, &config).await
}

/// Serve an existing handler with the router built from `config`
///
/// # Errors
/// - Bind or accept failures
pub async fn serve_handler(handler: RequestHandler, config: &ServerConfig) -> Result<()> {
    let app = router(handler, config);

    let listener = tokio::net::TcpListener::bind(config.bind_address).await?;
    tracing::info!(
        address = %config.bind_address,
        route = %config.route,
        backend = %config.removal.backend_type,
        "Server listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(e) => {
                tracing::warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("Received Ctrl+C, shutting down"),
        () = terminate => tracing::info!("Received SIGTERM, shutting down"),
    }
}
