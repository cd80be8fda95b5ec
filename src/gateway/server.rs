//! HTTP application assembly and serving

use super::handler::{api_router, USER_HEADER};
use crate::assistant::Assistant;
use crate::error::{Error, Result};
use axum::{
    http::{header, HeaderName, Method},
    Router,
};
use std::future::Future;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Build the complete HTTP application
///
/// Adds CORS and request tracing around the API router and returns a single
/// `Router` ready to be served by `axum::serve`.
pub fn build_app(assistant: Assistant, cors_origins: &[String]) -> Router {
    api_router(assistant)
        .layer(build_cors(cors_origins))
        .layer(TraceLayer::new_for_http())
}

/// Bind `host:port` and serve until `shutdown` resolves.
///
/// The assistant's background workers are stopped after the listener closes.
pub async fn serve<F>(assistant: Assistant, host: &str, port: u16, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| Error::Gateway(format!("Failed to bind {}: {}", addr, e)))?;

    let app = build_app(assistant.clone(), &assistant.config().gateway.cors_origins);
    tracing::info!(address = %addr, "Memoria gateway listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| Error::Gateway(format!("Server error: {}", e)))?;

    assistant.shutdown().await;
    tracing::info!("Memoria gateway stopped");
    Ok(())
}

/// Resolves on Ctrl+C
pub async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
}

fn build_cors(origins: &[String]) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::PUT,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            header::ACCEPT,
            HeaderName::from_static(USER_HEADER),
        ]);

    if origins.is_empty() {
        cors.allow_origin(Any)
    } else {
        let parsed: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();
        cors.allow_origin(parsed)
    }
}
