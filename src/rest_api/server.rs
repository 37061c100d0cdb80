//! Axum HTTP server exposing `/health` and `/metrics`

use std::net::SocketAddr;

use axum::{
    http::{header, StatusCode},
    response::IntoResponse,
    routing::get,
    Router,
};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::error::{Error, Result};
use crate::unsealer::{metrics, ShutdownSignal};

/// Liveness endpoint handler
async fn health_handler() -> &'static str {
    "ok"
}

/// Metrics endpoint handler
async fn metrics_handler() -> impl IntoResponse {
    match metrics::encode() {
        Ok(body) => (
            StatusCode::OK,
            [(
                header::CONTENT_TYPE,
                "application/openmetrics-text; version=1.0.0; charset=utf-8",
            )],
            body,
        )
            .into_response(),
        Err(e) => {
            error!("Failed to encode metrics: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

pub fn router() -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .layer(TraceLayer::new_for_http())
}

/// Bind the listener up front so a bad address aborts startup
pub async fn bind(addr: SocketAddr) -> Result<TcpListener> {
    TcpListener::bind(addr)
        .await
        .map_err(|e| Error::ConfigError(format!("Failed to bind to {}: {}", addr, e)))
}

/// Serve until `shutdown` fires
pub async fn run_server(listener: TcpListener, mut shutdown: ShutdownSignal) -> Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!("Metrics server listening on {}", addr);
    }

    axum::serve(listener, router())
        .with_graceful_shutdown(async move { shutdown.triggered().await })
        .await
        .map_err(|e| Error::ConfigError(format!("Server error: {}", e)))?;

    info!("Metrics server stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::unsealer::shutdown_channel;
    use std::time::Duration;

    #[tokio::test]
    async fn test_health_handler() {
        assert_eq!(health_handler().await, "ok");
    }

    #[tokio::test]
    async fn test_metrics_handler_succeeds() {
        metrics::record_pass("https://server-test:8200", "already_unsealed");
        let response = metrics_handler().await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_server_stops_on_shutdown() {
        let (trigger, signal) = shutdown_channel();
        let listener = bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let server = tokio::spawn(run_server(listener, signal));

        trigger.trigger();
        let result = tokio::time::timeout(Duration::from_secs(5), server)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
    }
}
