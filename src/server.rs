//! Web server module for pingscope.
//!
//! Serves the Prometheus text exposition on the configured metrics path and
//! a liveness probe on `/healthz`.

use axum::{
    Router,
    extract::State,
    http::{StatusCode, header},
    response::IntoResponse,
    routing::get,
};
use prometheus::{Encoder, Registry, TextEncoder};
use thiserror::Error;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::{DefaultMakeSpan, TraceLayer};

use crate::config::WebConfig;

/// Errors from the metrics web server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The listen address could not be bound.
    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        source: std::io::Error,
    },

    /// The server stopped with an I/O error.
    #[error("server error: {0}")]
    Serve(#[from] std::io::Error),
}

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub registry: Registry,
}

/// Create the Axum router.
pub fn create_router(state: AppState, metrics_path: &str) -> Router {
    Router::new()
        .route(metrics_path, get(metrics_handler))
        .route("/healthz", get(healthz_handler))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(tracing::Level::DEBUG)),
        )
        .with_state(state)
}

/// Bind the listen address from the web configuration.
pub async fn bind(config: &WebConfig) -> Result<TcpListener, ServerError> {
    let address = config.bind_address();
    TcpListener::bind(&address)
        .await
        .map_err(|source| ServerError::Bind { address, source })
}

/// Serve `router` on `listener` until `shutdown` is cancelled.
pub async fn serve(
    listener: TcpListener,
    router: Router,
    shutdown: CancellationToken,
) -> Result<(), ServerError> {
    axum::serve(listener, router)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    Ok(())
}

/// GET <metrics_path> - Prometheus text format.
async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = state.registry.gather();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode metrics");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            [(header::CONTENT_TYPE, "text/plain")],
            "encoding error".to_string(),
        );
    }

    match String::from_utf8(buffer) {
        Ok(text) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)],
            text,
        ),
        Err(e) => {
            tracing::error!(error = %e, "Failed to convert metrics to string");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [(header::CONTENT_TYPE, "text/plain")],
                "encoding error".to_string(),
            )
        }
    }
}

/// GET /healthz - Liveness probe.
async fn healthz_handler() -> &'static str {
    "ok"
}

#[cfg(test)]
mod tests {
    use super::*;
    use prometheus::{IntGauge, Opts};

    #[tokio::test]
    async fn test_metrics_handler_encodes_registry() {
        let registry = Registry::new();
        let gauge = IntGauge::with_opts(Opts::new("up", "Test gauge")).unwrap();
        gauge.set(1);
        registry.register(Box::new(gauge)).unwrap();

        let response = metrics_handler(State(AppState { registry }))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            prometheus::TEXT_FORMAT
        );
    }

    #[tokio::test]
    async fn test_bind_reports_address() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let config = WebConfig {
            address: taken.local_addr().unwrap().to_string(),
            ..Default::default()
        };

        let err = bind(&config).await.unwrap_err();
        assert!(matches!(err, ServerError::Bind { .. }));
        assert!(err.to_string().contains(&config.address));
    }

    #[test]
    fn test_router_accepts_validated_metrics_paths() {
        let mut config = crate::config::AppConfig {
            targets: vec![crate::config::TargetConfig::new("192.0.2.1")],
            ..Default::default()
        };
        for path in ["/", "/metrics", "/probe/metrics", "/a:b"] {
            config.web.metrics_path = path.to_string();
            config.validate().unwrap();
            let state = AppState {
                registry: Registry::new(),
            };
            let _router = create_router(state, &config.web.metrics_path);
        }
    }

    #[tokio::test]
    async fn test_healthz() {
        assert_eq!(healthz_handler().await, "ok");
    }
}
