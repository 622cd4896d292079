//! HTTP endpoints for clip-relay.
//!
//! Provides health checks, metrics, and the WebSocket upgrade route.

pub mod health;
mod metrics;
mod ws;

use crate::server::ClipRelay;
use axum::{routing::get, Extension, Router};
use std::sync::Arc;

pub use health::HealthStatus;

/// Route of the health check.
pub const HEALTH_PATH: &str = "/health";
/// Route of the Prometheus exposition.
pub const METRICS_PATH: &str = "/metrics";

/// Build the HTTP router with all endpoints.
///
/// The WebSocket path must not collide with [`HEALTH_PATH`] or
/// [`METRICS_PATH`]; [`crate::config::Config::validate`] rejects that.
pub fn build_router(relay: Arc<ClipRelay>) -> Router {
    let ws_path = relay.config().websocket.path.clone();
    Router::new()
        .route(HEALTH_PATH, get(health::health_handler))
        .route(METRICS_PATH, get(metrics::metrics_handler))
        .route(&ws_path, get(ws::ws_handler))
        .layer(Extension(relay))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::util::ServiceExt;

    fn test_relay(config: Config) -> Arc<ClipRelay> {
        Arc::new(ClipRelay::new(config))
    }

    async fn get_status(app: Router, uri: &str) -> StatusCode {
        app.oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
            .status()
    }

    #[tokio::test]
    async fn health_endpoint_returns_ok() {
        let app = build_router(test_relay(Config::default()));
        assert_eq!(get_status(app, "/health").await, StatusCode::OK);
    }

    #[tokio::test]
    async fn health_endpoint_unavailable_after_shutdown() {
        let relay = test_relay(Config::default());
        relay.shutdown().await;
        let app = build_router(relay);
        assert_eq!(
            get_status(app, "/health").await,
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[tokio::test]
    async fn metrics_endpoint_returns_ok() {
        let app = build_router(test_relay(Config::default()));
        assert_eq!(get_status(app, "/metrics").await, StatusCode::OK);
    }

    #[tokio::test]
    async fn ws_route_follows_configured_path() {
        let mut config = Config::default();
        config.websocket.path = "/clipboard".to_string();
        let relay = test_relay(config);

        // Without upgrade headers the route exists but refuses the request.
        let status = get_status(build_router(relay.clone()), "/clipboard").await;
        assert_ne!(status, StatusCode::NOT_FOUND);
        assert!(status.is_client_error());

        let status = get_status(build_router(relay), "/ws").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn unknown_route_is_not_found() {
        let app = build_router(test_relay(Config::default()));
        assert_eq!(get_status(app, "/nope").await, StatusCode::NOT_FOUND);
    }
}
