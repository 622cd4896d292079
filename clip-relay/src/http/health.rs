//! Health check endpoint.

use crate::server::ClipRelay;
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde::Serialize;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Health status response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    /// Overall status.
    pub status: String,
    /// Server version.
    pub version: String,
    /// Unix timestamp (seconds) of this report.
    pub timestamp: u64,
    /// Number of live connections.
    pub clients: usize,
    /// Number of non-empty groups.
    pub groups: usize,
    /// Uptime in seconds.
    pub uptime_seconds: u64,
}

/// Health check handler.
///
/// Reports 503 once the hub has stopped answering.
pub async fn health_handler(
    Extension(relay): Extension<Arc<ClipRelay>>,
) -> (StatusCode, Json<HealthStatus>) {
    let (code, status, stats) = match relay.hub().stats().await {
        Ok(stats) => (StatusCode::OK, "healthy", stats),
        Err(e) => {
            tracing::warn!("Health check failed: {}", e);
            (StatusCode::SERVICE_UNAVAILABLE, "unavailable", Default::default())
        }
    };

    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);

    (
        code,
        Json(HealthStatus {
            status: status.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            timestamp,
            clients: stats.connections,
            groups: stats.groups,
            uptime_seconds: relay.uptime().as_secs(),
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn health_status_serializes() {
        let status = HealthStatus {
            status: "healthy".to_string(),
            version: "0.1.0".to_string(),
            timestamp: 1_700_000_000,
            clients: 42,
            groups: 15,
            uptime_seconds: 3600,
        };

        let json = serde_json::to_string(&status).unwrap();
        assert!(json.contains("\"status\":\"healthy\""));
        assert!(json.contains("\"clients\":42"));
        assert!(json.contains("\"timestamp\":1700000000"));
    }
}
