//! WebSocket upgrade endpoint.

use crate::metrics::RelayMetrics;
use crate::server::{ClipRelay, SlotError};
use crate::session;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::ConnectInfo;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Extension;
use std::net::SocketAddr;
use std::sync::Arc;

/// Admit or refuse an upgrade, then hand the socket to a session.
///
/// Refuses with 429 when the client IP exceeds its upgrade quota and with 503
/// when the relay is full or shutting down. An admitted upgrade holds one
/// connection slot until its session ends.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Extension(relay): Extension<Arc<ClipRelay>>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
) -> Response {
    let remote = connect_info.map(|ConnectInfo(addr)| addr);

    if let Some(addr) = remote {
        if let Err(e) = relay.rate_limits().check_connection(addr.ip()) {
            RelayMetrics::incr(&relay.metrics().rate_limit_hits);
            tracing::warn!("Refusing upgrade from {}: {}", addr.ip(), e);
            return (StatusCode::TOO_MANY_REQUESTS, e.to_string()).into_response();
        }
    }

    let slot = match relay.try_reserve_slot() {
        Ok(slot) => slot,
        Err(SlotError::Full) => {
            tracing::warn!(
                "Refusing upgrade: {} connections open",
                relay.config().websocket.max_connections
            );
            return (StatusCode::SERVICE_UNAVAILABLE, "relay is full").into_response();
        }
        Err(SlotError::Closed) => {
            return (StatusCode::SERVICE_UNAVAILABLE, "relay is shutting down").into_response();
        }
    };

    let write_buffer_size = relay.config().websocket.write_buffer_size;
    let max_message_size = relay.config().websocket.max_message_size;

    ws.write_buffer_size(write_buffer_size)
        .max_message_size(max_message_size)
        .on_failed_upgrade(|e| tracing::warn!("WebSocket upgrade failed: {}", e))
        .on_upgrade(move |socket| async move {
            session::serve(socket, relay, remote).await;
            drop(slot);
        })
}
