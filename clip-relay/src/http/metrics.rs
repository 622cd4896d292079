//! Prometheus metrics endpoint.

use crate::server::ClipRelay;
use axum::{http::header::CONTENT_TYPE, response::IntoResponse, Extension};
use std::sync::Arc;

/// Prometheus metrics handler.
///
/// Returns metrics in Prometheus text format.
/// Includes both gauges (current state) and counters (monotonic since startup).
pub async fn metrics_handler(Extension(relay): Extension<Arc<ClipRelay>>) -> impl IntoResponse {
    let m = relay.metrics().snapshot();

    // Gauges: current state, zero once the hub has stopped
    let stats = relay.hub().stats().await.unwrap_or_default();
    let connections = stats.connections;
    let groups = stats.groups;
    let limiter_keys =
        relay.rate_limits().connection_keys_count() + relay.rate_limits().message_keys_count();

    let body = format!(
        r#"# HELP cliprelay_connections_active Number of live WebSocket connections
# TYPE cliprelay_connections_active gauge
cliprelay_connections_active {connections}

# HELP cliprelay_groups_active Number of non-empty key hash groups
# TYPE cliprelay_groups_active gauge
cliprelay_groups_active {groups}

# HELP cliprelay_rate_limiter_keys Number of tracked rate limiter keys
# TYPE cliprelay_rate_limiter_keys gauge
cliprelay_rate_limiter_keys {limiter_keys}

# HELP cliprelay_info Server information
# TYPE cliprelay_info gauge
cliprelay_info{{version="{version}"}} 1

# HELP cliprelay_connections_total Total WebSocket connections accepted
# TYPE cliprelay_connections_total counter
cliprelay_connections_total {conns_total}

# HELP cliprelay_frames_relayed_total Total frames queued to group members
# TYPE cliprelay_frames_relayed_total counter
cliprelay_frames_relayed_total {relayed}

# HELP cliprelay_evictions_total Total connections dropped for a full outbox
# TYPE cliprelay_evictions_total counter
cliprelay_evictions_total {evictions}

# HELP cliprelay_protocol_errors_total Total rejected requests
# TYPE cliprelay_protocol_errors_total counter
cliprelay_protocol_errors_total {protocol_errors}

# HELP cliprelay_decode_errors_total Total undecodable inbound frames
# TYPE cliprelay_decode_errors_total counter
cliprelay_decode_errors_total {decode_errors}

# HELP cliprelay_rate_limit_hits_total Total rate limit rejections
# TYPE cliprelay_rate_limit_hits_total counter
cliprelay_rate_limit_hits_total {rate_limits}
"#,
        version = env!("CARGO_PKG_VERSION"),
        conns_total = m.connections_total,
        relayed = m.frames_relayed,
        evictions = m.evictions_total,
        protocol_errors = m.protocol_errors_total,
        decode_errors = m.decode_errors_total,
        rate_limits = m.rate_limit_hits,
    );

    (
        [(CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
}
