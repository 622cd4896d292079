//! Main ClipRelay server coordination.
//!
//! ClipRelay owns the configuration, the hub handle and the rate limiters.
//! It is constructed once at startup and shared with every handler as an
//! `Arc<ClipRelay>`; there is no global state.

use crate::config::Config;
use crate::error::Result;
use crate::http::build_router;
use crate::hub::Hub;
use crate::limits::RateLimits;
use crate::metrics::RelayMetrics;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};
use tokio::task::JoinHandle;

/// Main relay server.
pub struct ClipRelay {
    config: Config,
    hub: Hub,
    /// Rate limiters for upgrades and messages.
    rate_limits: RateLimits,
    /// Operational metrics (counters), shared with the hub task.
    metrics: Arc<RelayMetrics>,
    /// One permit per admitted connection, held for the connection's lifetime.
    connection_slots: Arc<Semaphore>,
    started_at: Instant,
}

/// Why a connection slot could not be reserved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotError {
    /// `websocket.max_connections` connections are already admitted.
    Full,
    /// The relay is shutting down.
    Closed,
}

impl std::fmt::Debug for ClipRelay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClipRelay")
            .field("config", &self.config)
            .field("rate_limits", &self.rate_limits)
            .field("metrics", &self.metrics)
            .finish_non_exhaustive()
    }
}

impl ClipRelay {
    /// Create a relay and start its hub task.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(config: Config) -> Self {
        let rate_limits = RateLimits::new(&config.limits);
        let metrics = Arc::new(RelayMetrics::default());
        let (hub, task) = Hub::spawn(metrics.clone());
        tokio::spawn(watch_hub(task));
        let slots = config.websocket.max_connections.min(Semaphore::MAX_PERMITS);
        Self {
            config,
            hub,
            rate_limits,
            metrics,
            connection_slots: Arc::new(Semaphore::new(slots)),
            started_at: Instant::now(),
        }
    }

    /// Reserve room for one more connection.
    ///
    /// The slot is released when the returned permit is dropped, so it must
    /// live as long as the connection does.
    pub fn try_reserve_slot(&self) -> std::result::Result<OwnedSemaphorePermit, SlotError> {
        self.connection_slots
            .clone()
            .try_acquire_owned()
            .map_err(|e| match e {
                TryAcquireError::NoPermits => SlotError::Full,
                TryAcquireError::Closed => SlotError::Closed,
            })
    }

    /// Number of connections that can still be admitted.
    pub fn available_slots(&self) -> usize {
        self.connection_slots.available_permits()
    }

    /// Get the relay configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get the hub handle.
    pub fn hub(&self) -> &Hub {
        &self.hub
    }

    /// Get access to the rate limiters.
    pub fn rate_limits(&self) -> &RateLimits {
        &self.rate_limits
    }

    /// Get access to the operational metrics.
    pub fn metrics(&self) -> &RelayMetrics {
        &self.metrics
    }

    /// Time since the relay was created.
    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Refuse new connections, close every open one and stop the hub.
    pub async fn shutdown(&self) {
        self.connection_slots.close();
        self.hub.shutdown().await;
    }
}

/// Wait for the hub task and report how it ended.
///
/// The hub only exits on shutdown or once every handle is gone; a panic
/// leaves the relay unable to route anything.
async fn watch_hub(task: JoinHandle<()>) {
    match task.await {
        Ok(()) => tracing::debug!("Hub task exited"),
        Err(e) if e.is_panic() => tracing::error!("Hub task panicked: {}", e),
        Err(e) => tracing::warn!("Hub task cancelled: {}", e),
    }
}

/// Serve HTTP and WebSocket traffic on `listener` until `shutdown` resolves,
/// then close every remaining connection.
///
/// # Errors
///
/// Returns [`crate::error::RelayError::Io`] if the server fails.
pub async fn run<F>(relay: Arc<ClipRelay>, listener: TcpListener, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let router = build_router(relay.clone());
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(
            "Listening on {} (WebSocket path: {})",
            addr,
            relay.config().websocket.path
        );
    }

    let result = axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await;

    relay.shutdown().await;
    tracing::info!("Relay stopped");
    Ok(result?)
}
