//! Background cleanup task for rate limiter state.
//!
//! Runs periodically to drop limiter entries for addresses and connections
//! that have gone quiet.

use crate::limits::RateLimits;
use std::time::Duration;
use tokio::time::interval;

/// Spawn a background cleanup task.
///
/// Returns a handle that can be used to abort the task. A zero interval
/// disables cleanup.
pub fn spawn_cleanup_task(limits: RateLimits, interval_secs: u64) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        if interval_secs == 0 {
            tracing::info!("Cleanup task disabled");
            return;
        }

        tracing::info!("Cleanup task started (interval: {}s)", interval_secs);

        let mut timer = interval(Duration::from_secs(interval_secs));
        // The first tick completes immediately.
        timer.tick().await;

        loop {
            timer.tick().await;

            let before = limits.connection_keys_count() + limits.message_keys_count();
            limits.shrink();
            let after = limits.connection_keys_count() + limits.message_keys_count();

            if before > after {
                tracing::debug!("Cleanup: dropped {} idle limiter entries", before - after);
            }
        }
    })
}
