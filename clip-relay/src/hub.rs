//! The connection hub.
//!
//! One task owns every live [`Connection`] and the [`GroupIndex`]. All
//! mutation arrives as a [`HubCommand`] over a single queue and is applied one
//! command at a time, so register, unregister, join and broadcast are
//! linearized without locks. Commands sent from one task are applied in send
//! order.
//!
//! Delivery never blocks: a recipient whose outbox is full is evicted on the
//! spot and the broadcast carries on with the remaining members.

use crate::connection::{Connection, ConnectionId, EnqueueError, Frame};
use crate::error::{DisconnectReason, RelayError};
use crate::group::GroupIndex;
use crate::metrics::RelayMetrics;
use clip_types::KeyHash;
use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// Requests processed by the hub task.
#[derive(Debug)]
pub enum HubCommand {
    /// Add a freshly accepted, ungrouped connection.
    Register(Connection),
    /// Tear a connection down. No-op if it is already gone.
    Unregister {
        /// Connection to remove.
        id: ConnectionId,
        /// Why it is being removed (for logs).
        reason: DisconnectReason,
    },
    /// Put a connection in a group, moving it out of any previous group.
    JoinGroup {
        /// Connection to group.
        id: ConnectionId,
        /// Target group.
        key: KeyHash,
    },
    /// Queue a frame for every other member of `key`.
    Broadcast {
        /// Originating connection (never receives its own frame).
        sender: ConnectionId,
        /// Group to fan out to.
        key: KeyHash,
        /// Encoded frame.
        frame: Frame,
    },
    /// Queue a frame for a single connection.
    Send {
        /// Recipient.
        id: ConnectionId,
        /// Encoded frame.
        frame: Frame,
    },
    /// Report current counts.
    Stats(oneshot::Sender<HubStats>),
    /// Close every outbox and stop the hub task.
    Shutdown(oneshot::Sender<()>),
}

/// Counts reported by the hub.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HubStats {
    /// Live connections, grouped or not.
    pub connections: usize,
    /// Non-empty groups.
    pub groups: usize,
}

/// Handle to the hub task.
///
/// Cheap to clone; every connection holds one. The task stops when
/// [`Hub::shutdown`] is called or the last handle is dropped.
#[derive(Clone, Debug)]
pub struct Hub {
    tx: mpsc::UnboundedSender<HubCommand>,
    metrics: Arc<RelayMetrics>,
}

impl Hub {
    /// Start the hub task.
    pub fn spawn(metrics: Arc<RelayMetrics>) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let state = HubState::new(metrics.clone());
        let handle = tokio::spawn(run(state, rx));
        (Self { tx, metrics }, handle)
    }

    /// Shared metrics.
    pub fn metrics(&self) -> &RelayMetrics {
        &self.metrics
    }

    /// Add a new connection to the live set.
    pub fn register(&self, conn: Connection) {
        self.metrics.connections_total.fetch_add(1, Ordering::Relaxed);
        self.submit(HubCommand::Register(conn));
    }

    /// Remove a connection and close its outbox. Safe to call repeatedly.
    pub fn unregister(&self, id: ConnectionId, reason: DisconnectReason) {
        self.submit(HubCommand::Unregister { id, reason });
    }

    /// Register `id` under `key`.
    pub fn join_group(&self, id: ConnectionId, key: KeyHash) {
        self.submit(HubCommand::JoinGroup { id, key });
    }

    /// Fan `frame` out to every member of `key` except `sender`.
    pub fn broadcast(&self, sender: ConnectionId, key: KeyHash, frame: Frame) {
        self.submit(HubCommand::Broadcast { sender, key, frame });
    }

    /// Queue `frame` for a single connection.
    pub fn send(&self, id: ConnectionId, frame: Frame) {
        self.submit(HubCommand::Send { id, frame });
    }

    /// Current live connection and group counts.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::HubClosed`] if the hub task has stopped.
    pub async fn stats(&self) -> Result<HubStats, RelayError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(HubCommand::Stats(reply))
            .map_err(|_| RelayError::HubClosed)?;
        rx.await.map_err(|_| RelayError::HubClosed)
    }

    /// Number of live connections.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::HubClosed`] if the hub task has stopped.
    pub async fn live_count(&self) -> Result<usize, RelayError> {
        self.stats().await.map(|s| s.connections)
    }

    /// Close every outbox and stop the hub. Best-effort: frames already queued
    /// are still flushed by their writers.
    pub async fn shutdown(&self) {
        let (reply, rx) = oneshot::channel();
        if self.tx.send(HubCommand::Shutdown(reply)).is_ok() {
            let _ = rx.await;
        }
    }

    fn submit(&self, cmd: HubCommand) {
        if self.tx.send(cmd).is_err() {
            tracing::debug!("Hub is shut down, dropping command");
        }
    }
}

async fn run(mut state: HubState, mut rx: mpsc::UnboundedReceiver<HubCommand>) {
    tracing::debug!("Hub started");
    while let Some(cmd) = rx.recv().await {
        if let HubCommand::Shutdown(reply) = cmd {
            state.close_all();
            let _ = reply.send(());
            break;
        }
        state.apply(cmd);
    }
    tracing::debug!("Hub stopped");
}

/// State owned by the hub task.
///
/// Invariant: every connection present in `groups` is present in
/// `connections`, registered under the same key as its `group()`.
#[derive(Debug)]
pub struct HubState {
    connections: HashMap<ConnectionId, Connection>,
    groups: GroupIndex,
    metrics: Arc<RelayMetrics>,
}

impl HubState {
    /// Create empty hub state.
    pub fn new(metrics: Arc<RelayMetrics>) -> Self {
        Self {
            connections: HashMap::new(),
            groups: GroupIndex::new(),
            metrics,
        }
    }

    /// Apply one command. `Shutdown` is handled by the task loop.
    pub fn apply(&mut self, cmd: HubCommand) {
        match cmd {
            HubCommand::Register(conn) => self.register(conn),
            HubCommand::Unregister { id, reason } => {
                self.unregister(id, reason);
            }
            HubCommand::JoinGroup { id, key } => self.join_group(id, key),
            HubCommand::Broadcast { sender, key, frame } => {
                self.broadcast(sender, &key, &frame);
            }
            HubCommand::Send { id, frame } => {
                self.deliver(id, frame);
            }
            HubCommand::Stats(reply) => {
                let _ = reply.send(self.stats());
            }
            HubCommand::Shutdown(reply) => {
                self.close_all();
                let _ = reply.send(());
            }
        }
    }

    /// Add a connection to the live set, ungrouped.
    pub fn register(&mut self, conn: Connection) {
        let id = conn.id();
        let remote = conn.remote();
        self.connections.insert(id, conn);
        tracing::info!(
            "Client connected: {} from {:?} (total: {})",
            id,
            remote,
            self.connections.len()
        );
    }

    /// Remove a connection from the live set and its group, closing its
    /// outbox. Returns `false` if it was already gone.
    pub fn unregister(&mut self, id: ConnectionId, reason: DisconnectReason) -> bool {
        let Some(conn) = self.connections.remove(&id) else {
            return false;
        };
        if let Some(key) = conn.group() {
            self.groups.leave(key, id);
        }
        if reason == DisconnectReason::Evicted {
            self.metrics.evictions_total.fetch_add(1, Ordering::Relaxed);
            tracing::warn!("Evicted {}: outbox full", id);
        }
        tracing::info!(
            "Client disconnected: {} ({}) after {:?} (total: {})",
            id,
            reason,
            conn.age(),
            self.connections.len()
        );
        // Dropping the record drops the only outbox sender.
        drop(conn);
        true
    }

    /// Register `id` under `key`. The same key again is a no-op; a different
    /// key moves the connection in one step.
    pub fn join_group(&mut self, id: ConnectionId, key: KeyHash) {
        let Some(conn) = self.connections.get_mut(&id) else {
            tracing::debug!("Join for unknown connection {}", id);
            return;
        };
        if conn.group() == Some(&key) {
            return;
        }
        if let Some(previous) = conn.set_group(key.clone()) {
            self.groups.leave(&previous, id);
            tracing::info!("{} moved from group {:?} to {:?}", id, previous, key);
        } else {
            tracing::info!("{} registered in group {:?}", id, key);
        }
        self.groups.join(key, id);
    }

    /// Queue `frame` for every member of `key` other than `sender`. Returns
    /// the number of connections it was queued for.
    ///
    /// Ignored unless `sender` is itself registered under `key`.
    pub fn broadcast(&mut self, sender: ConnectionId, key: &KeyHash, frame: &Frame) -> usize {
        if !self.groups.contains(key, sender) {
            tracing::debug!("Dropping broadcast from {} outside group {:?}", sender, key);
            return 0;
        }

        let targets = self.groups.members_except(key, sender);
        let mut delivered = 0;
        for target in &targets {
            if self.deliver(*target, frame.clone()) {
                delivered += 1;
            }
        }

        self.metrics
            .frames_relayed
            .fetch_add(delivered as u64, Ordering::Relaxed);
        tracing::debug!(
            "Relayed from {} to {}/{} members of {:?}",
            sender,
            delivered,
            targets.len(),
            key
        );
        delivered
    }

    /// Queue one frame for `id`, evicting it if its outbox is full.
    pub fn deliver(&mut self, id: ConnectionId, frame: Frame) -> bool {
        let Some(conn) = self.connections.get(&id) else {
            return false;
        };
        match conn.try_enqueue(frame) {
            Ok(()) => true,
            Err(EnqueueError::Full) => {
                self.unregister(id, DisconnectReason::Evicted);
                false
            }
            Err(EnqueueError::Closed) => {
                self.unregister(id, DisconnectReason::WriteError);
                false
            }
        }
    }

    /// Current counts.
    pub fn stats(&self) -> HubStats {
        HubStats {
            connections: self.connections.len(),
            groups: self.groups.group_count(),
        }
    }

    /// Whether `id` is live.
    pub fn is_live(&self, id: ConnectionId) -> bool {
        self.connections.contains_key(&id)
    }

    /// Whether `id` is registered under `key`.
    pub fn is_member(&self, key: &KeyHash, id: ConnectionId) -> bool {
        self.groups.contains(key, id)
    }

    /// Drop every connection, closing all outboxes.
    pub fn close_all(&mut self) {
        let ids: Vec<ConnectionId> = self.connections.keys().copied().collect();
        for id in &ids {
            self.unregister(*id, DisconnectReason::Shutdown);
        }
        tracing::info!("Hub closed {} connections", ids.len());
    }
}
