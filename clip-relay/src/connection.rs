//! Connection records and their bounded outboxes.
//!
//! A [`Connection`] is the hub's record of one live client. It owns the only
//! sender of the client's outbox, so removing the record from the hub is the
//! single place an outbox gets closed. The matching [`Outbox`] receiver
//! belongs to the connection's writer task.

use clip_types::KeyHash;
use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc::{self, error::TrySendError};

/// A serialized outbound frame, shared between every recipient of a broadcast.
pub type Frame = Arc<str>;

/// Process-unique connection identifier.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Allocate the next identifier.
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw numeric value.
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

impl fmt::Debug for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ConnectionId({})", self.0)
    }
}

/// Why a frame could not be queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueError {
    /// The outbox is at capacity; the receiver is not keeping up.
    Full,
    /// The writer task is gone.
    Closed,
}

/// Hub-side record of a live connection.
#[derive(Debug)]
pub struct Connection {
    id: ConnectionId,
    remote: Option<SocketAddr>,
    outbox: mpsc::Sender<Frame>,
    group: Option<KeyHash>,
    connected_at: Instant,
}

impl Connection {
    /// Create a connection with an outbox of `capacity` frames.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero (rejected earlier by config validation).
    pub fn open(capacity: usize, remote: Option<SocketAddr>) -> (Self, Outbox) {
        let (tx, rx) = mpsc::channel(capacity);
        let conn = Self {
            id: ConnectionId::next(),
            remote,
            outbox: tx,
            group: None,
            connected_at: Instant::now(),
        };
        (conn, Outbox { rx })
    }

    /// Connection identifier.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Peer address, when known.
    pub fn remote(&self) -> Option<SocketAddr> {
        self.remote
    }

    /// Group this connection is registered under, if any.
    pub fn group(&self) -> Option<&KeyHash> {
        self.group.as_ref()
    }

    /// Replace the group, returning the previous one.
    pub(crate) fn set_group(&mut self, key: KeyHash) -> Option<KeyHash> {
        self.group.replace(key)
    }

    /// Time since the connection was accepted.
    pub fn age(&self) -> std::time::Duration {
        self.connected_at.elapsed()
    }

    /// Queue a frame without waiting.
    pub fn try_enqueue(&self, frame: Frame) -> Result<(), EnqueueError> {
        self.outbox.try_send(frame).map_err(|e| match e {
            TrySendError::Full(_) => EnqueueError::Full,
            TrySendError::Closed(_) => EnqueueError::Closed,
        })
    }
}

/// Receiving end of a connection's outbox.
#[derive(Debug)]
pub struct Outbox {
    rx: mpsc::Receiver<Frame>,
}

impl Outbox {
    /// Wait for the next frame and coalesce everything already queued behind
    /// it into one newline-joined batch, preserving FIFO order.
    ///
    /// Returns `None` once the hub has closed the outbox and every queued
    /// frame has been handed out.
    pub async fn next_batch(&mut self) -> Option<String> {
        let first = self.rx.recv().await?;
        let mut batch = String::from(&*first);
        while let Ok(next) = self.rx.try_recv() {
            batch.push('\n');
            batch.push_str(&next);
        }
        Some(batch)
    }
}
