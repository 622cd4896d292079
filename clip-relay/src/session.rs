//! Per-connection session management.
//!
//! Each accepted WebSocket runs two duties:
//!
//! - the **reader** (this task) decodes inbound frames, runs them through
//!   [`protocol::handle`] and applies the resulting effects through the hub;
//! - the **writer** (a spawned task) drains the connection's outbox onto the
//!   socket and sends keepalive pings.
//!
//! Whichever duty ends first ends the connection. Unregistration goes through
//! the hub, which closes the outbox; the writer then flushes what is queued,
//! sends a close frame and stops.

use crate::config::KeepaliveConfig;
use crate::connection::{Connection, ConnectionId, Frame, Outbox};
use crate::error::{DisconnectReason, ProtocolError};
use crate::metrics::RelayMetrics;
use crate::protocol::{self, Effect, SessionState};
use crate::server::ClipRelay;
use axum::extract::ws::{Message, WebSocket};
use clip_types::{ClientMessage, ServerMessage};
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use std::fmt::Display;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};

/// Serve an upgraded WebSocket until either side gives up.
pub async fn serve(socket: WebSocket, relay: Arc<ClipRelay>, remote: Option<SocketAddr>) {
    let (sink, stream) = socket.split();
    run_connection(sink, stream, relay, remote).await;
}

/// Drive one connection over any message sink/stream pair.
///
/// Registers the connection with the hub, spawns the writer, reads until the
/// stream ends or fails, and unregisters exactly once on the way out.
pub async fn run_connection<Si, St, E>(
    sink: Si,
    mut stream: St,
    relay: Arc<ClipRelay>,
    remote: Option<SocketAddr>,
) where
    Si: Sink<Message> + Unpin + Send + 'static,
    Si::Error: Display,
    St: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
{
    let (conn, outbox) = Connection::open(relay.config().websocket.outbox_capacity, remote);
    let id = conn.id();
    let hub = relay.hub().clone();
    hub.register(conn);

    let mut writer = tokio::spawn(write_loop(
        sink,
        outbox,
        id,
        relay.config().keepalive.clone(),
    ));
    let mut session = Session::new(id, relay.clone());

    tokio::select! {
        reason = session.read_loop(&mut stream) => {
            hub.unregister(id, reason);
            if let Err(e) = writer.await {
                tracing::warn!("{}: writer task failed: {}", id, e);
            }
        }
        exit = &mut writer => {
            // No-op when the hub already closed the outbox (eviction).
            hub.unregister(id, DisconnectReason::WriteError);
            match exit {
                Ok(()) => tracing::debug!("{} writer stopped before reader", id),
                Err(e) => tracing::warn!("{}: writer task failed: {}", id, e),
            }
        }
    }
}

/// Reader-side state of one connection.
pub struct Session {
    id: ConnectionId,
    relay: Arc<ClipRelay>,
    state: SessionState,
    last_seen: Instant,
}

impl Session {
    /// Create a session for a freshly registered connection.
    pub fn new(id: ConnectionId, relay: Arc<ClipRelay>) -> Self {
        Self {
            id,
            relay,
            state: SessionState::default(),
            last_seen: Instant::now(),
        }
    }

    /// Read frames until the connection should end.
    ///
    /// The read deadline is `last_seen + read_timeout`; any inbound frame,
    /// pongs included, pushes it forward.
    pub async fn read_loop<St, E>(&mut self, stream: &mut St) -> DisconnectReason
    where
        St: Stream<Item = Result<Message, E>> + Unpin,
        E: Display,
    {
        let read_timeout = self.relay.config().keepalive.read_timeout();

        loop {
            let deadline = self.last_seen + read_timeout;
            let next = match tokio::time::timeout_at(deadline, stream.next()).await {
                Ok(next) => next,
                Err(_) => return DisconnectReason::ReadTimeout,
            };

            let msg = match next {
                None => return DisconnectReason::ClientClosed,
                Some(Err(e)) => {
                    tracing::debug!("{}: read error: {}", self.id, e);
                    return DisconnectReason::ReadError;
                }
                Some(Ok(msg)) => msg,
            };
            self.last_seen = Instant::now();

            match msg {
                Message::Text(text) => self.handle_text(&text),
                Message::Binary(_) => {
                    RelayMetrics::incr(&self.relay.metrics().decode_errors_total);
                    tracing::debug!("{}: ignoring binary frame", self.id);
                }
                Message::Ping(_) | Message::Pong(_) => {}
                Message::Close(_) => return DisconnectReason::ClientClosed,
            }
        }
    }

    fn handle_text(&mut self, text: &str) {
        if self.relay.rate_limits().check_message(self.id).is_err() {
            RelayMetrics::incr(&self.relay.metrics().rate_limit_hits);
            tracing::warn!("{}: message rate limit exceeded", self.id);
            self.reject(&ProtocolError::RateLimited);
            return;
        }

        let msg = match ClientMessage::from_json(text) {
            Ok(msg) => msg,
            Err(e) => {
                RelayMetrics::incr(&self.relay.metrics().decode_errors_total);
                tracing::debug!("{}: {}", self.id, e);
                return;
            }
        };

        match protocol::handle(&self.state, msg) {
            Ok(effects) => {
                for effect in effects {
                    self.apply(effect);
                }
            }
            Err(e) => {
                RelayMetrics::incr(&self.relay.metrics().protocol_errors_total);
                tracing::debug!("{}: rejected: {}", self.id, e);
                self.reject(&e);
            }
        }
    }

    fn apply(&mut self, effect: Effect) {
        let hub = self.relay.hub();
        match effect {
            Effect::Join(key) => {
                tracing::debug!("{} registered under {:?}", self.id, key);
                hub.join_group(self.id, key.clone());
                // Commands from this task are applied in order, so later
                // broadcasts already see the membership.
                self.state = SessionState::Registered { key };
            }
            Effect::Broadcast { key, message } => {
                if let Some(frame) = self.encode(&message) {
                    hub.broadcast(self.id, key, frame);
                }
            }
            Effect::Reply(message) => {
                if let Some(frame) = self.encode(&message) {
                    hub.send(self.id, frame);
                }
            }
        }
    }

    fn reject(&self, error: &ProtocolError) {
        if let Some(frame) = self.encode(&ServerMessage::error(error.to_string())) {
            self.relay.hub().send(self.id, frame);
        }
    }

    fn encode(&self, message: &ServerMessage) -> Option<Frame> {
        match message.to_json() {
            Ok(json) => Some(Frame::from(json)),
            Err(e) => {
                tracing::error!("{}: failed to encode reply: {}", self.id, e);
                None
            }
        }
    }
}

/// Drain the outbox onto the socket and keep the peer alive with pings.
///
/// Returns when the outbox is closed (after sending a close frame) or when a
/// write fails or exceeds the write timeout.
async fn write_loop<Si>(mut sink: Si, mut outbox: Outbox, id: ConnectionId, keepalive: KeepaliveConfig)
where
    Si: Sink<Message> + Unpin,
    Si::Error: Display,
{
    let write_timeout = keepalive.write_timeout();
    let period = keepalive.ping_interval();
    let mut ping = tokio::time::interval_at(Instant::now() + period, period);
    ping.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        let message = tokio::select! {
            batch = outbox.next_batch() => match batch {
                Some(text) => Message::Text(text),
                None => {
                    if let Err(e) = send_within(&mut sink, Message::Close(None), write_timeout).await {
                        tracing::debug!("{}: close frame not sent: {}", id, e);
                    }
                    return;
                }
            },
            _ = ping.tick() => Message::Ping(Vec::new()),
        };

        if let Err(e) = send_within(&mut sink, message, write_timeout).await {
            tracing::warn!("{}: write failed: {}", id, e);
            return;
        }
    }
}

async fn send_within<Si>(sink: &mut Si, message: Message, limit: Duration) -> Result<(), String>
where
    Si: Sink<Message> + Unpin,
    Si::Error: Display,
{
    match tokio::time::timeout(limit, sink.send(message)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(e.to_string()),
        Err(_) => Err(format!("timed out after {:?}", limit)),
    }
}
