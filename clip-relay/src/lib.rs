//! # clip-relay
//!
//! Zero-knowledge WebSocket relay for encrypted clipboard sharing.
//!
//! This crate implements a relay server that:
//! - Accepts WebSocket connections from browsers and devices
//! - Groups connections by a client-derived key hash
//! - Fans encrypted payloads out to the other members of a group
//! - Never sees plaintext (relay is a "dumb pipe")
//! - Never stores anything (a client that is offline misses the message)
//!
//! ## Architecture
//!
//! ```text
//! Device A ──┐                          ┌── Device B
//!            │       WebSocket          │
//!            ├─────────────────────────►│
//!            │                          │
//!        ┌───┴──────────────────────────┴───┐
//!        │            clip-relay            │
//!        │  inbound ─► Hub actor ─► outbox  │
//!        │  (per conn)  (groups)  (per conn)│
//!        └──────────────────────────────────┘
//! ```
//!
//! ## Protocol
//!
//! JSON text frames discriminated by `type`:
//! - `register` → `register_success` (join a group)
//! - `message` → relayed `message` to the rest of the group
//! - `copy` → relayed `copy` to the rest of the group, `copy_response` to sender
//! - anything rejected → `error` (connection stays open)

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cleanup;
pub mod config;
pub mod connection;
pub mod error;
pub mod group;
pub mod http;
pub mod hub;
pub mod limits;
pub mod metrics;
pub mod protocol;
pub mod server;
pub mod session;
