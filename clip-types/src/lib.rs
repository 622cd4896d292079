//! # clip-types
//!
//! Wire format types for the cliprelay encrypted clipboard relay.
//!
//! Clients derive a [`KeyHash`] from a shared secret and exchange JSON text
//! frames over a WebSocket. The relay only ever sees ciphertext:
//! - [`ClientMessage`] - frames sent by a client (register, message, copy)
//! - [`ServerMessage`] - frames produced by the relay (acks, errors, relays)
//! - [`WireError`] - encode/decode failures

#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
mod key;
mod messages;

pub use error::WireError;
pub use key::KeyHash;
pub use messages::{
    ClientMessage, CopyRelay, CopyRequest, CopyResponse, ErrorReply, MessageRelay,
    MessageRequest, Register, RegisterSuccess, ServerMessage,
};
