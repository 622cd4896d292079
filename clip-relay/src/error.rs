//! Error types for clip-relay.

use std::fmt;

/// Main error type for clip-relay operations.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    /// The hub task is no longer running.
    #[error("hub is shut down")]
    HubClosed,

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Rejections produced by the protocol handler.
///
/// None of these are fatal: the `Display` text is sent back to the offending
/// client as an `error` frame and the connection stays open.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    /// Missing or mismatched key.
    #[error("{reason}")]
    Validation {
        /// Reason shown to the client.
        reason: String,
    },

    /// Action attempted before registration.
    #[error("register first")]
    NotRegistered,

    /// Unrecognized `type` discriminator.
    #[error("unknown message type")]
    UnknownType,

    /// The connection exceeded its inbound message budget.
    #[error("rate limit exceeded")]
    RateLimited,
}

impl ProtocolError {
    /// Registration without a key hash.
    pub fn empty_key() -> Self {
        Self::Validation {
            reason: "key hash must not be empty".to_string(),
        }
    }

    /// Declared key differs from the registered key.
    pub fn key_mismatch() -> Self {
        Self::Validation {
            reason: "key mismatch".to_string(),
        }
    }
}

/// Why a connection was torn down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    /// Client sent a close frame or the stream ended.
    ClientClosed,
    /// Reading from the stream failed.
    ReadError,
    /// No inbound activity before the read deadline.
    ReadTimeout,
    /// Writing to the stream failed or timed out.
    WriteError,
    /// Outbox was full; the receiver could not keep up.
    Evicted,
    /// The relay is shutting down.
    Shutdown,
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::ClientClosed => "client closed",
            Self::ReadError => "read error",
            Self::ReadTimeout => "read timeout",
            Self::WriteError => "write error",
            Self::Evicted => "outbox full",
            Self::Shutdown => "shutdown",
        };
        f.write_str(s)
    }
}

/// Result type alias for relay operations.
pub type Result<T> = std::result::Result<T, RelayError>;

/// Result type alias for protocol operations.
pub type ProtocolResult<T> = std::result::Result<T, ProtocolError>;
