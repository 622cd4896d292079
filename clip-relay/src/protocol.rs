//! Message protocol handler.
//!
//! Pure decision logic: given the connection's registration state and one
//! decoded [`ClientMessage`], decide which hub operations to perform. The
//! caller applies the returned [`Effect`]s; nothing here touches sockets or
//! the hub, which keeps every rule testable in isolation.

use crate::error::{ProtocolError, ProtocolResult};
use clip_types::{
    ClientMessage, CopyRelay, CopyRequest, CopyResponse, KeyHash, MessageRelay, MessageRequest,
    RegisterSuccess, ServerMessage,
};

/// Registration state of a connection, as seen by its reader.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SessionState {
    /// Connected, not yet in a group.
    #[default]
    Connected,
    /// Registered under a key hash.
    Registered {
        /// The group this connection belongs to.
        key: KeyHash,
    },
}

impl SessionState {
    /// The registered key, if any.
    pub fn key(&self) -> Option<&KeyHash> {
        match self {
            Self::Connected => None,
            Self::Registered { key } => Some(key),
        }
    }
}

/// An action the connection must carry out through the hub.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Join (or move to) a group; the session becomes `Registered`.
    Join(KeyHash),
    /// Fan a frame out to the rest of the group.
    Broadcast {
        /// Target group.
        key: KeyHash,
        /// Frame to relay.
        message: ServerMessage,
    },
    /// Send a frame back to this connection only.
    Reply(ServerMessage),
}

/// Decide what to do with one inbound message.
///
/// # Errors
///
/// Every error is non-fatal and should be reported to the sender as an
/// `error` frame.
pub fn handle(state: &SessionState, msg: ClientMessage) -> ProtocolResult<Vec<Effect>> {
    match msg {
        ClientMessage::Register(register) => {
            let key = KeyHash::new(register.key_hash).ok_or_else(ProtocolError::empty_key)?;
            Ok(vec![
                Effect::Join(key),
                Effect::Reply(ServerMessage::RegisterSuccess(RegisterSuccess {
                    message: "registered".to_string(),
                })),
            ])
        }
        ClientMessage::Message(MessageRequest {
            key_hash,
            encrypted_message,
        }) => {
            let key = authorize(state, &key_hash)?;
            Ok(vec![Effect::Broadcast {
                key: key.clone(),
                message: ServerMessage::Message(MessageRelay { encrypted_message }),
            }])
        }
        ClientMessage::Copy(CopyRequest {
            key_hash,
            encrypted_content,
            content_type,
        }) => {
            let key = authorize(state, &key_hash)?;
            Ok(vec![
                Effect::Broadcast {
                    key: key.clone(),
                    message: ServerMessage::Copy(CopyRelay {
                        encrypted_content,
                        content_type,
                    }),
                },
                Effect::Reply(ServerMessage::CopyResponse(CopyResponse {
                    success: true,
                    message: "copy relayed".to_string(),
                })),
            ])
        }
        ClientMessage::Unknown => Err(ProtocolError::UnknownType),
    }
}

/// A relay request needs a registration and must target the registered group.
fn authorize<'a>(state: &'a SessionState, declared: &str) -> ProtocolResult<&'a KeyHash> {
    let key = state.key().ok_or(ProtocolError::NotRegistered)?;
    if *key != *declared {
        return Err(ProtocolError::key_mismatch());
    }
    Ok(key)
}
