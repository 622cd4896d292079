//! Protocol frames for cliprelay.
//!
//! Every frame is a JSON object discriminated by its `type` field. Payload
//! fields (`encryptedMessage`, `encryptedContent`) are ciphertext produced by
//! the clients and are relayed untouched.

use serde::{Deserialize, Serialize};

use crate::WireError;

/// Frames sent by a client to the relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Join the sharing group identified by a key hash
    Register(Register),
    /// Relay an encrypted text message to the group
    Message(MessageRequest),
    /// Relay encrypted, content-type tagged data to the group
    Copy(CopyRequest),
    /// Any discriminator the relay does not understand
    #[serde(other)]
    Unknown,
}

impl ClientMessage {
    /// Decode a client frame from JSON text.
    pub fn from_json(text: &str) -> Result<Self, WireError> {
        serde_json::from_str(text).map_err(WireError::Deserialization)
    }

    /// Encode to JSON text.
    pub fn to_json(&self) -> Result<String, WireError> {
        serde_json::to_string(self).map_err(WireError::Serialization)
    }
}

/// Registration request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Register {
    /// Requested group (empty when the client omitted it)
    #[serde(default)]
    pub key_hash: String,
}

/// Opaque text relay request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRequest {
    /// Group the client claims to be sending to
    #[serde(default)]
    pub key_hash: String,
    /// Ciphertext (opaque to the relay)
    #[serde(default)]
    pub encrypted_message: String,
}

/// Typed relay request (text or image clipboard content).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CopyRequest {
    /// Group the client claims to be sending to
    #[serde(default)]
    pub key_hash: String,
    /// Ciphertext (opaque to the relay)
    #[serde(default)]
    pub encrypted_content: String,
    /// Client-declared content type tag, e.g. `text` or `image`
    #[serde(default)]
    pub content_type: String,
}

/// Frames produced by the relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Registration accepted
    RegisterSuccess(RegisterSuccess),
    /// A request was rejected; the connection stays open
    Error(ErrorReply),
    /// Relayed text message from another group member
    Message(MessageRelay),
    /// Relayed typed content from another group member
    Copy(CopyRelay),
    /// Acknowledges a copy request back to its sender
    CopyResponse(CopyResponse),
}

impl ServerMessage {
    /// Build an error frame.
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error(ErrorReply {
            message: message.into(),
        })
    }

    /// Encode to JSON text.
    pub fn to_json(&self) -> Result<String, WireError> {
        serde_json::to_string(self).map_err(WireError::Serialization)
    }

    /// Decode a relay frame from JSON text.
    pub fn from_json(text: &str) -> Result<Self, WireError> {
        serde_json::from_str(text).map_err(WireError::Deserialization)
    }
}

/// Registration acknowledgement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterSuccess {
    /// Human-readable status
    pub message: String,
}

/// Error reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorReply {
    /// Human-readable reason
    pub message: String,
}

/// Relayed text message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRelay {
    /// Ciphertext, exactly as the sender supplied it
    pub encrypted_message: String,
}

/// Relayed typed content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CopyRelay {
    /// Ciphertext, exactly as the sender supplied it
    pub encrypted_content: String,
    /// Content type tag declared by the sender
    pub content_type: String,
}

/// Copy acknowledgement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CopyResponse {
    /// Whether the copy was relayed
    pub success: bool,
    /// Human-readable status
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_register() {
        let msg = ClientMessage::from_json(r#"{"type":"register","keyHash":"abc"}"#).unwrap();
        assert_eq!(
            msg,
            ClientMessage::Register(Register {
                key_hash: "abc".into()
            })
        );
    }

    #[test]
    fn decode_register_without_key_defaults_to_empty() {
        let msg = ClientMessage::from_json(r#"{"type":"register"}"#).unwrap();
        assert_eq!(
            msg,
            ClientMessage::Register(Register {
                key_hash: String::new()
            })
        );
    }

    #[test]
    fn decode_message() {
        let msg = ClientMessage::from_json(
            r#"{"type":"message","keyHash":"abc","encryptedMessage":"U2FsdGVk"}"#,
        )
        .unwrap();
        match msg {
            ClientMessage::Message(m) => {
                assert_eq!(m.key_hash, "abc");
                assert_eq!(m.encrypted_message, "U2FsdGVk");
            }
            other => panic!("Expected Message, got {:?}", other),
        }
    }

    #[test]
    fn decode_copy() {
        let msg = ClientMessage::from_json(
            r#"{"type":"copy","keyHash":"abc","encryptedContent":"Zm9v","contentType":"image"}"#,
        )
        .unwrap();
        match msg {
            ClientMessage::Copy(c) => {
                assert_eq!(c.key_hash, "abc");
                assert_eq!(c.encrypted_content, "Zm9v");
                assert_eq!(c.content_type, "image");
            }
            other => panic!("Expected Copy, got {:?}", other),
        }
    }

    #[test]
    fn unknown_discriminator_is_not_a_decode_error() {
        let msg = ClientMessage::from_json(r#"{"type":"subscribe","keyHash":"abc"}"#).unwrap();
        assert_eq!(msg, ClientMessage::Unknown);
    }

    #[test]
    fn extra_fields_are_ignored() {
        let msg = ClientMessage::from_json(
            r#"{"type":"register","keyHash":"abc","success":true,"message":"hi"}"#,
        )
        .unwrap();
        assert!(matches!(msg, ClientMessage::Register(_)));
    }

    #[test]
    fn malformed_frames_fail_to_decode() {
        assert!(ClientMessage::from_json("not json").is_err());
        assert!(ClientMessage::from_json(r#"{"keyHash":"abc"}"#).is_err());
        assert!(ClientMessage::from_json(r#""register""#).is_err());
    }

    #[test]
    fn relayed_message_wire_shape() {
        let msg = ServerMessage::Message(MessageRelay {
            encrypted_message: "X".into(),
        });
        let json: serde_json::Value = serde_json::from_str(&msg.to_json().unwrap()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"type": "message", "encryptedMessage": "X"})
        );
    }

    #[test]
    fn relayed_copy_wire_shape() {
        let msg = ServerMessage::Copy(CopyRelay {
            encrypted_content: "Zm9v".into(),
            content_type: "text".into(),
        });
        let json: serde_json::Value = serde_json::from_str(&msg.to_json().unwrap()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"type": "copy", "encryptedContent": "Zm9v", "contentType": "text"})
        );
    }

    #[test]
    fn reply_types_use_snake_case_tags() {
        let ack = ServerMessage::RegisterSuccess(RegisterSuccess {
            message: "registered".into(),
        });
        assert!(ack.to_json().unwrap().contains(r#""type":"register_success""#));

        let resp = ServerMessage::CopyResponse(CopyResponse {
            success: true,
            message: "copy relayed".into(),
        });
        let json = resp.to_json().unwrap();
        assert!(json.contains(r#""type":"copy_response""#));
        assert!(json.contains(r#""success":true"#));

        let err = ServerMessage::error("key mismatch");
        let json: serde_json::Value = serde_json::from_str(&err.to_json().unwrap()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"type": "error", "message": "key mismatch"})
        );
    }
}
