//! Message protocol definitions
//!
//! JSON-based bidirectional message protocol using Serde's tagged enum
//! for type-safe serialization/deserialization. Every message is an
//! envelope `{ type, room_id?, from?, content?, target? }`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::error;

use crate::error::AppError;
use crate::types::Frame;

/// Client → Server message
///
/// All messages from client to server. Uses tagged enum with snake_case naming.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Create a room; the server picks a name when none is given
    CreateRoom {
        #[serde(default)]
        room_id: Option<String>,
    },
    /// Join an existing room by id
    JoinRoom { room_id: String },
    /// Leave the current room
    LeaveRoom,
    /// Send a chat message to the current room
    Chat { content: Value },
    /// Relay an opaque payload to one member of the current room
    Signal {
        target: String,
        #[serde(default)]
        content: Value,
    },
}

impl ClientMessage {
    /// Decode one inbound text frame
    pub fn decode(text: &str) -> Result<Self, AppError> {
        serde_json::from_str(text).map_err(|e| AppError::Malformed(e.to_string()))
    }
}

/// Server → Client message
///
/// All messages from server to client. Uses tagged enum with snake_case naming.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Rooms known to the hub and who is in them (sent on connect)
    RoomList { content: Vec<RoomSummary> },
    /// Room created successfully
    RoomCreated { room_id: String },
    /// Someone joined the room
    UserJoined { room_id: String, content: UserRef },
    /// Someone left the room
    UserLeft { room_id: String, content: UserRef },
    /// Other occupants of the room just joined
    UserList { room_id: String, content: Vec<String> },
    /// Chat message in a room
    Chat {
        room_id: String,
        from: String,
        content: Value,
    },
    /// Point-to-point signaling payload
    Signal {
        room_id: String,
        from: String,
        target: String,
        content: Value,
    },
    /// Error occurred
    Error { content: ErrorBody },
}

impl ServerMessage {
    /// Serialize into a frame ready for an outbound queue
    pub fn encode(&self) -> Result<Frame, AppError> {
        Ok(serde_json::to_string(self)?.into())
    }

    /// Encode for fan-out, logging instead of failing
    pub(crate) fn to_frame(&self) -> Option<Frame> {
        match self.encode() {
            Ok(frame) => Some(frame),
            Err(e) => {
                error!("Failed to serialize message: {}", e);
                None
            }
        }
    }
}

/// A username carried in join/leave notifications
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRef {
    pub username: String,
}

/// One entry of a `room_list`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomSummary {
    pub room_id: String,
    pub users: Vec<String>,
}

/// Payload of an `error` message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: ErrorCode,
    pub error: String,
}

/// Error codes for ServerMessage::Error
///
/// Represents different error scenarios that can be communicated to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Frame could not be decoded
    Malformed,
    /// Room id already taken
    RoomExists,
    /// Non-existent room id
    RoomNotFound,
    /// Room id failed validation
    InvalidRoomId,
    /// Signal target is not in the room
    TargetNotFound,
    /// Attempted a room action without joining a room
    NotInRoom,
    /// Already in the requested room
    AlreadyInRoom,
    /// Too many frames
    RateLimited,
    /// Persistence failure
    Storage,
    /// Anything else
    Internal,
}

/// Convert AppError to ServerMessage for client notification
impl From<AppError> for ServerMessage {
    fn from(err: AppError) -> Self {
        let (code, error) = match &err {
            AppError::Malformed(_) => (ErrorCode::Malformed, "Invalid message format".to_string()),
            AppError::InvalidRoomId(_) => (ErrorCode::InvalidRoomId, err.to_string()),
            AppError::RoomAlreadyExists(room_id) => {
                (ErrorCode::RoomExists, format!("Room '{}' already exists", room_id))
            }
            AppError::RoomNotFound(room_id) => {
                (ErrorCode::RoomNotFound, format!("Room '{}' not found", room_id))
            }
            AppError::TargetNotFound(target) => {
                (ErrorCode::TargetNotFound, format!("Target user '{}' not found", target))
            }
            AppError::NotInRoom => (ErrorCode::NotInRoom, "You are not in a room".to_string()),
            AppError::AlreadyInRoom => {
                (ErrorCode::AlreadyInRoom, "You are already in this room".to_string())
            }
            AppError::RateLimited => {
                (ErrorCode::RateLimited, "Too many messages, slow down".to_string())
            }
            AppError::Store(_) => (ErrorCode::Storage, "Storage unavailable".to_string()),
            // Fatal errors are not typically converted (connection closes)
            _ => (ErrorCode::Internal, "Internal error".to_string()),
        };
        ServerMessage::Error {
            content: ErrorBody { code, error },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_client_message_deserialize() {
        let msg = ClientMessage::decode(r#"{"type": "join_room", "room_id": "alpha"}"#).unwrap();
        assert_eq!(
            msg,
            ClientMessage::JoinRoom {
                room_id: "alpha".to_string()
            }
        );
    }

    #[test]
    fn test_create_room_without_id() {
        let msg = ClientMessage::decode(r#"{"type": "create_room"}"#).unwrap();
        assert_eq!(msg, ClientMessage::CreateRoom { room_id: None });
    }

    #[test]
    fn test_signal_content_is_opaque() {
        let raw = r#"{"type":"signal","target":"bob","content":{"sdp":"v=0","kind":[1,2]}}"#;
        match ClientMessage::decode(raw).unwrap() {
            ClientMessage::Signal { target, content } => {
                assert_eq!(target, "bob");
                assert_eq!(content, json!({"sdp": "v=0", "kind": [1, 2]}));
            }
            other => panic!("Wrong variant: {:?}", other),
        }
    }

    #[test]
    fn test_malformed_frames() {
        for raw in ["not json", r#"{"type":"dance"}"#, r#"{"type":"join_room"}"#, "{}"] {
            assert!(
                matches!(ClientMessage::decode(raw), Err(AppError::Malformed(_))),
                "{} should be malformed",
                raw
            );
        }
    }

    #[test]
    fn test_server_message_serialize() {
        let msg = ServerMessage::UserLeft {
            room_id: "alpha".to_string(),
            content: UserRef {
                username: "B".to_string(),
            },
        };
        let value: Value = serde_json::from_str(&msg.encode().unwrap()).unwrap();
        assert_eq!(
            value,
            json!({"type": "user_left", "room_id": "alpha", "content": {"username": "B"}})
        );
    }

    #[test]
    fn test_error_serialize() {
        let msg: ServerMessage = AppError::TargetNotFound("carol".to_string()).into();
        let value: Value = serde_json::from_str(&msg.encode().unwrap()).unwrap();
        assert_eq!(value["type"], "error");
        assert_eq!(value["content"]["code"], "target_not_found");
        assert!(value["content"]["error"].as_str().unwrap().contains("carol"));
    }
}
