//! Error types for the hub
//!
//! Defines application-level errors and outbound queue errors.
//! Uses thiserror for ergonomic error definitions.

use thiserror::Error;

use crate::store::StoreError;

/// Application-level errors
///
/// Covers both fatal errors (connection termination) and
/// per-message errors (reported to the requesting client only).
#[derive(Debug, Error)]
pub enum AppError {
    /// WebSocket protocol error (fatal)
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// JSON serialization error
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error (fatal)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Hub command channel is gone (fatal - hub stopped)
    #[error("Hub channel closed")]
    HubClosed,

    /// Inbound frame could not be decoded
    #[error("Malformed message: {0}")]
    Malformed(String),

    /// Room name rejected by validation
    #[error("Invalid room id: {0:?}")]
    InvalidRoomId(String),

    /// A room with this id already exists
    #[error("Room already exists: {0}")]
    RoomAlreadyExists(String),

    /// Room not found with the given id
    #[error("Room not found: {0}")]
    RoomNotFound(String),

    /// Signal target is not a member of the sender's room
    #[error("Target not found: {0}")]
    TargetNotFound(String),

    /// Client is not in any room
    #[error("Not in room")]
    NotInRoom,

    /// Client is already in the requested room
    #[error("Already in room")]
    AlreadyInRoom,

    /// Inbound frame dropped by the rate-limit guard
    #[error("Rate limited")]
    RateLimited,

    /// No free generated room id was found
    #[error("No free room id after {0} attempts")]
    RoomIdsExhausted(usize),

    /// Persistence collaborator failure
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),
}

/// Outbound queue errors
///
/// A push never waits: a full queue and a closed queue are both
/// reported immediately to the producer.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SendError {
    /// The consumer is not keeping up
    #[error("Outbound queue saturated")]
    QueueSaturated,

    /// The queue has been closed (client retired or evicted)
    #[error("Channel closed")]
    ChannelClosed,
}
