//! Room-based WebSocket Messaging Hub Library
//!
//! A WebSocket hub built with tokio-tungstenite that organizes clients
//! into named rooms, fans chat out to room members, and relays
//! point-to-point signaling payloads between members of a room.
//!
//! # Features
//! - Identity taken from the upgrade request (set by an upstream auth layer)
//! - Room creation, joining, leaving and membership transfer
//! - Chat fan-out with per-room history replay for late joiners
//! - Best-effort signaling relay for peer negotiation
//! - Bounded outbound queues: slow consumers are evicted, never waited on
//! - Per-connection inbound rate limiting
//!
//! # Architecture
//! - `Hub` is an actor owning the room directory and client registry;
//!   every structural change goes through its command channel
//! - Each `Room` guards its members and history with one lock and runs
//!   its own dispatch loop
//! - Each connection runs a reader and a writer task; the writer drains
//!   the client's outbound queue
//!
//! # Example
//! ```ignore
//! use std::sync::Arc;
//! use tokio::net::TcpListener;
//! use room_hub::{serve, Hub, MemoryRoomStore, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = Arc::new(ServerConfig::default());
//!     let listener = TcpListener::bind(&config.bind_addr).await.unwrap();
//!     let hub = Hub::spawn(&config, Arc::new(MemoryRoomStore::new()));
//!
//!     serve(listener, hub, config).await;
//! }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod guard;
pub mod handler;
pub mod hub;
pub mod identity;
pub mod message;
pub mod room;
pub mod store;
pub mod types;

// Re-export main types for convenience
pub use client::ClientHandle;
pub use config::{ConfigError, RateLimitConfig, ServerConfig};
pub use error::{AppError, SendError};
pub use handler::{handle_connection, serve, serve_connection};
pub use hub::{Hub, HubCommand, HubHandle};
pub use message::{ClientMessage, ErrorCode, RoomSummary, ServerMessage, UserRef};
pub use room::{Room, RoomEvent};
pub use store::{MemoryRoomStore, RoomStore, StoreError, StoredRoom};
pub use types::{ClientId, Frame, RoomId};
