//! Basic type definitions for the hub
//!
//! Provides newtype wrappers for type safety:
//! - `ClientId`: UUID-based unique client identifier
//! - `RoomId`: room name, client-supplied or generated
//! - `Frame`: one serialized outbound message

use std::sync::Arc;

use uuid::Uuid;

use crate::error::AppError;

/// Maximum length of a room id, in characters
pub const MAX_ROOM_ID_LEN: usize = 64;

/// Length of server-generated room ids
const GENERATED_ROOM_ID_LEN: usize = 8;

/// One serialized message, shared between every queue it is pushed onto
pub type Frame = Arc<str>;

/// Unique client identifier (newtype pattern)
///
/// Wraps a UUID v4 for type-safe client identification.
/// Implements Hash and Eq for use as HashMap keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientId(pub Uuid);

impl ClientId {
    /// Create a new random client ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ClientId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Room identifier
///
/// Rooms are addressed by name. Names are case-sensitive and trimmed;
/// a room created without a name gets a random alphanumeric one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RoomId(String);

impl RoomId {
    /// Generate a new random 8-character room id
    pub fn generate() -> Self {
        use rand::Rng;
        let id: String = rand::thread_rng()
            .sample_iter(&rand::distributions::Alphanumeric)
            .take(GENERATED_ROOM_ID_LEN)
            .map(char::from)
            .collect();
        Self(id)
    }

    /// Validate a client-supplied room name
    pub fn parse(raw: &str) -> Result<Self, AppError> {
        let name = raw.trim();
        if name.is_empty()
            || name.chars().count() > MAX_ROOM_ID_LEN
            || name.chars().any(char::is_control)
        {
            return Err(AppError::InvalidRoomId(raw.to_string()));
        }
        Ok(Self(name.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RoomId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_id_unique() {
        let id1 = ClientId::new();
        let id2 = ClientId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_generated_room_id() {
        let id = RoomId::generate();
        assert_eq!(id.as_str().len(), 8);
        assert!(id.as_str().chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn test_room_id_trimmed_and_case_sensitive() {
        let id = RoomId::parse("  Alpha ").unwrap();
        assert_eq!(id.as_str(), "Alpha");
        assert_ne!(id, RoomId::parse("alpha").unwrap());
    }

    #[test]
    fn test_room_id_rejects_bad_names() {
        assert!(RoomId::parse("").is_err());
        assert!(RoomId::parse("   ").is_err());
        assert!(RoomId::parse("tab\there").is_err());
        assert!(RoomId::parse(&"x".repeat(MAX_ROOM_ID_LEN + 1)).is_err());
        assert!(RoomId::parse(&"x".repeat(MAX_ROOM_ID_LEN)).is_ok());
    }
}
