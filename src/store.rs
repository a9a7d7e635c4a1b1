//! Room persistence collaborator
//!
//! The hub asks the store about durable rooms only when a room is
//! created, rehydrated on join, or listed for a newly connected client.
//! It never sits on the broadcast path.

use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};
use std::time::SystemTime;

use thiserror::Error;

use crate::types::RoomId;

/// Persistence failures
#[derive(Debug, Error)]
pub enum StoreError {
    /// A room with this name is already stored
    #[error("room already stored: {0}")]
    Duplicate(String),

    /// Backend failure
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// A durably recorded room
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredRoom {
    pub room_id: RoomId,
    pub created_at: SystemTime,
}

impl StoredRoom {
    pub fn new(room_id: RoomId) -> Self {
        Self {
            room_id,
            created_at: SystemTime::now(),
        }
    }
}

/// Durable room directory
///
/// Calls are synchronous; implementations backed by slow I/O should keep
/// their own cache.
pub trait RoomStore: Send + Sync {
    fn find_room_by_name(&self, room_id: &RoomId) -> Result<Option<StoredRoom>, StoreError>;

    fn insert_room(&self, room: StoredRoom) -> Result<(), StoreError>;

    fn list_all_rooms(&self) -> Result<Vec<StoredRoom>, StoreError>;
}

/// In-process store, used by the binary and in tests
#[derive(Debug, Default)]
pub struct MemoryRoomStore {
    rooms: Mutex<BTreeMap<RoomId, StoredRoom>>,
}

impl MemoryRoomStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RoomStore for MemoryRoomStore {
    fn find_room_by_name(&self, room_id: &RoomId) -> Result<Option<StoredRoom>, StoreError> {
        let rooms = self.rooms.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(rooms.get(room_id).cloned())
    }

    fn insert_room(&self, room: StoredRoom) -> Result<(), StoreError> {
        let mut rooms = self.rooms.lock().unwrap_or_else(PoisonError::into_inner);
        if rooms.contains_key(&room.room_id) {
            return Err(StoreError::Duplicate(room.room_id.to_string()));
        }
        rooms.insert(room.room_id.clone(), room);
        Ok(())
    }

    fn list_all_rooms(&self) -> Result<Vec<StoredRoom>, StoreError> {
        let rooms = self.rooms.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(rooms.values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_find() {
        let store = MemoryRoomStore::new();
        let id = RoomId::parse("alpha").unwrap();

        assert!(store.find_room_by_name(&id).unwrap().is_none());
        store.insert_room(StoredRoom::new(id.clone())).unwrap();
        assert_eq!(store.find_room_by_name(&id).unwrap().unwrap().room_id, id);
    }

    #[test]
    fn test_duplicate_insert_rejected() {
        let store = MemoryRoomStore::new();
        let id = RoomId::parse("alpha").unwrap();

        store.insert_room(StoredRoom::new(id.clone())).unwrap();
        assert!(matches!(
            store.insert_room(StoredRoom::new(id)),
            Err(StoreError::Duplicate(_))
        ));
    }

    #[test]
    fn test_list_sorted_by_name() {
        let store = MemoryRoomStore::new();
        for name in ["gamma", "alpha", "beta"] {
            store
                .insert_room(StoredRoom::new(RoomId::parse(name).unwrap()))
                .unwrap();
        }

        let names: Vec<_> = store
            .list_all_rooms()
            .unwrap()
            .into_iter()
            .map(|r| r.room_id.to_string())
            .collect();
        assert_eq!(names, vec!["alpha", "beta", "gamma"]);
    }
}
