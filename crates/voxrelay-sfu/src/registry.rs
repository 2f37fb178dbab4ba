//! The in-memory directory of active rooms.

use crate::room::{read_lock, write_lock, Room};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Directory of active rooms, shared by every component that needs it.
///
/// Rooms are fully constructed before they are inserted, so a lookup never
/// observes a half-built room.
#[derive(Debug, Default)]
pub struct RoomRegistry {
    rooms: RwLock<HashMap<String, Arc<Room>>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty room under a fresh unique id.
    pub fn create_room(&self) -> Arc<Room> {
        let room = Arc::new(Room::new(voxrelay_types::generate_id()));
        write_lock(&self.rooms).insert(room.id().to_string(), room.clone());
        tracing::debug!(room_id = %room.id(), "room created");
        room
    }

    /// Looks a room up. A miss is not an error.
    pub fn get_room(&self, id: &str) -> Option<Arc<Room>> {
        read_lock(&self.rooms).get(id).cloned()
    }

    pub fn all_rooms(&self) -> Vec<Arc<Room>> {
        read_lock(&self.rooms).values().cloned().collect()
    }

    pub fn room_count(&self) -> usize {
        read_lock(&self.rooms).len()
    }

    /// Removes a room from the directory. Deleting an absent id is a no-op.
    ///
    /// The room's tasks and sessions are left running; use
    /// [`RoomRegistry::teardown_room`] to stop them as well.
    pub fn delete_room(&self, id: &str) -> Option<Arc<Room>> {
        write_lock(&self.rooms).remove(id)
    }

    /// Removes a room and shuts it down. Returns whether the room existed.
    pub async fn teardown_room(&self, id: &str) -> bool {
        match self.delete_room(id) {
            Some(room) => {
                room.shutdown().await;
                tracing::info!(room_id = %id, "room torn down");
                true
            }
            None => false,
        }
    }

    /// Tears down every room (process shutdown).
    pub async fn shutdown_all(&self) {
        let rooms: Vec<_> = write_lock(&self.rooms).drain().map(|(_, r)| r).collect();
        for room in rooms {
            room.shutdown().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn created_room_is_immediately_visible_and_empty() {
        let registry = RoomRegistry::new();
        let room = registry.create_room();

        let found = registry.get_room(room.id()).expect("room should exist");
        assert!(Arc::ptr_eq(&room, &found));
        assert_eq!(found.participant_count(), 0);
        assert!(found.participants().is_empty());
    }

    #[test]
    fn lookup_miss_is_none() {
        let registry = RoomRegistry::new();
        assert!(registry.get_room("missing").is_none());
    }

    #[test]
    fn delete_is_idempotent() {
        let registry = RoomRegistry::new();
        let room = registry.create_room();
        let id = room.id().to_string();

        assert!(registry.delete_room(&id).is_some());
        assert!(registry.delete_room(&id).is_none());
        assert!(registry.get_room(&id).is_none());
        assert_eq!(registry.room_count(), 0);
    }

    #[test]
    fn all_rooms_enumerates_every_room() {
        let registry = RoomRegistry::new();
        let a = registry.create_room();
        let b = registry.create_room();

        let mut ids: Vec<_> = registry
            .all_rooms()
            .iter()
            .map(|r| r.id().to_string())
            .collect();
        ids.sort();
        let mut expected = vec![a.id().to_string(), b.id().to_string()];
        expected.sort();
        assert_eq!(ids, expected);
    }

    #[tokio::test]
    async fn teardown_cancels_room() {
        let registry = RoomRegistry::new();
        let room = registry.create_room();
        let id = room.id().to_string();

        assert!(registry.teardown_room(&id).await);
        assert!(room.is_shut_down());
        assert!(!registry.teardown_room(&id).await);
    }
}
