use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Mutex;
#[cfg(test)]
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::error::StoreError;
use crate::models::{Participant, RoomCheckpoint, RoomRecord};

/// Durable storage of rooms, owned by the persistence collaborator.
///
/// Participant writes are keyed by connection id so replaying them is harmless.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Short backend name for logs and readiness output
    fn backend(&self) -> &'static str;

    /// Check that the backend is reachable
    async fn ping(&self) -> Result<(), StoreError>;

    async fn fetch_room(&self, room_id: &str) -> Result<Option<RoomRecord>, StoreError>;

    /// Insert the record unless a room with the same id already exists
    async fn create_room(&self, record: &RoomRecord) -> Result<(), StoreError>;

    /// Write buffer, language and revision, creating the room if needed.
    /// A checkpoint older than the stored revision is ignored.
    async fn upsert_room(&self, checkpoint: &RoomCheckpoint) -> Result<(), StoreError>;

    async fn add_participant(&self, room_id: &str, participant: &Participant) -> Result<(), StoreError>;

    async fn remove_participant(&self, room_id: &str, connection_id: &str) -> Result<(), StoreError>;

    /// Drop every persisted participant of a room
    async fn clear_participants(&self, room_id: &str) -> Result<(), StoreError>;
}

/// In-process store used when no durable backend is configured
#[derive(Default)]
pub struct MemorySessionStore {
    rooms: Mutex<HashMap<String, RoomRecord>>,
    #[cfg(test)]
    upserts: Mutex<Vec<RoomCheckpoint>>,
    #[cfg(test)]
    unavailable: AtomicBool,
    #[cfg(test)]
    fetches: AtomicUsize,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn rooms(&self) -> std::sync::MutexGuard<'_, HashMap<String, RoomRecord>> {
        self.rooms.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    #[cfg(test)]
    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store switched off".to_string()));
        }
        Ok(())
    }

    #[cfg(not(test))]
    fn check_available(&self) -> Result<(), StoreError> {
        Ok(())
    }

    /// Simulate an outage of the backend
    #[cfg(test)]
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Every checkpoint written so far, oldest first
    #[cfg(test)]
    pub fn upserts(&self) -> Vec<RoomCheckpoint> {
        self.upserts.lock().unwrap().clone()
    }

    #[cfg(test)]
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    #[cfg(test)]
    pub fn room(&self, room_id: &str) -> Option<RoomRecord> {
        self.rooms().get(room_id).cloned()
    }

    #[cfg(test)]
    pub fn insert_room(&self, record: RoomRecord) {
        self.rooms().insert(record.room_id.clone(), record);
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.check_available()
    }

    async fn fetch_room(&self, room_id: &str) -> Result<Option<RoomRecord>, StoreError> {
        #[cfg(test)]
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        Ok(self.rooms().get(room_id).cloned())
    }

    async fn create_room(&self, record: &RoomRecord) -> Result<(), StoreError> {
        self.check_available()?;
        self.rooms()
            .entry(record.room_id.clone())
            .or_insert_with(|| record.clone());
        Ok(())
    }

    async fn upsert_room(&self, checkpoint: &RoomCheckpoint) -> Result<(), StoreError> {
        self.check_available()?;
        {
            let mut rooms = self.rooms();
            let room = rooms
                .entry(checkpoint.room_id.clone())
                .or_insert_with(|| RoomRecord::new(checkpoint.room_id.clone(), "", ""));
            if room.revision > checkpoint.revision {
                return Ok(());
            }
            room.code = checkpoint.code.clone();
            room.language = checkpoint.language;
            room.revision = checkpoint.revision;
            room.updated_at = checkpoint.updated_at;
        }
        #[cfg(test)]
        self.upserts.lock().unwrap().push(checkpoint.clone());
        Ok(())
    }

    async fn add_participant(&self, room_id: &str, participant: &Participant) -> Result<(), StoreError> {
        self.check_available()?;
        let mut rooms = self.rooms();
        let room = rooms
            .entry(room_id.to_string())
            .or_insert_with(|| RoomRecord::new(room_id, "", ""));
        if !room.participants.iter().any(|p| p.connection_id == participant.connection_id) {
            room.participants.push(participant.clone());
        }
        room.updated_at = Utc::now();
        Ok(())
    }

    async fn remove_participant(&self, room_id: &str, connection_id: &str) -> Result<(), StoreError> {
        self.check_available()?;
        if let Some(room) = self.rooms().get_mut(room_id) {
            room.participants.retain(|p| p.connection_id != connection_id);
        }
        Ok(())
    }

    async fn clear_participants(&self, room_id: &str) -> Result<(), StoreError> {
        self.check_available()?;
        if let Some(room) = self.rooms().get_mut(room_id) {
            room.participants.clear();
        }
        Ok(())
    }
}
