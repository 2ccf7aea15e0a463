use std::path::PathBuf;

use chrono::Utc;
use tracing::info;

use crate::error::{AgoraError, Result};
use crate::model::{Room, RoomDirectoryDocument, RoomRecord};
use crate::store::files::{read_document, write_document};
use crate::store::lock::LockManager;
use crate::store::paths::DataLayout;

/// The `rooms.json` document: every room and its counters.
#[derive(Debug, Clone)]
pub struct RoomDirectory {
    path: PathBuf,
    locks: LockManager,
}

impl RoomDirectory {
    pub fn open(layout: &DataLayout, locks: LockManager) -> Self {
        Self {
            path: layout.rooms_document(),
            locks,
        }
    }

    fn load(&self) -> Result<RoomDirectoryDocument> {
        Ok(read_document(&self.path)?.unwrap_or_default())
    }

    /// Read-modify-write the document under its lock.
    fn update<T>(&self, f: impl FnOnce(&mut RoomDirectoryDocument) -> Result<T>) -> Result<T> {
        self.locks.with_lock(&self.path, || {
            let mut doc = self.load()?;
            let out = f(&mut doc)?;
            write_document(&self.path, &doc)?;
            Ok(out)
        })
    }

    fn snapshot(&self) -> Result<RoomDirectoryDocument> {
        self.locks.with_lock(&self.path, || self.load())
    }

    /// Create a room. Fails with [`AgoraError::RoomExists`] if the name is taken.
    pub fn create_room(&self, name: &str, description: Option<&str>) -> Result<Room> {
        let room = self.update(|doc| {
            if doc.rooms.contains_key(name) {
                return Err(AgoraError::RoomExists(name.to_string()));
            }
            let record = RoomRecord {
                description: description.map(str::to_string),
                created_at: Utc::now(),
                message_count: 0,
                user_count: 0,
            };
            doc.rooms.insert(name.to_string(), record.clone());
            Ok(Room::from_record(name, record))
        })?;
        info!(room = name, "room created");
        Ok(room)
    }

    pub fn exists(&self, name: &str) -> Result<bool> {
        Ok(self.snapshot()?.rooms.contains_key(name))
    }

    pub fn get(&self, name: &str) -> Result<Room> {
        self.snapshot()?
            .rooms
            .remove(name)
            .map(|record| Room::from_record(name, record))
            .ok_or_else(|| AgoraError::RoomNotFound(name.to_string()))
    }

    pub fn update_user_count(&self, name: &str, user_count: u64) -> Result<Room> {
        self.update(|doc| {
            let record = doc
                .rooms
                .get_mut(name)
                .ok_or_else(|| AgoraError::RoomNotFound(name.to_string()))?;
            record.user_count = user_count;
            Ok(Room::from_record(name, record.clone()))
        })
    }

    pub fn increment_message_count(&self, name: &str, by: u64) -> Result<Room> {
        self.update(|doc| {
            let record = doc
                .rooms
                .get_mut(name)
                .ok_or_else(|| AgoraError::RoomNotFound(name.to_string()))?;
            record.message_count = record.message_count.saturating_add(by);
            Ok(Room::from_record(name, record.clone()))
        })
    }

    /// Room names in lexical order.
    pub fn list_names(&self) -> Result<Vec<String>> {
        Ok(self.snapshot()?.rooms.into_keys().collect())
    }

    /// Every room, ordered by name.
    pub fn list_all(&self) -> Result<Vec<Room>> {
        Ok(self
            .snapshot()?
            .rooms
            .into_iter()
            .map(|(name, record)| Room::from_record(name, record))
            .collect())
    }
}
