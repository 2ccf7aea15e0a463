use std::path::{Path, PathBuf};

/// File layout under a data directory:
///
/// ```text
/// <data>/rooms.json
/// <data>/rooms/<room>/messages.jsonl
/// <data>/rooms/<room>/presence.json
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataLayout {
    root: PathBuf,
}

impl DataLayout {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            root: data_dir.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn rooms_document(&self) -> PathBuf {
        self.root.join("rooms.json")
    }

    pub fn rooms_dir(&self) -> PathBuf {
        self.root.join("rooms")
    }

    pub fn room_dir(&self, room: &str) -> PathBuf {
        self.rooms_dir().join(room)
    }

    pub fn messages_log(&self, room: &str) -> PathBuf {
        self.room_dir(room).join("messages.jsonl")
    }

    pub fn presence_document(&self, room: &str) -> PathBuf {
        self.room_dir(room).join("presence.json")
    }
}
