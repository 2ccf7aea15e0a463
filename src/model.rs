use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::mentions::extract_mentions;

pub const DEFAULT_PAGE_LIMIT: usize = 50;
pub const MAX_PAGE_LIMIT: usize = 1000;

// ---------------------------------------------------------------------------
// Rooms
// ---------------------------------------------------------------------------

/// One entry of the room directory as stored on disk (keyed by room name).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RoomRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub message_count: u64,
    #[serde(default)]
    pub user_count: u64,
}

/// The whole `rooms.json` document.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoomDirectoryDocument {
    #[serde(default)]
    pub rooms: BTreeMap<String, RoomRecord>,
}

/// A room together with its name, as handed to callers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    pub name: String,
    #[serde(flatten)]
    pub record: RoomRecord,
}

impl Room {
    pub fn from_record(name: impl Into<String>, record: RoomRecord) -> Self {
        Self {
            name: name.into(),
            record,
        }
    }
}

// ---------------------------------------------------------------------------
// Presence
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
#[clap(rename_all = "snake_case")]
pub enum PresenceStatus {
    #[default]
    Online,
    Offline,
}

impl std::fmt::Display for PresenceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Online => write!(f, "online"),
            Self::Offline => write!(f, "offline"),
        }
    }
}

/// Self-description an agent may attach when entering a room.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AgentProfile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub capabilities: Vec<String>,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PresenceRecord {
    pub status: PresenceStatus,
    #[serde(default)]
    pub message_count: u64,
    pub joined_at: DateTime<Utc>,
    /// Time of the last status change. Older documents may lack it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<AgentProfile>,
}

impl PresenceRecord {
    pub fn is_online(&self) -> bool {
        self.status == PresenceStatus::Online
    }

    /// Reference time used when aging out offline records.
    pub fn last_change(&self) -> DateTime<Utc> {
        self.last_seen.unwrap_or(self.joined_at)
    }
}

/// The whole `presence.json` document of one room.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PresenceDocument {
    pub room_name: String,
    #[serde(default)]
    pub users: BTreeMap<String, PresenceRecord>,
}

impl PresenceDocument {
    pub fn empty(room: &str) -> Self {
        Self {
            room_name: room.to_string(),
            users: BTreeMap::new(),
        }
    }
}

/// A presence record together with the agent it belongs to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AgentPresence {
    pub agent_name: String,
    #[serde(flatten)]
    pub record: PresenceRecord,
}

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

/// One line of a room's message log. Immutable once written.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub agent_name: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub mentions: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Map<String, serde_json::Value>>,
}

impl Message {
    /// Build a new message with a fresh id, the current time, and mentions
    /// parsed from the body.
    pub fn new(
        agent_name: impl Into<String>,
        body: impl Into<String>,
        metadata: Option<serde_json::Map<String, serde_json::Value>>,
    ) -> Self {
        let message = body.into();
        let mentions = extract_mentions(&message);
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            agent_name: agent_name.into(),
            message,
            timestamp: Utc::now(),
            mentions,
            metadata,
        }
    }

    pub fn mentions_agent(&self, agent: &str) -> bool {
        self.mentions.iter().any(|m| m == agent)
    }
}

/// Parameters of a paginated log read.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct MessageQuery {
    /// Page size; `None` means [`DEFAULT_PAGE_LIMIT`].
    pub limit: Option<usize>,
    pub offset: usize,
    /// Requesting agent. Only consulted when `mentions_only` is set.
    pub agent_name: Option<String>,
    pub mentions_only: bool,
}

impl MessageQuery {
    pub fn page(limit: usize, offset: usize) -> Self {
        Self {
            limit: Some(limit),
            offset,
            ..Self::default()
        }
    }

    pub fn mentioning(agent: impl Into<String>) -> Self {
        Self {
            agent_name: Some(agent.into()),
            mentions_only: true,
            ..Self::default()
        }
    }

    /// Clamped page size.
    pub fn effective_limit(&self) -> usize {
        self.limit
            .unwrap_or(DEFAULT_PAGE_LIMIT)
            .clamp(1, MAX_PAGE_LIMIT)
    }

    /// The agent whose mentions filter the page, if filtering applies.
    pub fn mention_filter(&self) -> Option<&str> {
        if self.mentions_only {
            self.agent_name.as_deref()
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MessagePage {
    pub messages: Vec<Message>,
    pub has_more: bool,
}
