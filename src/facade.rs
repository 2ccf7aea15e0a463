use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::config::StoreConfig;
use crate::error::Result;
use crate::model::{AgentPresence, AgentProfile, Message, MessagePage, MessageQuery, Room};
use crate::store::cache::PageCache;
use crate::store::lock::LockManager;
use crate::store::messages::MessageLog;
use crate::store::paths::DataLayout;
use crate::store::presence::PresenceStore;
use crate::store::query::MessageQueries;
use crate::store::rooms::RoomDirectory;

/// All stores over one data directory, wired together.
///
/// Each instance is independent: two `Agora`s over different directories
/// share nothing, and two over the same directory coordinate through the
/// on-disk lock markers exactly like two processes would.
#[derive(Debug, Clone)]
pub struct Agora {
    layout: DataLayout,
    rooms: RoomDirectory,
    presence: PresenceStore,
    messages: MessageLog,
    queries: MessageQueries,
}

impl Agora {
    pub fn open(config: &StoreConfig) -> Self {
        let layout = DataLayout::new(config.data_dir());
        let locks = LockManager::from_config(config);
        let cache = Arc::new(PageCache::new(config.cache_capacity));
        let messages = MessageLog::open(&layout, locks.clone()).with_observer(cache.clone());
        Self {
            rooms: RoomDirectory::open(&layout, locks.clone()),
            presence: PresenceStore::open(&layout, locks),
            queries: MessageQueries::new(messages.clone(), cache),
            messages,
            layout,
        }
    }

    pub fn data_dir(&self) -> &Path {
        self.layout.root()
    }

    // -- rooms --------------------------------------------------------------

    pub fn create_room(&self, name: &str, description: Option<&str>) -> Result<Room> {
        self.rooms.create_room(name, description)
    }

    pub fn room_exists(&self, name: &str) -> Result<bool> {
        self.rooms.exists(name)
    }

    pub fn get_room(&self, name: &str) -> Result<Room> {
        self.rooms.get(name)
    }

    pub fn list_rooms(&self) -> Result<Vec<Room>> {
        self.rooms.list_all()
    }

    pub fn list_room_names(&self) -> Result<Vec<String>> {
        self.rooms.list_names()
    }

    pub fn update_user_count(&self, room: &str, user_count: u64) -> Result<Room> {
        self.rooms.update_user_count(room, user_count)
    }

    pub fn increment_room_message_count(&self, room: &str) -> Result<Room> {
        self.rooms.increment_message_count(room, 1)
    }

    // -- presence -----------------------------------------------------------

    pub fn upsert_presence(
        &self,
        room: &str,
        agent: &str,
        profile: Option<AgentProfile>,
    ) -> Result<AgentPresence> {
        self.presence.upsert_online(room, agent, profile)
    }

    pub fn set_offline(&self, room: &str, agent: &str) -> Result<AgentPresence> {
        self.presence.mark_offline(room, agent)
    }

    pub fn get_presence(&self, room: &str, agent: &str) -> Result<AgentPresence> {
        self.presence.get(room, agent)
    }

    pub fn list_presence(&self, room: &str) -> Result<Vec<AgentPresence>> {
        self.presence.list_agents(room)
    }

    pub fn count_online(&self, room: &str) -> Result<u64> {
        self.presence.count_online(room)
    }

    pub fn increment_agent_message_count(&self, room: &str, agent: &str) -> Result<AgentPresence> {
        self.presence.increment_message_count(room, agent)
    }

    pub fn prune_offline(&self, room: &str, max_age: Duration) -> Result<usize> {
        self.presence.prune_offline(room, max_age)
    }

    // -- messages -----------------------------------------------------------

    pub fn append_message(&self, room: &str, message: &Message) -> Result<()> {
        self.messages.append(room, message)
    }

    pub fn query_messages(&self, room: &str, query: &MessageQuery) -> Result<MessagePage> {
        self.queries.query(room, query)
    }

    pub fn message_count(&self, room: &str) -> Result<usize> {
        self.messages.count(room)
    }

    pub fn clear_messages(&self, room: &str) -> Result<usize> {
        self.messages.clear(room)
    }
}
