use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Mutex;

use lru::LruCache;

use crate::model::{MessagePage, MessageQuery};
use crate::store::files::Fingerprint;
use crate::store::messages::LogObserver;

/// Identity of a computed page: room plus every query parameter that can
/// change the result.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PageKey {
    pub room: String,
    /// Requesting agent, kept only for mention-filtered queries.
    pub agent: Option<String>,
    pub limit: usize,
    pub offset: usize,
    pub mentions_only: bool,
}

impl PageKey {
    pub fn new(room: &str, query: &MessageQuery) -> Self {
        Self {
            room: room.to_string(),
            agent: query.mention_filter().map(str::to_string),
            limit: query.effective_limit(),
            offset: query.offset,
            mentions_only: query.mentions_only,
        }
    }

    /// Canonical string form used as the cache key.
    pub fn encode(&self) -> String {
        serde_json::json!([
            self.room,
            self.agent,
            self.limit,
            self.offset,
            self.mentions_only
        ])
        .to_string()
    }
}

#[derive(Debug, Clone)]
struct CachedPage {
    room: String,
    page: MessagePage,
    fingerprint: Fingerprint,
}

#[derive(Debug)]
struct CacheState {
    entries: LruCache<String, CachedPage>,
    /// Bumped on every invalidation of a room.
    generations: HashMap<String, u64>,
}

impl CacheState {
    fn generation(&self, room: &str) -> u64 {
        self.generations.get(room).copied().unwrap_or(0)
    }
}

/// Process-local LRU of computed message pages.
///
/// The cache never reads the log. A page is only accepted by
/// [`PageCache::insert`] if no invalidation of its room happened since the
/// caller took [`PageCache::generation`], and only served by
/// [`PageCache::get`] while the log still has the fingerprint the page was
/// computed from. The second check catches writes by other processes.
#[derive(Debug)]
pub struct PageCache {
    state: Mutex<CacheState>,
}

impl PageCache {
    /// A capacity of zero is treated as one.
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            state: Mutex::new(CacheState {
                entries: LruCache::new(capacity),
                generations: HashMap::new(),
            }),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, CacheState> {
        // Every mutation leaves the state consistent, so a poisoned lock is
        // still usable.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Current invalidation generation of `room`. Take it before reading the
    /// log and hand it back to [`PageCache::insert`].
    pub fn generation(&self, room: &str) -> u64 {
        self.state().generation(room)
    }

    /// Cached page for `key`, marking it most recently used. Entries whose
    /// log no longer matches `current` are dropped instead.
    pub fn get(&self, key: &PageKey, current: Fingerprint) -> Option<MessagePage> {
        let encoded = key.encode();
        let mut state = self.state();
        let fresh = state.entries.get(&encoded).map(|e| e.fingerprint == current)?;
        if !fresh {
            state.entries.pop(&encoded);
            return None;
        }
        state.entries.get(&encoded).map(|e| e.page.clone())
    }

    /// Store a page computed at `generation` from a log with `fingerprint`.
    /// Returns false (and stores nothing) if the room was invalidated since.
    pub fn insert(
        &self,
        key: &PageKey,
        page: MessagePage,
        generation: u64,
        fingerprint: Fingerprint,
    ) -> bool {
        let mut state = self.state();
        if state.generation(&key.room) != generation {
            return false;
        }
        state.entries.put(
            key.encode(),
            CachedPage {
                room: key.room.clone(),
                page,
                fingerprint,
            },
        );
        true
    }

    /// Drop every page of `room`.
    pub fn clear_room(&self, room: &str) {
        let mut state = self.state();
        *state.generations.entry(room.to_string()).or_insert(0) += 1;
        let stale: Vec<String> = state
            .entries
            .iter()
            .filter(|(_, e)| e.room == room)
            .map(|(k, _)| k.clone())
            .collect();
        for key in stale {
            state.entries.pop(&key);
        }
    }

    /// Drop every page.
    pub fn clear(&self) {
        let mut state = self.state();
        let rooms: Vec<String> = state.entries.iter().map(|(_, e)| e.room.clone()).collect();
        for room in rooms {
            *state.generations.entry(room).or_insert(0) += 1;
        }
        state.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.state().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl LogObserver for PageCache {
    fn log_changed(&self, room: &str) {
        self.clear_room(room);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Message;

    const FP: Fingerprint = (10, 1);

    fn page(bodies: &[&str]) -> MessagePage {
        MessagePage {
            messages: bodies
                .iter()
                .map(|b| Message::new("alice", *b, None))
                .collect(),
            has_more: false,
        }
    }

    fn key(room: &str, offset: usize) -> PageKey {
        PageKey::new(room, &MessageQuery::page(10, offset))
    }

    #[test]
    fn key_ignores_agent_unless_mention_filtered() {
        let mut q = MessageQuery::page(10, 0);
        q.agent_name = Some("bob".into());
        assert_eq!(PageKey::new("general", &q), key("general", 0));

        q.mentions_only = true;
        let filtered = PageKey::new("general", &q);
        assert_eq!(filtered.agent.as_deref(), Some("bob"));
        assert_ne!(filtered.encode(), key("general", 0).encode());
    }

    #[test]
    fn key_uses_effective_limit() {
        assert_eq!(
            PageKey::new("general", &MessageQuery::default()),
            PageKey::new("general", &MessageQuery::page(50, 0))
        );
    }

    #[test]
    fn insert_then_get() {
        let cache = PageCache::new(4);
        let k = key("general", 0);
        assert!(cache.get(&k, FP).is_none());
        assert!(cache.insert(&k, page(&["a"]), cache.generation("general"), FP));
        assert_eq!(cache.get(&k, FP).unwrap().messages[0].message, "a");
    }

    #[test]
    fn fingerprint_mismatch_evicts() {
        let cache = PageCache::new(4);
        let k = key("general", 0);
        cache.insert(&k, page(&["a"]), 0, FP);
        assert!(cache.get(&k, (11, 2)).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn clear_room_drops_only_that_room() {
        let cache = PageCache::new(8);
        cache.insert(&key("general", 0), page(&["a"]), 0, FP);
        cache.insert(&key("general", 10), page(&["b"]), 0, FP);
        cache.insert(&key("random", 0), page(&["c"]), 0, FP);

        cache.clear_room("general");
        assert!(cache.get(&key("general", 0), FP).is_none());
        assert!(cache.get(&key("general", 10), FP).is_none());
        assert!(cache.get(&key("random", 0), FP).is_some());
    }

    #[test]
    fn insert_after_invalidation_is_rejected() {
        let cache = PageCache::new(4);
        let k = key("general", 0);
        let generation = cache.generation("general");
        // A write lands between the read and the insert
        cache.log_changed("general");
        assert!(!cache.insert(&k, page(&["old"]), generation, FP));
        assert!(cache.get(&k, FP).is_none());

        let generation = cache.generation("general");
        assert!(cache.insert(&k, page(&["new"]), generation, FP));
    }

    #[test]
    fn least_recently_used_is_evicted() {
        let cache = PageCache::new(2);
        cache.insert(&key("general", 0), page(&["a"]), 0, FP);
        cache.insert(&key("general", 10), page(&["b"]), 0, FP);
        // Touch the first so the second becomes LRU
        assert!(cache.get(&key("general", 0), FP).is_some());
        cache.insert(&key("general", 20), page(&["c"]), 0, FP);

        assert_eq!(cache.len(), 2);
        assert!(cache.get(&key("general", 0), FP).is_some());
        assert!(cache.get(&key("general", 10), FP).is_none());
        assert!(cache.get(&key("general", 20), FP).is_some());
    }

    #[test]
    fn clear_empties_everything() {
        let cache = PageCache::new(4);
        cache.insert(&key("general", 0), page(&["a"]), 0, FP);
        cache.insert(&key("random", 0), page(&["b"]), 0, FP);
        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn zero_capacity_still_holds_one() {
        let cache = PageCache::new(0);
        cache.insert(&key("general", 0), page(&["a"]), 0, FP);
        cache.insert(&key("general", 10), page(&["b"]), 0, FP);
        assert_eq!(cache.len(), 1);
    }
}
