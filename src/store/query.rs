use std::sync::Arc;

use tracing::debug;

use crate::error::Result;
use crate::model::{MessagePage, MessageQuery};
use crate::store::cache::{PageCache, PageKey};
use crate::store::files::fingerprint;
use crate::store::messages::MessageLog;

/// Paginated, optionally mention-filtered reads of a room's log, served from
/// the page cache when possible.
#[derive(Debug, Clone)]
pub struct MessageQueries {
    log: MessageLog,
    cache: Arc<PageCache>,
}

impl MessageQueries {
    /// `log` must already have `cache` registered as an observer, otherwise
    /// appends would not evict cached pages.
    pub fn new(log: MessageLog, cache: Arc<PageCache>) -> Self {
        Self { log, cache }
    }

    pub fn query(&self, room: &str, query: &MessageQuery) -> Result<MessagePage> {
        let key = PageKey::new(room, query);
        let current = fingerprint(&self.log.log_path(room))?;
        if let Some(page) = self.cache.get(&key, current) {
            debug!(room, key = %key.encode(), "page cache hit");
            return Ok(page);
        }

        let generation = self.cache.generation(room);
        let (page, read_fp) = self.log.read_snapshot(room, query)?;
        self.cache.insert(&key, page.clone(), generation, read_fp);
        Ok(page)
    }

    pub fn cache(&self) -> &PageCache {
        &self.cache
    }
}
