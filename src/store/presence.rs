use chrono::{Duration as ChronoDuration, Utc};
use tracing::debug;

use crate::error::{AgoraError, Result};
use crate::model::{AgentPresence, AgentProfile, PresenceDocument, PresenceRecord, PresenceStatus};
use crate::store::files::{read_document, write_document};
use crate::store::lock::LockManager;
use crate::store::paths::DataLayout;

/// Per-room `presence.json` documents: who has been in the room and who is
/// online now.
///
/// Records are never deleted by leaving; an agent that leaves is kept as
/// offline until [`PresenceStore::prune_offline`] ages it out.
#[derive(Debug, Clone)]
pub struct PresenceStore {
    layout: DataLayout,
    locks: LockManager,
}

impl PresenceStore {
    pub fn open(layout: &DataLayout, locks: LockManager) -> Self {
        Self {
            layout: layout.clone(),
            locks,
        }
    }

    fn load(&self, room: &str) -> Result<PresenceDocument> {
        Ok(read_document(&self.layout.presence_document(room))?
            .unwrap_or_else(|| PresenceDocument::empty(room)))
    }

    fn update<T>(
        &self,
        room: &str,
        f: impl FnOnce(&mut PresenceDocument) -> Result<T>,
    ) -> Result<T> {
        let path = self.layout.presence_document(room);
        self.locks.with_lock(&path, || {
            let mut doc = self.load(room)?;
            let out = f(&mut doc)?;
            write_document(&path, &doc)?;
            Ok(out)
        })
    }

    fn snapshot(&self, room: &str) -> Result<PresenceDocument> {
        let path = self.layout.presence_document(room);
        self.locks.with_lock(&path, || self.load(room))
    }

    /// Create the agent's record, or flip an existing one back online.
    ///
    /// `joinedAt` is kept from the first entry. The profile is replaced only
    /// when a new one is given.
    pub fn upsert_online(
        &self,
        room: &str,
        agent: &str,
        profile: Option<AgentProfile>,
    ) -> Result<AgentPresence> {
        self.update(room, |doc| {
            let now = Utc::now();
            let record = doc
                .users
                .entry(agent.to_string())
                .and_modify(|existing| {
                    existing.status = PresenceStatus::Online;
                    existing.last_seen = Some(now);
                })
                .or_insert_with(|| PresenceRecord {
                    status: PresenceStatus::Online,
                    message_count: 0,
                    joined_at: now,
                    last_seen: Some(now),
                    profile: None,
                });
            if profile.is_some() {
                record.profile = profile;
            }
            Ok(AgentPresence {
                agent_name: agent.to_string(),
                record: record.clone(),
            })
        })
    }

    /// Mark an agent offline. The agent must have been recorded in the room.
    pub fn mark_offline(&self, room: &str, agent: &str) -> Result<AgentPresence> {
        self.update(room, |doc| {
            let record = doc
                .users
                .get_mut(agent)
                .ok_or_else(|| AgoraError::AgentNotPresent {
                    room: room.to_string(),
                    agent: agent.to_string(),
                })?;
            record.status = PresenceStatus::Offline;
            record.last_seen = Some(Utc::now());
            Ok(AgentPresence {
                agent_name: agent.to_string(),
                record: record.clone(),
            })
        })
    }

    pub fn get(&self, room: &str, agent: &str) -> Result<AgentPresence> {
        self.snapshot(room)?
            .users
            .remove(agent)
            .map(|record| AgentPresence {
                agent_name: agent.to_string(),
                record,
            })
            .ok_or_else(|| AgoraError::AgentNotFound {
                room: room.to_string(),
                agent: agent.to_string(),
            })
    }

    /// Every known agent, online or not, ordered by name.
    pub fn list_agents(&self, room: &str) -> Result<Vec<AgentPresence>> {
        Ok(self
            .snapshot(room)?
            .users
            .into_iter()
            .map(|(agent_name, record)| AgentPresence { agent_name, record })
            .collect())
    }

    pub fn count_online(&self, room: &str) -> Result<u64> {
        Ok(self
            .snapshot(room)?
            .users
            .values()
            .filter(|r| r.is_online())
            .count() as u64)
    }

    pub fn increment_message_count(&self, room: &str, agent: &str) -> Result<AgentPresence> {
        self.update(room, |doc| {
            let record = doc
                .users
                .get_mut(agent)
                .ok_or_else(|| AgoraError::AgentNotFound {
                    room: room.to_string(),
                    agent: agent.to_string(),
                })?;
            record.message_count = record.message_count.saturating_add(1);
            Ok(AgentPresence {
                agent_name: agent.to_string(),
                record: record.clone(),
            })
        })
    }

    /// Drop offline records whose last status change is older than `max_age`.
    /// Returns how many were removed. Running it twice removes nothing more.
    pub fn prune_offline(&self, room: &str, max_age: std::time::Duration) -> Result<usize> {
        let max_age = ChronoDuration::from_std(max_age).unwrap_or(ChronoDuration::MAX);
        let cutoff = Utc::now()
            .checked_sub_signed(max_age)
            .unwrap_or(chrono::DateTime::<Utc>::MIN_UTC);
        let path = self.layout.presence_document(room);
        let removed = self.locks.with_lock(&path, || {
            let mut doc = self.load(room)?;
            let before = doc.users.len();
            doc.users
                .retain(|_, r| r.is_online() || r.last_change() >= cutoff);
            let removed = before - doc.users.len();
            if removed > 0 {
                write_document(&path, &doc)?;
            }
            Ok(removed)
        })?;
        debug!(room, removed, "pruned offline presence records");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::time::Duration;
    use tempfile::tempdir;

    fn setup() -> (tempfile::TempDir, PresenceStore) {
        let dir = tempdir().unwrap();
        let layout = DataLayout::new(dir.path());
        let locks = LockManager::new(Duration::from_secs(5), Duration::from_millis(5));
        (dir, PresenceStore::open(&layout, locks))
    }

    fn profile(role: &str) -> AgentProfile {
        AgentProfile {
            role: Some(role.into()),
            capabilities: vec!["review".into()],
            ..AgentProfile::default()
        }
    }

    #[test]
    fn missing_document_means_no_users() {
        let (_dir, store) = setup();
        assert!(store.list_agents("general").unwrap().is_empty());
        assert_eq!(store.count_online("general").unwrap(), 0);
    }

    #[test]
    fn upsert_is_idempotent_and_keeps_joined_at() {
        let (_dir, store) = setup();
        let first = store.upsert_online("general", "alice", None).unwrap();
        std::thread::sleep(Duration::from_millis(5));
        let second = store.upsert_online("general", "alice", None).unwrap();

        assert_eq!(first.record.joined_at, second.record.joined_at);
        let agents = store.list_agents("general").unwrap();
        assert_eq!(agents.len(), 1);
        assert_eq!(agents[0].record.joined_at, first.record.joined_at);
        assert_eq!(agents[0].record.status, PresenceStatus::Online);
    }

    #[test]
    fn reentry_after_leave_goes_online_and_keeps_history() {
        let (_dir, store) = setup();
        let joined = store.upsert_online("general", "alice", Some(profile("coder"))).unwrap();
        store.increment_message_count("general", "alice").unwrap();
        store.mark_offline("general", "alice").unwrap();
        assert_eq!(store.count_online("general").unwrap(), 0);

        let back = store.upsert_online("general", "alice", None).unwrap();
        assert_eq!(back.record.status, PresenceStatus::Online);
        assert_eq!(back.record.joined_at, joined.record.joined_at);
        assert_eq!(back.record.message_count, 1);
        // No profile given on re-entry: previous one kept
        assert_eq!(back.record.profile, Some(profile("coder")));

        let refreshed = store
            .upsert_online("general", "alice", Some(profile("reviewer")))
            .unwrap();
        assert_eq!(refreshed.record.profile, Some(profile("reviewer")));
    }

    #[test]
    fn mark_offline_unknown_agent_conflicts() {
        let (_dir, store) = setup();
        let err = store.mark_offline("general", "ghost").unwrap_err();
        assert!(matches!(err, AgoraError::AgentNotPresent { .. }));
        assert_eq!(err.kind(), crate::error::ErrorKind::Conflict);
    }

    #[test]
    fn list_is_sorted_and_includes_offline() {
        let (_dir, store) = setup();
        store.upsert_online("general", "carol", None).unwrap();
        store.upsert_online("general", "alice", None).unwrap();
        store.upsert_online("general", "bob", None).unwrap();
        store.mark_offline("general", "bob").unwrap();

        let names: Vec<String> = store
            .list_agents("general")
            .unwrap()
            .into_iter()
            .map(|a| a.agent_name)
            .collect();
        assert_eq!(names, vec!["alice", "bob", "carol"]);
        assert_eq!(store.count_online("general").unwrap(), 2);
    }

    #[test]
    fn rooms_are_independent() {
        let (_dir, store) = setup();
        store.upsert_online("general", "alice", None).unwrap();
        assert!(store.list_agents("random").unwrap().is_empty());
        assert!(matches!(
            store.get("random", "alice"),
            Err(AgoraError::AgentNotFound { .. })
        ));
    }

    #[test]
    fn increment_unknown_agent_is_not_found() {
        let (_dir, store) = setup();
        assert!(matches!(
            store.increment_message_count("general", "ghost"),
            Err(AgoraError::AgentNotFound { .. })
        ));
    }

    #[test]
    fn prune_removes_only_old_offline_records() {
        let (dir, store) = setup();
        store.upsert_online("general", "alice", None).unwrap();
        store.upsert_online("general", "bob", None).unwrap();
        store.upsert_online("general", "carol", None).unwrap();
        store.mark_offline("general", "bob").unwrap();
        store.mark_offline("general", "carol").unwrap();

        // Age bob's record by rewriting the document directly
        let path = dir.path().join("rooms/general/presence.json");
        let mut doc: PresenceDocument =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        let old = Utc::now() - ChronoDuration::hours(2);
        let bob = doc.users.get_mut("bob").unwrap();
        bob.last_seen = Some(old);
        bob.joined_at = old;
        fs::write(&path, serde_json::to_string(&doc).unwrap()).unwrap();

        let removed = store
            .prune_offline("general", Duration::from_secs(3600))
            .unwrap();
        assert_eq!(removed, 1);
        let names: Vec<String> = store
            .list_agents("general")
            .unwrap()
            .into_iter()
            .map(|a| a.agent_name)
            .collect();
        assert_eq!(names, vec!["alice", "carol"]);

        // Idempotent
        assert_eq!(
            store.prune_offline("general", Duration::from_secs(3600)).unwrap(),
            0
        );
    }

    #[test]
    fn document_uses_wire_shape() {
        let (dir, store) = setup();
        store.upsert_online("general", "alice", Some(profile("coder"))).unwrap();
        let raw = fs::read_to_string(dir.path().join("rooms/general/presence.json")).unwrap();
        let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(json["roomName"], "general");
        let alice = &json["users"]["alice"];
        assert_eq!(alice["status"], "online");
        assert_eq!(alice["messageCount"], 0);
        assert_eq!(alice["profile"]["role"], "coder");
        assert!(alice["joinedAt"].is_string());
    }

    #[test]
    fn corrupt_document_is_not_empty() {
        let (dir, store) = setup();
        let path = dir.path().join("rooms/general/presence.json");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "garbage").unwrap();
        assert!(matches!(
            store.list_agents("general"),
            Err(AgoraError::Corrupt(_, _))
        ));
    }

    #[test]
    fn concurrent_upserts_keep_every_agent() {
        let (_dir, store) = setup();
        std::thread::scope(|s| {
            for i in 0..10 {
                let store = &store;
                s.spawn(move || {
                    store
                        .upsert_online("general", &format!("agent-{i}"), None)
                        .unwrap();
                });
            }
        });
        assert_eq!(store.list_agents("general").unwrap().len(), 10);
        assert_eq!(store.count_online("general").unwrap(), 10);
    }
}
