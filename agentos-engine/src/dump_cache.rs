//! Response cache for DUMP: keyed `(tenant, agent, limit)`, 60-second TTL,
//! capped at 100 entries. When full, the oldest half is dropped rather
//! than tracking strict LRU order. Every successful write for an agent
//! invalidates its cached dumps.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use uuid::Uuid;

use crate::memory::DumpEntry;

const DUMP_CACHE_TTL: Duration = Duration::from_secs(60);
const DUMP_CACHE_CAPACITY: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct DumpKey {
    tenant_id: Uuid,
    agent_id: String,
    limit: i64,
}

#[derive(Debug, Clone)]
struct CachedDump {
    stored_at: Instant,
    entries: Vec<DumpEntry>,
}

#[derive(Debug, Default)]
pub struct DumpCache {
    entries: DashMap<DumpKey, CachedDump>,
}

impl DumpCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, tenant_id: Uuid, agent_id: &str, limit: i64) -> Option<Vec<DumpEntry>> {
        let key =
            DumpKey { tenant_id, agent_id: agent_id.to_string(), limit };
        let cached = self.entries.get(&key)?;
        if cached.stored_at.elapsed() >= DUMP_CACHE_TTL {
            drop(cached);
            self.entries.remove(&key);
            return None;
        }
        Some(cached.entries.clone())
    }

    pub fn insert(&self, tenant_id: Uuid, agent_id: &str, limit: i64, entries: Vec<DumpEntry>) {
        if self.entries.len() >= DUMP_CACHE_CAPACITY {
            self.evict_oldest_half();
        }
        self.entries.insert(
            DumpKey { tenant_id, agent_id: agent_id.to_string(), limit },
            CachedDump { stored_at: Instant::now(), entries },
        );
    }

    /// Drop every cached dump for `(tenant, agent)`.
    pub fn invalidate(&self, tenant_id: Uuid, agent_id: &str) {
        self.entries
            .retain(|key, _| !(key.tenant_id == tenant_id && key.agent_id == agent_id));
    }

    fn evict_oldest_half(&self) {
        let mut ages: Vec<(DumpKey, Instant)> = self
            .entries
            .iter()
            .map(|entry| (entry.key().clone(), entry.stored_at))
            .collect();
        ages.sort_by_key(|(_, stored_at)| *stored_at);
        for (key, _) in ages.into_iter().take(DUMP_CACHE_CAPACITY / 2) {
            self.entries.remove(&key);
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entries() -> Vec<DumpEntry> {
        Vec::new()
    }

    #[test]
    fn test_hit_and_miss() {
        let cache = DumpCache::new();
        let tenant = Uuid::new_v4();
        cache.insert(tenant, "a", 200, entries());
        assert!(cache.get(tenant, "a", 200).is_some());
        assert!(cache.get(tenant, "a", 100).is_none());
        assert!(cache.get(tenant, "b", 200).is_none());
        assert!(cache.get(Uuid::new_v4(), "a", 200).is_none());
    }

    #[test]
    fn test_invalidate_clears_all_limits_for_agent() {
        let cache = DumpCache::new();
        let tenant = Uuid::new_v4();
        cache.insert(tenant, "a", 100, entries());
        cache.insert(tenant, "a", 200, entries());
        cache.insert(tenant, "b", 200, entries());
        cache.invalidate(tenant, "a");
        assert!(cache.get(tenant, "a", 100).is_none());
        assert!(cache.get(tenant, "a", 200).is_none());
        assert!(cache.get(tenant, "b", 200).is_some());
    }

    #[test]
    fn test_capacity_drops_oldest_half() {
        let cache = DumpCache::new();
        let tenant = Uuid::new_v4();
        for i in 0..DUMP_CACHE_CAPACITY {
            cache.insert(tenant, &format!("agent-{i}"), 200, entries());
        }
        assert_eq!(cache.len(), DUMP_CACHE_CAPACITY);
        cache.insert(tenant, "one-more", 200, entries());
        assert!(cache.len() <= DUMP_CACHE_CAPACITY / 2 + 1);
        assert!(cache.get(tenant, "one-more", 200).is_some());
    }
}
