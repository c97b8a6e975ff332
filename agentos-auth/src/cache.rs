use std::time::{Duration, Instant};

use dashmap::DashMap;

use crate::AuthContext;

const CACHE_TTL: Duration = Duration::from_secs(60);
const CACHE_CAPACITY: usize = 1000;

#[derive(Debug, Clone)]
struct CachedAuth {
    context: AuthContext,
    inserted: Instant,
}

/// Process-local cache of verified tokens.
///
/// Keyed by the full `<id>.<secret>` token so a revoked-and-reissued secret
/// can never hit a stale entry for longer than the 60-second TTL. Bounded at
/// 1000 entries; when full, expired entries are dropped first and then the
/// oldest live one.
#[derive(Debug, Default)]
pub struct AuthCache {
    entries: DashMap<String, CachedAuth>,
}

impl AuthCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, token: &str) -> Option<AuthContext> {
        let entry = self.entries.get(token)?;
        if entry.inserted.elapsed() >= CACHE_TTL {
            drop(entry);
            self.entries.remove(token);
            return None;
        }
        Some(entry.context.clone())
    }

    pub fn insert(&self, token: String, context: AuthContext) {
        if self.entries.len() >= CACHE_CAPACITY {
            self.evict();
        }
        self.entries.insert(token, CachedAuth { context, inserted: Instant::now() });
    }

    /// Drop all cached entries for a key id (revocation path).
    pub fn invalidate_key(&self, key_id: &str) {
        self.entries.retain(|_, cached| cached.context.key_id.as_ref() != key_id);
    }

    fn evict(&self) {
        self.entries.retain(|_, cached| cached.inserted.elapsed() < CACHE_TTL);
        if self.entries.len() < CACHE_CAPACITY {
            return;
        }
        let oldest = self
            .entries
            .iter()
            .min_by_key(|entry| entry.inserted)
            .map(|entry| entry.key().clone());
        if let Some(token) = oldest {
            self.entries.remove(&token);
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.entries.len()
    }
}
