use std::time::{Duration, Instant};

use dashmap::DashMap;

/// Failures within the window before a key id is locked out.
const LOCKOUT_THRESHOLD: u32 = 10;
/// Window over which failures accumulate, and the lockout duration.
const LOCKOUT_WINDOW: Duration = Duration::from_secs(15 * 60);

#[derive(Debug, Clone, Copy)]
struct FailureWindow {
    count: u32,
    window_start: Instant,
}

/// Per-key-id failure counter. Once a key id accumulates ten failures within
/// fifteen minutes, further attempts are rejected without touching the
/// database or running argon2.
#[derive(Debug, Default)]
pub struct FailureTracker {
    failures: DashMap<String, FailureWindow>,
}

impl FailureTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Is this key id currently locked out?
    pub fn is_locked(&self, key_id: &str) -> bool {
        // Copy out before touching the map again; holding the shard guard
        // across a remove would deadlock.
        let snapshot = self.failures.get(key_id).map(|entry| (entry.count, entry.window_start));
        match snapshot {
            Some((count, window_start)) if window_start.elapsed() < LOCKOUT_WINDOW => {
                count >= LOCKOUT_THRESHOLD
            }
            Some(_) => {
                self.failures.remove(key_id);
                false
            }
            None => false,
        }
    }

    /// Count one failed attempt.
    pub fn record_failure(&self, key_id: &str) {
        let mut entry = self.failures.entry(key_id.to_string()).or_insert(FailureWindow {
            count: 0,
            window_start: Instant::now(),
        });
        if entry.window_start.elapsed() >= LOCKOUT_WINDOW {
            entry.count = 0;
            entry.window_start = Instant::now();
        }
        entry.count += 1;
    }

    /// Clear the counter after a successful authentication.
    pub fn clear(&self, key_id: &str) {
        self.failures.remove(key_id);
    }
}
