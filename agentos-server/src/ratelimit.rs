//! Process-local rate limiting.
//!
//! Two mechanisms guard the API. Before authentication, a per-IP token
//! bucket absorbs unauthenticated traffic. After authentication, a
//! per-(tenant, endpoint) window counter enforces the per-minute limits.
//! Both are process-local; under horizontal scale each instance
//! enforces its own share.

use std::net::IpAddr;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use dashmap::DashMap;

/// Window length for the per-endpoint counters.
pub const WINDOW: Duration = Duration::from_secs(60);

/// Idle pre-auth buckets are evicted after twice the window.
const BUCKET_IDLE_TTL: Duration = Duration::from_secs(120);

/// What a limiter check returns, with the fields the response headers need.
#[derive(Debug, Clone, Copy)]
pub struct RateDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    pub reset_epoch_secs: u64,
    pub retry_after_secs: u64,
}

fn epoch_secs() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}

#[derive(Debug)]
struct WindowState {
    count: u32,
    window_start: Instant,
    window_start_epoch: u64,
}

/// Per-(tenant, endpoint) fixed-window counter that resets when the
/// 60-second window expires.
#[derive(Debug, Default)]
pub struct SlidingWindow {
    windows: DashMap<(String, String), WindowState>,
}

impl SlidingWindow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn check(&self, tenant: &str, endpoint: &str, limit: u32) -> RateDecision {
        let key = (tenant.to_string(), endpoint.to_string());
        let mut entry = self.windows.entry(key).or_insert_with(|| WindowState {
            count: 0,
            window_start: Instant::now(),
            window_start_epoch: epoch_secs(),
        });

        if entry.window_start.elapsed() >= WINDOW {
            entry.count = 0;
            entry.window_start = Instant::now();
            entry.window_start_epoch = epoch_secs();
        }
        entry.count += 1;

        let reset_epoch_secs = entry.window_start_epoch + WINDOW.as_secs();
        RateDecision {
            allowed: entry.count <= limit,
            limit,
            remaining: limit.saturating_sub(entry.count),
            reset_epoch_secs,
            retry_after_secs: reset_epoch_secs.saturating_sub(epoch_secs()).max(1),
        }
    }
}

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
    last_seen: Instant,
}

/// Per-IP token bucket consulted before authentication. Capacity equals the
/// per-minute limit; refill is linear at `limit / 60_000` tokens per
/// millisecond.
#[derive(Debug)]
pub struct PreAuthBuckets {
    buckets: DashMap<IpAddr, Bucket>,
    limit: u32,
}

impl PreAuthBuckets {
    pub fn new(limit: u32) -> Self {
        Self { buckets: DashMap::new(), limit }
    }

    pub fn check(&self, ip: IpAddr) -> RateDecision {
        let capacity = f64::from(self.limit);
        let rate_per_ms = capacity / 60_000.0;

        let mut bucket = self.buckets.entry(ip).or_insert_with(|| Bucket {
            tokens: capacity,
            last_refill: Instant::now(),
            last_seen: Instant::now(),
        });

        let elapsed_ms = bucket.last_refill.elapsed().as_millis() as f64;
        bucket.tokens = (bucket.tokens + elapsed_ms * rate_per_ms).min(capacity);
        bucket.last_refill = Instant::now();
        bucket.last_seen = Instant::now();

        let allowed = bucket.tokens >= 1.0;
        if allowed {
            bucket.tokens -= 1.0;
        }

        // Time until the bucket holds one token again.
        let deficit = (1.0 - bucket.tokens).max(0.0);
        let retry_after_secs = ((deficit / rate_per_ms) / 1000.0).ceil().max(1.0) as u64;

        RateDecision {
            allowed,
            limit: self.limit,
            remaining: bucket.tokens.floor().max(0.0) as u32,
            reset_epoch_secs: epoch_secs() + retry_after_secs,
            retry_after_secs,
        }
    }

    /// Drop buckets idle for longer than twice the window.
    pub fn evict_idle(&self) {
        self.buckets.retain(|_, bucket| bucket.last_seen.elapsed() < BUCKET_IDLE_TTL);
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.buckets.len()
    }
}
