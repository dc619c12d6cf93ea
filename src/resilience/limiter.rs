//! Sliding-window rate limiter for outbound calls.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::clock::Clock;

/// Error type for limiter decisions.
///
/// A failing counter store is surfaced, never mapped to an implicit
/// allow or deny; the caller owns that policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LimiterError {
    StoreUnavailable(String),
}

impl fmt::Display for LimiterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LimiterError::StoreUnavailable(msg) => {
                write!(f, "rate limit store unavailable: {}", msg)
            }
        }
    }
}

impl std::error::Error for LimiterError {}

/// Bucket counters with TTL, the Redis-shaped seam under the limiter.
pub trait CounterStore: Send + Sync {
    /// Current count for `key`; missing or expired keys read as zero.
    fn get(&self, key: &str) -> Result<u64, LimiterError>;

    /// Increment `key` and refresh its expiry to `ttl` from now.
    fn incr(&self, key: &str, ttl: Duration) -> Result<u64, LimiterError>;
}

/// Approximate sliding window over fixed-width buckets.
///
/// Admission sums the current bucket and the preceding ones spanning the
/// window. True counts per bucket, approximate behavior at bucket
/// boundaries; memory stays proportional to the bucket count instead of
/// the request count, and bursts cannot hide at a fixed-window edge.
/// Bucket keys expire on their own (TTL = window), so no sweeper is
/// needed.
pub struct SlidingWindowLimiter<C> {
    counters: C,
    clock: Arc<dyn Clock>,
    origin: Instant,
    limit: u64,
    window: Duration,
    bucket: Duration,
}

impl<C> SlidingWindowLimiter<C> {
    pub fn new(counters: C, clock: Arc<dyn Clock>) -> Self {
        let origin = clock.now();
        Self {
            counters,
            clock,
            origin,
            limit: 4,
            window: Duration::from_secs(60),
            bucket: Duration::from_secs(10),
        }
    }

    /// Maximum admitted calls per window per counterparty.
    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = limit;
        self
    }

    /// Window length. Must be a multiple of the bucket width.
    pub fn with_window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    /// Bucket width.
    pub fn with_bucket(mut self, bucket: Duration) -> Self {
        self.bucket = bucket;
        self
    }
}

impl<C: CounterStore> SlidingWindowLimiter<C> {
    /// May one more call go to `counterparty` now?
    ///
    /// With `check_only` the decision is made without consuming quota;
    /// background drainers probe admission this way before dequeuing.
    pub fn admit(&self, counterparty: &str, check_only: bool) -> Result<bool, LimiterError> {
        let elapsed = self.clock.now().duration_since(self.origin);
        let current = elapsed.as_secs() / self.bucket.as_secs().max(1);
        let span = (self.window.as_secs() / self.bucket.as_secs().max(1)).max(1);

        let mut total = 0u64;
        for offset in 0..span {
            let Some(index) = current.checked_sub(offset) else {
                break;
            };
            total += self.counters.get(&bucket_key(counterparty, index))?;
        }

        if total >= self.limit {
            return Ok(false);
        }

        if !check_only {
            self.counters
                .incr(&bucket_key(counterparty, current), self.window)?;
        }

        Ok(true)
    }
}

fn bucket_key(counterparty: &str, index: u64) -> String {
    format!("outgoing_limit:{}:{}", counterparty, index)
}

struct Cell {
    count: u64,
    expires_at: Instant,
}

/// In-memory [`CounterStore`] with clock-driven expiry.
pub struct InMemoryCounterStore {
    clock: Arc<dyn Clock>,
    cells: Mutex<HashMap<String, Cell>>,
}

impl InMemoryCounterStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            cells: Mutex::new(HashMap::new()),
        }
    }
}

impl CounterStore for InMemoryCounterStore {
    fn get(&self, key: &str) -> Result<u64, LimiterError> {
        let cells = self
            .cells
            .lock()
            .map_err(|_| LimiterError::StoreUnavailable("counter lock poisoned".to_string()))?;
        let now = self.clock.now();
        Ok(cells
            .get(key)
            .filter(|cell| cell.expires_at > now)
            .map(|cell| cell.count)
            .unwrap_or(0))
    }

    fn incr(&self, key: &str, ttl: Duration) -> Result<u64, LimiterError> {
        let mut cells = self
            .cells
            .lock()
            .map_err(|_| LimiterError::StoreUnavailable("counter lock poisoned".to_string()))?;
        let now = self.clock.now();
        cells.retain(|_, cell| cell.expires_at > now);

        let cell = cells.entry(key.to_string()).or_insert(Cell {
            count: 0,
            expires_at: now + ttl,
        });
        cell.count += 1;
        cell.expires_at = now + ttl;
        Ok(cell.count)
    }
}
