//! Key-value cache with per-entry TTL.
//!
//! Collaborator seam for the Redis-shaped cache the resilience facade and
//! the cached competition reads use. Values are serialized JSON strings,
//! matching what goes over the wire to the real cache.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use crate::clock::Clock;

use super::error::StoreError;

/// Get / set-with-TTL cache interface.
pub trait Cache: Send + Sync {
    /// Returns `None` for missing or expired keys.
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Store `value` under `key` for `ttl`.
    fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError>;
}

struct CacheEntry {
    value: String,
    expires_at: Instant,
}

/// In-memory [`Cache`] driven by an injected clock.
pub struct InMemoryCache {
    clock: Arc<dyn Clock>,
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl InMemoryCache {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            entries: RwLock::new(HashMap::new()),
        }
    }
}

impl Cache for InMemoryCache {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let entries = self
            .entries
            .read()
            .map_err(|_| StoreError::LockPoisoned("cache read"))?;
        let now = self.clock.now();
        Ok(entries
            .get(key)
            .filter(|entry| entry.expires_at > now)
            .map(|entry| entry.value.clone()))
    }

    fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| StoreError::LockPoisoned("cache write"))?;
        let now = self.clock.now();
        entries.retain(|_, entry| entry.expires_at > now);
        entries.insert(
            key.to_string(),
            CacheEntry {
                value: value.to_string(),
                expires_at: now + ttl,
            },
        );
        Ok(())
    }
}
