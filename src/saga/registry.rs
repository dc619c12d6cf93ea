//! Registry of in-flight saga timers.

use std::collections::HashMap;
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Mutex;

/// Owns the cancellation handle of every pending saga.
///
/// At most one timer is live per saga key. The success path and the
/// timeout path race; whichever loses finds the entry already gone and
/// must treat that as a no-op, so every operation here tolerates an
/// absent key.
#[derive(Default)]
pub struct SagaRegistry {
    timers: Mutex<HashMap<String, Sender<()>>>,
}

impl SagaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a timer for `key` and hand back the receiver it waits on.
    /// Returns `None` when a timer is already armed for this key.
    pub fn register(&self, key: &str) -> Option<Receiver<()>> {
        let mut timers = lock(&self.timers);
        if timers.contains_key(key) {
            return None;
        }
        let (cancel_tx, cancel_rx) = channel();
        timers.insert(key.to_string(), cancel_tx);
        Some(cancel_rx)
    }

    /// Signal the timer for `key` and drop the entry. Returns whether a
    /// timer was found; a missing key (already expired or already
    /// confirmed) is a silent no-op.
    pub fn cancel(&self, key: &str) -> bool {
        let handle = lock(&self.timers).remove(key);
        match handle {
            Some(cancel_tx) => {
                // The receiver may already be gone if the timer fired
                // between the lookup and the send.
                let _ = cancel_tx.send(());
                true
            }
            None => false,
        }
    }

    /// Drop the entry without signalling, used by the timer itself after
    /// it fires.
    pub fn remove(&self, key: &str) -> bool {
        lock(&self.timers).remove(key).is_some()
    }

    /// Whether a timer is currently armed for `key`.
    pub fn is_armed(&self, key: &str) -> bool {
        lock(&self.timers).contains_key(key)
    }

    /// Number of pending sagas.
    pub fn len(&self) -> usize {
        lock(&self.timers).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Cancellation must never panic, even after a poisoning panic elsewhere;
/// the map is still structurally valid.
fn lock(
    timers: &Mutex<HashMap<String, Sender<()>>>,
) -> std::sync::MutexGuard<'_, HashMap<String, Sender<()>>> {
    timers.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
