//! Backpressure queue for deferred outbound requests.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use crate::store::StoreError;

/// A deferred problem fetch, waiting for quota.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QueuedFetch {
    pub problem_id: u64,
}

/// Per-counterparty FIFO of requests that were denied admission.
///
/// Push at the tail, pop at the head: requests are retried in arrival
/// order. There is no ordering guarantee across counterparties.
#[derive(Default)]
pub struct BackpressureQueue {
    queues: Mutex<HashMap<String, VecDeque<QueuedFetch>>>,
}

impl BackpressureQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&self, counterparty: &str, request: QueuedFetch) -> Result<(), StoreError> {
        let mut queues = self
            .queues
            .lock()
            .map_err(|_| StoreError::LockPoisoned("queue push"))?;
        queues
            .entry(counterparty.to_string())
            .or_default()
            .push_back(request);
        Ok(())
    }

    /// The oldest waiting request, or `None` when the queue is empty.
    /// Empty is a normal condition, not an error.
    pub fn dequeue(&self, counterparty: &str) -> Result<Option<QueuedFetch>, StoreError> {
        let mut queues = self
            .queues
            .lock()
            .map_err(|_| StoreError::LockPoisoned("queue pop"))?;
        Ok(queues
            .get_mut(counterparty)
            .and_then(VecDeque::pop_front))
    }

    /// Requests currently waiting for `counterparty`.
    pub fn depth(&self, counterparty: &str) -> usize {
        self.queues
            .lock()
            .map(|queues| queues.get(counterparty).map(VecDeque::len).unwrap_or(0))
            .unwrap_or(0)
    }
}
