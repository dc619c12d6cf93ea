use tracing::{debug, warn};

use crate::bus::{Envelope, Publisher};
use crate::store::{OutboxStore, StoreError};

/// Result of one relay sweep.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RelayStats {
    /// Rows fetched this sweep.
    pub fetched: usize,
    /// Rows published and marked processed.
    pub published: usize,
    /// Rows whose publish failed; their retry count was bumped.
    pub failed: usize,
}

/// Drains a service's outbox table into the broker.
///
/// Each sweep fetches up to `batch_size` unpublished rows with
/// `retries < max_retries` in insertion order and publishes each to the
/// queue named by its `event_type`. Success marks the row processed;
/// failure bumps `retries` and leaves the row for the next sweep. Rows
/// that exhaust their retries stay in the table unpublished, where an
/// operator can find them.
pub struct OutboxRelay<S, P> {
    store: S,
    publisher: P,
    batch_size: usize,
    max_retries: u32,
}

impl<S, P> OutboxRelay<S, P> {
    pub fn new(store: S, publisher: P) -> Self {
        Self {
            store,
            publisher,
            batch_size: 10,
            max_retries: 5,
        }
    }

    /// Set the maximum rows fetched per sweep.
    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }

    /// Set the retry budget per row.
    pub fn with_max_retries(mut self, max: u32) -> Self {
        self.max_retries = max;
        self
    }
}

impl<S: OutboxStore, P: Publisher> OutboxRelay<S, P> {
    /// Run one sweep. Returns an error only when the fetch itself fails;
    /// per-row publish and bookkeeping failures are logged and counted.
    pub fn run_once(&self) -> Result<RelayStats, StoreError> {
        let rows = self
            .store
            .fetch_unpublished(self.batch_size, self.max_retries)?;

        let mut stats = RelayStats {
            fetched: rows.len(),
            ..RelayStats::default()
        };

        for row in rows {
            let envelope = Envelope::new(
                row.event_id.clone(),
                row.event_type.clone(),
                row.payload.clone(),
            );

            match self.publisher.publish(&row.event_type, &envelope) {
                Ok(()) => {
                    if let Err(err) = self.store.mark_published(row.id) {
                        // The row will be republished next sweep; consumers
                        // deduplicate on event_id.
                        warn!(event_id = %row.event_id, error = %err,
                            "published but failed to mark outbox row");
                    } else {
                        debug!(event_id = %row.event_id, queue = %row.event_type,
                            "outbox event published");
                        stats.published += 1;
                    }
                }
                Err(err) => {
                    warn!(event_id = %row.event_id, queue = %row.event_type,
                        attempt = row.retries + 1, error = %err,
                        "failed to publish outbox event");
                    if let Err(err) = self.store.record_publish_failure(row.id) {
                        warn!(event_id = %row.event_id, error = %err,
                            "failed to record outbox publish failure");
                    }
                    stats.failed += 1;
                }
            }
        }

        Ok(stats)
    }
}
