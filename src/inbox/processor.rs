//! Inbox processor: dispatches persisted events to domain handlers.

use std::sync::mpsc::{channel, Sender, TryRecvError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, warn};

use crate::event::DomainEvent;
use crate::store::{InboxStore, StoreError};

use super::handler::EventHandler;

/// Result of one processor sweep.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ProcessStats {
    /// Rows fetched this sweep.
    pub fetched: usize,
    /// Rows handled and marked processed.
    pub processed: usize,
    /// Rows whose handler failed; their retry count was bumped.
    pub failed: usize,
    /// Rows that did not decode to a known event; left untouched.
    pub skipped: usize,
}

/// Drains a service's inbox table through its [`EventHandler`].
///
/// Same sweep shape as the outbox relay: up to `batch_size` unprocessed
/// rows with `retries < max_retries`, id-ascending. Handler success marks
/// the row processed and stamps `processed_at`; handler failure bumps
/// `retries`. Rows that do not decode are logged and skipped without
/// touching their retry budget, since a structural problem cannot be
/// fixed by retrying.
pub struct InboxProcessor<S, H> {
    store: S,
    handler: H,
    batch_size: usize,
    max_retries: u32,
}

impl<S, H> InboxProcessor<S, H> {
    pub fn new(store: S, handler: H) -> Self {
        Self {
            store,
            handler,
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

impl<S: InboxStore, H: EventHandler> InboxProcessor<S, H> {
    /// Run one sweep. Returns an error only when the fetch itself fails.
    pub fn run_once(&self) -> Result<ProcessStats, StoreError> {
        let rows = self
            .store
            .fetch_unprocessed(self.batch_size, self.max_retries)?;

        let mut stats = ProcessStats {
            fetched: rows.len(),
            ..ProcessStats::default()
        };

        for row in rows {
            let event = match DomainEvent::decode(&row.event_type, &row.payload) {
                Ok(event) => event,
                Err(err) => {
                    warn!(event_id = %row.event_id, event_type = %row.event_type,
                        error = %err, "skipping unroutable inbox event");
                    stats.skipped += 1;
                    continue;
                }
            };

            match self.handler.handle(&event) {
                Ok(()) => {
                    if let Err(err) = self.store.mark_processed(row.id) {
                        warn!(event_id = %row.event_id, error = %err,
                            "handled but failed to mark inbox row");
                    } else {
                        debug!(event_id = %row.event_id, event_type = %row.event_type,
                            "inbox event processed");
                        stats.processed += 1;
                    }
                }
                Err(err) => {
                    warn!(event_id = %row.event_id, event_type = %row.event_type,
                        attempt = row.retries + 1, error = %err,
                        "inbox handler failed");
                    if let Err(err) = self.store.record_handler_failure(row.id) {
                        warn!(event_id = %row.event_id, error = %err,
                            "failed to record inbox handler failure");
                    }
                    stats.failed += 1;
                }
            }
        }

        Ok(stats)
    }
}

/// A background thread that sweeps the inbox on a fixed interval.
pub struct InboxProcessorThread {
    stop_tx: Sender<()>,
    handle: Option<JoinHandle<()>>,
}

impl InboxProcessorThread {
    pub fn spawn<S, H>(processor: InboxProcessor<S, H>, poll_interval: Duration) -> Self
    where
        S: InboxStore + Send + 'static,
        H: EventHandler + 'static,
    {
        let (stop_tx, stop_rx) = channel();

        let handle = thread::spawn(move || loop {
            match stop_rx.try_recv() {
                Ok(()) | Err(TryRecvError::Disconnected) => break,
                Err(TryRecvError::Empty) => {}
            }

            if let Err(err) = processor.run_once() {
                warn!(error = %err, "inbox sweep failed");
            }

            thread::sleep(poll_interval);
        });

        Self {
            stop_tx,
            handle: Some(handle),
        }
    }

    /// Signal the thread to stop and wait for it to finish.
    pub fn stop(mut self) {
        let _ = self.stop_tx.send(());
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for InboxProcessorThread {
    fn drop(&mut self) {
        let _ = self.stop_tx.send(());
    }
}
