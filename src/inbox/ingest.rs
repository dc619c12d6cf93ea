//! Inbox ingest: one broker queue into the inbox table.

use std::sync::mpsc::{channel, Sender, TryRecvError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, warn};

use crate::bus::{Envelope, PublishError, Subscriber};
use crate::store::InboxStore;

/// Persists every message from one queue into the inbox, keyed by
/// `event_id`.
///
/// Messages are acknowledged on receipt, so the idempotent insert is what
/// makes broker redelivery harmless: a duplicate `event_id` is ignored.
/// Bodies that do not parse as an envelope are logged and dropped; they
/// can never become parseable, so there is nothing to retry.
pub struct InboxIngest<S, Q> {
    queue: String,
    subscriber: Q,
    store: S,
}

impl<S, Q> InboxIngest<S, Q> {
    pub fn new(queue: impl Into<String>, subscriber: Q, store: S) -> Self {
        Self {
            queue: queue.into(),
            subscriber,
            store,
        }
    }
}

impl<S: InboxStore, Q: Subscriber> InboxIngest<S, Q> {
    /// Wait up to `timeout` for one message and ingest it.
    /// Returns whether a message was consumed.
    pub fn poll_once(&self, timeout: Duration) -> Result<bool, PublishError> {
        match self.subscriber.poll(timeout)? {
            None => Ok(false),
            Some(body) => {
                self.ingest(&body);
                Ok(true)
            }
        }
    }

    fn ingest(&self, body: &[u8]) {
        let envelope = match Envelope::from_bytes(body) {
            Ok(envelope) => envelope,
            Err(err) => {
                warn!(queue = %self.queue, error = %err,
                    "dropping malformed message");
                return;
            }
        };

        match self
            .store
            .insert_if_absent(&envelope.event_id, &self.queue, envelope.payload)
        {
            Ok(true) => {
                debug!(event_id = %envelope.event_id, queue = %self.queue,
                    "inbox event recorded");
            }
            Ok(false) => {
                debug!(event_id = %envelope.event_id, queue = %self.queue,
                    "duplicate delivery ignored");
            }
            Err(err) => {
                // The message is gone from the broker; losing it here is
                // visible in the logs, not silently swallowed.
                warn!(event_id = %envelope.event_id, queue = %self.queue,
                    error = %err, "failed to record inbox event");
            }
        }
    }
}

/// A background thread pumping one subscription into the inbox.
pub struct InboxIngestThread {
    stop_tx: Sender<()>,
    handle: Option<JoinHandle<()>>,
}

impl InboxIngestThread {
    pub fn spawn<S, Q>(ingest: InboxIngest<S, Q>, poll_timeout: Duration) -> Self
    where
        S: InboxStore + Send + 'static,
        Q: Subscriber + Send + 'static,
    {
        let (stop_tx, stop_rx) = channel();

        let handle = thread::spawn(move || loop {
            match stop_rx.try_recv() {
                Ok(()) | Err(TryRecvError::Disconnected) => break,
                Err(TryRecvError::Empty) => {}
            }

            if let Err(err) = ingest.poll_once(poll_timeout) {
                warn!(queue = %ingest.queue, error = %err, "inbox poll failed");
                thread::sleep(poll_timeout);
            }
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

impl Drop for InboxIngestThread {
    fn drop(&mut self) {
        let _ = self.stop_tx.send(());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{InMemoryBroker, Publisher};
    use crate::event::topology;
    use crate::store::InMemoryStore;
    use serde_json::json;

    fn wired() -> (InMemoryBroker, InMemoryStore, InboxIngest<InMemoryStore, crate::bus::InMemorySubscriber>) {
        let broker = InMemoryBroker::new();
        broker.declare_queue(topology::COMPETITION_CREATED);
        let store = InMemoryStore::new();
        let ingest = InboxIngest::new(
            topology::COMPETITION_CREATED,
            broker.subscribe(topology::COMPETITION_CREATED),
            store.clone(),
        );
        (broker, store, ingest)
    }

    #[test]
    fn persists_messages_keyed_by_event_id() {
        let (broker, store, ingest) = wired();

        let envelope = Envelope::new("evt-1", topology::COMPETITION_CREATED, json!({"id": 1}));
        broker.publish(topology::COMPETITION_CREATED, &envelope).unwrap();

        assert!(ingest.poll_once(Duration::from_millis(10)).unwrap());

        let rows = store.inbox_rows();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].event_id, "evt-1");
        assert_eq!(rows[0].event_type, topology::COMPETITION_CREATED);
        assert!(!rows[0].processed);
    }

    #[test]
    fn redelivery_does_not_duplicate() {
        let (broker, store, ingest) = wired();

        let envelope = Envelope::new("evt-1", topology::COMPETITION_CREATED, json!({"id": 1}));
        broker.publish(topology::COMPETITION_CREATED, &envelope).unwrap();
        broker.publish(topology::COMPETITION_CREATED, &envelope).unwrap();

        assert!(ingest.poll_once(Duration::from_millis(10)).unwrap());
        assert!(ingest.poll_once(Duration::from_millis(10)).unwrap());

        assert_eq!(store.inbox_rows().len(), 1);
    }

    #[test]
    fn malformed_bodies_are_dropped() {
        let (broker, store, ingest) = wired();

        broker
            .publish_raw(topology::COMPETITION_CREATED, b"not an envelope".to_vec())
            .unwrap();

        assert!(ingest.poll_once(Duration::from_millis(10)).unwrap());
        assert!(store.inbox_rows().is_empty());
    }

    #[test]
    fn empty_queue_reports_no_work() {
        let (_broker, _store, ingest) = wired();
        assert!(!ingest.poll_once(Duration::from_millis(5)).unwrap());
    }
}
