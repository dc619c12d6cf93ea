//! Per-saga timeout timers and the compensation they publish.

use std::sync::mpsc::RecvTimeoutError;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::{info, warn};
use uuid::Uuid;

use crate::bus::{Envelope, Publisher};
use crate::event::{topology, DomainEvent, Rollback};
use crate::saga::SagaRegistry;

/// Arms a timer per competition-creation saga and publishes the
/// compensating rollback when the leaderboard confirmation does not
/// arrive in time.
///
/// Each `start` races a deadline against a cancellation signal, exactly
/// one of which wins:
/// - deadline: a [`DomainEvent::Rollback`] goes out through the fanout
///   exchange so every compensating consumer sees it, then the registry
///   entry is removed.
/// - cancellation: the entry is removed and nothing is published.
pub struct SagaCoordinator<P> {
    publisher: Arc<P>,
    registry: Arc<SagaRegistry>,
    deadline: Duration,
}

impl<P> SagaCoordinator<P> {
    pub fn new(publisher: Arc<P>, registry: Arc<SagaRegistry>) -> Self {
        Self {
            publisher,
            registry,
            deadline: Duration::from_secs(10),
        }
    }

    /// Set how long the saga may stay unconfirmed.
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    /// The shared registry, for wiring the success-side handler.
    pub fn registry(&self) -> &Arc<SagaRegistry> {
        &self.registry
    }
}

impl<P: Publisher + 'static> SagaCoordinator<P> {
    /// Arm the timer for a competition. Call immediately after the
    /// leading transaction commits.
    ///
    /// Returns `false` when a timer for this competition is already
    /// armed, which makes re-arming from a recovery sweep harmless.
    pub fn start(&self, competition_id: u64) -> bool {
        let key = competition_id.to_string();
        let Some(cancel_rx) = self.registry.register(&key) else {
            return false;
        };

        let publisher = Arc::clone(&self.publisher);
        let registry = Arc::clone(&self.registry);
        let deadline = self.deadline;

        thread::spawn(move || {
            match cancel_rx.recv_timeout(deadline) {
                Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                    info!(saga_key = %key, "saga timer canceled");
                }
                Err(RecvTimeoutError::Timeout) => {
                    info!(saga_key = %key, "saga deadline expired, initiating rollback");
                    publish_rollback(publisher.as_ref(), competition_id);
                    registry.remove(&key);
                }
            }
        });

        true
    }

    /// Confirm the saga, disarming its timer. Safe to call after the
    /// timer has already fired; the loser of the race is a no-op.
    pub fn cancel(&self, competition_id: u64) -> bool {
        self.registry.cancel(&competition_id.to_string())
    }
}

fn publish_rollback<P: Publisher>(publisher: &P, competition_id: u64) {
    let event = DomainEvent::Rollback(Rollback {
        competition_id,
        reason: "Timeout expired".to_string(),
    });

    let payload = match event.payload() {
        Ok(payload) => payload,
        Err(err) => {
            warn!(saga_key = %competition_id, error = %err,
                "failed to encode rollback event");
            return;
        }
    };

    let envelope = Envelope::new(Uuid::new_v4().to_string(), event.event_type(), payload);

    match publisher.publish_fanout(topology::ROLLBACK_EXCHANGE, &envelope) {
        Ok(()) => {
            info!(saga_key = %competition_id, event_id = %envelope.event_id,
                "rollback event published");
        }
        Err(err) => {
            warn!(saga_key = %competition_id, error = %err,
                "failed to publish rollback event");
        }
    }
}
