//! In-memory broker for testing and single-process scenarios.
//!
//! Thread-safe broker implementing both [`Publisher`] and (per queue, via
//! [`InMemoryBroker::subscribe`]) [`Subscriber`]. Useful for:
//! - Unit and integration testing without external dependencies
//! - Single-process applications
//! - Development and prototyping
//!
//! Topology mirrors the production broker: durable queues are declared up
//! front, fanout exchanges deliver one publish to every bound queue.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use super::envelope::Envelope;
use super::publisher::{PublishError, Publisher};
use super::subscriber::Subscriber;

#[derive(Default)]
struct BrokerState {
    queues: HashMap<String, VecDeque<Vec<u8>>>,
    exchanges: HashMap<String, Vec<String>>,
    /// Append-only publish log for test assertions: (queue, body).
    delivered: Vec<(String, Vec<u8>)>,
}

/// In-memory broker with durable queues and fanout exchanges.
///
/// ## Example
///
/// ```
/// use std::time::Duration;
/// use serde_json::json;
/// use contest_sagas::bus::{Envelope, InMemoryBroker, Publisher, Subscriber};
///
/// let broker = InMemoryBroker::new();
/// broker.declare_queue("competition_created");
///
/// let envelope = Envelope::new("evt-1", "competition_created", json!({"id": 1}));
/// broker.publish("competition_created", &envelope).unwrap();
///
/// let subscriber = broker.subscribe("competition_created");
/// let body = subscriber.poll(Duration::from_millis(10)).unwrap().unwrap();
/// assert_eq!(Envelope::from_bytes(&body).unwrap(), envelope);
/// ```
#[derive(Clone)]
pub struct InMemoryBroker {
    state: Arc<Mutex<BrokerState>>,
    arrival: Arc<Condvar>,
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(BrokerState::default())),
            arrival: Arc::new(Condvar::new()),
        }
    }

    /// Declare a durable queue. Declaring an existing queue is a no-op.
    pub fn declare_queue(&self, name: &str) {
        let mut state = self.state.lock().unwrap();
        state.queues.entry(name.to_string()).or_default();
    }

    /// Declare a fanout exchange. Declaring an existing exchange is a no-op.
    pub fn declare_exchange(&self, name: &str) {
        let mut state = self.state.lock().unwrap();
        state.exchanges.entry(name.to_string()).or_default();
    }

    /// Declare `queue` and bind it to `exchange`.
    pub fn bind_queue(&self, queue: &str, exchange: &str) -> Result<(), PublishError> {
        let mut state = self.state.lock().unwrap();
        state.queues.entry(queue.to_string()).or_default();
        let bindings = state
            .exchanges
            .get_mut(exchange)
            .ok_or_else(|| PublishError::UnknownExchange(exchange.to_string()))?;
        if !bindings.iter().any(|bound| bound == queue) {
            bindings.push(queue.to_string());
        }
        Ok(())
    }

    /// Create a consumer for one queue.
    ///
    /// Each subscriber competes for messages: a body handed to one
    /// subscriber is consumed, matching durable-queue semantics.
    pub fn subscribe(&self, queue: &str) -> InMemorySubscriber {
        self.declare_queue(queue);
        InMemorySubscriber {
            queue: queue.to_string(),
            state: Arc::clone(&self.state),
            arrival: Arc::clone(&self.arrival),
        }
    }

    /// Push raw bytes onto a queue, bypassing envelope serialization.
    ///
    /// Exists so tests can deliver malformed bodies.
    pub fn publish_raw(&self, queue: &str, body: Vec<u8>) -> Result<(), PublishError> {
        let mut state = self.state.lock().unwrap();
        self.deliver(&mut state, queue, body)?;
        self.arrival.notify_all();
        Ok(())
    }

    /// Every body delivered to `queue` so far, parsed as envelopes.
    /// Bodies that do not parse are skipped.
    pub fn delivered_to(&self, queue: &str) -> Vec<Envelope> {
        let state = self.state.lock().unwrap();
        state
            .delivered
            .iter()
            .filter(|(name, _)| name == queue)
            .filter_map(|(_, body)| Envelope::from_bytes(body).ok())
            .collect()
    }

    /// Total number of deliveries across all queues.
    pub fn delivery_count(&self) -> usize {
        self.state.lock().unwrap().delivered.len()
    }

    /// Number of bodies currently waiting on `queue`.
    pub fn depth(&self, queue: &str) -> usize {
        let state = self.state.lock().unwrap();
        state.queues.get(queue).map(VecDeque::len).unwrap_or(0)
    }

    fn deliver(
        &self,
        state: &mut BrokerState,
        queue: &str,
        body: Vec<u8>,
    ) -> Result<(), PublishError> {
        let messages = state
            .queues
            .get_mut(queue)
            .ok_or_else(|| PublishError::UnknownQueue(queue.to_string()))?;
        messages.push_back(body.clone());
        state.delivered.push((queue.to_string(), body));
        Ok(())
    }
}

impl Publisher for InMemoryBroker {
    fn publish(&self, queue: &str, envelope: &Envelope) -> Result<(), PublishError> {
        let body = envelope
            .to_bytes()
            .map_err(|e| PublishError::SerializationFailed(e.to_string()))?;
        let mut state = self.state.lock().unwrap();
        self.deliver(&mut state, queue, body)?;
        self.arrival.notify_all();
        Ok(())
    }

    fn publish_fanout(&self, exchange: &str, envelope: &Envelope) -> Result<(), PublishError> {
        let body = envelope
            .to_bytes()
            .map_err(|e| PublishError::SerializationFailed(e.to_string()))?;
        let mut state = self.state.lock().unwrap();
        let bound: Vec<String> = state
            .exchanges
            .get(exchange)
            .ok_or_else(|| PublishError::UnknownExchange(exchange.to_string()))?
            .clone();
        for queue in bound {
            self.deliver(&mut state, &queue, body.clone())?;
        }
        self.arrival.notify_all();
        Ok(())
    }
}

/// Consumer handle for one queue of an [`InMemoryBroker`].
pub struct InMemorySubscriber {
    queue: String,
    state: Arc<Mutex<BrokerState>>,
    arrival: Arc<Condvar>,
}

impl Subscriber for InMemorySubscriber {
    fn poll(&self, timeout: Duration) -> Result<Option<Vec<u8>>, PublishError> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock().unwrap();

        loop {
            if let Some(messages) = state.queues.get_mut(&self.queue) {
                if let Some(body) = messages.pop_front() {
                    return Ok(Some(body));
                }
            }

            let remaining = match deadline.checked_duration_since(Instant::now()) {
                Some(remaining) if !remaining.is_zero() => remaining,
                _ => return Ok(None),
            };

            let (next, wait) = self.arrival.wait_timeout(state, remaining).unwrap();
            state = next;
            if wait.timed_out() {
                if let Some(messages) = state.queues.get_mut(&self.queue) {
                    if let Some(body) = messages.pop_front() {
                        return Ok(Some(body));
                    }
                }
                return Ok(None);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn publish_to_undeclared_queue_fails() {
        let broker = InMemoryBroker::new();
        let envelope = Envelope::new("evt-1", "competition_created", json!({}));
        assert!(matches!(
            broker.publish("competition_created", &envelope),
            Err(PublishError::UnknownQueue(_))
        ));
    }

    #[test]
    fn queue_is_consumed_point_to_point() {
        let broker = InMemoryBroker::new();
        broker.declare_queue("competition_created");

        let envelope = Envelope::new("evt-1", "competition_created", json!({"id": 1}));
        broker.publish("competition_created", &envelope).unwrap();

        let first = broker.subscribe("competition_created");
        let second = broker.subscribe("competition_created");

        assert!(first.poll(Duration::from_millis(10)).unwrap().is_some());
        // Consumed by the first subscriber; queues are not fanout.
        assert!(second.poll(Duration::from_millis(10)).unwrap().is_none());
    }

    #[test]
    fn fanout_reaches_every_bound_queue() {
        let broker = InMemoryBroker::new();
        broker.declare_exchange("rollback_exchange");
        broker.bind_queue("rollback_events", "rollback_exchange").unwrap();
        broker
            .bind_queue("leaderboard_rollback_queue", "rollback_exchange")
            .unwrap();

        let envelope = Envelope::new("evt-1", "rollback_events", json!({"competition_id": 3}));
        broker.publish_fanout("rollback_exchange", &envelope).unwrap();

        assert_eq!(broker.depth("rollback_events"), 1);
        assert_eq!(broker.depth("leaderboard_rollback_queue"), 1);
    }

    #[test]
    fn fanout_to_unknown_exchange_fails() {
        let broker = InMemoryBroker::new();
        let envelope = Envelope::new("evt-1", "rollback_events", json!({}));
        assert!(matches!(
            broker.publish_fanout("rollback_exchange", &envelope),
            Err(PublishError::UnknownExchange(_))
        ));
    }

    #[test]
    fn poll_times_out_when_empty() {
        let broker = InMemoryBroker::new();
        let subscriber = broker.subscribe("competition_created");
        let started = Instant::now();
        assert!(subscriber.poll(Duration::from_millis(20)).unwrap().is_none());
        assert!(started.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn poll_wakes_on_arrival() {
        let broker = InMemoryBroker::new();
        broker.declare_queue("competition_created");
        let subscriber = broker.subscribe("competition_created");

        let publisher = broker.clone();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            let envelope = Envelope::new("evt-1", "competition_created", json!({"id": 1}));
            publisher.publish("competition_created", &envelope).unwrap();
        });

        let body = subscriber.poll(Duration::from_secs(2)).unwrap();
        assert!(body.is_some());
        handle.join().unwrap();
    }

    #[test]
    fn delivered_log_skips_unparseable_bodies() {
        let broker = InMemoryBroker::new();
        broker.declare_queue("competition_created");
        broker
            .publish_raw("competition_created", b"not json".to_vec())
            .unwrap();

        assert_eq!(broker.delivery_count(), 1);
        assert!(broker.delivered_to("competition_created").is_empty());
    }

    #[test]
    fn binding_twice_delivers_once() {
        let broker = InMemoryBroker::new();
        broker.declare_exchange("rollback_exchange");
        broker.bind_queue("rollback_events", "rollback_exchange").unwrap();
        broker.bind_queue("rollback_events", "rollback_exchange").unwrap();

        let envelope = Envelope::new("evt-1", "rollback_events", json!({}));
        broker.publish_fanout("rollback_exchange", &envelope).unwrap();
        assert_eq!(broker.depth("rollback_events"), 1);
    }
}
