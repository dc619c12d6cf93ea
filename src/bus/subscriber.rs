//! Core subscriber trait for the message broker.

use std::time::Duration;

use super::publisher::PublishError;

/// Trait for consuming raw message bodies from one broker queue.
///
/// This is a pull-based interface. Messages are acknowledged on receipt
/// (auto-ack): durability of "processed" state lives in the inbox table,
/// not in broker redelivery, so a returned body is gone from the queue.
/// The body is returned unparsed; the consumer owns the decision of what
/// to do with bytes that do not parse as an envelope.
pub trait Subscriber: Send + Sync {
    /// Poll for the next message body, blocking until one is available or
    /// the timeout elapses.
    fn poll(&self, timeout: Duration) -> Result<Option<Vec<u8>>, PublishError>;
}
