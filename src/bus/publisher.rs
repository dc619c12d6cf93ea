//! Core publisher trait for the message broker.

use std::error::Error;
use std::fmt;

use super::envelope::Envelope;

/// Error type for publish and poll operations.
#[derive(Debug)]
pub enum PublishError {
    /// The named queue has not been declared.
    UnknownQueue(String),
    /// The named exchange has not been declared.
    UnknownExchange(String),
    /// Serialization of the envelope failed.
    SerializationFailed(String),
    /// Connection to the broker failed.
    ConnectionFailed(String),
    /// Other error.
    Other(Box<dyn Error + Send + Sync>),
}

impl fmt::Display for PublishError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PublishError::UnknownQueue(name) => write!(f, "unknown queue: {}", name),
            PublishError::UnknownExchange(name) => write!(f, "unknown exchange: {}", name),
            PublishError::SerializationFailed(msg) => write!(f, "serialization failed: {}", msg),
            PublishError::ConnectionFailed(msg) => write!(f, "connection failed: {}", msg),
            PublishError::Other(e) => write!(f, "publish error: {}", e),
        }
    }
}

impl Error for PublishError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            PublishError::Other(e) => Some(e.as_ref()),
            _ => None,
        }
    }
}

/// Trait for publishing envelopes to a message broker.
///
/// The broker is modeled the way the services use it: durable queues for
/// point-to-point delivery and fanout exchanges for compensation events
/// that every bound service must see.
///
/// Implementations might include:
/// - `InMemoryBroker` - for testing and single-process scenarios
/// - an AMQP-backed broker for production deployments
pub trait Publisher: Send + Sync {
    /// Publish an envelope to a single durable queue.
    fn publish(&self, queue: &str, envelope: &Envelope) -> Result<(), PublishError>;

    /// Publish an envelope through a fanout exchange.
    ///
    /// The envelope is delivered to every queue bound to the exchange.
    fn publish_fanout(&self, exchange: &str, envelope: &Envelope) -> Result<(), PublishError>;
}
