//! Handler seam between the inbox processor and domain logic.

use std::error::Error;
use std::fmt;

use crate::event::DomainEvent;
use crate::store::StoreError;

/// Error type for event handler operations.
#[derive(Debug)]
pub enum HandlerError {
    /// Storage failed underneath the handler.
    Store(StoreError),
    /// Business logic rejected the event.
    Rejected(String),
    /// Other error.
    Other(Box<dyn Error + Send + Sync>),
}

impl fmt::Display for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandlerError::Store(e) => write!(f, "store error: {}", e),
            HandlerError::Rejected(msg) => write!(f, "rejected: {}", msg),
            HandlerError::Other(e) => write!(f, "handler error: {}", e),
        }
    }
}

impl Error for HandlerError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            HandlerError::Store(e) => Some(e),
            HandlerError::Other(e) => Some(e.as_ref()),
            _ => None,
        }
    }
}

impl From<StoreError> for HandlerError {
    fn from(err: StoreError) -> Self {
        HandlerError::Store(err)
    }
}

/// One service's reaction to the events it consumes.
///
/// The processor retries a row after a partial failure, so every
/// implementation must be idempotent: re-running a handler for an event
/// it already applied must succeed without a second effect.
pub trait EventHandler: Send + Sync {
    fn handle(&self, event: &DomainEvent) -> Result<(), HandlerError>;
}
