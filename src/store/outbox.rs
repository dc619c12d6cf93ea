//! Outbox table: the durable half of at-least-once event publication.

use std::time::SystemTime;

use uuid::Uuid;

use crate::event::DomainEvent;

use super::error::StoreError;

/// One row of a service's outbox table.
///
/// Created in the same transaction as the business write it announces,
/// then drained asynchronously by the outbox relay. Rows are never
/// deleted; they stay behind as an audit and replay log. Once `processed`
/// flips to `true` the row is never published again.
#[derive(Clone, Debug, PartialEq)]
pub struct OutboxEvent {
    /// Store-assigned sequence id; zero until appended.
    pub id: u64,
    /// External-facing unique id, carried on the wire envelope.
    pub event_id: String,
    /// Destination queue name.
    pub event_type: String,
    pub payload: serde_json::Value,
    pub processed: bool,
    pub retries: u32,
    pub created_at: SystemTime,
}

impl OutboxEvent {
    /// Build an unappended row with a fresh event id.
    pub fn new(event_type: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            id: 0,
            event_id: Uuid::new_v4().to_string(),
            event_type: event_type.into(),
            payload,
            processed: false,
            retries: 0,
            created_at: SystemTime::now(),
        }
    }

    /// Build a row announcing a typed domain event.
    pub fn for_event(event: &DomainEvent) -> Result<Self, StoreError> {
        Ok(Self::new(event.event_type(), event.payload()?))
    }
}

/// The producing service's view of its outbox table.
pub trait OutboxStore: Send + Sync {
    /// Append a row, assigning its sequence id. Returns the stored row.
    fn append(&self, event: OutboxEvent) -> Result<OutboxEvent, StoreError>;

    /// Unpublished rows with `retries < max_retries`, id-ascending, at
    /// most `limit`. Rows that have exhausted their retries are left
    /// where they are for operator inspection.
    fn fetch_unpublished(
        &self,
        limit: usize,
        max_retries: u32,
    ) -> Result<Vec<OutboxEvent>, StoreError>;

    /// Record a successful publish. The row will never be fetched again.
    fn mark_published(&self, id: u64) -> Result<(), StoreError>;

    /// Record a failed publish attempt.
    fn record_publish_failure(&self, id: u64) -> Result<(), StoreError>;
}
