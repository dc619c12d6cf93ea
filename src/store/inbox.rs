//! Inbox table: the durable half of exactly-once-effect consumption.

use std::time::SystemTime;

use super::error::StoreError;

/// One row of a service's inbox table.
///
/// Created by inbox ingest with an idempotent insert keyed on `event_id`,
/// so broker redelivery never produces a second row. `event_type` records
/// the queue the message arrived on. `processed` flips false to true at
/// most once.
#[derive(Clone, Debug, PartialEq)]
pub struct InboxEvent {
    pub id: u64,
    pub event_id: String,
    /// The source queue name.
    pub event_type: String,
    pub payload: serde_json::Value,
    pub processed: bool,
    pub retries: u32,
    pub processed_at: Option<SystemTime>,
}

/// The consuming service's view of its inbox table.
pub trait InboxStore: Send + Sync {
    /// Insert-or-ignore keyed on `event_id`. Returns `false` when a row
    /// with this id already exists (a duplicate delivery).
    fn insert_if_absent(
        &self,
        event_id: &str,
        event_type: &str,
        payload: serde_json::Value,
    ) -> Result<bool, StoreError>;

    /// Unprocessed rows with `retries < max_retries`, id-ascending, at
    /// most `limit`.
    fn fetch_unprocessed(
        &self,
        limit: usize,
        max_retries: u32,
    ) -> Result<Vec<InboxEvent>, StoreError>;

    /// Record a successful dispatch, stamping `processed_at`.
    fn mark_processed(&self, id: u64) -> Result<(), StoreError>;

    /// Record a failed dispatch attempt.
    fn record_handler_failure(&self, id: u64) -> Result<(), StoreError>;
}
