//! Inbox pipeline: ingest persists, the processor dispatches.
//!
//! Splitting receipt from processing is what buys exactly-once effects on
//! top of an at-least-once broker: ingest makes redelivery idempotent via
//! the `event_id` key, the processor tracks per-row retries in the table
//! rather than relying on broker redelivery.

mod handler;
mod ingest;
mod processor;

pub use handler::{EventHandler, HandlerError};
pub use ingest::{InboxIngest, InboxIngestThread};
pub use processor::{InboxProcessor, InboxProcessorThread, ProcessStats};
