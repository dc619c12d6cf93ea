//! Message broker abstractions.
//!
//! The services never talk to each other directly; every cross-service
//! effect travels through the broker as a JSON envelope.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        Broker topology                       │
//! │                                                              │
//! │  competition_created ──────────► leaderboard service inbox   │
//! │  leaderboard_success ──────────► competition service inbox   │
//! │                                                              │
//! │  rollback_exchange (fanout)                                  │
//! │    ├─► rollback_events             (competition service)     │
//! │    └─► leaderboard_rollback_queue  (leaderboard service)     │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! [`Publisher`] and [`Subscriber`] are the seams a production AMQP
//! implementation plugs into; [`InMemoryBroker`] covers tests and
//! single-process runs.

mod envelope;
mod in_memory;
mod publisher;
mod subscriber;

pub use envelope::Envelope;
pub use in_memory::{InMemoryBroker, InMemorySubscriber};
pub use publisher::{PublishError, Publisher};
pub use subscriber::Subscriber;
