//! Coordination layer for the contest platform services.
//!
//! The competition, leaderboard, and problem-management services cannot
//! share a transaction, so cross-service state changes go through three
//! cooperating mechanisms:
//!
//! - a transactional **outbox/inbox pipeline** giving at-least-once
//!   delivery with exactly-once effects between independently stored
//!   services ([`outbox`], [`inbox`], [`store`]);
//! - a **saga timeout coordinator** that compensates a competition
//!   creation when the leaderboard side never confirms ([`saga`]);
//! - a **resilience facade** (circuit breaker, sliding-window rate
//!   limiter, backpressure queue, cache fallback) guarding synchronous
//!   problem fetches ([`resilience`]).
//!
//! HTTP routing, CRUD persistence, and the production broker transport
//! live outside this crate; [`bus`] and [`store`] define the seams they
//! plug into.

pub mod bus;
pub mod clock;
mod competition;
pub mod event;
pub mod inbox;
mod leaderboard;
pub mod outbox;
pub mod resilience;
pub mod saga;
pub mod store;

pub use competition::{CompetitionCoordinator, CompetitionEventHandler};
pub use event::{DomainEvent, EventDecodeError};
pub use leaderboard::LeaderboardEventHandler;
