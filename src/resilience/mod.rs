//! Resilience for synchronous cross-service calls.
//!
//! Fetching problem data is the one place a service calls another
//! synchronously, so it gets the full treatment:
//!
//! ```text
//! caller ──► ProblemFacade::fetch
//!              │ breaker open? ──► cache ──► hit / "unavailable"
//!              │ limiter.admit ──► denied ──► BackpressureQueue
//!              │ admitted
//!              ▼
//!          CircuitBreaker::call ──► ProblemFetcher (HTTP, out of crate)
//!              │ success ──► cache.set(TTL)
//!              └ failure ──► raw error (closed) / cache (degraded)
//!
//! QueueDrain (one thread per counterparty) feeds queued requests back
//! through the same path once the window has quota again.
//! ```
//!
//! Every piece takes its collaborators at construction; nothing here is
//! process-global.

mod breaker;
mod drain;
mod facade;
mod limiter;
mod queue;

pub use breaker::{BreakerError, CircuitBreaker, CircuitState};
pub use drain::{DrainOutcome, QueueDrain, QueueDrainThread};
pub use facade::{FacadeError, FetchError, ProblemFacade, ProblemFetcher};
pub use limiter::{CounterStore, InMemoryCounterStore, LimiterError, SlidingWindowLimiter};
pub use queue::{BackpressureQueue, QueuedFetch};
