//! Degraded-mode behavior of the problem-fetch facade.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use contest_sagas::clock::ManualClock;
use contest_sagas::resilience::{
    BackpressureQueue, CircuitBreaker, CircuitState, DrainOutcome, FacadeError, FetchError,
    InMemoryCounterStore, ProblemFacade, ProblemFetcher, QueueDrain, SlidingWindowLimiter,
};
use contest_sagas::store::InMemoryCache;
use serde_json::json;

const COUNTERPARTY: &str = "problem_management";

/// Transport fake: success unless told to fail, counting every call.
struct FakeProblemService {
    down: AtomicBool,
    calls: AtomicU32,
}

impl FakeProblemService {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            down: AtomicBool::new(false),
            calls: AtomicU32::new(0),
        })
    }

    fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

/// Shareable handle to the fake. A local newtype is required because the
/// orphan rule forbids implementing the out-of-crate `ProblemFetcher` trait
/// directly for `Arc<FakeProblemService>` from this integration-test crate.
#[derive(Clone)]
struct Fetcher(Arc<FakeProblemService>);

impl ProblemFetcher for Fetcher {
    fn fetch_problem(&self, problem_id: u64) -> Result<serde_json::Value, FetchError> {
        self.0.calls.fetch_add(1, Ordering::SeqCst);
        if self.0.down.load(Ordering::SeqCst) {
            Err(FetchError::Status(503))
        } else {
            Ok(json!({"id": problem_id, "title": format!("Problem {}", problem_id)}))
        }
    }
}

struct Fixture {
    clock: Arc<ManualClock>,
    service: Arc<FakeProblemService>,
    facade: Arc<ProblemFacade<Fetcher, InMemoryCounterStore>>,
}

fn fixture(limit: u64) -> Fixture {
    let clock = Arc::new(ManualClock::new());
    let service = FakeProblemService::new();
    let facade = Arc::new(ProblemFacade::new(
        Fetcher(service.clone()),
        CircuitBreaker::new(clock.clone()),
        SlidingWindowLimiter::new(InMemoryCounterStore::new(clock.clone()), clock.clone())
            .with_limit(limit),
        Arc::new(BackpressureQueue::new()),
        Arc::new(InMemoryCache::new(clock.clone())),
    ));
    Fixture {
        clock,
        service,
        facade,
    }
}

#[test]
fn open_breaker_serves_the_cached_copy() {
    let f = fixture(100);

    // A successful fetch populates the cache.
    f.facade.fetch(7, COUNTERPARTY).unwrap();

    // The service goes down and the breaker trips.
    f.service.set_down(true);
    for _ in 0..4 {
        let _ = f.facade.fetch(7, COUNTERPARTY);
    }
    assert_eq!(f.facade.breaker_state(), CircuitState::Open);

    let calls_before = f.service.calls();
    let problem = f.facade.fetch(7, COUNTERPARTY).unwrap();
    assert_eq!(problem["title"], json!("Problem 7"));
    // Served without a downstream call.
    assert_eq!(f.service.calls(), calls_before);

    // A problem never fetched has no cached copy to fall back on.
    assert!(matches!(
        f.facade.fetch(8, COUNTERPARTY),
        Err(FacadeError::Unavailable)
    ));
}

#[test]
fn excess_calls_queue_and_drain_after_rollover() {
    let f = fixture(4);
    let drain = QueueDrain::new(f.facade.clone(), COUNTERPARTY);

    // Fill the window.
    for problem_id in 1..=4 {
        f.facade.fetch(problem_id, COUNTERPARTY).unwrap();
    }

    // The excess is deferred, not dropped.
    for problem_id in 5..=6 {
        assert!(matches!(
            f.facade.fetch(problem_id, COUNTERPARTY),
            Err(FacadeError::RateLimited)
        ));
    }
    assert_eq!(f.facade.queue().depth(COUNTERPARTY), 2);
    assert_eq!(f.service.calls(), 4);

    // Still inside the window: the drain probe is denied and consumes
    // nothing.
    assert_eq!(drain.run_once(), DrainOutcome::Idle);
    assert_eq!(f.facade.queue().depth(COUNTERPARTY), 2);

    // Window rolls over; the drain delivers in arrival order.
    f.clock.advance(Duration::from_secs(61));
    assert_eq!(drain.run_once(), DrainOutcome::Delivered);
    assert_eq!(drain.run_once(), DrainOutcome::Delivered);
    assert_eq!(drain.run_once(), DrainOutcome::Idle);
    assert_eq!(f.facade.queue().depth(COUNTERPARTY), 0);
    assert_eq!(f.service.calls(), 6);
}

#[test]
fn failed_drain_attempt_requeues_the_request() {
    let f = fixture(1);
    let drain = QueueDrain::new(f.facade.clone(), COUNTERPARTY);

    f.facade.fetch(1, COUNTERPARTY).unwrap();
    assert!(matches!(
        f.facade.fetch(2, COUNTERPARTY),
        Err(FacadeError::RateLimited)
    ));

    f.service.set_down(true);
    f.clock.advance(Duration::from_secs(61));

    assert_eq!(drain.run_once(), DrainOutcome::Requeued);
    assert_eq!(f.facade.queue().depth(COUNTERPARTY), 1);

    // Once the service recovers the same request finally lands.
    f.service.set_down(false);
    f.clock.advance(Duration::from_secs(61));
    assert_eq!(drain.run_once(), DrainOutcome::Delivered);
    assert_eq!(f.facade.queue().depth(COUNTERPARTY), 0);
}

#[test]
fn recovery_probes_close_the_breaker_again() {
    let f = fixture(100);

    f.service.set_down(true);
    for _ in 0..4 {
        let _ = f.facade.fetch(9, COUNTERPARTY);
    }
    assert_eq!(f.facade.breaker_state(), CircuitState::Open);

    f.service.set_down(false);
    f.clock.advance(Duration::from_secs(6));
    assert_eq!(f.facade.breaker_state(), CircuitState::HalfOpen);

    for _ in 0..5 {
        f.facade.fetch(9, COUNTERPARTY).unwrap();
    }
    assert_eq!(f.facade.breaker_state(), CircuitState::Closed);
}
