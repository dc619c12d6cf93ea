//! Shared wiring for the cross-service integration tests.
//!
//! Each helper assembles one service the way production would: its own
//! store, an outbox relay shipping to the shared broker, one ingest
//! thread per consumed queue, and an inbox processor dispatching to the
//! service's handler. Services communicate only through the broker.

use std::sync::Arc;
use std::time::{Duration, Instant};

use contest_sagas::bus::InMemoryBroker;
use contest_sagas::clock::SystemClock;
use contest_sagas::event::topology;
use contest_sagas::inbox::{InboxIngest, InboxIngestThread, InboxProcessor, InboxProcessorThread};
use contest_sagas::outbox::{OutboxRelay, OutboxRelayThread};
use contest_sagas::saga::{SagaCoordinator, SagaRegistry};
use contest_sagas::store::{InMemoryCache, InMemoryStore};
use contest_sagas::{CompetitionCoordinator, CompetitionEventHandler, LeaderboardEventHandler};

pub const POLL: Duration = Duration::from_millis(10);

/// Install a subscriber once so `RUST_LOG=debug` shows pipeline activity.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Block until `cond` holds, or fail the test after `timeout`.
pub fn wait_until(timeout: Duration, what: &str, cond: impl Fn() -> bool) {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    panic!("timed out waiting for {}", what);
}

/// The broker with every queue, exchange, and binding both services
/// declare at startup.
pub fn broker_with_topology() -> InMemoryBroker {
    init_tracing();
    let broker = InMemoryBroker::new();
    broker.declare_queue(topology::COMPETITION_CREATED);
    broker.declare_queue(topology::LEADERBOARD_SUCCESS);
    broker.declare_exchange(topology::ROLLBACK_EXCHANGE);
    broker
        .bind_queue(topology::ROLLBACK_EVENTS, topology::ROLLBACK_EXCHANGE)
        .unwrap();
    broker
        .bind_queue(topology::LEADERBOARD_ROLLBACK_QUEUE, topology::ROLLBACK_EXCHANGE)
        .unwrap();
    broker
}

pub struct CompetitionService {
    pub store: InMemoryStore,
    pub registry: Arc<SagaRegistry>,
    pub coordinator: CompetitionCoordinator<InMemoryStore, InMemoryBroker>,
    _relay: OutboxRelayThread,
    _success_ingest: InboxIngestThread,
    _rollback_ingest: InboxIngestThread,
    _processor: InboxProcessorThread,
}

pub fn competition_service(
    broker: &InMemoryBroker,
    saga_deadline: Duration,
) -> CompetitionService {
    let store = InMemoryStore::new();
    let registry = Arc::new(SagaRegistry::new());
    let saga = Arc::new(
        SagaCoordinator::new(Arc::new(broker.clone()), registry.clone())
            .with_deadline(saga_deadline),
    );
    let cache = Arc::new(InMemoryCache::new(Arc::new(SystemClock)));

    let relay = OutboxRelayThread::spawn(OutboxRelay::new(store.clone(), broker.clone()), POLL);
    let success_ingest = InboxIngestThread::spawn(
        InboxIngest::new(
            topology::LEADERBOARD_SUCCESS,
            broker.subscribe(topology::LEADERBOARD_SUCCESS),
            store.clone(),
        ),
        POLL,
    );
    let rollback_ingest = InboxIngestThread::spawn(
        InboxIngest::new(
            topology::ROLLBACK_EVENTS,
            broker.subscribe(topology::ROLLBACK_EVENTS),
            store.clone(),
        ),
        POLL,
    );
    let processor = InboxProcessorThread::spawn(
        InboxProcessor::new(
            store.clone(),
            CompetitionEventHandler::new(store.clone(), saga.clone()),
        ),
        POLL,
    );

    CompetitionService {
        store: store.clone(),
        registry,
        coordinator: CompetitionCoordinator::new(store, saga, cache),
        _relay: relay,
        _success_ingest: success_ingest,
        _rollback_ingest: rollback_ingest,
        _processor: processor,
    }
}

pub struct LeaderboardService {
    pub store: InMemoryStore,
    _relay: Option<OutboxRelayThread>,
    _created_ingest: InboxIngestThread,
    _rollback_ingest: InboxIngestThread,
    _processor: InboxProcessorThread,
}

/// Wire the leaderboard service. With `ship_confirmations` off its
/// outbox relay never runs, so `leaderboard_success` rows pile up
/// unshipped; this simulates the outage that lets a saga expire.
pub fn leaderboard_service(
    broker: &InMemoryBroker,
    ship_confirmations: bool,
) -> LeaderboardService {
    let store = InMemoryStore::new();

    let relay = ship_confirmations.then(|| {
        OutboxRelayThread::spawn(OutboxRelay::new(store.clone(), broker.clone()), POLL)
    });
    let created_ingest = InboxIngestThread::spawn(
        InboxIngest::new(
            topology::COMPETITION_CREATED,
            broker.subscribe(topology::COMPETITION_CREATED),
            store.clone(),
        ),
        POLL,
    );
    let rollback_ingest = InboxIngestThread::spawn(
        InboxIngest::new(
            topology::LEADERBOARD_ROLLBACK_QUEUE,
            broker.subscribe(topology::LEADERBOARD_ROLLBACK_QUEUE),
            store.clone(),
        ),
        POLL,
    );
    let processor = InboxProcessorThread::spawn(
        InboxProcessor::new(store.clone(), LeaderboardEventHandler::new(store.clone())),
        POLL,
    );

    LeaderboardService {
        store,
        _relay: relay,
        _created_ingest: created_ingest,
        _rollback_ingest: rollback_ingest,
        _processor: processor,
    }
}
