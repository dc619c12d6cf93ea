//! Competition-side coordination.
//!
//! The competition service issues the leading write of the saga: the
//! competition row and its `competition_created` announcement commit in
//! one transaction, then the saga timer is armed. Confirmation and
//! compensation both arrive through the inbox.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::bus::Publisher;
use crate::event::{CompetitionCreated, DomainEvent};
use crate::inbox::{EventHandler, HandlerError};
use crate::saga::SagaCoordinator;
use crate::store::{
    Cache, Competition, CompetitionStore, NewCompetition, OutboxEvent, StoreError,
};

/// Synchronous entry points of the competition service.
pub struct CompetitionCoordinator<S, P> {
    store: S,
    saga: Arc<SagaCoordinator<P>>,
    cache: Arc<dyn Cache>,
    cache_ttl: Duration,
}

impl<S, P> CompetitionCoordinator<S, P> {
    pub fn new(store: S, saga: Arc<SagaCoordinator<P>>, cache: Arc<dyn Cache>) -> Self {
        Self {
            store,
            saga,
            cache,
            cache_ttl: Duration::from_secs(600),
        }
    }

    /// Cache lifetime for competition reads.
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }
}

impl<S: CompetitionStore, P: Publisher + 'static> CompetitionCoordinator<S, P> {
    /// Create a competition.
    ///
    /// The row and its announcement commit together; the saga timer is
    /// armed only after the transaction is durable, so a timer can never
    /// exist for a competition that was not written.
    pub fn create(&self, competition: NewCompetition) -> Result<Competition, StoreError> {
        let competition = self.store.insert_with_event(competition, |row| {
            OutboxEvent::for_event(&DomainEvent::CompetitionCreated(CompetitionCreated {
                id: row.id,
                name: row.name.clone(),
            }))
        })?;

        self.saga.start(competition.id);
        info!(saga_key = %competition.id, name = %competition.name,
            "competition created, awaiting leaderboard");
        Ok(competition)
    }

    /// Read a competition through the cache.
    pub fn get(&self, id: u64) -> Result<Option<Competition>, StoreError> {
        let cache_key = format!("competition:{}", id);

        match self.cache.get(&cache_key) {
            Ok(Some(body)) => {
                if let Ok(competition) = serde_json::from_str(&body) {
                    return Ok(Some(competition));
                }
            }
            Ok(None) => {}
            Err(err) => warn!(cache_key = %cache_key, error = %err, "cache read failed"),
        }

        let Some(competition) = self.store.get(id)? else {
            return Ok(None);
        };

        match serde_json::to_string(&competition) {
            Ok(body) => {
                if let Err(err) = self.cache.set(&cache_key, &body, self.cache_ttl) {
                    warn!(cache_key = %cache_key, error = %err, "failed to cache competition");
                }
            }
            Err(err) => warn!(cache_key = %cache_key, error = %err, "failed to encode competition"),
        }

        Ok(Some(competition))
    }

    /// Re-arm timers for competitions whose confirmation never came.
    ///
    /// Covers the crash window between a committed leading write and its
    /// timer registration: run at startup, any unconfirmed competition
    /// gets its deadline back. Arming is keyed, so sweeping while timers
    /// are already live changes nothing.
    pub fn recover_pending(&self) -> Result<usize, StoreError> {
        let mut armed = 0;
        for competition in self.store.fetch_unconfirmed()? {
            if self.saga.start(competition.id) {
                info!(saga_key = %competition.id, "re-armed saga timer");
                armed += 1;
            }
        }
        Ok(armed)
    }
}

/// The competition service's reaction to consumed events.
pub struct CompetitionEventHandler<S, P> {
    store: S,
    saga: Arc<SagaCoordinator<P>>,
}

impl<S, P> CompetitionEventHandler<S, P> {
    pub fn new(store: S, saga: Arc<SagaCoordinator<P>>) -> Self {
        Self { store, saga }
    }
}

impl<S: CompetitionStore, P: Publisher + 'static> EventHandler
    for CompetitionEventHandler<S, P>
{
    fn handle(&self, event: &DomainEvent) -> Result<(), HandlerError> {
        match event {
            DomainEvent::LeaderboardSuccess(success) => {
                let confirmed = self.store.confirm(success.competition_id)?;
                let canceled = self.saga.cancel(success.competition_id);
                info!(saga_key = %success.competition_id, confirmed, canceled,
                    "leaderboard confirmed");
                Ok(())
            }
            DomainEvent::Rollback(rollback) => {
                let deleted = self.store.delete(rollback.competition_id)?;
                info!(saga_key = %rollback.competition_id, deleted,
                    reason = %rollback.reason, "competition rolled back");
                Ok(())
            }
            DomainEvent::CompetitionCreated(created) => {
                // Our own outbound event; nothing to apply here.
                debug!(saga_key = %created.id, "ignoring competition_created");
                Ok(())
            }
        }
    }
}
