//! Leaderboard-side coordination.
//!
//! The leaderboard service only reacts: a `competition_created` event
//! creates the linked leaderboard and commits the `leaderboard_success`
//! confirmation into the outbox in the same transaction; a rollback
//! deletes whatever was created.

use tracing::{debug, info};

use crate::event::{DomainEvent, LeaderboardSuccess};
use crate::inbox::{EventHandler, HandlerError};
use crate::store::{LeaderboardStore, OutboxEvent};

/// The leaderboard service's reaction to consumed events.
pub struct LeaderboardEventHandler<S> {
    store: S,
}

impl<S> LeaderboardEventHandler<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }
}

impl<S: LeaderboardStore> EventHandler for LeaderboardEventHandler<S> {
    fn handle(&self, event: &DomainEvent) -> Result<(), HandlerError> {
        match event {
            DomainEvent::CompetitionCreated(created) => {
                // Redelivery and handler retries land here; an existing
                // row means the confirmation is already on its way.
                if self.store.find_by_competition(created.id)?.is_some() {
                    debug!(saga_key = %created.id, "leaderboard already exists");
                    return Ok(());
                }

                let leaderboard = self.store.insert_with_event(created.id, |row| {
                    OutboxEvent::for_event(&DomainEvent::LeaderboardSuccess(
                        LeaderboardSuccess {
                            competition_id: row.competition_id,
                        },
                    ))
                })?;

                info!(saga_key = %created.id, leaderboard_id = leaderboard.id,
                    "leaderboard created, confirmation committed");
                Ok(())
            }
            DomainEvent::Rollback(rollback) => {
                let deleted = self.store.delete_for_competition(rollback.competition_id)?;
                info!(saga_key = %rollback.competition_id, deleted,
                    reason = %rollback.reason, "leaderboard rolled back");
                Ok(())
            }
            DomainEvent::LeaderboardSuccess(success) => {
                // Our own outbound event; nothing to apply here.
                debug!(saga_key = %success.competition_id, "ignoring leaderboard_success");
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{topology, CompetitionCreated, Rollback};
    use crate::store::InMemoryStore;

    fn created(id: u64) -> DomainEvent {
        DomainEvent::CompetitionCreated(CompetitionCreated {
            id,
            name: "Spring Open".to_string(),
        })
    }

    #[test]
    fn creates_leaderboard_and_commits_confirmation() {
        let store = InMemoryStore::new();
        let handler = LeaderboardEventHandler::new(store.clone());

        handler.handle(&created(7)).unwrap();

        let leaderboard = store.find_by_competition(7).unwrap().unwrap();
        assert_eq!(leaderboard.competition_id, 7);

        let outbox = store.outbox_rows();
        assert_eq!(outbox.len(), 1);
        assert_eq!(outbox[0].event_type, topology::LEADERBOARD_SUCCESS);
        assert_eq!(outbox[0].payload["competition_id"], serde_json::json!(7));
    }

    #[test]
    fn reprocessing_does_not_duplicate() {
        let store = InMemoryStore::new();
        let handler = LeaderboardEventHandler::new(store.clone());

        handler.handle(&created(7)).unwrap();
        handler.handle(&created(7)).unwrap();

        assert_eq!(store.outbox_rows().len(), 1);
    }

    #[test]
    fn rollback_deletes_the_linked_row() {
        let store = InMemoryStore::new();
        let handler = LeaderboardEventHandler::new(store.clone());

        handler.handle(&created(7)).unwrap();

        let rollback = DomainEvent::Rollback(Rollback {
            competition_id: 7,
            reason: "Timeout expired".to_string(),
        });
        handler.handle(&rollback).unwrap();
        assert!(store.find_by_competition(7).unwrap().is_none());

        // Redelivered rollback is a no-op.
        handler.handle(&rollback).unwrap();
    }

    #[test]
    fn own_confirmation_events_are_ignored() {
        let store = InMemoryStore::new();
        let handler = LeaderboardEventHandler::new(store.clone());

        handler
            .handle(&DomainEvent::LeaderboardSuccess(LeaderboardSuccess {
                competition_id: 7,
            }))
            .unwrap();

        assert!(store.outbox_rows().is_empty());
    }
}
