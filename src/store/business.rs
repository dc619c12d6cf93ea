//! Business rows and the storage seams the coordinators need.
//!
//! CRUD persistence itself lives outside this crate; these traits are the
//! interface the coordination layer requires of it. The combined
//! insert-with-event operations are the transactional outbox guarantee:
//! the business row and its announcement commit together or not at all.

use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use super::error::StoreError;
use super::outbox::OutboxEvent;

/// A competition row owned by the competition service.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Competition {
    pub id: u64,
    pub name: String,
    pub description: String,
    pub problem_ids: Vec<u64>,
    /// Set once the leaderboard service confirms; unconfirmed rows older
    /// than the saga deadline are candidates for timer recovery.
    pub confirmed: bool,
    pub created_at: SystemTime,
}

/// Fields of a competition before the store assigns its id.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct NewCompetition {
    pub name: String,
    pub description: String,
    pub problem_ids: Vec<u64>,
}

/// A leaderboard row owned by the leaderboard service.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Leaderboard {
    pub id: u64,
    pub competition_id: u64,
    pub created_at: SystemTime,
}

/// Competition-side storage.
pub trait CompetitionStore: Send + Sync {
    /// Insert a competition and its outbox announcement in one
    /// transaction. The closure sees the row with its assigned id so the
    /// announcement can carry it; if the closure fails, nothing commits.
    fn insert_with_event<F>(
        &self,
        competition: NewCompetition,
        event: F,
    ) -> Result<Competition, StoreError>
    where
        F: FnOnce(&Competition) -> Result<OutboxEvent, StoreError>;

    fn get(&self, id: u64) -> Result<Option<Competition>, StoreError>;

    /// Mark a competition as confirmed by the leaderboard service.
    /// Returns `false` when the row does not exist.
    fn confirm(&self, id: u64) -> Result<bool, StoreError>;

    /// Compensating delete. Returns `false` when already gone.
    fn delete(&self, id: u64) -> Result<bool, StoreError>;

    /// Rows still waiting on confirmation, id-ascending.
    fn fetch_unconfirmed(&self) -> Result<Vec<Competition>, StoreError>;
}

/// Leaderboard-side storage.
pub trait LeaderboardStore: Send + Sync {
    /// Insert a leaderboard and its outbox confirmation in one
    /// transaction; same contract as
    /// [`CompetitionStore::insert_with_event`].
    fn insert_with_event<F>(
        &self,
        competition_id: u64,
        event: F,
    ) -> Result<Leaderboard, StoreError>
    where
        F: FnOnce(&Leaderboard) -> Result<OutboxEvent, StoreError>;

    fn find_by_competition(&self, competition_id: u64)
        -> Result<Option<Leaderboard>, StoreError>;

    /// Compensating delete. Returns `false` when already gone.
    fn delete_for_competition(&self, competition_id: u64) -> Result<bool, StoreError>;
}
