//! In-memory storage backend.
//!
//! One [`InMemoryStore`] stands in for one service's database, so a test
//! that wires two services builds two stores. All tables live behind a
//! single `RwLock`, which is what makes the combined
//! business-write-plus-outbox-append operations transactional: either
//! both rows land under one write guard or neither does.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, RwLock};
use std::time::SystemTime;

use super::business::{
    Competition, CompetitionStore, Leaderboard, LeaderboardStore, NewCompetition,
};
use super::error::StoreError;
use super::inbox::{InboxEvent, InboxStore};
use super::outbox::{OutboxEvent, OutboxStore};

#[derive(Default)]
struct Tables {
    competitions: BTreeMap<u64, Competition>,
    competition_seq: u64,
    leaderboards: BTreeMap<u64, Leaderboard>,
    leaderboard_seq: u64,
    outbox: Vec<OutboxEvent>,
    outbox_seq: u64,
    inbox: Vec<InboxEvent>,
    inbox_ids: HashSet<String>,
    inbox_seq: u64,
}

/// One service's database. Cloning creates another handle to the same
/// storage, so the request path and the worker threads can share it.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the outbox table, for assertions.
    pub fn outbox_rows(&self) -> Vec<OutboxEvent> {
        self.tables.read().map(|t| t.outbox.clone()).unwrap_or_default()
    }

    /// Snapshot of the inbox table, for assertions.
    pub fn inbox_rows(&self) -> Vec<InboxEvent> {
        self.tables.read().map(|t| t.inbox.clone()).unwrap_or_default()
    }

    fn read(&self, op: &'static str) -> Result<std::sync::RwLockReadGuard<'_, Tables>, StoreError> {
        self.tables.read().map_err(|_| StoreError::LockPoisoned(op))
    }

    fn write(
        &self,
        op: &'static str,
    ) -> Result<std::sync::RwLockWriteGuard<'_, Tables>, StoreError> {
        self.tables.write().map_err(|_| StoreError::LockPoisoned(op))
    }
}

fn append_outbox(tables: &mut Tables, mut event: OutboxEvent) -> OutboxEvent {
    tables.outbox_seq += 1;
    event.id = tables.outbox_seq;
    tables.outbox.push(event.clone());
    event
}

impl OutboxStore for InMemoryStore {
    fn append(&self, event: OutboxEvent) -> Result<OutboxEvent, StoreError> {
        let mut tables = self.write("outbox append")?;
        Ok(append_outbox(&mut tables, event))
    }

    fn fetch_unpublished(
        &self,
        limit: usize,
        max_retries: u32,
    ) -> Result<Vec<OutboxEvent>, StoreError> {
        let tables = self.read("outbox fetch")?;
        Ok(tables
            .outbox
            .iter()
            .filter(|row| !row.processed && row.retries < max_retries)
            .take(limit)
            .cloned()
            .collect())
    }

    fn mark_published(&self, id: u64) -> Result<(), StoreError> {
        let mut tables = self.write("outbox update")?;
        let row = tables
            .outbox
            .iter_mut()
            .find(|row| row.id == id)
            .ok_or(StoreError::MissingRow { table: "outbox", id })?;
        row.processed = true;
        Ok(())
    }

    fn record_publish_failure(&self, id: u64) -> Result<(), StoreError> {
        let mut tables = self.write("outbox update")?;
        let row = tables
            .outbox
            .iter_mut()
            .find(|row| row.id == id)
            .ok_or(StoreError::MissingRow { table: "outbox", id })?;
        row.retries += 1;
        Ok(())
    }
}

impl InboxStore for InMemoryStore {
    fn insert_if_absent(
        &self,
        event_id: &str,
        event_type: &str,
        payload: serde_json::Value,
    ) -> Result<bool, StoreError> {
        let mut tables = self.write("inbox insert")?;
        if !tables.inbox_ids.insert(event_id.to_string()) {
            return Ok(false);
        }
        tables.inbox_seq += 1;
        let id = tables.inbox_seq;
        tables.inbox.push(InboxEvent {
            id,
            event_id: event_id.to_string(),
            event_type: event_type.to_string(),
            payload,
            processed: false,
            retries: 0,
            processed_at: None,
        });
        Ok(true)
    }

    fn fetch_unprocessed(
        &self,
        limit: usize,
        max_retries: u32,
    ) -> Result<Vec<InboxEvent>, StoreError> {
        let tables = self.read("inbox fetch")?;
        Ok(tables
            .inbox
            .iter()
            .filter(|row| !row.processed && row.retries < max_retries)
            .take(limit)
            .cloned()
            .collect())
    }

    fn mark_processed(&self, id: u64) -> Result<(), StoreError> {
        let mut tables = self.write("inbox update")?;
        let row = tables
            .inbox
            .iter_mut()
            .find(|row| row.id == id)
            .ok_or(StoreError::MissingRow { table: "inbox", id })?;
        row.processed = true;
        row.processed_at = Some(SystemTime::now());
        Ok(())
    }

    fn record_handler_failure(&self, id: u64) -> Result<(), StoreError> {
        let mut tables = self.write("inbox update")?;
        let row = tables
            .inbox
            .iter_mut()
            .find(|row| row.id == id)
            .ok_or(StoreError::MissingRow { table: "inbox", id })?;
        row.retries += 1;
        Ok(())
    }
}

impl CompetitionStore for InMemoryStore {
    fn insert_with_event<F>(
        &self,
        competition: NewCompetition,
        event: F,
    ) -> Result<Competition, StoreError>
    where
        F: FnOnce(&Competition) -> Result<OutboxEvent, StoreError>,
    {
        let mut tables = self.write("competition insert")?;
        let row = Competition {
            id: tables.competition_seq + 1,
            name: competition.name,
            description: competition.description,
            problem_ids: competition.problem_ids,
            confirmed: false,
            created_at: SystemTime::now(),
        };
        // Nothing is committed until the announcement exists.
        let outbox_event = event(&row)?;
        tables.competition_seq = row.id;
        tables.competitions.insert(row.id, row.clone());
        append_outbox(&mut tables, outbox_event);
        Ok(row)
    }

    fn get(&self, id: u64) -> Result<Option<Competition>, StoreError> {
        Ok(self.read("competition get")?.competitions.get(&id).cloned())
    }

    fn confirm(&self, id: u64) -> Result<bool, StoreError> {
        let mut tables = self.write("competition update")?;
        match tables.competitions.get_mut(&id) {
            Some(row) => {
                row.confirmed = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn delete(&self, id: u64) -> Result<bool, StoreError> {
        let mut tables = self.write("competition delete")?;
        Ok(tables.competitions.remove(&id).is_some())
    }

    fn fetch_unconfirmed(&self) -> Result<Vec<Competition>, StoreError> {
        let tables = self.read("competition fetch")?;
        Ok(tables
            .competitions
            .values()
            .filter(|row| !row.confirmed)
            .cloned()
            .collect())
    }
}

impl LeaderboardStore for InMemoryStore {
    fn insert_with_event<F>(
        &self,
        competition_id: u64,
        event: F,
    ) -> Result<Leaderboard, StoreError>
    where
        F: FnOnce(&Leaderboard) -> Result<OutboxEvent, StoreError>,
    {
        let mut tables = self.write("leaderboard insert")?;
        let row = Leaderboard {
            id: tables.leaderboard_seq + 1,
            competition_id,
            created_at: SystemTime::now(),
        };
        let outbox_event = event(&row)?;
        tables.leaderboard_seq = row.id;
        tables.leaderboards.insert(row.id, row.clone());
        append_outbox(&mut tables, outbox_event);
        Ok(row)
    }

    fn find_by_competition(
        &self,
        competition_id: u64,
    ) -> Result<Option<Leaderboard>, StoreError> {
        let tables = self.read("leaderboard get")?;
        Ok(tables
            .leaderboards
            .values()
            .find(|row| row.competition_id == competition_id)
            .cloned())
    }

    fn delete_for_competition(&self, competition_id: u64) -> Result<bool, StoreError> {
        let mut tables = self.write("leaderboard delete")?;
        let before = tables.leaderboards.len();
        tables
            .leaderboards
            .retain(|_, row| row.competition_id != competition_id);
        Ok(tables.leaderboards.len() < before)
    }
}
