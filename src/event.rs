//! Domain events exchanged between the competition and leaderboard services.
//!
//! The set of events is closed: everything a service can receive decodes
//! into [`DomainEvent`], and the inbox processor matches on it
//! exhaustively. Anything arriving outside the known set fails decoding at
//! this boundary and is dropped by the caller with a log line, never
//! retried.

use std::error::Error;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Queue and exchange names shared by both services.
pub mod topology {
    /// Competition leading-write announcements, consumed by the
    /// leaderboard service.
    pub const COMPETITION_CREATED: &str = "competition_created";
    /// Leaderboard confirmations, consumed by the competition service.
    pub const LEADERBOARD_SUCCESS: &str = "leaderboard_success";
    /// Fanout exchange for compensation events.
    pub const ROLLBACK_EXCHANGE: &str = "rollback_exchange";
    /// Rollback queue bound for the competition service.
    pub const ROLLBACK_EVENTS: &str = "rollback_events";
    /// Rollback queue bound for the leaderboard service.
    pub const LEADERBOARD_ROLLBACK_QUEUE: &str = "leaderboard_rollback_queue";
}

/// Payload of a `competition_created` event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CompetitionCreated {
    pub id: u64,
    pub name: String,
}

/// Payload of a `leaderboard_success` event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardSuccess {
    pub competition_id: u64,
}

/// Payload of a rollback event published through the fanout exchange.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Rollback {
    pub competition_id: u64,
    pub reason: String,
}

/// The closed set of events the services exchange.
#[derive(Clone, Debug, PartialEq)]
pub enum DomainEvent {
    CompetitionCreated(CompetitionCreated),
    LeaderboardSuccess(LeaderboardSuccess),
    Rollback(Rollback),
}

impl DomainEvent {
    /// The queue this event is published to.
    ///
    /// Rollbacks are published through [`topology::ROLLBACK_EXCHANGE`];
    /// their event type names the competition-side queue, matching what
    /// consumers record as the source.
    pub fn event_type(&self) -> &'static str {
        match self {
            DomainEvent::CompetitionCreated(_) => topology::COMPETITION_CREATED,
            DomainEvent::LeaderboardSuccess(_) => topology::LEADERBOARD_SUCCESS,
            DomainEvent::Rollback(_) => topology::ROLLBACK_EVENTS,
        }
    }

    /// Serialize the event-specific payload.
    pub fn payload(&self) -> Result<serde_json::Value, serde_json::Error> {
        match self {
            DomainEvent::CompetitionCreated(p) => serde_json::to_value(p),
            DomainEvent::LeaderboardSuccess(p) => serde_json::to_value(p),
            DomainEvent::Rollback(p) => serde_json::to_value(p),
        }
    }

    /// Decode an inbox row back into a typed event.
    ///
    /// `event_type` is the queue the message arrived on. Both rollback
    /// queues carry the same payload shape and decode to
    /// [`DomainEvent::Rollback`].
    pub fn decode(
        event_type: &str,
        payload: &serde_json::Value,
    ) -> Result<Self, EventDecodeError> {
        let from_payload = |err: serde_json::Error| EventDecodeError::Payload {
            event_type: event_type.to_string(),
            message: err.to_string(),
        };

        match event_type {
            topology::COMPETITION_CREATED => serde_json::from_value(payload.clone())
                .map(DomainEvent::CompetitionCreated)
                .map_err(from_payload),
            topology::LEADERBOARD_SUCCESS => serde_json::from_value(payload.clone())
                .map(DomainEvent::LeaderboardSuccess)
                .map_err(from_payload),
            topology::ROLLBACK_EVENTS | topology::LEADERBOARD_ROLLBACK_QUEUE => {
                serde_json::from_value(payload.clone())
                    .map(DomainEvent::Rollback)
                    .map_err(from_payload)
            }
            other => Err(EventDecodeError::UnknownEventType(other.to_string())),
        }
    }
}

/// Error type for the decode boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventDecodeError {
    /// The event type is outside the known set (a future or older
    /// version); retrying can never make it routable.
    UnknownEventType(String),
    /// The event type is known but the payload does not match its shape.
    Payload {
        event_type: String,
        message: String,
    },
}

impl fmt::Display for EventDecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventDecodeError::UnknownEventType(event_type) => {
                write!(f, "unknown event type: {}", event_type)
            }
            EventDecodeError::Payload {
                event_type,
                message,
            } => write!(f, "malformed {} payload: {}", event_type, message),
        }
    }
}

impl Error for EventDecodeError {}
