//! Wire envelope for messages crossing service boundaries.

use serde::{Deserialize, Serialize};

/// The transport payload every queue and exchange carries.
///
/// The envelope is JSON on the wire. `event_id` is the globally unique id
/// the inbox uses for deduplication; `event_type` names the logical event;
/// `payload` is the event-specific body.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub event_id: String,
    pub event_type: String,
    pub payload: serde_json::Value,
}

impl Envelope {
    pub fn new(
        event_id: impl Into<String>,
        event_type: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            event_id: event_id.into(),
            event_type: event_type.into(),
            payload,
        }
    }

    /// Serialize to the wire format.
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Parse from the wire format.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}
