use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::EntityId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    Create,
    Update,
    Delete,
}

/// Immutable, append-only record. Once appended, never mutated or
/// compacted — the event stream is the ultimate source of truth
/// (spec.md §3, "Ownership semantics").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: EntityId,
    pub entity_id: EntityId,
    pub entity_name: String,
    pub event_type: EventType,
    pub attributes_before: Option<serde_json::Value>,
    pub attributes_after: Option<serde_json::Value>,
    pub timestamp: DateTime<Utc>,
}
