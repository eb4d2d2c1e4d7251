//! Event instances dispatched through the engine.
//!
//! An `Event` is a header (identity, kind, dispatch controls) plus an opaque
//! JSON payload. The engine never inspects the payload; it is handed to
//! listeners as-is. The two header fields the engine does act on are
//! `emit_up` (also dispatch ancestor kinds) and `merge_strategy` (how
//! listener results combine on key collision).

use crate::kind::EventKind;
use crate::merge::MergeStrategy;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

// ============================================================================
// IDENTITY TYPES
// ============================================================================

/// Event identifier using UUIDv7 for timestamp-sortable IDs.
pub type EventId = Uuid;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// Generate a new UUIDv7 EventId (timestamp-sortable).
pub fn new_event_id() -> EventId {
    Uuid::now_v7()
}

// ============================================================================
// EVENT HEADER
// ============================================================================

/// Metadata the engine needs to dispatch an event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventHeader {
    /// Unique event identifier, assigned at construction.
    pub event_id: EventId,
    /// Creation time, assigned at construction.
    pub timestamp: Timestamp,
    /// Concrete kind of this event.
    pub kind: &'static EventKind,
    /// Also dispatch listeners registered on ancestor kinds.
    pub emit_up: bool,
    /// Conflict policy for combining listener results.
    pub merge_strategy: MergeStrategy,
}

impl EventHeader {
    /// Create a header for `kind` with default dispatch controls.
    pub fn new(kind: &'static EventKind) -> Self {
        Self {
            event_id: new_event_id(),
            timestamp: Utc::now(),
            kind,
            emit_up: false,
            merge_strategy: MergeStrategy::default(),
        }
    }
}

// ============================================================================
// FULL EVENT (Header + Payload)
// ============================================================================

/// A complete event with header and opaque payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Event {
    pub header: EventHeader,
    /// User-defined fields, passed through to listeners untouched.
    pub payload: Value,
}

impl Event {
    /// Create an event of `kind` with an empty payload.
    pub fn new(kind: &'static EventKind) -> Self {
        Self {
            header: EventHeader::new(kind),
            payload: Value::Null,
        }
    }

    /// Set the payload.
    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }

    /// Set whether ancestor kinds are dispatched too.
    pub fn with_emit_up(mut self, emit_up: bool) -> Self {
        self.header.emit_up = emit_up;
        self
    }

    /// Set the conflict policy for this emission.
    pub fn with_merge_strategy(mut self, strategy: MergeStrategy) -> Self {
        self.header.merge_strategy = strategy;
        self
    }

    /// Get the event ID.
    pub fn event_id(&self) -> EventId {
        self.header.event_id
    }

    /// Get the concrete kind.
    pub fn kind(&self) -> &'static EventKind {
        self.header.kind
    }

    /// Get the creation timestamp.
    pub fn timestamp(&self) -> Timestamp {
        self.header.timestamp
    }

    /// Whether ancestor kinds are dispatched.
    pub fn emit_up(&self) -> bool {
        self.header.emit_up
    }

    /// Conflict policy for this emission.
    pub fn merge_strategy(&self) -> MergeStrategy {
        self.header.merge_strategy
    }

    /// Look up a top-level payload field, if the payload is an object.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.payload.as_object().and_then(|map| map.get(name))
    }
}
