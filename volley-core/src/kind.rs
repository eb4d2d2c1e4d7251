//! Event kind descriptors.
//!
//! An `EventKind` names a class of occurrences and optionally points at a
//! parent kind, forming a single-inheritance hierarchy. Dispatchers use the
//! hierarchy when an event is emitted with `emit_up`: the concrete kind is
//! dispatched first, then each ancestor in order.
//!
//! Kinds are designed to live in `static` items so registrations and event
//! headers can hold `&'static EventKind` references:
//!
//! ```
//! use volley_core::EventKind;
//!
//! static ORDER: EventKind = EventKind::root("Order");
//! static ORDER_PLACED: EventKind = EventKind::child("OrderPlaced", &ORDER);
//!
//! assert!(ORDER_PLACED.is_a(&ORDER));
//! ```
//!
//! Kind names must be unique within a process; equality and hashing are by
//! name.

use serde::{Serialize, Serializer};
use std::fmt;
use std::hash::{Hash, Hasher};

// ============================================================================
// EVENT KIND
// ============================================================================

/// A nominal event type with an optional parent link.
#[derive(Debug)]
pub struct EventKind {
    name: &'static str,
    parent: Option<&'static EventKind>,
}

impl EventKind {
    /// Create a kind with no parent (the top of its hierarchy).
    pub const fn root(name: &'static str) -> Self {
        Self { name, parent: None }
    }

    /// Create a kind derived from `parent`.
    pub const fn child(name: &'static str, parent: &'static EventKind) -> Self {
        Self {
            name,
            parent: Some(parent),
        }
    }

    /// The kind's unique name.
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// The direct parent, if any.
    pub const fn parent(&self) -> Option<&'static EventKind> {
        self.parent
    }

    /// Whether this kind has no parent.
    pub const fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    /// Iterate the ancestor chain starting at this kind (self first).
    pub fn ancestors(&self) -> Ancestors<'_> {
        Ancestors {
            current: Some(self),
        }
    }

    /// Whether this kind is `other` or a descendant of it.
    pub fn is_a(&self, other: &EventKind) -> bool {
        self.ancestors().any(|kind| kind == other)
    }

    /// Depth below the hierarchy root (0 for a root kind).
    pub fn depth(&self) -> usize {
        self.ancestors().count() - 1
    }
}

impl PartialEq for EventKind {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for EventKind {}

impl Hash for EventKind {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

// Kinds serialize as their name. Deserialization is intentionally absent:
// an EventKind is a reference into the program's static kind table, not a
// value that can be reconstituted from a string.
impl Serialize for EventKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name)
    }
}

/// Iterator over a kind and its ancestors, nearest first.
#[derive(Debug, Clone)]
pub struct Ancestors<'a> {
    current: Option<&'a EventKind>,
}

impl<'a> Iterator for Ancestors<'a> {
    type Item = &'a EventKind;

    fn next(&mut self) -> Option<Self::Item> {
        let kind = self.current?;
        self.current = kind.parent;
        Some(kind)
    }
}

// ============================================================================
// BUILT-IN KINDS
// ============================================================================

/// Base kind for dispatcher-internal events.
pub static META: EventKind = EventKind::root("Meta");

/// Synthetic event describing a listener failure, emitted by the recovery
/// protocol. Payload fields: `listener_name`, `original_event_type`,
/// `error_message`, `error_type`.
pub static CALLBACK_ERROR: EventKind = EventKind::child("CallbackError", &META);

/// Notification that a failing listener was dead-lettered. Payload fields:
/// `listener_name`, `original_event_type`, `retry_count`.
pub static DEAD_LETTER: EventKind = EventKind::child("DeadLetter", &META);

// ============================================================================
// TESTS
// ============================================================================
