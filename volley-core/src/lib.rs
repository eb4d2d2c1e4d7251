//! VOLLEY Core - Event Model, Merge Engine, and Error Taxonomy
//!
//! Pure data types and stateless logic shared by the registry and the
//! dispatchers. Nothing here holds state between emissions.
//!
//! # Key Types
//!
//! - `EventKind`: nominal event type with a parent link, forming a
//!   single-inheritance hierarchy walked by `emit_up` dispatch
//! - `Event` / `EventHeader`: one occurrence, with identity, dispatch
//!   controls, and an opaque JSON payload
//! - `MergeStrategy` / `merge_into`: conflict policies for combining
//!   listener results into one map
//! - `ErrorPolicy`: retry/deadletter/silent directives parsed from failure
//!   handler results
//! - `VolleyError` and the per-area error enums
//!
//! # Hierarchy Example
//!
//! ```text
//! Order ── OrderPlaced
//!      └── OrderCancelled
//! ```
//!
//! Emitting an `OrderPlaced` event with `emit_up` dispatches listeners
//! registered on `OrderPlaced`, then those registered on `Order`.

pub mod error;
pub mod event;
pub mod kind;
pub mod merge;
pub mod policy;

pub use error::{
    DispatchError, ListenerError, ListenerFailure, MergeError, PolicyError, RegistryError,
    VolleyError, VolleyResult,
};
pub use event::{new_event_id, Event, EventHeader, EventId, Timestamp};
pub use kind::{Ancestors, EventKind, CALLBACK_ERROR, DEAD_LETTER, META};
pub use merge::{merge_into, MergeStrategy, ResultMap};
pub use policy::ErrorPolicy;
