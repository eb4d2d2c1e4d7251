//! VOLLEY Dispatch - Synchronous and Concurrent Emission Engines
//!
//! This crate turns the execution plans computed by `volley-registry` into
//! actual listener invocations: resolving the kinds an event reaches,
//! filtering by predicate, merging returned maps under the event's
//! strategy, and running the error recovery protocol when a listener
//! fails.
//!
//! # Engines
//!
//! - `Dispatcher`: runs listeners one at a time, layer by layer, in
//!   declared registration order
//! - `AsyncDispatcher`: runs each layer's listeners concurrently inside
//!   the caller's task, but never starts layer N+1 before layer N has
//!   fully settled
//!
//! Both engines share the same registration surface (`Binding`,
//! `BindingGroup`) and the same recovery protocol: a failing listener
//! triggers a synthetic failure event whose handlers answer with retry,
//! deadletter, or silent directives.
//!
//! # Example
//!
//! ```
//! use volley_dispatch::{sync_listener, Binding, Dispatcher, Event, EventKind};
//! use serde_json::json;
//!
//! static ORDER_PLACED: EventKind = EventKind::root("OrderPlaced");
//!
//! let dispatcher = Dispatcher::new();
//! let pricer = sync_listener("pricer", |_event| Ok(Some(json!({"total": 42}))));
//! dispatcher.register(&pricer, Binding::kind(&ORDER_PLACED)).unwrap();
//!
//! let result = dispatcher.emit(&Event::new(&ORDER_PLACED)).unwrap();
//! assert_eq!(result.get("total"), Some(&json!(42)));
//! ```

mod binding;
mod concurrent;
mod dispatcher;
mod group;
mod recovery;

pub use binding::Binding;
pub use concurrent::{async_listener, AsyncCallback, AsyncDispatcher};
pub use dispatcher::{sync_listener, Dispatcher, SyncCallback};
pub use group::BindingGroup;

// Core types callers need at every registration and emission site.
pub use volley_core::{
    DispatchError, ErrorPolicy, Event, EventKind, ListenerError, MergeStrategy, ResultMap,
    VolleyError, VolleyResult, CALLBACK_ERROR, DEAD_LETTER, META,
};
pub use volley_registry::{Listener, Predicate};
