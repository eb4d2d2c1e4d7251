//! Volley Registry - Listener Graphs and Execution Plans
//!
//! This crate keeps track of which listeners run for which event kinds and
//! in what order. Each kind owns a directed graph rooted at a synthetic
//! guardian node; an `after` dependency becomes an edge, and execution
//! plans are the graph's layers read off breadth-first from the guardian.
//!
//! ```text
//! guardian → validate ─┬→ persist → notify
//!                      └→ audit
//! Plan: [validate] [persist, audit] [notify]
//! ```
//!
//! # Key Types
//!
//! - `Listener<C>`: named callback handle; identity follows the handle, so
//!   clones of one handle are the same listener
//! - `RegistryTable<C>`: thread-safe registry shared by dispatchers
//! - `Plan<C>`: memoized layered execution order for one kind
//! - `Predicate`: per-registration filter evaluated against each event

mod graph;
mod listener;
mod table;

pub use graph::Entry;
pub use listener::{Listener, ListenerId, Predicate};
pub use table::{Plan, RegistryTable};
