//! Shared registry of listeners keyed by event kind.
//!
//! `RegistryTable` wraps the per-kind graphs behind an `Arc<RwLock>` so
//! dispatchers can share one registry across threads. Execution plans are
//! memoized per kind and invalidated by a revision counter that every
//! mutation bumps.

use crate::graph::{Entry, KindGraph};
use crate::listener::{Listener, Predicate};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};
use volley_core::{EventKind, RegistryError};

/// Memoized execution plan: one inner vec per layer, in run order.
pub type Plan<C> = Arc<Vec<Vec<Entry<C>>>>;

// ============================================================================
// REGISTRY TABLE
// ============================================================================

struct TableInner<C> {
    graphs: HashMap<&'static str, KindGraph<C>>,
    plans: HashMap<&'static str, (u64, Plan<C>)>,
    revision: u64,
    next_order: u64,
}

/// Thread-safe listener registry.
///
/// Clones share the same underlying state.
pub struct RegistryTable<C> {
    inner: Arc<RwLock<TableInner<C>>>,
}

impl<C> RegistryTable<C> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(TableInner {
                graphs: HashMap::new(),
                plans: HashMap::new(),
                revision: 0,
                next_order: 0,
            })),
        }
    }

    /// Register `listener` under each kind in `kinds`.
    ///
    /// Validation runs per kind: every `after` dependency must already be
    /// registered under that kind, and the new edges must not close a cycle.
    /// A failing kind is rolled back in full, but kinds processed before it
    /// stay registered. Re-adding a listener a kind already holds keeps its
    /// declared position and replaces its predicate.
    pub fn add(
        &self,
        kinds: &[&'static EventKind],
        listener: &Listener<C>,
        after: &[Listener<C>],
        when: Option<Predicate>,
    ) -> Result<(), RegistryError> {
        if kinds.is_empty() {
            return Ok(());
        }
        let mut inner = self.inner.write().map_err(|_| RegistryError::LockPoisoned)?;
        let order = inner.next_order;
        inner.next_order += 1;

        let mut mutated = false;
        let mut result = Ok(());
        for kind in kinds {
            let graph = inner
                .graphs
                .entry(kind.name())
                .or_insert_with(KindGraph::new);
            match graph.add(*kind, listener, after, when.clone(), order) {
                Ok(()) => mutated = true,
                Err(err) => {
                    result = Err(err);
                    break;
                }
            }
        }

        // A freshly inserted graph that rejected its only listener would
        // otherwise linger as an empty kind.
        inner.graphs.retain(|_, graph| !graph.is_empty());
        if mutated {
            inner.revision += 1;
        }
        result
    }

    /// Unregister listeners.
    ///
    /// At least one selector is required. With both, `listener` is removed
    /// from each named kind; with only `kinds`, the named kinds are cleared
    /// outright; with only `listener`, it is removed from every kind. A
    /// listener selector that matches nothing in the registry is an error.
    /// Kinds left without listeners are dropped.
    pub fn remove(
        &self,
        kinds: Option<&[&'static EventKind]>,
        listener: Option<&Listener<C>>,
    ) -> Result<(), RegistryError> {
        let mut inner = self.inner.write().map_err(|_| RegistryError::LockPoisoned)?;
        let mut mutated = false;

        match (kinds, listener) {
            (None, None) => return Err(RegistryError::MissingSelector),
            (Some(kinds), Some(listener)) => {
                let id = listener.id();
                if !inner.graphs.values().any(|graph| graph.contains(id)) {
                    return Err(RegistryError::UnknownListener {
                        listener: listener.name().to_string(),
                    });
                }
                for kind in kinds {
                    if let Some(graph) = inner.graphs.get_mut(kind.name()) {
                        mutated |= graph.remove(id);
                    }
                }
            }
            (Some(kinds), None) => {
                for kind in kinds {
                    if inner.graphs.remove(kind.name()).is_some() {
                        inner.plans.remove(kind.name());
                        mutated = true;
                    }
                }
            }
            (None, Some(listener)) => {
                let id = listener.id();
                if !inner.graphs.values().any(|graph| graph.contains(id)) {
                    return Err(RegistryError::UnknownListener {
                        listener: listener.name().to_string(),
                    });
                }
                for graph in inner.graphs.values_mut() {
                    mutated |= graph.remove(id);
                }
            }
        }

        let inner = &mut *inner;
        let plans = &mut inner.plans;
        inner.graphs.retain(|name, graph| {
            if graph.is_empty() {
                plans.remove(name);
                false
            } else {
                true
            }
        });
        if mutated {
            inner.revision += 1;
        }
        Ok(())
    }

    /// Execution plan for `kind`, computed lazily and cached per revision.
    ///
    /// A kind nothing was ever registered under yields an empty plan.
    pub fn exec_order(&self, kind: &'static EventKind) -> Result<Plan<C>, RegistryError> {
        let name = kind.name();
        {
            let inner = self.inner.read().map_err(|_| RegistryError::LockPoisoned)?;
            if !inner.graphs.contains_key(name) {
                return Ok(Arc::new(Vec::new()));
            }
            if let Some((revision, plan)) = inner.plans.get(name) {
                if *revision == inner.revision {
                    return Ok(Arc::clone(plan));
                }
            }
        }

        let mut inner = self.inner.write().map_err(|_| RegistryError::LockPoisoned)?;
        let revision = inner.revision;
        if let Some((cached_revision, plan)) = inner.plans.get(name) {
            if *cached_revision == revision {
                return Ok(Arc::clone(plan));
            }
        }
        let plan = match inner.graphs.get(name) {
            Some(graph) => Arc::new(graph.layers()),
            None => return Ok(Arc::new(Vec::new())),
        };
        inner.plans.insert(name, (revision, Arc::clone(&plan)));
        Ok(plan)
    }

    /// Whether `listener` is registered under any kind.
    pub fn contains(&self, listener: &Listener<C>) -> Result<bool, RegistryError> {
        let inner = self.inner.read().map_err(|_| RegistryError::LockPoisoned)?;
        let id = listener.id();
        Ok(inner.graphs.values().any(|graph| graph.contains(id)))
    }

    /// Number of kinds with at least one listener.
    pub fn kind_count(&self) -> Result<usize, RegistryError> {
        let inner = self.inner.read().map_err(|_| RegistryError::LockPoisoned)?;
        Ok(inner.graphs.len())
    }

    pub fn is_empty(&self) -> Result<bool, RegistryError> {
        Ok(self.kind_count()? == 0)
    }
}

impl<C> Default for RegistryTable<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> Clone for RegistryTable<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C> fmt::Debug for RegistryTable<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.inner.read() {
            Ok(inner) => f
                .debug_struct("RegistryTable")
                .field("kinds", &inner.graphs.len())
                .field("revision", &inner.revision)
                .finish(),
            Err(_) => f.write_str("RegistryTable { <poisoned> }"),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
