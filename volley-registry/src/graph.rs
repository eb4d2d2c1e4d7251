//! Per-kind dependency graphs.
//!
//! Every event kind gets one directed graph. Nodes are listener handles plus
//! a synthetic guardian root; an edge `a -> b` means "a completes before b
//! starts". Listeners registered without dependencies hang off the guardian,
//! which keeps the graph single-rooted for layering and cycle checks.

use crate::listener::{Listener, ListenerId, Predicate};
use petgraph::graphmap::DiGraphMap;
use petgraph::Direction;
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use volley_core::{Event, EventKind, RegistryError};

// ============================================================================
// GRAPH ENTRY
// ============================================================================

/// One registered listener inside a kind's graph.
pub struct Entry<C> {
    listener: Listener<C>,
    when: Option<Predicate>,
    order: u64,
}

impl<C> Entry<C> {
    /// The listener handle.
    pub fn listener(&self) -> &Listener<C> {
        &self.listener
    }

    /// Evaluate the registration predicate against `event`.
    ///
    /// Registrations without a predicate match everything.
    pub fn matches(&self, event: &Event) -> bool {
        match &self.when {
            Some(predicate) => predicate(event),
            None => true,
        }
    }

    pub(crate) fn order(&self) -> u64 {
        self.order
    }
}

impl<C> Clone for Entry<C> {
    fn clone(&self) -> Self {
        Self {
            listener: self.listener.clone(),
            when: self.when.clone(),
            order: self.order,
        }
    }
}

impl<C> fmt::Debug for Entry<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entry")
            .field("listener", &self.listener)
            .field("has_when", &self.when.is_some())
            .field("order", &self.order)
            .finish()
    }
}

// ============================================================================
// KIND GRAPH
// ============================================================================

/// Guardian-rooted dependency graph for one event kind.
pub(crate) struct KindGraph<C> {
    graph: DiGraphMap<ListenerId, ()>,
    entries: HashMap<ListenerId, Entry<C>>,
}

impl<C> KindGraph<C> {
    pub(crate) fn new() -> Self {
        let mut graph = DiGraphMap::new();
        graph.add_node(ListenerId::GUARDIAN);
        Self {
            graph,
            entries: HashMap::new(),
        }
    }

    pub(crate) fn contains(&self, id: ListenerId) -> bool {
        self.entries.contains_key(&id)
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn listener_ids(&self) -> impl Iterator<Item = ListenerId> + '_ {
        self.entries.keys().copied()
    }

    /// Register `listener` after the given dependencies.
    ///
    /// Dependencies must already be nodes of this graph. A mutation that
    /// would close a cycle is rolled back completely before the error
    /// returns. Re-adding a known listener keeps its original position in
    /// declared order but replaces its predicate and accumulates edges.
    pub(crate) fn add(
        &mut self,
        kind: &'static EventKind,
        listener: &Listener<C>,
        after: &[Listener<C>],
        when: Option<Predicate>,
        order: u64,
    ) -> Result<(), RegistryError> {
        let id = listener.id();

        for dep in after {
            if dep.id() == id {
                return Err(RegistryError::CyclicDependency {
                    chain: vec![listener.name().to_string(), listener.name().to_string()],
                });
            }
            if !self.contains(dep.id()) {
                return Err(RegistryError::UnknownDependency {
                    dependency: dep.name().to_string(),
                    kind: kind.name().to_string(),
                });
            }
        }

        let node_was_new = !self.contains(id);
        self.graph.add_node(id);

        let mut added_edges = Vec::new();
        if after.is_empty() {
            if self.graph.add_edge(ListenerId::GUARDIAN, id, ()).is_none() {
                added_edges.push((ListenerId::GUARDIAN, id));
            }
        } else {
            for dep in after {
                if self.graph.add_edge(dep.id(), id, ()).is_none() {
                    added_edges.push((dep.id(), id));
                }
            }
        }

        if let Some(cycle) = self.find_cycle_through(id) {
            for (a, b) in added_edges {
                self.graph.remove_edge(a, b);
            }
            if node_was_new {
                self.graph.remove_node(id);
            }
            let chain = cycle
                .iter()
                .map(|node| self.display_name(*node))
                .collect();
            return Err(RegistryError::CyclicDependency { chain });
        }

        let kept_order = self.entries.get(&id).map_or(order, Entry::order);
        self.entries.insert(
            id,
            Entry {
                listener: listener.clone(),
                when,
                order: kept_order,
            },
        );
        Ok(())
    }

    /// Drop a listener and its incident edges.
    pub(crate) fn remove(&mut self, id: ListenerId) -> bool {
        if self.entries.remove(&id).is_some() {
            self.graph.remove_node(id);
            true
        } else {
            false
        }
    }

    /// Compute execution layers, guardian layer excluded.
    ///
    /// Layer k holds the listeners whose dependencies all sit in layers
    /// before k, so no layer contains an edge between two of its members.
    /// Only nodes still reachable from the guardian participate; within a
    /// layer, listeners keep declared registration order.
    pub(crate) fn layers(&self) -> Vec<Vec<Entry<C>>> {
        let mut reachable = HashSet::new();
        reachable.insert(ListenerId::GUARDIAN);
        let mut queue = VecDeque::from([ListenerId::GUARDIAN]);
        while let Some(node) = queue.pop_front() {
            for succ in self.graph.neighbors_directed(node, Direction::Outgoing) {
                if reachable.insert(succ) {
                    queue.push_back(succ);
                }
            }
        }

        let mut pending: HashMap<ListenerId, usize> = HashMap::new();
        for &node in &reachable {
            let preds = self
                .graph
                .neighbors_directed(node, Direction::Incoming)
                .filter(|pred| reachable.contains(pred))
                .count();
            pending.insert(node, preds);
        }

        let mut layers = Vec::new();
        let mut frontier = vec![ListenerId::GUARDIAN];
        while !frontier.is_empty() {
            let mut next = Vec::new();
            for &node in &frontier {
                for succ in self.graph.neighbors_directed(node, Direction::Outgoing) {
                    if let Some(remaining) = pending.get_mut(&succ) {
                        *remaining -= 1;
                        if *remaining == 0 {
                            next.push(succ);
                        }
                    }
                }
            }
            let mut layer: Vec<Entry<C>> = next
                .iter()
                .filter_map(|id| self.entries.get(id).cloned())
                .collect();
            layer.sort_by_key(Entry::order);
            if !layer.is_empty() {
                layers.push(layer);
            }
            frontier = next;
        }
        layers
    }

    fn display_name(&self, id: ListenerId) -> String {
        match self.entries.get(&id) {
            Some(entry) => entry.listener().name().to_string(),
            None => "<guardian>".to_string(),
        }
    }

    /// Depth-first search for a path from `start` back to itself.
    fn find_cycle_through(&self, start: ListenerId) -> Option<Vec<ListenerId>> {
        let mut path = vec![start];
        let mut visited = HashSet::new();
        if self.walk_back_to(start, start, &mut visited, &mut path) {
            Some(path)
        } else {
            None
        }
    }

    fn walk_back_to(
        &self,
        current: ListenerId,
        target: ListenerId,
        visited: &mut HashSet<ListenerId>,
        path: &mut Vec<ListenerId>,
    ) -> bool {
        for succ in self.graph.neighbors_directed(current, Direction::Outgoing) {
            if succ == target {
                path.push(target);
                return true;
            }
            if visited.insert(succ) {
                path.push(succ);
                if self.walk_back_to(succ, target, visited, path) {
                    return true;
                }
                path.pop();
            }
        }
        false
    }
}

// ============================================================================
// TESTS
// ============================================================================
