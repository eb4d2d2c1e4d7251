//! Synchronous dispatch engine.
//!
//! Listeners run one at a time, layer by layer, in declared registration
//! order within each layer. A listener failure is handed to the recovery
//! protocol before the loop continues; an unrecovered failure aborts the
//! emission and discards the partially merged result.

use crate::binding::Binding;
use crate::group::BindingGroup;
use crate::recovery::{dead_letter_event, error_event, into_result_map};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use volley_core::{
    merge_into, DispatchError, ErrorPolicy, Event, EventKind, ListenerError, ResultMap,
};
use volley_registry::{Listener, RegistryTable};

/// Callback signature for the synchronous engine.
pub type SyncCallback = Arc<dyn Fn(&Event) -> Result<Option<Value>, ListenerError> + Send + Sync>;

/// Wrap a closure into a listener handle for the synchronous engine.
pub fn sync_listener<F>(name: impl Into<String>, callback: F) -> Listener<SyncCallback>
where
    F: Fn(&Event) -> Result<Option<Value>, ListenerError> + Send + Sync + 'static,
{
    let callback: SyncCallback = Arc::new(callback);
    Listener::new(name, callback)
}

/// What recovery decided for one failed listener.
enum Recovered {
    /// A retry succeeded; merge its return value.
    Value(Option<Value>),
    /// The failure was dead-lettered or silenced; contribute nothing.
    Swallowed,
}

// ============================================================================
// DISPATCHER
// ============================================================================

/// Sequential dispatch engine.
///
/// Clones share the same registry and lifecycle state, so a listener can
/// hold a clone and emit further events inline.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    registry: RegistryTable<SyncCallback>,
    closed: Arc<AtomicBool>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self {
            registry: RegistryTable::new(),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Register `listener` as described by `binding`.
    pub fn register(
        &self,
        listener: &Listener<SyncCallback>,
        binding: Binding<SyncCallback>,
    ) -> Result<(), DispatchError> {
        let (kinds, after, when) = binding.into_parts();
        self.registry.add(&kinds, listener, &after, when)?;
        let kind_names: Vec<&str> = kinds.iter().map(|kind| kind.name()).collect();
        tracing::debug!(listener = %listener.name(), kinds = ?kind_names, "Registered listener");
        Ok(())
    }

    /// Remove registrations by kinds, by listener, or both.
    pub fn unregister(
        &self,
        kinds: Option<&[&'static EventKind]>,
        listener: Option<&Listener<SyncCallback>>,
    ) -> Result<(), DispatchError> {
        self.registry.remove(kinds, listener)?;
        Ok(())
    }

    /// Registration group whose teardown unregisters everything it added.
    pub fn group(&self) -> BindingGroup<SyncCallback> {
        BindingGroup::new(self.registry.clone())
    }

    /// Stop accepting emissions. Registration stays available; only `emit`
    /// is refused afterwards. Idempotent.
    pub fn shutdown(&self) {
        self.closed.store(true, Ordering::SeqCst);
        tracing::debug!("Dispatcher shut down");
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Dispatch one event and return the merged listener results.
    ///
    /// The event's concrete kind is dispatched first; with `emit_up` set,
    /// every ancestor kind follows in chain order. Within each kind the
    /// plan's layers run in order, and listeners whose registration
    /// predicate rejects the event are skipped. Listener results merge
    /// under the event's merge strategy; failures go through the recovery
    /// protocol, and an unrecovered failure discards the partial result.
    pub fn emit(&self, event: &Event) -> Result<ResultMap, DispatchError> {
        if self.is_closed() {
            return Err(DispatchError::Closed);
        }
        tracing::debug!(
            kind = %event.kind(),
            event_id = %event.event_id(),
            emit_up = event.emit_up(),
            "Dispatching event"
        );

        let mut merged = ResultMap::new();
        let kinds: Vec<&'static EventKind> = if event.emit_up() {
            event.kind().ancestors().collect()
        } else {
            vec![event.kind()]
        };
        for kind in kinds {
            let plan = self.registry.exec_order(kind)?;
            for layer in plan.iter() {
                for entry in layer {
                    if !entry.matches(event) {
                        continue;
                    }
                    let listener = entry.listener();
                    let value = match (listener.callback())(event) {
                        Ok(value) => value,
                        Err(error) => match self.recover(listener, event, &error)? {
                            Recovered::Value(value) => value,
                            Recovered::Swallowed => continue,
                        },
                    };
                    let Some(result) = into_result_map(listener.name(), event.kind(), value)?
                    else {
                        continue;
                    };
                    merge_into(&mut merged, result, event.merge_strategy(), listener.name())?;
                }
            }
        }
        Ok(merged)
    }

    /// Run the recovery protocol for one failed listener.
    ///
    /// Emits the synthetic failure event, reads the merged handler result
    /// as a policy, then applies retry, deadletter, silent, and re-raise
    /// in that fixed order.
    fn recover(
        &self,
        listener: &Listener<SyncCallback>,
        event: &Event,
        error: &ListenerError,
    ) -> Result<Recovered, DispatchError> {
        tracing::debug!(
            listener = %listener.name(),
            kind = %event.kind(),
            error = %error,
            "Listener failed, consulting error handlers"
        );
        let policy_map = self.emit(&error_event(listener.name(), event.kind(), error))?;
        let policy = ErrorPolicy::from_map(&policy_map)?;

        let mut remaining = policy.retry;
        while remaining > 0 {
            remaining -= 1;
            if let Ok(value) = (listener.callback())(event) {
                return Ok(Recovered::Value(value));
            }
        }
        if policy.deadletter {
            self.notify_dead_letter(listener, event, policy.retry);
            return Ok(Recovered::Swallowed);
        }
        if policy.silent {
            return Ok(Recovered::Swallowed);
        }
        Err(DispatchError::Listener {
            listener: listener.name().to_string(),
            source: error.clone(),
        })
    }

    fn notify_dead_letter(
        &self,
        listener: &Listener<SyncCallback>,
        event: &Event,
        retry_count: u64,
    ) {
        let notice = dead_letter_event(listener.name(), event.kind(), retry_count);
        if let Err(error) = self.emit(&notice) {
            tracing::warn!(
                listener = %listener.name(),
                error = %error,
                "Dead-letter notification failed"
            );
        }
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// TESTS
// ============================================================================


#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;
    use volley_core::CALLBACK_ERROR;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        /// A listener that needs `needed` attempts to succeed recovers
        /// exactly when the policy grants at least `needed - 1` retries;
        /// otherwise the original error resurfaces after the budget is
        /// spent.
        #[test]
        fn prop_retry_budget_bounds_recovery(needed in 1usize..6, retries in 0u64..6) {
            static KIND: EventKind = EventKind::root("RetryBudget");

            let dispatcher = Dispatcher::new();
            let calls = Arc::new(AtomicUsize::new(0));
            {
                let calls = Arc::clone(&calls);
                let flaky = sync_listener("flaky", move |_| {
                    let attempt = calls.fetch_add(1, Ordering::SeqCst) + 1;
                    if attempt >= needed {
                        Ok(Some(json!({"attempt": attempt})))
                    } else {
                        Err(ListenerError::new("transient"))
                    }
                });
                dispatcher.register(&flaky, Binding::kind(&KIND)).unwrap();
            }
            dispatcher
                .register(
                    &sync_listener("policy", move |_| Ok(Some(json!({"retry": retries})))),
                    Binding::kind(&CALLBACK_ERROR),
                )
                .unwrap();

            let result = dispatcher.emit(&Event::new(&KIND));
            if needed as u64 <= retries + 1 {
                let merged = result.expect("budget covers the needed attempts");
                prop_assert_eq!(merged.get("attempt"), Some(&json!(needed)));
                prop_assert_eq!(calls.load(Ordering::SeqCst), needed);
            } else {
                prop_assert!(
                    matches!(result, Err(DispatchError::Listener { .. })),
                    "expected the original failure, got {:?}",
                    result
                );
                prop_assert_eq!(calls.load(Ordering::SeqCst), 1 + retries as usize);
            }
        }
    }
}
