//! Concurrent dispatch engine.
//!
//! Each layer's listeners run as concurrent tasks inside the caller's own
//! context; the engine never advances to the next layer until every task
//! of the current one has finished, recovered, or failed for good. One
//! emission stays a single future, so dropping it cancels the whole
//! in-flight layer while an application error inside one listener never
//! touches its siblings.

use crate::binding::Binding;
use crate::group::BindingGroup;
use crate::recovery::{dead_letter_event, error_event, into_result_map};
use futures_util::future::{join_all, BoxFuture};
use serde_json::Value;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use volley_core::{
    merge_into, DispatchError, ErrorPolicy, Event, EventKind, ListenerError, ListenerFailure,
    ResultMap,
};
use volley_registry::{Entry, Listener, RegistryTable};

/// Callback signature for the concurrent engine.
///
/// The event arrives behind an `Arc` so the returned future owns its
/// input and can run side by side with its layer siblings.
pub type AsyncCallback = Arc<
    dyn Fn(Arc<Event>) -> BoxFuture<'static, Result<Option<Value>, ListenerError>> + Send + Sync,
>;

/// Wrap an async closure into a listener handle for the concurrent engine.
pub fn async_listener<F, Fut>(name: impl Into<String>, callback: F) -> Listener<AsyncCallback>
where
    F: Fn(Arc<Event>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Option<Value>, ListenerError>> + Send + 'static,
{
    let callback: AsyncCallback = Arc::new(move |event| Box::pin(callback(event)));
    Listener::new(name, callback)
}

/// Why one layer task produced no mergeable value.
enum TaskError {
    /// The listener failed and recovery chose to re-raise.
    Unrecovered(ListenerFailure),
    /// Recovery itself hit an engine error (handler conflict, bad policy).
    Engine(DispatchError),
}

// ============================================================================
// ASYNC DISPATCHER
// ============================================================================

/// Layer-concurrent dispatch engine.
///
/// Clones share the same registry and lifecycle state, so a listener can
/// hold a clone and emit further events inline.
#[derive(Debug, Clone)]
pub struct AsyncDispatcher {
    registry: RegistryTable<AsyncCallback>,
    closed: Arc<AtomicBool>,
}

impl AsyncDispatcher {
    pub fn new() -> Self {
        Self {
            registry: RegistryTable::new(),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Register `listener` as described by `binding`.
    pub fn register(
        &self,
        listener: &Listener<AsyncCallback>,
        binding: Binding<AsyncCallback>,
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
        listener: Option<&Listener<AsyncCallback>>,
    ) -> Result<(), DispatchError> {
        self.registry.remove(kinds, listener)?;
        Ok(())
    }

    /// Registration group whose teardown unregisters everything it added.
    pub fn group(&self) -> BindingGroup<AsyncCallback> {
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
    /// Kind resolution, predicate filtering, and merge strategy behave as
    /// in the synchronous engine. Within each layer all matching listeners
    /// run concurrently; their results still merge in declared
    /// registration order, so conflict resolution stays deterministic.
    /// A single unrecovered failure propagates alone; several within one
    /// layer aggregate into one compound error.
    pub async fn emit(&self, event: &Event) -> Result<ResultMap, DispatchError> {
        if self.is_closed() {
            return Err(DispatchError::Closed);
        }
        self.dispatch(Arc::new(event.clone())).await
    }

    // Boxed so listener failures can recursively dispatch the synthetic
    // failure event from inside an emission already in flight.
    fn dispatch(&self, event: Arc<Event>) -> BoxFuture<'static, Result<ResultMap, DispatchError>> {
        let engine = self.clone();
        Box::pin(async move {
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
                let plan = engine.registry.exec_order(kind)?;
                for layer in plan.iter() {
                    let entries: Vec<Entry<AsyncCallback>> = layer
                        .iter()
                        .filter(|entry| entry.matches(&event))
                        .cloned()
                        .collect();
                    if entries.is_empty() {
                        continue;
                    }

                    let tasks = entries.iter().map(|entry| {
                        let engine = engine.clone();
                        let listener = entry.listener().clone();
                        let event = Arc::clone(&event);
                        async move {
                            match (listener.callback())(Arc::clone(&event)).await {
                                Ok(value) => Ok(value),
                                Err(error) => engine.recover(&listener, &event, error).await,
                            }
                        }
                    });
                    let outcomes = join_all(tasks).await;

                    let mut failures = Vec::new();
                    let mut completed = Vec::new();
                    for (entry, outcome) in entries.iter().zip(outcomes) {
                        match outcome {
                            Ok(value) => completed.push((entry, value)),
                            Err(TaskError::Engine(error)) => return Err(error),
                            Err(TaskError::Unrecovered(failure)) => failures.push(failure),
                        }
                    }
                    if failures.len() > 1 {
                        return Err(DispatchError::LayerFailures { failures });
                    }
                    if let Some(failure) = failures.pop() {
                        return Err(DispatchError::Listener {
                            listener: failure.listener,
                            source: failure.error,
                        });
                    }
                    for (entry, value) in completed {
                        let listener = entry.listener();
                        let Some(result) =
                            into_result_map(listener.name(), event.kind(), value)?
                        else {
                            continue;
                        };
                        merge_into(&mut merged, result, event.merge_strategy(), listener.name())?;
                    }
                }
            }
            Ok(merged)
        })
    }

    /// Run the recovery protocol for one failed listener, inside its task.
    ///
    /// The layer barrier therefore waits for recovery too: retries and
    /// policy lookups finish before the next layer starts.
    async fn recover(
        &self,
        listener: &Listener<AsyncCallback>,
        event: &Arc<Event>,
        error: ListenerError,
    ) -> Result<Option<Value>, TaskError> {
        tracing::debug!(
            listener = %listener.name(),
            kind = %event.kind(),
            error = %error,
            "Listener failed, consulting error handlers"
        );
        let failure_event = Arc::new(error_event(listener.name(), event.kind(), &error));
        let policy_map = self
            .dispatch(failure_event)
            .await
            .map_err(TaskError::Engine)?;
        let policy = ErrorPolicy::from_map(&policy_map)
            .map_err(|policy_error| TaskError::Engine(policy_error.into()))?;

        let mut remaining = policy.retry;
        while remaining > 0 {
            remaining -= 1;
            if let Ok(value) = (listener.callback())(Arc::clone(event)).await {
                return Ok(value);
            }
        }
        if policy.deadletter {
            self.notify_dead_letter(listener, event, policy.retry).await;
            return Ok(None);
        }
        if policy.silent {
            return Ok(None);
        }
        Err(TaskError::Unrecovered(ListenerFailure {
            listener: listener.name().to_string(),
            error,
        }))
    }

    async fn notify_dead_letter(
        &self,
        listener: &Listener<AsyncCallback>,
        event: &Arc<Event>,
        retry_count: u64,
    ) {
        let notice = Arc::new(dead_letter_event(listener.name(), event.kind(), retry_count));
        if let Err(error) = self.dispatch(notice).await {
            tracing::warn!(
                listener = %listener.name(),
                error = %error,
                "Dead-letter notification failed"
            );
        }
    }
}

impl Default for AsyncDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;
    use std::time::Duration;
    use volley_core::{MergeStrategy, CALLBACK_ERROR};

    static GREETING: EventKind = EventKind::root("AsyncGreeting");
    static PARENT: EventKind = EventKind::root("AsyncParent");
    static CHILD: EventKind = EventKind::child("AsyncChild", &PARENT);

    fn returning(name: &str, value: Value) -> Listener<AsyncCallback> {
        async_listener(name, move |_| {
            let value = value.clone();
            async move { Ok(Some(value)) }
        })
    }

    fn failing(name: &str, message: &str) -> Listener<AsyncCallback> {
        let message = message.to_string();
        async_listener(name, move |_| {
            let message = message.clone();
            async move { Err(ListenerError::new(message)) }
        })
    }

    #[tokio::test]
    async fn test_disjoint_keys_merge_across_a_layer() {
        let dispatcher = AsyncDispatcher::new();
        dispatcher
            .register(&returning("a", json!({"a": 1})), Binding::kind(&GREETING))
            .unwrap();
        dispatcher
            .register(&returning("b", json!({"b": 2})), Binding::kind(&GREETING))
            .unwrap();

        let result = dispatcher.emit(&Event::new(&GREETING)).await.unwrap();
        assert_eq!(Value::Object(result), json!({"a": 1, "b": 2}));
    }

    #[tokio::test(start_paused = true)]
    async fn test_layer_completes_before_next_starts() {
        let dispatcher = AsyncDispatcher::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        let slow = {
            let log = Arc::clone(&log);
            async_listener("slow", move |_| {
                let log = Arc::clone(&log);
                async move {
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    log.lock().unwrap().push("slow".to_string());
                    Ok(None)
                }
            })
        };
        let after = {
            let log = Arc::clone(&log);
            async_listener("after", move |_| {
                let log = Arc::clone(&log);
                async move {
                    log.lock().unwrap().push("after".to_string());
                    Ok(None)
                }
            })
        };
        dispatcher.register(&slow, Binding::kind(&GREETING)).unwrap();
        dispatcher
            .register(&after, Binding::kind(&GREETING).with_after(&slow))
            .unwrap();

        dispatcher.emit(&Event::new(&GREETING)).await.unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["slow", "after"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_override_uses_declared_order_not_completion_order() {
        let dispatcher = AsyncDispatcher::new();
        let laggard = async_listener("laggard", |_| async {
            tokio::time::sleep(Duration::from_millis(40)).await;
            Ok(Some(json!({"k": "declared_first"})))
        });
        let sprinter = async_listener("sprinter", |_| async {
            Ok(Some(json!({"k": "declared_second"})))
        });
        dispatcher
            .register(&laggard, Binding::kind(&GREETING))
            .unwrap();
        dispatcher
            .register(&sprinter, Binding::kind(&GREETING))
            .unwrap();

        let event = Event::new(&GREETING).with_merge_strategy(MergeStrategy::Override);
        let result = dispatcher.emit(&event).await.unwrap();
        assert_eq!(result.get("k"), Some(&json!("declared_second")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_app_failure_does_not_cancel_siblings() {
        let dispatcher = AsyncDispatcher::new();
        let sibling_ran = Arc::new(AtomicBool::new(false));

        dispatcher
            .register(&failing("boom", "early failure"), Binding::kind(&GREETING))
            .unwrap();
        {
            let sibling_ran = Arc::clone(&sibling_ran);
            let sibling = async_listener("sibling", move |_| {
                let sibling_ran = Arc::clone(&sibling_ran);
                async move {
                    tokio::time::sleep(Duration::from_millis(30)).await;
                    sibling_ran.store(true, Ordering::SeqCst);
                    Ok(Some(json!({"sibling": true})))
                }
            });
            dispatcher.register(&sibling, Binding::kind(&GREETING)).unwrap();
        }

        let err = dispatcher.emit(&Event::new(&GREETING)).await.unwrap_err();
        assert!(matches!(err, DispatchError::Listener { .. }));
        assert!(sibling_ran.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_multiple_layer_failures_aggregate() {
        let dispatcher = AsyncDispatcher::new();
        dispatcher
            .register(&failing("first", "one"), Binding::kind(&GREETING))
            .unwrap();
        dispatcher
            .register(&failing("second", "two"), Binding::kind(&GREETING))
            .unwrap();

        let err = dispatcher.emit(&Event::new(&GREETING)).await.unwrap_err();
        match err {
            DispatchError::LayerFailures { failures } => {
                assert_eq!(failures.len(), 2);
                assert_eq!(failures[0].listener, "first");
                assert_eq!(failures[1].listener, "second");
            }
            other => panic!("expected aggregated failures, got {other}"),
        }
    }

    #[tokio::test]
    async fn test_lone_failure_propagates_alone() {
        let dispatcher = AsyncDispatcher::new();
        dispatcher
            .register(&failing("only", "solo"), Binding::kind(&GREETING))
            .unwrap();
        dispatcher
            .register(&returning("fine", json!({"ok": true})), Binding::kind(&GREETING))
            .unwrap();

        let err = dispatcher.emit(&Event::new(&GREETING)).await.unwrap_err();
        match err {
            DispatchError::Listener { listener, source } => {
                assert_eq!(listener, "only");
                assert_eq!(source.message, "solo");
            }
            other => panic!("expected lone failure, got {other}"),
        }
    }

    #[tokio::test]
    async fn test_retry_policy_reinvokes_until_success() {
        let dispatcher = AsyncDispatcher::new();
        let calls = Arc::new(AtomicUsize::new(0));
        {
            let calls = Arc::clone(&calls);
            let flaky = async_listener("flaky", move |_| {
                let calls = Arc::clone(&calls);
                async move {
                    let attempt = calls.fetch_add(1, Ordering::SeqCst) + 1;
                    if attempt == 1 {
                        Err(ListenerError::new("transient"))
                    } else {
                        Ok(Some(json!({"attempt": attempt})))
                    }
                }
            });
            dispatcher.register(&flaky, Binding::kind(&GREETING)).unwrap();
        }
        dispatcher
            .register(
                &returning("policy", json!({"retry": 2})),
                Binding::kind(&CALLBACK_ERROR),
            )
            .unwrap();

        let result = dispatcher.emit(&Event::new(&GREETING)).await.unwrap();
        assert_eq!(Value::Object(result), json!({"attempt": 2}));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_deadletter_swallows_the_failure() {
        let dispatcher = AsyncDispatcher::new();
        dispatcher
            .register(&failing("doomed", "boom"), Binding::kind(&GREETING))
            .unwrap();
        dispatcher
            .register(
                &returning("policy", json!({"deadletter": true})),
                Binding::kind(&CALLBACK_ERROR),
            )
            .unwrap();

        let result = dispatcher.emit(&Event::new(&GREETING)).await.unwrap();
        assert!(result.is_empty());
    }

    #[tokio::test]
    async fn test_emit_up_merges_child_then_parent() {
        let dispatcher = AsyncDispatcher::new();
        dispatcher
            .register(
                &returning("on_child", json!({"from_child": true})),
                Binding::kind(&CHILD),
            )
            .unwrap();
        dispatcher
            .register(
                &returning("on_parent", json!({"from_parent": true})),
                Binding::kind(&PARENT),
            )
            .unwrap();

        let flat = dispatcher.emit(&Event::new(&CHILD)).await.unwrap();
        assert_eq!(Value::Object(flat), json!({"from_child": true}));

        let up = dispatcher
            .emit(&Event::new(&CHILD).with_emit_up(true))
            .await
            .unwrap();
        assert_eq!(
            Value::Object(up),
            json!({"from_child": true, "from_parent": true})
        );
    }

    #[tokio::test]
    async fn test_listener_can_emit_recursively() {
        static INNER: EventKind = EventKind::root("AsyncInner");

        let dispatcher = AsyncDispatcher::new();
        dispatcher
            .register(&returning("inner", json!({"b": true})), Binding::kind(&INNER))
            .unwrap();
        {
            let inner_dispatcher = dispatcher.clone();
            let outer = async_listener("outer", move |_| {
                let dispatcher = inner_dispatcher.clone();
                async move {
                    let nested = dispatcher
                        .emit(&Event::new(&INNER))
                        .await
                        .map_err(|err| ListenerError::new(err.to_string()))?;
                    Ok(Some(json!({"nested": Value::Object(nested)})))
                }
            });
            dispatcher.register(&outer, Binding::kind(&GREETING)).unwrap();
        }

        let result = dispatcher.emit(&Event::new(&GREETING)).await.unwrap();
        assert_eq!(Value::Object(result), json!({"nested": {"b": true}}));
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_the_emission_cancels_the_active_layer() {
        let dispatcher = AsyncDispatcher::new();
        let finished = Arc::new(AtomicBool::new(false));
        {
            let finished = Arc::clone(&finished);
            let sleeper = async_listener("sleeper", move |_| {
                let finished = Arc::clone(&finished);
                async move {
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    finished.store(true, Ordering::SeqCst);
                    Ok(None)
                }
            });
            dispatcher.register(&sleeper, Binding::kind(&GREETING)).unwrap();
        }

        let outcome =
            tokio::time::timeout(Duration::from_millis(10), dispatcher.emit(&Event::new(&GREETING)))
                .await;
        assert!(outcome.is_err());

        // Give the cancelled listener time it would have needed.
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(!finished.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_shutdown_refuses_emissions() {
        let dispatcher = AsyncDispatcher::new();
        dispatcher.shutdown();
        let err = dispatcher.emit(&Event::new(&GREETING)).await.unwrap_err();
        assert!(matches!(err, DispatchError::Closed));
    }

    #[tokio::test]
    async fn test_non_mapping_return_fails_after_the_barrier() {
        let dispatcher = AsyncDispatcher::new();
        dispatcher
            .register(&returning("bad", json!("just a string")), Binding::kind(&GREETING))
            .unwrap();
        dispatcher
            .register(&returning("good", json!({"x": 1})), Binding::kind(&GREETING))
            .unwrap();

        let err = dispatcher.emit(&Event::new(&GREETING)).await.unwrap_err();
        assert!(matches!(err, DispatchError::NonMapResult { .. }));
    }
}
