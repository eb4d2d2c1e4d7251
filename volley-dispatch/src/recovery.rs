//! Synthetic events and shared plumbing for the error recovery protocol.
//!
//! When a listener fails, the engines emit a `CALLBACK_ERROR` event and
//! read the merged handler result back as an [`ErrorPolicy`]
//! (retry, deadletter, silent). The constructors here pin down the
//! synthetic payloads; the retry loops live in the engines because they
//! must re-invoke callbacks in the engine's own calling convention.

use serde_json::{json, Value};
use volley_core::{
    DispatchError, Event, EventKind, ListenerError, MergeStrategy, ResultMap, CALLBACK_ERROR,
    DEAD_LETTER,
};

/// Synthetic event describing one listener failure.
///
/// Always dispatched under `Raise` so policy keys coming back from
/// several handlers are never wrapped by the original event's strategy,
/// and never up-emitted.
pub(crate) fn error_event(listener: &str, original: &EventKind, error: &ListenerError) -> Event {
    Event::new(&CALLBACK_ERROR)
        .with_merge_strategy(MergeStrategy::Raise)
        .with_payload(json!({
            "listener_name": listener,
            "original_event_type": original.name(),
            "error_message": error.message,
            "error_type": error.error_type,
        }))
}

/// Notification that a failing listener was dead-lettered after
/// `retry_count` configured retries.
pub(crate) fn dead_letter_event(listener: &str, original: &EventKind, retry_count: u64) -> Event {
    Event::new(&DEAD_LETTER)
        .with_merge_strategy(MergeStrategy::Raise)
        .with_payload(json!({
            "listener_name": listener,
            "original_event_type": original.name(),
            "retry_count": retry_count,
        }))
}

/// Interpret a listener's return value: mappings merge, `None` contributes
/// nothing, anything else is a type error.
pub(crate) fn into_result_map(
    listener: &str,
    kind: &EventKind,
    value: Option<Value>,
) -> Result<Option<ResultMap>, DispatchError> {
    match value {
        None => Ok(None),
        Some(Value::Object(map)) => Ok(Some(map)),
        Some(_) => Err(DispatchError::NonMapResult {
            listener: listener.to_string(),
            kind: kind.name().to_string(),
        }),
    }
}
