//! Error-policy mapping read from failure-event handler results.
//!
//! When a listener fails, the recovery protocol emits a synthetic failure
//! event and merges its handlers' results into a policy map. [`ErrorPolicy`]
//! interprets that map: how many retries, whether to dead-letter, whether to
//! stay silent. Keys the handlers never wrote fall back to defaults.

use crate::error::PolicyError;
use crate::merge::ResultMap;
use serde_json::Value;

/// Directives extracted from a failure-event handler result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ErrorPolicy {
    /// Number of times the failing listener is re-invoked.
    pub retry: u64,
    /// After retries are exhausted, swallow the failure and notify.
    pub deadletter: bool,
    /// Swallow the failure without notification.
    pub silent: bool,
}

impl ErrorPolicy {
    /// Read a policy from a merged handler result.
    ///
    /// `retry` accepts any numeric-like value (integers, integral-valued
    /// strings, floats truncated toward zero, booleans) but must be
    /// non-negative. `deadletter` and `silent` must be booleans when
    /// present.
    pub fn from_map(map: &ResultMap) -> Result<Self, PolicyError> {
        let retry = match map.get("retry") {
            None => 0,
            Some(value) => coerce_retry(value)?,
        };
        Ok(Self {
            retry,
            deadletter: coerce_flag(map, "deadletter")?,
            silent: coerce_flag(map, "silent")?,
        })
    }
}

fn coerce_retry(value: &Value) -> Result<u64, PolicyError> {
    let rejected = || PolicyError::InvalidRetry {
        value: value.to_string(),
    };
    match value {
        Value::Number(n) => {
            if let Some(count) = n.as_u64() {
                Ok(count)
            } else if let Some(f) = n.as_f64() {
                if f.is_finite() && f >= 0.0 {
                    Ok(f as u64)
                } else {
                    Err(rejected())
                }
            } else {
                Err(rejected())
            }
        }
        Value::String(s) => s.trim().parse::<u64>().map_err(|_| rejected()),
        Value::Bool(b) => Ok(u64::from(*b)),
        _ => Err(rejected()),
    }
}

fn coerce_flag(map: &ResultMap, key: &str) -> Result<bool, PolicyError> {
    match map.get(key) {
        None => Ok(false),
        Some(Value::Bool(b)) => Ok(*b),
        Some(other) => Err(PolicyError::InvalidFlag {
            key: key.to_string(),
            value: other.to_string(),
        }),
    }
}

// ============================================================================
// TESTS
// ============================================================================
