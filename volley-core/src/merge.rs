//! Merge engine: combining listener results under a conflict policy.
//!
//! Every listener may return a JSON object; one emission folds those objects
//! into a single accumulator with [`merge_into`]. The event's
//! [`MergeStrategy`] decides what happens when two listeners write the same
//! key.

use crate::error::MergeError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Accumulated listener results for one emission.
pub type ResultMap = Map<String, Value>;

// ============================================================================
// MERGE STRATEGY
// ============================================================================

/// Conflict policy for combining listener results on key collision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MergeStrategy {
    /// Fail the emission, naming the colliding keys.
    #[default]
    Raise,
    /// First writer wins; later values are discarded.
    Keep,
    /// Last writer wins; earlier values are replaced.
    Override,
    /// On collision, collect the key's values into an array in merge order.
    ListMerge,
    /// On collision, collect the key's values into an object keyed by the
    /// producing listener's name.
    DictMerge,
}

impl fmt::Display for MergeStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Raise => "raise",
            Self::Keep => "keep",
            Self::Override => "override",
            Self::ListMerge => "list_merge",
            Self::DictMerge => "dict_merge",
        };
        f.write_str(name)
    }
}

// ============================================================================
// MERGE
// ============================================================================

/// Fold `source` into `target` under `strategy`.
///
/// Keys absent from `target` land unchanged under every strategy; the
/// strategy only decides what a collision does. `source_name` identifies
/// the producing listener; `DictMerge` uses it as the sub-key and `Raise`
/// reports it in the conflict error. Merging an empty `source` never
/// changes `target`.
pub fn merge_into(
    target: &mut ResultMap,
    source: ResultMap,
    strategy: MergeStrategy,
    source_name: &str,
) -> Result<(), MergeError> {
    if strategy == MergeStrategy::Raise {
        let mut colliding: Vec<String> = source
            .keys()
            .filter(|key| target.contains_key(*key))
            .cloned()
            .collect();
        if !colliding.is_empty() {
            colliding.sort();
            return Err(MergeError::KeyConflict {
                keys: colliding,
                source: source_name.to_string(),
            });
        }
        target.extend(source);
        return Ok(());
    }

    for (key, value) in source {
        match strategy {
            MergeStrategy::Raise => unreachable!("handled above"),
            MergeStrategy::Keep => {
                target.entry(key).or_insert(value);
            }
            MergeStrategy::Override => {
                target.insert(key, value);
            }
            MergeStrategy::ListMerge => match target.get_mut(&key) {
                Some(Value::Array(items)) => items.push(value),
                Some(existing) => {
                    // First collision on a non-array value: keep it as the
                    // array's head.
                    let previous = existing.take();
                    *existing = Value::Array(vec![previous, value]);
                }
                None => {
                    target.insert(key, value);
                }
            },
            MergeStrategy::DictMerge => match target.get_mut(&key) {
                Some(Value::Object(entries)) => {
                    entries.insert(source_name.to_string(), value);
                }
                Some(existing) => {
                    // First collision: the earlier value's producer is no
                    // longer known, so it keeps the empty key.
                    let previous = existing.take();
                    let mut entries = Map::new();
                    entries.insert(String::new(), previous);
                    entries.insert(source_name.to_string(), value);
                    *existing = Value::Object(entries);
                }
                None => {
                    target.insert(key, value);
                }
            },
        }
    }
    Ok(())
}

// ============================================================================
// TESTS
// ============================================================================
