//! Error types for VOLLEY operations

use std::fmt;
use thiserror::Error;

/// Registration and registry mutation errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Unknown dependency '{dependency}' for kind {kind}")]
    UnknownDependency { dependency: String, kind: String },

    #[error("Cyclic dependency detected: {}", .chain.join(" -> "))]
    CyclicDependency { chain: Vec<String> },

    #[error("Unregister requires kinds, a listener, or both")]
    MissingSelector,

    #[error("Listener not registered: {listener}")]
    UnknownListener { listener: String },

    #[error("Registry lock poisoned")]
    LockPoisoned,
}

/// Result combination errors.
// Not derived via thiserror: the `source` field is the producing listener's
// name, not an error cause, but thiserror unconditionally treats any field
// named `source` as the error source and requires it to implement Error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeError {
    KeyConflict { keys: Vec<String>, source: String },
}

impl fmt::Display for MergeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::KeyConflict { keys, source } => write!(
                f,
                "Key conflict from listener '{source}' on: {}",
                keys.join(", ")
            ),
        }
    }
}

impl std::error::Error for MergeError {}

/// Error-policy interpretation errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PolicyError {
    #[error("Invalid retry value: {value} - expected a non-negative integer")]
    InvalidRetry { value: String },

    #[error("Invalid value for {key}: {value} - expected a boolean")]
    InvalidFlag { key: String, value: String },
}

/// An application error raised by a listener.
///
/// Carries a display type name and a message: the two facts the recovery
/// protocol's synthetic failure event reports to its handlers.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{error_type}: {message}")]
pub struct ListenerError {
    pub error_type: String,
    pub message: String,
}

impl ListenerError {
    /// Create a listener error with the default type name.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error_type: "ListenerError".to_string(),
            message: message.into(),
        }
    }

    /// Create a listener error with an explicit type name.
    pub fn typed(error_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error_type: error_type.into(),
            message: message.into(),
        }
    }
}

/// One unrecovered failure inside a concurrently executed layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerFailure {
    pub listener: String,
    pub error: ListenerError,
}

impl fmt::Display for ListenerFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.listener, self.error)
    }
}

fn join_failures(failures: &[ListenerFailure]) -> String {
    failures
        .iter()
        .map(ListenerFailure::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Emission errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error("Dispatcher has been shut down")]
    Closed,

    #[error("Listener '{listener}' returned a non-mapping value for kind {kind}")]
    NonMapResult { listener: String, kind: String },

    #[error("Merge error: {0}")]
    Merge(#[from] MergeError),

    #[error("Policy error: {0}")]
    Policy(#[from] PolicyError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Listener '{listener}' failed: {source}")]
    Listener {
        listener: String,
        source: ListenerError,
    },

    #[error("{} listeners failed in one layer: {}", .failures.len(), join_failures(.failures))]
    LayerFailures { failures: Vec<ListenerFailure> },
}

/// Master error type for all VOLLEY errors.
#[derive(Debug, Clone, Error)]
pub enum VolleyError {
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Merge error: {0}")]
    Merge(#[from] MergeError),

    #[error("Policy error: {0}")]
    Policy(#[from] PolicyError),

    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),
}

/// Result type alias for VOLLEY operations.
pub type VolleyResult<T> = Result<T, VolleyError>;

// =============================================================================
// TESTS
// =============================================================================
