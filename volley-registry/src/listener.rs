//! Listener handles.
//!
//! A [`Listener`] wraps a callback together with a display name. The handle
//! is the callback's identity: the registry tracks listeners by the handle's
//! allocation, never by comparing or copying the callback value. Cloning a
//! handle clones the reference, so clones refer to the same registration
//! node, while two handles built from identical closures stay distinct.
//!
//! The callback type is generic: the synchronous dispatcher registers plain
//! functions, the concurrent one registers future-returning functions, and
//! the registry stores either without caring which.

use std::fmt;
use std::sync::Arc;
use volley_core::Event;

/// Filter deciding whether a registration fires for a given event.
pub type Predicate = Arc<dyn Fn(&Event) -> bool + Send + Sync>;

/// Identity of a listener handle, derived from its allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ListenerId(pub(crate) usize);

impl ListenerId {
    /// Identity of the synthetic guardian node rooting every graph.
    pub(crate) const GUARDIAN: ListenerId = ListenerId(0);
}

struct ListenerInner<C> {
    name: String,
    callback: C,
}

/// A named callback handle.
pub struct Listener<C> {
    inner: Arc<ListenerInner<C>>,
}

impl<C> Listener<C> {
    /// Wrap `callback` under a display name.
    ///
    /// The name appears in execution logs, conflict errors, and the
    /// synthetic failure events of the recovery protocol.
    pub fn new(name: impl Into<String>, callback: C) -> Self {
        Self {
            inner: Arc::new(ListenerInner {
                name: name.into(),
                callback,
            }),
        }
    }

    /// The display name.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// The wrapped callback.
    pub fn callback(&self) -> &C {
        &self.inner.callback
    }

    /// Stable identity of this handle while any clone of it is alive.
    pub fn id(&self) -> ListenerId {
        ListenerId(Arc::as_ptr(&self.inner) as *const () as usize)
    }

    /// Whether two handles refer to the same registration node.
    pub fn same_as(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<C> Clone for Listener<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C> fmt::Debug for Listener<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listener")
            .field("name", &self.inner.name)
            .field("id", &self.id())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type Callback = fn(&Event) -> Option<serde_json::Value>;

    fn noop(_: &Event) -> Option<serde_json::Value> {
        None
    }

    #[test]
    fn test_clones_share_identity() {
        let listener: Listener<Callback> = Listener::new("audit", noop);
        let clone = listener.clone();
        assert_eq!(listener.id(), clone.id());
        assert!(listener.same_as(&clone));
    }

    #[test]
    fn test_distinct_handles_around_same_fn_differ() {
        let a: Listener<Callback> = Listener::new("audit", noop);
        let b: Listener<Callback> = Listener::new("audit", noop);
        assert_ne!(a.id(), b.id());
        assert!(!a.same_as(&b));
    }

    #[test]
    fn test_name_and_debug() {
        let listener: Listener<Callback> = Listener::new("send_welcome", noop);
        assert_eq!(listener.name(), "send_welcome");
        let rendered = format!("{:?}", listener);
        assert!(rendered.contains("send_welcome"));
    }
}
