//! Registration descriptors.
//!
//! A `Binding` spells out everything one registration needs: the kinds to
//! listen under, the listeners that must complete first, and an optional
//! event filter. It is built explicitly and consumed by `register`;
//! nothing is ever attached to the callback value itself.

use std::fmt;
use std::sync::Arc;
use volley_core::{Event, EventKind};
use volley_registry::{Listener, Predicate};

/// Declarative description of one listener registration.
pub struct Binding<C> {
    kinds: Vec<&'static EventKind>,
    after: Vec<Listener<C>>,
    when: Option<Predicate>,
}

impl<C> Binding<C> {
    /// Descriptor for one or more kinds.
    pub fn new(kinds: impl Into<Vec<&'static EventKind>>) -> Self {
        Self {
            kinds: kinds.into(),
            after: Vec::new(),
            when: None,
        }
    }

    /// Descriptor for a single kind.
    pub fn kind(kind: &'static EventKind) -> Self {
        Self::new([kind])
    }

    /// Require `dep` to complete before this listener runs.
    ///
    /// May be called repeatedly; dependencies accumulate.
    pub fn with_after(mut self, dep: &Listener<C>) -> Self {
        self.after.push(dep.clone());
        self
    }

    /// Skip the listener for events the predicate rejects.
    pub fn with_when(
        mut self,
        predicate: impl Fn(&Event) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.when = Some(Arc::new(predicate));
        self
    }

    /// The kinds this registration covers.
    pub fn kinds(&self) -> &[&'static EventKind] {
        &self.kinds
    }

    pub(crate) fn into_parts(
        self,
    ) -> (Vec<&'static EventKind>, Vec<Listener<C>>, Option<Predicate>) {
        (self.kinds, self.after, self.when)
    }
}

impl<C> fmt::Debug for Binding<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind_names: Vec<&str> = self.kinds.iter().map(|kind| kind.name()).collect();
        let after_names: Vec<&str> = self.after.iter().map(Listener::name).collect();
        f.debug_struct("Binding")
            .field("kinds", &kind_names)
            .field("after", &after_names)
            .field("has_when", &self.when.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type Callback = fn(&Event) -> Option<serde_json::Value>;

    static SIGNUP: EventKind = EventKind::root("BindingSignup");
    static LOGIN: EventKind = EventKind::root("BindingLogin");

    fn noop(_: &Event) -> Option<serde_json::Value> {
        None
    }

    #[test]
    fn test_builder_accumulates_dependencies() {
        let first: Listener<Callback> = Listener::new("first", noop);
        let second: Listener<Callback> = Listener::new("second", noop);
        let binding = Binding::new([&SIGNUP, &LOGIN])
            .with_after(&first)
            .with_after(&second);

        assert_eq!(binding.kinds().len(), 2);
        let (kinds, after, when) = binding.into_parts();
        assert_eq!(kinds, vec![&SIGNUP, &LOGIN]);
        assert_eq!(after.len(), 2);
        assert!(after[0].same_as(&first));
        assert!(after[1].same_as(&second));
        assert!(when.is_none());
    }

    #[test]
    fn test_predicate_is_carried() {
        let binding: Binding<Callback> =
            Binding::kind(&SIGNUP).with_when(|event| event.field("vip").is_some());
        let (_, _, when) = binding.into_parts();
        let predicate = when.expect("predicate should be set");

        let plain = Event::new(&SIGNUP);
        let vip = Event::new(&SIGNUP).with_payload(serde_json::json!({"vip": true}));
        assert!(!predicate(&plain));
        assert!(predicate(&vip));
    }
}
