//! Scoped registration groups.
//!
//! A `BindingGroup` remembers every registration made through it and
//! unregisters them all on teardown, so a component can tie its listeners
//! to its own lifetime without an implicit registration hook.

use crate::binding::Binding;
use volley_core::{DispatchError, EventKind};
use volley_registry::{Listener, RegistryTable};

/// Registration handle that tears its listeners down when it goes.
///
/// Dropping the group unregisters everything it added, logging failures;
/// call [`close`](Self::close) to observe them instead.
pub struct BindingGroup<C> {
    registry: RegistryTable<C>,
    entries: Vec<(Vec<&'static EventKind>, Listener<C>)>,
}

impl<C> BindingGroup<C> {
    pub(crate) fn new(registry: RegistryTable<C>) -> Self {
        Self {
            registry,
            entries: Vec::new(),
        }
    }

    /// Register `listener` and remember it for teardown.
    pub fn register(
        &mut self,
        listener: &Listener<C>,
        binding: Binding<C>,
    ) -> Result<(), DispatchError> {
        let (kinds, after, when) = binding.into_parts();
        self.registry.add(&kinds, listener, &after, when)?;
        self.entries.push((kinds, listener.clone()));
        Ok(())
    }

    /// Number of registrations the group still owns.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Unregister everything the group added, reporting the first error.
    ///
    /// Later entries are still torn down after a failure.
    pub fn close(&mut self) -> Result<(), DispatchError> {
        let mut result = Ok(());
        for (kinds, listener) in self.entries.drain(..) {
            if let Err(error) = self.registry.remove(Some(&kinds), Some(&listener)) {
                if result.is_ok() {
                    result = Err(DispatchError::from(error));
                }
            }
        }
        result
    }
}

impl<C> Drop for BindingGroup<C> {
    fn drop(&mut self) {
        for (kinds, listener) in self.entries.drain(..) {
            if let Err(error) = self.registry.remove(Some(&kinds), Some(&listener)) {
                tracing::warn!(
                    listener = %listener.name(),
                    error = %error,
                    "Failed to unregister listener during group teardown"
                );
            }
        }
    }
}
