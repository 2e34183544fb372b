use std::fmt::Debug;
use std::hash::Hash;
use std::sync::{Arc, Weak};

use indexmap::IndexMap;

use crate::descriptor::ErasedLoader;
use crate::loader::Loader;

/// Implemented by loader collaborators that need access to the registry they
/// are registered in, e.g. to load from sibling loaders inside their own
/// batch function.
///
/// The reference is injected once per registry build, after the registry's
/// membership is complete, so a consumer always observes every loader of its
/// request, including its own.
pub trait RegistryConsumer: Send + Sync {
    fn attach_registry(&self, registry: RegistryRef);
}

pub(crate) struct RegistryEntry {
    handle: Box<dyn std::any::Any + Send + Sync>,
    dispatch: Box<dyn Fn() + Send + Sync>,
}

impl From<ErasedLoader> for RegistryEntry {
    fn from(erased: ErasedLoader) -> Self {
        Self { handle: erased.handle, dispatch: erased.dispatch }
    }
}

struct RegistryInner {
    entries: IndexMap<String, RegistryEntry>,
}

/// The per-request collection of named, ready-to-use loader instances.
///
/// Membership is frozen once the registry builder returns it; the contained
/// loaders remain live for queueing and dispatch. Cloning is cheap and every
/// clone refers to the same loaders. The registry and its loaders are owned
/// by exactly one request; nothing here is meant to outlive it.
#[derive(Clone)]
pub struct Registry {
    inner: Arc<RegistryInner>,
}

impl Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry").field("loaders", &self.names()).finish()
    }
}

impl Registry {
    pub(crate) fn from_entries(entries: IndexMap<String, RegistryEntry>) -> Self {
        Self { inner: Arc::new(RegistryInner { entries }) }
    }

    /// Returns the loader registered under `name`, typed by its key and
    /// value. `None` if no loader has that name or the types don't match.
    pub fn get<K, V>(&self, name: &str) -> Option<Loader<K, V>>
    where
        K: 'static + Eq + Hash + Clone + Debug + Send + Sync,
        V: 'static + Clone + Debug + Send,
    {
        self.inner
            .entries
            .get(name)
            .and_then(|entry| entry.handle.downcast_ref::<Loader<K, V>>())
            .cloned()
    }

    /// Dispatches every contained loader.
    pub fn dispatch_all(&self) {
        for (name, entry) in &self.inner.entries {
            tracing::trace!(%name, "dispatching loader");
            (entry.dispatch)();
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.inner.entries.contains_key(name)
    }

    /// Registered loader names, in registration order.
    pub fn names(&self) -> Vec<&str> {
        self.inner.entries.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.inner.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.entries.is_empty()
    }

    /// A weak back-reference suitable for handing to loader collaborators.
    pub fn downgrade(&self) -> RegistryRef {
        RegistryRef { inner: Arc::downgrade(&self.inner) }
    }
}

/// Weak back-reference to a [`Registry`].
///
/// This is what [`RegistryConsumer`]s receive: it does not keep the
/// request's registry alive, so a batch-function context holding one cannot
/// extend the registry's lifetime past its request.
#[derive(Clone, Default)]
pub struct RegistryRef {
    inner: Weak<RegistryInner>,
}

impl RegistryRef {
    /// The live registry, or `None` once the owning request is gone.
    pub fn upgrade(&self) -> Option<Registry> {
        self.inner.upgrade().map(|inner| Registry { inner })
    }
}

impl Debug for RegistryRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryRef")
            .field("alive", &(self.inner.strong_count() > 0))
            .finish()
    }
}
