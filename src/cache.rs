//! Construct-once caches for worker resources.
//!
//! [`OnceMap`] is the building block: a concurrent map whose values are
//! created at most once per key. Readers of an already constructed entry
//! only take a shared lock; first construction of a key is serialized on a
//! per-key mutex, so slow factories for different keys run in parallel.
//!
//! [`WorkerCache`] stores heterogeneous resources behind string keys. It is
//! a plain value owned by a [`crate::WorkerContext`], never a global.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::{Arc, Mutex, OnceLock, PoisonError, RwLock};

use crate::{BlockwiseError, Result};

struct Slot<V> {
    value: OnceLock<V>,
    init: Mutex<()>,
}

impl<V> Default for Slot<V> {
    fn default() -> Self {
        Self {
            value: OnceLock::new(),
            init: Mutex::new(()),
        }
    }
}

/// Concurrent map with at-most-once value construction per key.
///
/// Entries are never evicted. A factory that fails leaves the key empty, so
/// a later call runs its own factory again.
pub struct OnceMap<K, V> {
    slots: RwLock<HashMap<K, Arc<Slot<V>>>>,
}

impl<K, V> Default for OnceMap<K, V> {
    fn default() -> Self {
        Self {
            slots: RwLock::new(HashMap::new()),
        }
    }
}

impl<K: Eq + Hash + Clone, V: Clone> OnceMap<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// The value stored under `key`, if it has been constructed.
    pub fn get(&self, key: &K) -> Option<V> {
        let slots = self.slots.read().unwrap_or_else(PoisonError::into_inner);
        slots.get(key).and_then(|slot| slot.value.get().cloned())
    }

    fn slot(&self, key: &K) -> Arc<Slot<V>> {
        if let Some(slot) = self
            .slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
        {
            return Arc::clone(slot);
        }
        let mut slots = self.slots.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(slots.entry(key.clone()).or_default())
    }

    /// Return the value under `key`, constructing it with `factory` if absent.
    ///
    /// Concurrent callers with the same key block until the first successful
    /// construction and then all observe that value.
    pub fn get_or_try_insert_with<E>(
        &self,
        key: &K,
        factory: impl FnOnce() -> std::result::Result<V, E>,
    ) -> std::result::Result<V, E> {
        let slot = self.slot(key);
        if let Some(value) = slot.value.get() {
            return Ok(value.clone());
        }

        let _guard = slot.init.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(value) = slot.value.get() {
            return Ok(value.clone());
        }
        let value = factory()?;
        // Only the holder of `init` sets the value.
        let _ = slot.value.set(value.clone());
        Ok(value)
    }

    /// Number of constructed entries.
    pub fn len(&self) -> usize {
        let slots = self.slots.read().unwrap_or_else(PoisonError::into_inner);
        slots.values().filter(|slot| slot.value.get().is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<K, V> fmt::Debug for OnceMap<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slots = self.slots.read().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("OnceMap").field("slots", &slots.len()).finish()
    }
}

/// Kind of a cached worker resource; the first component of every key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    /// Opened input storage handle.
    Reader,
    /// Cell-cached view over the input dataset.
    Source,
    /// Cell-cached transformed view over the whole array.
    Transformed,
    /// Opened output storage handle.
    Writer,
}

impl ResourceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ResourceKind::Reader => "reader",
            ResourceKind::Source => "source",
            ResourceKind::Transformed => "transformed",
            ResourceKind::Writer => "writer",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Namespaced cache key, `"<kind>:<id>"`.
pub fn resource_key(kind: ResourceKind, id: &str) -> String {
    format!("{kind}:{id}")
}

type Resource = Arc<dyn Any + Send + Sync>;

/// Keyed cache of type-erased worker resources.
///
/// # Example
///
/// ```
/// use blockwise::WorkerCache;
///
/// let cache = WorkerCache::new();
/// let a = cache.get_or_create("reader:in", || Ok(vec![1u8, 2, 3])).unwrap();
/// let b = cache.get_or_create("reader:in", || Ok(vec![9u8])).unwrap();
/// assert!(std::sync::Arc::ptr_eq(&a, &b));
/// ```
#[derive(Debug, Default)]
pub struct WorkerCache {
    entries: OnceMap<String, Resource>,
}

impl WorkerCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the resource under `key`, constructing it once with `factory`.
    ///
    /// Fails with [`BlockwiseError::CacheTypeMismatch`] if `key` already holds
    /// a resource of another type.
    pub fn get_or_create<R, F>(&self, key: &str, factory: F) -> Result<Arc<R>>
    where
        R: Any + Send + Sync,
        F: FnOnce() -> Result<R>,
    {
        let key = key.to_string();
        let resource = self
            .entries
            .get_or_try_insert_with(&key, || factory().map(|r| Arc::new(r) as Resource))?;
        resource
            .downcast::<R>()
            .map_err(|_| BlockwiseError::CacheTypeMismatch { key })
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.get(&key.to_string()).is_some()
    }

    /// Number of constructed resources.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
