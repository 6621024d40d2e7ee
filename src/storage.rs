//! Entry storage for the service provider
//!
//! The table is filled once while the provider is built and is read-only
//! afterwards, so lookups need no locking. Hashing uses `ahash` for `TypeId`
//! keys.

use crate::factory::AnyFactory;
use crate::Lifetime;
use ahash::RandomState;
use std::any::TypeId;
use std::collections::HashMap;
use std::sync::Arc;

/// Runtime record binding a requested key type to a factory and lifetime
pub(crate) struct ServiceEntry {
    pub(crate) key: TypeId,
    pub(crate) key_name: &'static str,
    pub(crate) target_name: String,
    pub(crate) factory: AnyFactory,
}

impl ServiceEntry {
    #[inline]
    pub(crate) fn lifetime(&self) -> Lifetime {
        self.factory.lifetime()
    }
}

impl std::fmt::Debug for ServiceEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceEntry")
            .field("key", &self.key_name)
            .field("target", &self.target_name)
            .field("lifetime", &self.lifetime())
            .finish()
    }
}

/// Entry table keyed by `TypeId`.
///
/// Several entries may share a key; the last one registered answers single
/// lookups and all of them answer collection lookups, in registration order.
pub struct ServiceStorage {
    by_key: HashMap<TypeId, Vec<Arc<ServiceEntry>>, RandomState>,
    order: Vec<Arc<ServiceEntry>>,
}

impl ServiceStorage {
    /// Create new empty storage
    #[inline]
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Create with pre-allocated capacity.
    #[inline]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            by_key: HashMap::with_capacity_and_hasher(capacity, RandomState::new()),
            order: Vec::with_capacity(capacity),
        }
    }

    /// Insert an entry
    #[inline]
    pub(crate) fn insert(&mut self, entry: ServiceEntry) {
        let entry = Arc::new(entry);
        self.by_key
            .entry(entry.key)
            .or_default()
            .push(Arc::clone(&entry));
        self.order.push(entry);
    }

    /// Entry answering a single lookup for `type_id`
    #[inline]
    pub(crate) fn last(&self, type_id: &TypeId) -> Option<&Arc<ServiceEntry>> {
        self.by_key.get(type_id).and_then(|entries| entries.last())
    }

    /// All entries registered for `type_id`, in registration order
    #[inline]
    pub(crate) fn all(&self, type_id: &TypeId) -> &[Arc<ServiceEntry>] {
        self.by_key
            .get(type_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Check if type exists
    #[inline]
    pub fn contains(&self, type_id: &TypeId) -> bool {
        self.by_key.contains_key(type_id)
    }

    /// Every entry in registration order
    #[inline]
    pub(crate) fn iter(&self) -> impl Iterator<Item = &Arc<ServiceEntry>> {
        self.order.iter()
    }

    /// Copy of this table for a child scope.
    ///
    /// Scoped entries get a fresh instance cell; all other entries are shared
    /// so singletons stay singletons across scopes.
    pub(crate) fn scoped_clone(&self) -> Self {
        let mut child = Self::with_capacity(self.order.len());
        for entry in &self.order {
            let shared = match entry.factory.scoped_copy() {
                Some(factory) => Arc::new(ServiceEntry {
                    key: entry.key,
                    key_name: entry.key_name,
                    target_name: entry.target_name.clone(),
                    factory,
                }),
                None => Arc::clone(entry),
            };
            child
                .by_key
                .entry(shared.key)
                .or_default()
                .push(Arc::clone(&shared));
            child.order.push(shared);
        }
        child
    }

    /// Get number of registered entries
    #[inline]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Check if empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Get all registered type IDs
    pub fn type_ids(&self) -> Vec<TypeId> {
        self.by_key.keys().copied().collect()
    }
}

impl Default for ServiceStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ServiceStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceStorage")
            .field("count", &self.len())
            .finish()
    }
}
