//! Lifetime-aware service provider
//!
//! The `ServiceProvider` is what generated registration code builds and what
//! injected resolve sites call into. It is immutable once built; only the
//! per-entry instance cells change afterwards.

use crate::factory::{ServiceRef, unerase};
use crate::scope::Scope;
use crate::storage::{ServiceEntry, ServiceStorage};
use crate::{Constant, DiError, Injectable, Result};
use std::any::TypeId;
use std::cell::RefCell;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, trace, warn};

thread_local! {
    /// Entries currently being constructed on this thread, for cycle detection
    static RESOLVING: RefCell<Vec<usize>> = const { RefCell::new(Vec::new()) };
}

/// Pops the entry from the resolution stack when construction finishes
struct ResolvingGuard(usize);

impl ResolvingGuard {
    fn enter(entry: &Arc<ServiceEntry>) -> Result<Self> {
        let id = Arc::as_ptr(entry) as usize;
        RESOLVING.with(|stack| {
            let mut stack = stack.borrow_mut();
            if stack.contains(&id) {
                return Err(DiError::CircularDependency {
                    type_name: entry.key_name,
                });
            }
            stack.push(id);
            Ok(Self(id))
        })
    }
}

impl Drop for ResolvingGuard {
    fn drop(&mut self) {
        RESOLVING.with(|stack| {
            let mut stack = stack.borrow_mut();
            if let Some(pos) = stack.iter().rposition(|id| *id == self.0) {
                stack.remove(pos);
            }
        });
    }
}

/// Context handed to factories: the provider resolving the request plus the
/// constant arguments attached to the dependency marker.
pub struct Resolver<'a> {
    provider: &'a ServiceProvider,
    args: &'a [Constant],
}

impl<'a> Resolver<'a> {
    #[inline]
    pub fn new(provider: &'a ServiceProvider, args: &'a [Constant]) -> Self {
        Self { provider, args }
    }

    /// Resolve a dependency from the same provider
    #[inline]
    pub fn get<T: ?Sized + Injectable>(&self) -> Option<Arc<T>> {
        self.provider.get::<T>()
    }

    /// Resolve a dependency that must exist
    #[inline]
    pub fn get_required<T: ?Sized + Injectable>(&self) -> Result<Arc<T>> {
        self.provider.get_required::<T>()
    }

    /// Resolve every registration for `T`
    #[inline]
    pub fn get_all<T: ?Sized + Injectable>(&self) -> Vec<Arc<T>> {
        self.provider.get_all::<T>()
    }

    /// Marker arguments forwarded from the resolve site
    #[inline]
    pub fn args(&self) -> &[Constant] {
        self.args
    }

    #[inline]
    pub fn provider(&self) -> &ServiceProvider {
        self.provider
    }
}

struct ProviderInner {
    storage: ServiceStorage,
    disposed: AtomicBool,
    scope: Scope,
    depth: u32,
}

/// Immutable, lifetime-aware service provider.
///
/// Cloning is cheap and yields a handle to the same provider.
///
/// # Examples
///
/// ```rust
/// use autodi::ServiceCollection;
///
/// struct Clock;
///
/// let mut services = ServiceCollection::new();
/// services.add_lazy(|_| Clock);
/// let provider = services.build().unwrap();
///
/// assert!(provider.get::<Clock>().is_some());
/// assert!(provider.get::<String>().is_none());
/// ```
#[derive(Clone)]
pub struct ServiceProvider {
    inner: Arc<ProviderInner>,
}

impl ServiceProvider {
    /// Provider without registrations
    #[inline]
    pub fn empty() -> Self {
        Self::wrap(ServiceStorage::new(), 0)
    }

    fn wrap(storage: ServiceStorage, depth: u32) -> Self {
        Self {
            inner: Arc::new(ProviderInner {
                storage,
                disposed: AtomicBool::new(false),
                scope: Scope::new(),
                depth,
            }),
        }
    }

    /// Finalize a storage table, constructing eager singletons in
    /// registration order.
    pub(crate) fn from_storage(storage: ServiceStorage) -> Result<Self> {
        let provider = Self::wrap(storage, 0);

        let eager: Vec<Arc<ServiceEntry>> = provider
            .inner
            .storage
            .iter()
            .filter(|entry| entry.factory.is_eager())
            .cloned()
            .collect();

        for entry in &eager {
            provider.resolve_entry(entry, &[])?;
        }

        debug!(
            target: "autodi",
            services = provider.len(),
            eager_singletons = eager.len(),
            scope = %provider.inner.scope,
            "Service provider built"
        );

        Ok(provider)
    }

    /// Run the entry's factory under cycle detection
    pub(crate) fn resolve_entry(
        &self,
        entry: &Arc<ServiceEntry>,
        args: &[Constant],
    ) -> Result<ServiceRef> {
        let _guard = ResolvingGuard::enter(entry)?;
        let resolver = Resolver::new(self, args);
        entry.factory.resolve(&resolver)
    }

    pub(crate) fn storage(&self) -> &ServiceStorage {
        &self.inner.storage
    }

    // =========================================================================
    // Resolution Methods
    // =========================================================================

    /// Resolve a service by key type.
    ///
    /// Unregistered keys resolve to `None`; so do factory failures, which are
    /// logged. Use [`get_required`](Self::get_required) to see the error.
    #[inline]
    pub fn get<T: ?Sized + Injectable>(&self) -> Option<Arc<T>> {
        self.get_with_args::<T>(&[])
    }

    /// Resolve a service, forwarding marker arguments to its factory
    pub fn get_with_args<T: ?Sized + Injectable>(&self, args: &[Constant]) -> Option<Arc<T>> {
        match self.try_get_with_args::<T>(args) {
            Ok(found) => found,
            Err(err) => {
                warn!(
                    target: "autodi",
                    service = std::any::type_name::<T>(),
                    error = %err,
                    "Service resolution failed"
                );
                None
            }
        }
    }

    /// Resolve a service; `Ok(None)` when the key is not registered
    pub fn try_get_with_args<T: ?Sized + Injectable>(
        &self,
        args: &[Constant],
    ) -> Result<Option<Arc<T>>> {
        if self.is_disposed() {
            return Err(DiError::Disposed);
        }

        let Some(entry) = self.inner.storage.last(&TypeId::of::<T>()) else {
            trace!(
                target: "autodi",
                service = std::any::type_name::<T>(),
                "Service not registered"
            );
            return Ok(None);
        };

        let service = self.resolve_entry(entry, args)?;
        unerase::<T>(&service)
            .map(Some)
            .ok_or_else(|| DiError::creation_failed::<T>("factory produced an instance of another type"))
    }

    /// Resolve a service that must be registered
    #[inline]
    pub fn get_required<T: ?Sized + Injectable>(&self) -> Result<Arc<T>> {
        self.try_get_with_args::<T>(&[])?
            .ok_or_else(DiError::not_found::<T>)
    }

    /// Resolve every registration for `T`, in registration order
    pub fn get_all<T: ?Sized + Injectable>(&self) -> Vec<Arc<T>> {
        if self.is_disposed() {
            return Vec::new();
        }

        self.inner
            .storage
            .all(&TypeId::of::<T>())
            .iter()
            .filter_map(|entry| match self.resolve_entry(entry, &[]) {
                Ok(service) => unerase::<T>(&service),
                Err(err) => {
                    warn!(
                        target: "autodi",
                        service = entry.key_name,
                        target_type = %entry.target_name,
                        error = %err,
                        "Skipping collection element that failed to resolve"
                    );
                    None
                }
            })
            .collect()
    }

    // =========================================================================
    // Query Methods
    // =========================================================================

    /// Check if a key is registered
    #[inline]
    pub fn contains<T: ?Sized + Injectable>(&self) -> bool {
        self.inner.storage.contains(&TypeId::of::<T>())
    }

    /// Number of registrations
    #[inline]
    pub fn len(&self) -> usize {
        self.inner.storage.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.inner.storage.is_empty()
    }

    /// All registered key TypeIds
    pub fn registered_types(&self) -> Vec<TypeId> {
        self.inner.storage.type_ids()
    }

    /// Scope depth (0 = root)
    #[inline]
    pub fn depth(&self) -> u32 {
        self.inner.depth
    }

    /// Scope identifier of this provider
    #[inline]
    pub fn scope_id(&self) -> Scope {
        self.inner.scope
    }

    /// Whether two handles refer to the same provider
    #[inline]
    pub fn ptr_eq(&self, other: &ServiceProvider) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    // =========================================================================
    // Lifecycle Methods
    // =========================================================================

    /// Create a provider for a child scope.
    ///
    /// The entry table is cloned: scoped entries start empty, every other
    /// lifetime shares its state with this provider.
    pub(crate) fn child(&self) -> Self {
        let child = Self::wrap(self.inner.storage.scoped_clone(), self.inner.depth + 1);

        debug!(
            target: "autodi",
            parent_depth = self.inner.depth,
            child_depth = child.inner.depth,
            scope = %child.inner.scope,
            "Creating child scope"
        );

        child
    }

    /// Mark the provider disposed; later resolutions fail with `Disposed`.
    ///
    /// Instances are released once the last provider handle is dropped.
    pub fn dispose(&self) {
        if !self.inner.disposed.swap(true, Ordering::AcqRel) {
            debug!(
                target: "autodi",
                scope = %self.inner.scope,
                "Service provider disposed"
            );
        }
    }

    #[inline]
    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for ServiceProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceProvider")
            .field("service_count", &self.len())
            .field("depth", &self.inner.depth)
            .field("scope", &self.inner.scope)
            .field("disposed", &self.is_disposed())
            .finish()
    }
}
