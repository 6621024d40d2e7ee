//! Scoped provider support
//!
//! A scope is a child provider whose `Scoped` entries get their own
//! instances. Every other lifetime is shared with the root.

use crate::{Constant, Injectable, Result, ServiceProvider};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::debug;

/// Unique scope identifier.
///
/// Each scope gets a unique ID for tracking and debugging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Scope(u64);

impl Scope {
    /// Generate a new unique scope ID.
    #[inline]
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    #[inline]
    pub fn id(&self) -> u64 {
        self.0
    }
}

impl Default for Scope {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "scope-{}", self.0)
    }
}

/// A child provider owning its scoped instances.
///
/// Dropping (or [`dispose`](Self::dispose)-ing) the scope releases the
/// instances it created.
///
/// # Examples
///
/// ```rust
/// use autodi::ServiceCollection;
/// use std::sync::Arc;
///
/// struct RequestContext;
///
/// let mut services = ServiceCollection::new();
/// services.add_scoped(|_| RequestContext);
/// let root = services.build().unwrap();
///
/// let scope = root.create_scope();
/// let a = scope.get::<RequestContext>().unwrap();
/// let b = scope.get::<RequestContext>().unwrap();
/// assert!(Arc::ptr_eq(&a, &b));
///
/// let other = root.create_scope();
/// assert!(!Arc::ptr_eq(&a, &other.get::<RequestContext>().unwrap()));
/// ```
pub struct ProviderScope {
    provider: ServiceProvider,
}

impl ProviderScope {
    /// Get the scope identifier.
    #[inline]
    pub fn scope(&self) -> Scope {
        self.provider.scope_id()
    }

    /// Resolve a service from this scope.
    #[inline]
    pub fn get<T: ?Sized + Injectable>(&self) -> Option<Arc<T>> {
        self.provider.get::<T>()
    }

    /// Resolve a service with marker arguments.
    #[inline]
    pub fn get_with_args<T: ?Sized + Injectable>(&self, args: &[Constant]) -> Option<Arc<T>> {
        self.provider.get_with_args::<T>(args)
    }

    /// Resolve a service that must exist.
    #[inline]
    pub fn get_required<T: ?Sized + Injectable>(&self) -> Result<Arc<T>> {
        self.provider.get_required::<T>()
    }

    /// Check if a service exists in this scope.
    #[inline]
    pub fn contains<T: ?Sized + Injectable>(&self) -> bool {
        self.provider.contains::<T>()
    }

    /// Get the underlying provider.
    #[inline]
    pub fn provider(&self) -> &ServiceProvider {
        &self.provider
    }

    /// Get the scope depth.
    #[inline]
    pub fn depth(&self) -> u32 {
        self.provider.depth()
    }

    /// Dispose the scope and release its instances.
    #[inline]
    pub fn dispose(self) {
        drop(self);
    }
}

impl Drop for ProviderScope {
    fn drop(&mut self) {
        self.provider.dispose();
        debug!(
            target: "autodi",
            scope_id = self.provider.scope_id().id(),
            "Scope disposed"
        );
    }
}

impl std::ops::Deref for ProviderScope {
    type Target = ServiceProvider;

    #[inline]
    fn deref(&self) -> &Self::Target {
        &self.provider
    }
}

impl std::fmt::Debug for ProviderScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderScope")
            .field("scope", &self.scope())
            .field("provider", &self.provider)
            .finish()
    }
}

impl ServiceProvider {
    /// Create a child scope.
    ///
    /// The entry table is cloned into the child: `Scoped` registrations get a
    /// fresh instance per scope, everything else resolves to the shared state.
    #[inline]
    pub fn create_scope(&self) -> ProviderScope {
        ProviderScope {
            provider: self.child(),
        }
    }
}
