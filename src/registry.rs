//! Resolution registry
//!
//! The list of published providers that injected resolve sites call into.
//! Several independently initialized modules can be registered at once; a
//! lookup asks each provider in registration order.
//!
//! The registry is an explicit value. [`ResolutionRegistry::global`] is the
//! process-wide instance generated code uses, and tests can build private ones.

use crate::{Constant, DiError, Injectable, Result, ServiceProvider};
use once_cell::sync::Lazy;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, trace};

/// Handle returned by [`ResolutionRegistry::register`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProviderHandle(u64);

impl ProviderHandle {
    #[inline]
    pub fn id(&self) -> u64 {
        self.0
    }
}

static GLOBAL: Lazy<Arc<ResolutionRegistry>> = Lazy::new(|| Arc::new(ResolutionRegistry::new()));

/// Registry of published providers, guarded by a single lock.
///
/// # Examples
///
/// ```rust
/// use autodi::{DiError, ResolutionRegistry, ServiceCollection};
///
/// struct Clock;
///
/// let registry = ResolutionRegistry::new();
/// assert!(matches!(registry.get_service::<Clock>(&[]), Err(DiError::NotInitialized)));
///
/// let mut services = ServiceCollection::new();
/// services.add_lazy(|_| Clock);
/// let handle = registry.register(services.build().unwrap());
///
/// assert!(registry.get_service::<Clock>(&[]).unwrap().is_some());
/// assert!(registry.unregister(handle));
/// ```
pub struct ResolutionRegistry {
    providers: Mutex<Vec<(ProviderHandle, ServiceProvider)>>,
    next_handle: AtomicU64,
}

impl ResolutionRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            providers: Mutex::new(Vec::new()),
            next_handle: AtomicU64::new(1),
        }
    }

    /// The process-wide registry
    #[inline]
    pub fn global() -> Arc<ResolutionRegistry> {
        Arc::clone(&GLOBAL)
    }

    fn lock(&self) -> MutexGuard<'_, Vec<(ProviderHandle, ServiceProvider)>> {
        self.providers.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Publish a provider
    pub fn register(&self, provider: ServiceProvider) -> ProviderHandle {
        let handle = ProviderHandle(self.next_handle.fetch_add(1, Ordering::Relaxed));
        let mut providers = self.lock();
        providers.push((handle, provider));

        debug!(
            target: "autodi",
            handle = handle.id(),
            active_providers = providers.len(),
            "Provider registered"
        );
        handle
    }

    /// Withdraw a provider; `false` if the handle was not registered
    pub fn unregister(&self, handle: ProviderHandle) -> bool {
        let mut providers = self.lock();
        let before = providers.len();
        providers.retain(|(h, _)| *h != handle);
        let removed = providers.len() != before;

        debug!(
            target: "autodi",
            handle = handle.id(),
            removed,
            active_providers = providers.len(),
            "Provider unregistered"
        );
        removed
    }

    /// Resolve `T` from the first provider that has it registered.
    ///
    /// Fails with [`DiError::NotInitialized`] when no provider is published;
    /// an unregistered key is `Ok(None)`.
    pub fn get_service<T: ?Sized + Injectable>(&self, args: &[Constant]) -> Result<Option<Arc<T>>> {
        // Resolve outside the lock so factories may call back into the registry
        let providers: Vec<ServiceProvider> = {
            let providers = self.lock();
            if providers.is_empty() {
                return Err(DiError::NotInitialized);
            }
            providers.iter().map(|(_, p)| p.clone()).collect()
        };

        for provider in providers.iter().filter(|p| p.contains::<T>()) {
            if let Some(found) = provider.try_get_with_args::<T>(args)? {
                return Ok(Some(found));
            }
        }

        trace!(
            target: "autodi",
            service = std::any::type_name::<T>(),
            providers = providers.len(),
            "No published provider has the service"
        );
        Ok(None)
    }

    /// Number of published providers
    #[inline]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

impl Default for ResolutionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ResolutionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolutionRegistry")
            .field("active_providers", &self.len())
            .finish()
    }
}
