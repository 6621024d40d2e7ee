//! Factory types for creating service instances
//!
//! Factories encapsulate how services are created and how long they live.
//!
//! Instances are stored type-erased as `Arc<dyn Any>` wrapping the `Arc<K>`
//! handed out to callers, which lets trait-object keys (`dyn Trait`) share the
//! same storage as concrete types.

use crate::container::Resolver;
use crate::{Injectable, Lifetime, Result};
use once_cell::sync::OnceCell;
use std::any::Any;
use std::sync::{Arc, Mutex, Weak};

use tracing::{debug, trace};

/// A type-erased service instance; always wraps an `Arc<K>` for its key `K`.
pub type ServiceRef = Arc<dyn Any + Send + Sync>;

/// Type-erased factory function
pub(crate) type InitFn = Arc<dyn Fn(&Resolver<'_>) -> Result<ServiceRef> + Send + Sync>;

/// Produces a weak handle from a freshly created instance
pub(crate) type DowngradeFn = fn(&ServiceRef) -> Option<Box<dyn WeakSlot>>;

/// Erase a typed instance for storage.
#[inline]
pub fn erase<K: ?Sized + Injectable>(instance: Arc<K>) -> ServiceRef {
    Arc::new(instance) as ServiceRef
}

/// Recover the typed instance from an erased one.
///
/// Returns `None` if the instance was stored under a different key type.
#[inline]
pub fn unerase<K: ?Sized + Injectable>(service: &ServiceRef) -> Option<Arc<K>> {
    service.downcast_ref::<Arc<K>>().cloned()
}

// =============================================================================
// Weak handles
// =============================================================================

/// A handle that may report that its target is gone.
///
/// Backed by `std::sync::Weak`, so "gone" means the last strong `Arc` was
/// released; there is no collector involved.
pub trait WeakSlot: Send + Sync {
    /// Upgrade to a live instance if one is still held somewhere
    fn upgrade(&self) -> Option<ServiceRef>;
}

struct TypedWeak<K: ?Sized>(Weak<K>);

impl<K: ?Sized + Injectable> WeakSlot for TypedWeak<K> {
    fn upgrade(&self) -> Option<ServiceRef> {
        self.0.upgrade().map(erase)
    }
}

/// Downgrade function monomorphized for a key type
pub(crate) fn downgrade_as<K: ?Sized + Injectable>(service: &ServiceRef) -> Option<Box<dyn WeakSlot>> {
    service
        .downcast_ref::<Arc<K>>()
        .map(|strong| Box::new(TypedWeak(Arc::downgrade(strong))) as Box<dyn WeakSlot>)
}

// =============================================================================
// Singleton / Lazy Factories
// =============================================================================

/// Singleton factory - materialized when the provider is built
pub struct SingletonFactory {
    init: InitFn,
    instance: OnceCell<ServiceRef>,
}

impl SingletonFactory {
    pub(crate) fn new(init: InitFn) -> Self {
        Self {
            init,
            instance: OnceCell::new(),
        }
    }

    /// Create the instance if needed, otherwise return the cached one
    #[inline]
    pub(crate) fn resolve(&self, resolver: &Resolver<'_>) -> Result<ServiceRef> {
        self.instance
            .get_or_try_init(|| (self.init)(resolver))
            .map(Arc::clone)
    }

    #[inline]
    pub(crate) fn is_materialized(&self) -> bool {
        self.instance.get().is_some()
    }
}

/// Lazy singleton factory - creates instance on first access, exactly once
pub struct LazyFactory {
    init: InitFn,
    instance: OnceCell<ServiceRef>,
    type_name: &'static str,
}

impl LazyFactory {
    pub(crate) fn new(init: InitFn, type_name: &'static str) -> Self {
        Self {
            init,
            instance: OnceCell::new(),
            type_name,
        }
    }

    /// Get the instance, creating it if necessary
    #[inline]
    pub(crate) fn resolve(&self, resolver: &Resolver<'_>) -> Result<ServiceRef> {
        if let Some(existing) = self.instance.get() {
            trace!(
                target: "autodi",
                service = self.type_name,
                "Lazy singleton already initialized, returning cached instance"
            );
            return Ok(Arc::clone(existing));
        }

        self.instance
            .get_or_try_init(|| {
                debug!(
                    target: "autodi",
                    service = self.type_name,
                    "Lazy singleton initializing on first access"
                );
                (self.init)(resolver)
            })
            .map(Arc::clone)
    }
}

// =============================================================================
// Weak Singleton Factory
// =============================================================================

/// Weak singleton factory - shares an instance while it is alive elsewhere.
///
/// Creation is serialized by a lock owned by this entry only.
pub struct WeakFactory {
    init: InitFn,
    downgrade: DowngradeFn,
    slot: Mutex<Option<Box<dyn WeakSlot>>>,
    type_name: &'static str,
}

impl WeakFactory {
    pub(crate) fn new(init: InitFn, downgrade: DowngradeFn, type_name: &'static str) -> Self {
        Self {
            init,
            downgrade,
            slot: Mutex::new(None),
            type_name,
        }
    }

    pub(crate) fn resolve(&self, resolver: &Resolver<'_>) -> Result<ServiceRef> {
        let mut slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());

        if let Some(live) = slot.as_ref().and_then(|weak| weak.upgrade()) {
            return Ok(live);
        }

        debug!(
            target: "autodi",
            service = self.type_name,
            recreated = slot.is_some(),
            "Creating weak singleton instance"
        );

        let created = (self.init)(resolver)?;
        *slot = (self.downgrade)(&created);
        Ok(created)
    }
}

// =============================================================================
// Scoped / Transient Factories
// =============================================================================

/// Scoped factory - one instance per provider scope
pub struct ScopedFactory {
    init: InitFn,
    instance: OnceCell<ServiceRef>,
}

impl ScopedFactory {
    pub(crate) fn new(init: InitFn) -> Self {
        Self {
            init,
            instance: OnceCell::new(),
        }
    }

    #[inline]
    pub(crate) fn resolve(&self, resolver: &Resolver<'_>) -> Result<ServiceRef> {
        self.instance
            .get_or_try_init(|| (self.init)(resolver))
            .map(Arc::clone)
    }

    /// A fresh factory for a new scope, sharing the creation function
    #[inline]
    pub(crate) fn fresh(&self) -> Self {
        Self::new(Arc::clone(&self.init))
    }
}

/// Transient factory - creates new instance every time
pub struct TransientFactory {
    init: InitFn,
    type_name: &'static str,
}

impl TransientFactory {
    pub(crate) fn new(init: InitFn, type_name: &'static str) -> Self {
        Self { init, type_name }
    }

    /// Create a new instance
    #[inline]
    pub(crate) fn create(&self, resolver: &Resolver<'_>) -> Result<ServiceRef> {
        trace!(
            target: "autodi",
            service = self.type_name,
            "Creating new transient instance"
        );

        (self.init)(resolver)
    }
}

// =============================================================================
// AnyFactory - Enum-based type erasure
// =============================================================================

/// Type-erased factory wrapper for storage
///
/// Using an enum instead of `Box<dyn Factory>` keeps every lifetime policy
/// visible in one `match` and avoids a vtable hop on every resolve.
pub(crate) enum AnyFactory {
    /// Eager singleton
    Singleton(SingletonFactory),
    /// Lazy singleton - created on first access
    Lazy(LazyFactory),
    /// Weak singleton - recreated after release
    Weak(WeakFactory),
    /// Scoped - one per scope
    Scoped(ScopedFactory),
    /// Transient - new instance each time
    Transient(TransientFactory),
}

impl AnyFactory {
    /// Build the factory for a lifetime; `Lifetime::None` has no factory.
    pub(crate) fn for_lifetime(
        lifetime: Lifetime,
        init: InitFn,
        downgrade: DowngradeFn,
        type_name: &'static str,
    ) -> Option<Self> {
        Some(match lifetime {
            Lifetime::None => return None,
            Lifetime::Transient => AnyFactory::Transient(TransientFactory::new(init, type_name)),
            Lifetime::WeakSingleton => {
                AnyFactory::Weak(WeakFactory::new(init, downgrade, type_name))
            }
            Lifetime::Scoped => AnyFactory::Scoped(ScopedFactory::new(init)),
            Lifetime::LazySingleton => AnyFactory::Lazy(LazyFactory::new(init, type_name)),
            Lifetime::Singleton => AnyFactory::Singleton(SingletonFactory::new(init)),
        })
    }

    /// Resolve the service
    #[inline]
    pub(crate) fn resolve(&self, resolver: &Resolver<'_>) -> Result<ServiceRef> {
        match self {
            AnyFactory::Singleton(f) => f.resolve(resolver),
            AnyFactory::Lazy(f) => f.resolve(resolver),
            AnyFactory::Weak(f) => f.resolve(resolver),
            AnyFactory::Scoped(f) => f.resolve(resolver),
            AnyFactory::Transient(f) => f.create(resolver),
        }
    }

    #[inline]
    pub(crate) fn lifetime(&self) -> Lifetime {
        match self {
            AnyFactory::Singleton(_) => Lifetime::Singleton,
            AnyFactory::Lazy(_) => Lifetime::LazySingleton,
            AnyFactory::Weak(_) => Lifetime::WeakSingleton,
            AnyFactory::Scoped(_) => Lifetime::Scoped,
            AnyFactory::Transient(_) => Lifetime::Transient,
        }
    }

    /// Whether this factory must be materialized when the provider is built
    #[inline]
    pub(crate) fn is_eager(&self) -> bool {
        matches!(self, AnyFactory::Singleton(f) if !f.is_materialized())
    }

    /// The factory a child scope should use: scoped entries get a fresh cell,
    /// everything else is shared with the parent.
    #[inline]
    pub(crate) fn scoped_copy(&self) -> Option<Self> {
        match self {
            AnyFactory::Scoped(f) => Some(AnyFactory::Scoped(f.fresh())),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::ServiceProvider;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct TestService {
        id: u32,
    }

    fn counting_init(counter: &'static AtomicU32) -> InitFn {
        Arc::new(move |_r: &Resolver<'_>| {
            Ok(erase(Arc::new(TestService {
                id: counter.fetch_add(1, Ordering::SeqCst),
            })))
        })
    }

    fn build(lifetime: Lifetime, counter: &'static AtomicU32) -> AnyFactory {
        AnyFactory::for_lifetime(
            lifetime,
            counting_init(counter),
            downgrade_as::<TestService>,
            "TestService",
        )
        .unwrap()
    }

    #[test]
    fn test_lazy_factory() {
        static COUNTER: AtomicU32 = AtomicU32::new(0);
        let provider = ServiceProvider::empty();
        let resolver = Resolver::new(&provider, &[]);
        let factory = build(Lifetime::LazySingleton, &COUNTER);

        assert_eq!(COUNTER.load(Ordering::SeqCst), 0);

        let a = unerase::<TestService>(&factory.resolve(&resolver).unwrap()).unwrap();
        let b = unerase::<TestService>(&factory.resolve(&resolver).unwrap()).unwrap();
        assert_eq!(COUNTER.load(Ordering::SeqCst), 1);
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_transient_factory() {
        static COUNTER: AtomicU32 = AtomicU32::new(0);
        let provider = ServiceProvider::empty();
        let resolver = Resolver::new(&provider, &[]);
        let factory = build(Lifetime::Transient, &COUNTER);

        let a = unerase::<TestService>(&factory.resolve(&resolver).unwrap()).unwrap();
        let b = unerase::<TestService>(&factory.resolve(&resolver).unwrap()).unwrap();

        assert_eq!(a.id, 0);
        assert_eq!(b.id, 1);
        assert!(!Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_weak_factory_recreates_after_release() {
        static COUNTER: AtomicU32 = AtomicU32::new(0);
        let provider = ServiceProvider::empty();
        let resolver = Resolver::new(&provider, &[]);
        let factory = build(Lifetime::WeakSingleton, &COUNTER);

        let first = unerase::<TestService>(&factory.resolve(&resolver).unwrap()).unwrap();
        let again = unerase::<TestService>(&factory.resolve(&resolver).unwrap()).unwrap();
        assert!(Arc::ptr_eq(&first, &again));
        assert_eq!(COUNTER.load(Ordering::SeqCst), 1);

        drop(first);
        drop(again);

        let fresh = unerase::<TestService>(&factory.resolve(&resolver).unwrap()).unwrap();
        assert_eq!(fresh.id, 1);
        assert_eq!(COUNTER.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_none_lifetime_has_no_factory() {
        static COUNTER: AtomicU32 = AtomicU32::new(0);
        let factory = AnyFactory::for_lifetime(
            Lifetime::None,
            counting_init(&COUNTER),
            downgrade_as::<TestService>,
            "TestService",
        );
        assert!(factory.is_none());
    }

    #[test]
    fn test_scoped_copy_only_for_scoped() {
        static COUNTER: AtomicU32 = AtomicU32::new(0);
        assert!(build(Lifetime::Scoped, &COUNTER).scoped_copy().is_some());
        assert!(build(Lifetime::LazySingleton, &COUNTER).scoped_copy().is_none());
        assert!(build(Lifetime::Singleton, &COUNTER).is_eager());
    }
}
