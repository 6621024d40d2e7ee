//! Deferred and collection requests
//!
//! Requests for a deferred wrapper (`Lazy`-like), a factory wrapper
//! (`Func`-like) or a collection of a key are not registrations. They are
//! synthesized from the entry table when requested, dispatched on the closed
//! [`WrapperShape`] tag.

use crate::factory::{ServiceRef, unerase};
use crate::{Injectable, ServiceProvider};
use once_cell::sync::OnceCell;
use std::any::TypeId;
use std::marker::PhantomData;
use std::sync::Arc;

use tracing::trace;

/// Shape of a service request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WrapperShape {
    /// The key itself
    Direct,
    /// Resolved on first access, then cached by the wrapper
    Lazy,
    /// Resolved on every call
    Func,
    /// Every registration of the key
    All,
}

/// An untyped request: key plus shape
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceRequest {
    pub key: TypeId,
    pub key_name: &'static str,
    pub shape: WrapperShape,
}

impl ServiceRequest {
    #[inline]
    pub fn of<T: ?Sized + Injectable>(shape: WrapperShape) -> Self {
        Self {
            key: TypeId::of::<T>(),
            key_name: std::any::type_name::<T>(),
            shape,
        }
    }
}

/// Result of an untyped request
pub enum Resolved {
    Direct(ServiceRef),
    Lazy(ErasedDeferred),
    Func(ErasedFunc),
    All(Vec<ServiceRef>),
}

impl std::fmt::Debug for Resolved {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Resolved::Direct(_) => f.write_str("Resolved::Direct"),
            Resolved::Lazy(_) => f.write_str("Resolved::Lazy"),
            Resolved::Func(_) => f.write_str("Resolved::Func"),
            Resolved::All(items) => write!(f, "Resolved::All({})", items.len()),
        }
    }
}

/// Untyped factory wrapper: resolves its key on every call
#[derive(Clone)]
pub struct ErasedFunc {
    provider: ServiceProvider,
    key: TypeId,
}

impl ErasedFunc {
    pub fn call(&self) -> Option<ServiceRef> {
        let entry = self.provider.storage().last(&self.key)?;
        self.provider.resolve_entry(entry, &[]).ok()
    }
}

/// Untyped deferred wrapper: resolves its key once, on first access
pub struct ErasedDeferred {
    func: ErasedFunc,
    value: OnceCell<Option<ServiceRef>>,
}

impl ErasedDeferred {
    pub fn value(&self) -> Option<ServiceRef> {
        self.value.get_or_init(|| self.func.call()).clone()
    }

    #[inline]
    pub fn is_value_created(&self) -> bool {
        self.value.get().is_some()
    }
}

/// Typed deferred wrapper returned by [`ServiceProvider::get_lazy`]
pub struct Deferred<T: ?Sized> {
    inner: ErasedDeferred,
    _marker: PhantomData<fn() -> Arc<T>>,
}

impl<T: ?Sized + Injectable> Deferred<T> {
    /// Resolve on first call, return the cached instance afterwards
    #[inline]
    pub fn value(&self) -> Option<Arc<T>> {
        self.inner.value().as_ref().and_then(unerase::<T>)
    }

    #[inline]
    pub fn is_value_created(&self) -> bool {
        self.inner.is_value_created()
    }
}

/// Typed factory wrapper returned by [`ServiceProvider::get_func`]
pub struct Func<T: ?Sized> {
    inner: ErasedFunc,
    _marker: PhantomData<fn() -> Arc<T>>,
}

impl<T: ?Sized + Injectable> Func<T> {
    /// Resolve the key now, honoring its lifetime
    #[inline]
    pub fn call(&self) -> Option<Arc<T>> {
        self.inner.call().as_ref().and_then(unerase::<T>)
    }
}

impl<T: ?Sized> Clone for Func<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            _marker: PhantomData,
        }
    }
}

impl ServiceProvider {
    /// Resolve an untyped request.
    ///
    /// `Direct`, `Lazy` and `Func` yield `None` when the key is not
    /// registered; `All` always yields a (possibly empty) collection.
    pub fn get_untyped(&self, request: &ServiceRequest) -> Option<Resolved> {
        trace!(
            target: "autodi",
            service = request.key_name,
            shape = ?request.shape,
            "Resolving untyped request"
        );

        let func = || ErasedFunc {
            provider: self.clone(),
            key: request.key,
        };

        match request.shape {
            WrapperShape::Direct => {
                let entry = self.storage().last(&request.key)?;
                self.resolve_entry(entry, &[]).ok().map(Resolved::Direct)
            }
            WrapperShape::Lazy => self.storage().contains(&request.key).then(|| {
                Resolved::Lazy(ErasedDeferred {
                    func: func(),
                    value: OnceCell::new(),
                })
            }),
            WrapperShape::Func => self
                .storage()
                .contains(&request.key)
                .then(|| Resolved::Func(func())),
            WrapperShape::All => Some(Resolved::All(
                self.storage()
                    .all(&request.key)
                    .iter()
                    .filter_map(|entry| self.resolve_entry(entry, &[]).ok())
                    .collect(),
            )),
        }
    }

    /// Deferred wrapper for `T`; `None` when `T` is not registered
    pub fn get_lazy<T: ?Sized + Injectable>(&self) -> Option<Deferred<T>> {
        match self.get_untyped(&ServiceRequest::of::<T>(WrapperShape::Lazy))? {
            Resolved::Lazy(inner) => Some(Deferred {
                inner,
                _marker: PhantomData,
            }),
            _ => None,
        }
    }

    /// Factory wrapper for `T`; `None` when `T` is not registered
    pub fn get_func<T: ?Sized + Injectable>(&self) -> Option<Func<T>> {
        match self.get_untyped(&ServiceRequest::of::<T>(WrapperShape::Func))? {
            Resolved::Func(inner) => Some(Func {
                inner,
                _marker: PhantomData,
            }),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Lifetime, ServiceCollection};
    use std::sync::atomic::{AtomicU32, Ordering};

    trait Plugin: Send + Sync {
        fn id(&self) -> u32;
    }

    struct PluginA;
    struct PluginB;

    impl Plugin for PluginA {
        fn id(&self) -> u32 {
            1
        }
    }

    impl Plugin for PluginB {
        fn id(&self) -> u32 {
            2
        }
    }

    #[test]
    fn test_collection_request_returns_all_in_order() {
        let mut services = ServiceCollection::new();
        services
            .add_mapped::<dyn Plugin, _>("PluginA", Lifetime::Transient, |_| {
                Ok(Arc::new(PluginA) as Arc<dyn Plugin>)
            })
            .unwrap()
            .add_mapped::<dyn Plugin, _>("PluginB", Lifetime::LazySingleton, |_| {
                Ok(Arc::new(PluginB) as Arc<dyn Plugin>)
            })
            .unwrap();
        let provider = services.build().unwrap();

        let ids: Vec<u32> = provider.get_all::<dyn Plugin>().iter().map(|p| p.id()).collect();
        assert_eq!(ids, vec![1, 2]);
        assert_eq!(provider.get::<dyn Plugin>().unwrap().id(), 2);
    }

    #[test]
    fn test_lazy_wrapper_defers_creation() {
        static CREATED: AtomicU32 = AtomicU32::new(0);
        struct Heavy;

        let mut services = ServiceCollection::new();
        services.add_transient(|_| {
            CREATED.fetch_add(1, Ordering::SeqCst);
            Heavy
        });
        let provider = services.build().unwrap();

        let deferred = provider.get_lazy::<Heavy>().unwrap();
        assert!(!deferred.is_value_created());
        assert_eq!(CREATED.load(Ordering::SeqCst), 0);

        let a = deferred.value().unwrap();
        let b = deferred.value().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(CREATED.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_func_wrapper_resolves_each_call() {
        static CREATED: AtomicU32 = AtomicU32::new(0);
        struct Fresh(u32);

        let mut services = ServiceCollection::new();
        services.add_transient(|_| Fresh(CREATED.fetch_add(1, Ordering::SeqCst)));
        let provider = services.build().unwrap();

        let func = provider.get_func::<Fresh>().unwrap();
        assert_eq!(func.call().unwrap().0, 0);
        assert_eq!(func.call().unwrap().0, 1);
    }

    #[test]
    fn test_wrappers_for_unregistered_key() {
        struct Missing;
        let provider = ServiceCollection::new().build().unwrap();

        assert!(provider.get_lazy::<Missing>().is_none());
        assert!(provider.get_func::<Missing>().is_none());
        assert!(matches!(
            provider.get_untyped(&ServiceRequest::of::<Missing>(WrapperShape::All)),
            Some(Resolved::All(items)) if items.is_empty()
        ));
    }
}
