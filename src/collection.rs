//! Service registration surface
//!
//! A [`ServiceCollection`] is the ordered list of registrations produced by a
//! module's generated `add_services`. Building it yields the immutable
//! [`ServiceProvider`].

use crate::container::{Resolver, ServiceProvider};
use crate::factory::{AnyFactory, DowngradeFn, InitFn, downgrade_as, erase};
use crate::storage::{ServiceEntry, ServiceStorage};
use crate::{DiError, Injectable, Lifetime, Result};
use std::any::TypeId;
use std::sync::Arc;

use tracing::{debug, warn};

/// A single registration: key type, target name, factory and lifetime
pub struct ServiceDescriptor {
    key: TypeId,
    key_name: &'static str,
    target_name: String,
    lifetime: Lifetime,
    init: InitFn,
    downgrade: DowngradeFn,
}

impl ServiceDescriptor {
    #[inline]
    pub fn key(&self) -> TypeId {
        self.key
    }

    #[inline]
    pub fn key_name(&self) -> &'static str {
        self.key_name
    }

    #[inline]
    pub fn target_name(&self) -> &str {
        &self.target_name
    }

    #[inline]
    pub fn lifetime(&self) -> Lifetime {
        self.lifetime
    }
}

impl std::fmt::Debug for ServiceDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceDescriptor")
            .field("key", &self.key_name)
            .field("target", &self.target_name)
            .field("lifetime", &self.lifetime)
            .finish()
    }
}

/// Ordered collection of service registrations.
///
/// # Examples
///
/// ```rust
/// use autodi::{Lifetime, ServiceCollection};
/// use std::sync::Arc;
///
/// trait Greeter: Send + Sync {
///     fn greet(&self) -> String;
/// }
///
/// struct English;
/// impl Greeter for English {
///     fn greet(&self) -> String { "hello".into() }
/// }
///
/// let mut services = ServiceCollection::new();
/// services
///     .add::<dyn Greeter, _>(Lifetime::LazySingleton, |_| Ok(Arc::new(English) as Arc<dyn Greeter>))
///     .unwrap();
///
/// let provider = services.build().unwrap();
/// assert_eq!(provider.get::<dyn Greeter>().unwrap().greet(), "hello");
/// ```
#[derive(Default)]
pub struct ServiceCollection {
    descriptors: Vec<ServiceDescriptor>,
}

impl ServiceCollection {
    /// Create an empty collection
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory for key `K`, naming the target after `K`.
    #[inline]
    pub fn add<K, F>(&mut self, lifetime: Lifetime, factory: F) -> Result<&mut Self>
    where
        K: ?Sized + Injectable,
        F: Fn(&Resolver<'_>) -> Result<Arc<K>> + Send + Sync + 'static,
    {
        self.add_mapped::<K, F>(std::any::type_name::<K>(), lifetime, factory)
    }

    /// Register `(key, target, factory, lifetime)`.
    ///
    /// This is the entry point generated registration code calls for every
    /// mapping entry. `Lifetime::None` is rejected.
    pub fn add_mapped<K, F>(
        &mut self,
        target_name: impl Into<String>,
        lifetime: Lifetime,
        factory: F,
    ) -> Result<&mut Self>
    where
        K: ?Sized + Injectable,
        F: Fn(&Resolver<'_>) -> Result<Arc<K>> + Send + Sync + 'static,
    {
        let target_name = target_name.into();
        let key_name = std::any::type_name::<K>();

        if lifetime == Lifetime::None {
            return Err(DiError::InvalidRegistration {
                key: key_name.to_string(),
                target: target_name,
                reason: "lifetime None cannot be registered".into(),
            });
        }

        debug!(
            target: "autodi",
            service = key_name,
            target_type = %target_name,
            lifetime = lifetime.as_str(),
            service_count = self.descriptors.len() + 1,
            "Registering service"
        );

        let init: InitFn = Arc::new(move |resolver: &Resolver<'_>| factory(resolver).map(erase));
        self.descriptors.push(ServiceDescriptor {
            key: TypeId::of::<K>(),
            key_name,
            target_name,
            lifetime,
            init,
            downgrade: downgrade_as::<K>,
        });
        Ok(self)
    }

    /// Register with the lifetime given by name, as generated
    /// `AddServices` bodies do.
    ///
    /// Fails with [`DiError::UnknownLifetime`] on a name [`Lifetime`] does
    /// not parse.
    pub fn add_autodi_service<K, F>(
        &mut self,
        target_name: impl Into<String>,
        lifetime: &str,
        factory: F,
    ) -> Result<&mut Self>
    where
        K: ?Sized + Injectable,
        F: Fn(&Resolver<'_>) -> Result<Arc<K>> + Send + Sync + 'static,
    {
        let lifetime: Lifetime = lifetime.parse()?;
        self.add_mapped::<K, F>(target_name, lifetime, factory)
    }

    /// Register a pre-built instance as an eager singleton.
    #[inline]
    pub fn add_instance<T: Injectable>(&mut self, instance: T) -> &mut Self {
        let shared = Arc::new(instance);
        self.descriptors.push(ServiceDescriptor {
            key: TypeId::of::<T>(),
            key_name: std::any::type_name::<T>(),
            target_name: std::any::type_name::<T>().to_string(),
            lifetime: Lifetime::Singleton,
            init: Arc::new(move |_r: &Resolver<'_>| Ok(erase(Arc::clone(&shared)))),
            downgrade: downgrade_as::<T>,
        });
        self
    }

    /// Register a transient service.
    #[inline]
    pub fn add_transient<T, F>(&mut self, factory: F) -> &mut Self
    where
        T: Injectable,
        F: Fn(&Resolver<'_>) -> T + Send + Sync + 'static,
    {
        self.add_infallible(Lifetime::Transient, factory)
    }

    /// Register a lazy singleton.
    #[inline]
    pub fn add_lazy<T, F>(&mut self, factory: F) -> &mut Self
    where
        T: Injectable,
        F: Fn(&Resolver<'_>) -> T + Send + Sync + 'static,
    {
        self.add_infallible(Lifetime::LazySingleton, factory)
    }

    /// Register a scoped service.
    #[inline]
    pub fn add_scoped<T, F>(&mut self, factory: F) -> &mut Self
    where
        T: Injectable,
        F: Fn(&Resolver<'_>) -> T + Send + Sync + 'static,
    {
        self.add_infallible(Lifetime::Scoped, factory)
    }

    /// Register a weak singleton.
    #[inline]
    pub fn add_weak<T, F>(&mut self, factory: F) -> &mut Self
    where
        T: Injectable,
        F: Fn(&Resolver<'_>) -> T + Send + Sync + 'static,
    {
        self.add_infallible(Lifetime::WeakSingleton, factory)
    }

    fn add_infallible<T, F>(&mut self, lifetime: Lifetime, factory: F) -> &mut Self
    where
        T: Injectable,
        F: Fn(&Resolver<'_>) -> T + Send + Sync + 'static,
    {
        let type_name = std::any::type_name::<T>();
        self.descriptors.push(ServiceDescriptor {
            key: TypeId::of::<T>(),
            key_name: type_name,
            target_name: type_name.to_string(),
            lifetime,
            init: Arc::new(move |resolver: &Resolver<'_>| Ok(erase(Arc::new(factory(resolver))))),
            downgrade: downgrade_as::<T>,
        });
        self
    }

    /// Start a registration batch.
    ///
    /// With `isolate` set, a failing registration is recorded and the batch
    /// continues; [`RegistrationBatch::finish`] reports every failure at once.
    #[inline]
    pub fn batch(&mut self, isolate: bool) -> RegistrationBatch<'_> {
        RegistrationBatch {
            collection: self,
            isolate,
            errors: Vec::new(),
        }
    }

    /// Registered descriptors, in order
    #[inline]
    pub fn descriptors(&self) -> &[ServiceDescriptor] {
        &self.descriptors
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// Finalize the collection into a provider.
    ///
    /// Eager singletons are constructed here, in registration order, before
    /// the provider is handed out.
    pub fn build(self) -> Result<ServiceProvider> {
        let mut storage = ServiceStorage::with_capacity(self.descriptors.len());
        for descriptor in self.descriptors {
            let Some(factory) = AnyFactory::for_lifetime(
                descriptor.lifetime,
                descriptor.init,
                descriptor.downgrade,
                descriptor.key_name,
            ) else {
                continue;
            };
            storage.insert(ServiceEntry {
                key: descriptor.key,
                key_name: descriptor.key_name,
                target_name: descriptor.target_name,
                factory,
            });
        }
        ServiceProvider::from_storage(storage)
    }
}

impl std::fmt::Debug for ServiceCollection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceCollection")
            .field("count", &self.descriptors.len())
            .finish()
    }
}

/// Batch of registrations with optional per-registration error isolation.
pub struct RegistrationBatch<'a> {
    collection: &'a mut ServiceCollection,
    isolate: bool,
    errors: Vec<DiError>,
}

impl<'a> RegistrationBatch<'a> {
    /// Run one registration step.
    ///
    /// Without isolation the first error is returned immediately.
    pub fn register<F>(&mut self, step: F) -> Result<&mut Self>
    where
        F: FnOnce(&mut ServiceCollection) -> Result<()>,
    {
        if let Err(err) = step(&mut *self.collection) {
            if !self.isolate {
                return Err(err);
            }
            warn!(target: "autodi", error = %err, "Registration failed, continuing batch");
            self.errors.push(err);
        }
        Ok(self)
    }

    /// Failures recorded so far
    #[inline]
    pub fn errors(&self) -> &[DiError] {
        &self.errors
    }

    /// Finish the batch, aggregating any isolated failures into one error
    pub fn finish(self) -> Result<()> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(DiError::Registration(self.errors))
        }
    }
}

/// Configuration callback applied to the collection before it is built
pub type ConfigureFn = Box<dyn FnOnce(&mut ServiceCollection) -> Result<()> + Send>;

/// Builds the application's provider: registrations first, then any
/// configuration callbacks in the order they were added.
#[derive(Default)]
pub struct ApplicationBuilder {
    services: ServiceCollection,
    configure: Vec<ConfigureFn>,
}

impl ApplicationBuilder {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a configuration callback
    #[inline]
    pub fn configure_services<F>(&mut self, configure: F) -> &mut Self
    where
        F: FnOnce(&mut ServiceCollection) -> Result<()> + Send + 'static,
    {
        self.configure.push(Box::new(configure));
        self
    }

    /// Direct access to the collection
    #[inline]
    pub fn services_mut(&mut self) -> &mut ServiceCollection {
        &mut self.services
    }

    /// Apply all callbacks and build the provider
    pub fn build(mut self) -> Result<ServiceProvider> {
        for configure in self.configure.drain(..) {
            configure(&mut self.services)?;
        }
        self.services.build()
    }
}

impl std::fmt::Debug for ApplicationBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApplicationBuilder")
            .field("services", &self.services)
            .field("pending_callbacks", &self.configure.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Config {
        name: &'static str,
    }

    #[test]
    fn test_none_lifetime_rejected() {
        let mut services = ServiceCollection::new();
        let result = services.add::<Config, _>(Lifetime::None, |_| Ok(Arc::new(Config { name: "x" })));
        assert!(matches!(result, Err(DiError::InvalidRegistration { .. })));
        assert!(services.is_empty());
    }

    #[test]
    fn test_lifetime_by_name() {
        let mut services = ServiceCollection::new();
        for name in [Lifetime::LazySingleton.as_str(), "WeakTransient"] {
            services
                .add_autodi_service::<Config, _>("App.Config", name, |_| {
                    Ok(Arc::new(Config { name: "named" }))
                })
                .unwrap();
        }
        let lifetimes: Vec<Lifetime> = services.descriptors().iter().map(|d| d.lifetime()).collect();
        assert_eq!(lifetimes, vec![Lifetime::LazySingleton, Lifetime::WeakSingleton]);

        let result = services.add_autodi_service::<Config, _>("App.Config", "eternal", |_| {
            Ok(Arc::new(Config { name: "never" }))
        });
        assert!(matches!(result, Err(DiError::UnknownLifetime(_))));
        assert_eq!(services.len(), 2);
    }

    #[test]
    fn test_isolated_batch_aggregates_failures() {
        let mut services = ServiceCollection::new();
        let mut batch = services.batch(true);
        batch
            .register(|c| c.add::<Config, _>(Lifetime::None, |_| Ok(Arc::new(Config { name: "a" }))).map(|_| ()))
            .unwrap()
            .register(|c| {
                c.add_instance(Config { name: "b" });
                Ok(())
            })
            .unwrap()
            .register(|_| Err(DiError::Internal("boom".into())))
            .unwrap();
        assert_eq!(batch.errors().len(), 2);

        match batch.finish() {
            Err(DiError::Registration(errors)) => assert_eq!(errors.len(), 2),
            other => panic!("expected aggregated error, got {other:?}"),
        }
        assert_eq!(services.len(), 1);
    }

    #[test]
    fn test_unisolated_batch_stops_on_first_failure() {
        let mut services = ServiceCollection::new();
        let mut batch = services.batch(false);
        assert!(batch.register(|_| Err(DiError::NotInitialized)).is_err());
    }

    #[test]
    fn test_application_builder_runs_callbacks_in_order() {
        let mut app = ApplicationBuilder::new();
        app.services_mut().add_instance(Config { name: "first" });
        app.configure_services(|services| {
            services.add_instance(Config { name: "second" });
            Ok(())
        });

        let provider = app.build().unwrap();
        assert_eq!(provider.get::<Config>().unwrap().name, "second");
        assert_eq!(provider.get_all::<Config>().len(), 2);
    }
}
