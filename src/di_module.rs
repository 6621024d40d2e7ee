//! Generated runtime surface of a woven module
//!
//! Weaving a module emits `AddServices`, `Init` and `Dispose` members plus a
//! published provider slot. `DiModule` is the runtime object those members
//! drive: it owns the module's registration function, its optional setup
//! hook and the provider it publishes to a [`ResolutionRegistry`].

use crate::registry::ProviderHandle;
use crate::{
    ApplicationBuilder, DiError, Injectable, ResolutionRegistry, Result, ServiceCollection,
    ServiceProvider,
};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, info};

/// Registration function: the body of the generated `AddServices`
pub type AddServicesFn = Arc<dyn Fn(&mut ServiceCollection) -> Result<()> + Send + Sync>;

/// Setup hook discovered in the module, run before the caller's callback
pub type SetupFn = Arc<dyn Fn(&mut ApplicationBuilder) + Send + Sync>;

struct Published {
    provider: ServiceProvider,
    handle: ProviderHandle,
}

/// Per-module DI entry point.
///
/// # Examples
///
/// ```rust
/// use autodi::{DiError, DiModule, Lifetime, ResolutionRegistry};
/// use std::sync::Arc;
///
/// struct Clock;
///
/// let module = DiModule::builder("App")
///     .registry(Arc::new(ResolutionRegistry::new()))
///     .add_services(|services| {
///         services.add::<Clock, _>(Lifetime::LazySingleton, |_| Ok(Arc::new(Clock)))?;
///         Ok(())
///     })
///     .build();
///
/// module.init(None).unwrap();
/// assert!(matches!(module.init(None), Err(DiError::AlreadyInitialized { .. })));
/// assert!(module.dispose());
/// assert!(module.try_init(None).unwrap());
/// ```
pub struct DiModule {
    name: String,
    registry: Arc<ResolutionRegistry>,
    add_services: AddServicesFn,
    setup: Option<SetupFn>,
    state: Mutex<Option<Published>>,
}

impl DiModule {
    /// Start building the surface for module `name`
    #[inline]
    pub fn builder(name: impl Into<String>) -> DiModuleBuilder {
        DiModuleBuilder {
            name: name.into(),
            registry: None,
            add_services: None,
            setup: None,
        }
    }

    fn state(&self) -> MutexGuard<'_, Option<Published>> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Add this module's registrations to `services`
    #[inline]
    pub fn add_services(&self, services: &mut ServiceCollection) -> Result<()> {
        (self.add_services)(services)
    }

    /// Build and publish the module's provider.
    ///
    /// Order: registrations, the module's setup hook, then `configure`.
    /// Fails with [`DiError::AlreadyInitialized`] when a provider is already
    /// published for this module.
    pub fn init(&self, configure: Option<&dyn Fn(&mut ApplicationBuilder)>) -> Result<()> {
        if self.state().is_some() {
            return Err(DiError::already_initialized(&self.name));
        }

        // Callbacks and eager factories run unlocked; they may query this module
        let mut app = ApplicationBuilder::new();
        self.add_services(app.services_mut())?;
        if let Some(setup) = &self.setup {
            setup(&mut app);
        }
        if let Some(configure) = configure {
            configure(&mut app);
        }
        let provider = app.build()?;

        let mut state = self.state();
        if state.is_some() {
            // Lost a race with a concurrent init
            provider.dispose();
            return Err(DiError::already_initialized(&self.name));
        }
        let handle = self.registry.register(provider.clone());

        info!(
            target: "autodi",
            module = %self.name,
            services = provider.len(),
            handle = handle.id(),
            "Module initialized"
        );

        *state = Some(Published { provider, handle });
        Ok(())
    }

    /// Like [`init`](Self::init), but `Ok(false)` instead of an error when
    /// already initialized.
    pub fn try_init(&self, configure: Option<&dyn Fn(&mut ApplicationBuilder)>) -> Result<bool> {
        match self.init(configure) {
            Ok(()) => Ok(true),
            Err(DiError::AlreadyInitialized { .. }) => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// Dispose the published provider and withdraw it from the registry.
    ///
    /// Returns `false` if the module was not initialized.
    pub fn dispose(&self) -> bool {
        let Some(published) = self.state().take() else {
            return false;
        };

        published.provider.dispose();
        self.registry.unregister(published.handle);

        debug!(
            target: "autodi",
            module = %self.name,
            handle = published.handle.id(),
            "Module disposed"
        );
        true
    }

    /// The published provider, if initialized
    #[inline]
    pub fn provider(&self) -> Option<ServiceProvider> {
        self.state().as_ref().map(|p| p.provider.clone())
    }

    #[inline]
    pub fn is_initialized(&self) -> bool {
        self.state().is_some()
    }

    /// Resolve from this module's provider.
    ///
    /// Fails with [`DiError::NotInitialized`] before `init`.
    pub fn get<T: ?Sized + Injectable>(&self) -> Result<Option<Arc<T>>> {
        let provider = self.provider().ok_or(DiError::NotInitialized)?;
        provider.try_get_with_args::<T>(&[])
    }
}

impl std::fmt::Debug for DiModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiModule")
            .field("name", &self.name)
            .field("has_setup", &self.setup.is_some())
            .field("initialized", &self.is_initialized())
            .finish()
    }
}

/// Builder for [`DiModule`]
pub struct DiModuleBuilder {
    name: String,
    registry: Option<Arc<ResolutionRegistry>>,
    add_services: Option<AddServicesFn>,
    setup: Option<SetupFn>,
}

impl DiModuleBuilder {
    /// Publish to `registry` instead of the process-wide one
    #[inline]
    pub fn registry(mut self, registry: Arc<ResolutionRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    #[inline]
    pub fn add_services<F>(mut self, add_services: F) -> Self
    where
        F: Fn(&mut ServiceCollection) -> Result<()> + Send + Sync + 'static,
    {
        self.add_services = Some(Arc::new(add_services));
        self
    }

    #[inline]
    pub fn setup<F>(mut self, setup: F) -> Self
    where
        F: Fn(&mut ApplicationBuilder) + Send + Sync + 'static,
    {
        self.setup = Some(Arc::new(setup));
        self
    }

    pub fn build(self) -> DiModule {
        DiModule {
            name: self.name,
            registry: self.registry.unwrap_or_else(ResolutionRegistry::global),
            add_services: self.add_services.unwrap_or_else(|| Arc::new(|_| Ok(()))),
            setup: self.setup,
            state: Mutex::new(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Lifetime;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct Greeting(&'static str);

    fn module(registry: &Arc<ResolutionRegistry>) -> DiModule {
        DiModule::builder("Tests")
            .registry(Arc::clone(registry))
            .add_services(|services| {
                services.add::<Greeting, _>(Lifetime::Transient, |_| Ok(Arc::new(Greeting("hi"))))?;
                Ok(())
            })
            .build()
    }

    #[test]
    fn test_double_init_fails() {
        let registry = Arc::new(ResolutionRegistry::new());
        let module = module(&registry);

        module.init(None).unwrap();
        assert!(matches!(
            module.init(None),
            Err(DiError::AlreadyInitialized { .. })
        ));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_try_init_cycle() {
        let registry = Arc::new(ResolutionRegistry::new());
        let module = module(&registry);

        assert!(module.try_init(None).unwrap());
        assert!(!module.try_init(None).unwrap());
        assert!(module.dispose());
        assert!(registry.is_empty());
        assert!(module.try_init(None).unwrap());
    }

    #[test]
    fn test_get_before_init() {
        let registry = Arc::new(ResolutionRegistry::new());
        let module = module(&registry);
        assert!(matches!(module.get::<Greeting>(), Err(DiError::NotInitialized)));
        assert!(!module.dispose());
    }

    #[test]
    fn test_setup_runs_before_configure() {
        static SETUP_RAN: AtomicBool = AtomicBool::new(false);

        let registry = Arc::new(ResolutionRegistry::new());
        let module = DiModule::builder("WithSetup")
            .registry(Arc::clone(&registry))
            .setup(|app| {
                SETUP_RAN.store(true, Ordering::SeqCst);
                app.services_mut().add_instance(Greeting("setup"));
            })
            .build();

        module
            .init(Some(&|app: &mut ApplicationBuilder| {
                app.services_mut().add_instance(Greeting("configure"));
            }))
            .unwrap();

        assert!(SETUP_RAN.load(Ordering::SeqCst));
        let greeting = module.get::<Greeting>().unwrap().unwrap();
        assert_eq!(greeting.0, "configure");
    }

    #[test]
    fn test_callbacks_may_query_module_during_init() {
        let registry = Arc::new(ResolutionRegistry::new());
        let module = module(&registry);
        let observed = AtomicBool::new(true);

        module
            .init(Some(&|_: &mut ApplicationBuilder| {
                observed.store(module.is_initialized() || module.provider().is_some(), Ordering::SeqCst);
            }))
            .unwrap();

        assert!(!observed.load(Ordering::SeqCst));
        assert!(module.is_initialized());
    }

    #[test]
    fn test_dispose_disposes_provider() {
        let registry = Arc::new(ResolutionRegistry::new());
        let module = module(&registry);
        module.init(None).unwrap();
        let provider = module.provider().unwrap();

        module.dispose();
        assert!(provider.is_disposed());
        assert!(matches!(
            registry.get_service::<Greeting>(&[]),
            Err(DiError::NotInitialized)
        ));
    }
}
