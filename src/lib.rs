//! # AutoDI - Weave-Time Dependency Injection for Rust
//!
//! Dependency injection in two halves:
//!
//! - **Weave time** ([`weave`]): reads a compiled module, maps keys to
//!   concrete targets, instruments members marked as dependencies and emits a
//!   container that registers every mapping at startup.
//! - **Run time**: a lifetime-aware [`ServiceProvider`] built from a
//!   [`ServiceCollection`], published through a [`ResolutionRegistry`] that
//!   the injected resolve sequences call into.
//!
//! ## Features
//!
//! - 🗺️ **Automatic mapping** - base classes, concrete classes and single
//!   interface implementations map without configuration
//! - 🎯 **Explicit rules** - wildcard or regex rename rules and lifetime
//!   overrides from settings or attributes
//! - 🔒 **Type-safe resolution** - `Arc<T>` out, any `Send + Sync + 'static` key in
//! - ♻️ **Five lifetimes** - singleton, lazy singleton, weak singleton, scoped, transient
//! - 📊 **Observable** - `tracing` events under the `autodi` target
//!
//! ## Quick Start
//!
//! ```rust
//! use autodi::{Lifetime, ServiceCollection};
//! use std::sync::Arc;
//!
//! trait Clock: Send + Sync {
//!     fn now(&self) -> u64;
//! }
//!
//! struct FixedClock;
//!
//! impl Clock for FixedClock {
//!     fn now(&self) -> u64 {
//!         42
//!     }
//! }
//!
//! let mut services = ServiceCollection::new();
//! services
//!     .add::<dyn Clock, _>(Lifetime::LazySingleton, |_| Ok(Arc::new(FixedClock) as Arc<dyn Clock>))
//!     .unwrap();
//! let provider = services.build().unwrap();
//!
//! let clock = provider.get::<dyn Clock>().unwrap();
//! assert_eq!(clock.now(), 42);
//!
//! // Unregistered keys resolve to nothing
//! assert!(provider.get::<String>().is_none());
//! ```
//!
//! ## Weaving
//!
//! ```rust
//! use autodi::weave::{InMemoryResolver, ModuleDef, Settings, TypeDef, Weaver};
//! use autodi::Lifetime;
//!
//! let mut clock = TypeDef::class("App.Clock");
//! clock.interfaces.push("App.IClock".into());
//!
//! let resolver = InMemoryResolver::new().with(
//!     ModuleDef::new("App")
//!         .with_type(TypeDef::interface("App.IClock"))
//!         .with_type(clock),
//! );
//!
//! let output = Weaver::new(&resolver, Settings::default()).weave("App").unwrap();
//! let mapping = &output.report.mapping;
//! assert_eq!(mapping.lifetime_of("App.IClock", "App.Clock"), Some(Lifetime::LazySingleton));
//! assert_eq!(mapping.lifetime_of("App.Clock", "App.Clock"), Some(Lifetime::Transient));
//! ```
//!
//! ## Performance
//!
//! - **AHash**: Faster hashing for `TypeId` keys
//! - **Lock-free lazy singletons**: `OnceCell` per entry, exactly-once under contention
//! - **Zero allocation resolve**: Returns `Arc<T>` directly, no cloning

mod collection;
mod container;
mod di_module;
mod error;
mod factory;
pub mod logging;
mod provider;
mod registry;
mod scope;
mod storage;
pub mod weave;
mod wrapper;

pub use collection::*;
pub use container::*;
pub use di_module::*;
pub use error::*;
pub use factory::{ServiceRef, WeakSlot, erase, unerase};
pub use provider::*;
pub use registry::*;
pub use scope::*;
pub use wrapper::*;

// Re-export for convenience
pub use std::sync::Arc;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{
        ApplicationBuilder, DiError, DiModule, Injectable, Lifetime, ProviderScope,
        ResolutionRegistry, Result, ServiceCollection, ServiceProvider, WeaveError, WeaveResult,
    };
    pub use std::sync::Arc;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct Database {
        url: String,
    }

    struct UserService {
        db: Arc<Database>,
    }

    #[test]
    fn test_instance_registration() {
        let mut services = ServiceCollection::new();
        services.add_instance(Database { url: "test".into() });
        let provider = services.build().unwrap();

        let db = provider.get::<Database>().unwrap();
        assert_eq!(db.url, "test");
    }

    #[test]
    fn test_multiple_resolve_same_instance() {
        let mut services = ServiceCollection::new();
        services.add_lazy(|_| Database { url: "test".into() });
        let provider = services.build().unwrap();

        let db1 = provider.get::<Database>().unwrap();
        let db2 = provider.get::<Database>().unwrap();
        assert!(Arc::ptr_eq(&db1, &db2));
    }

    #[test]
    fn test_transient_creates_new_instance() {
        static COUNTER: AtomicU32 = AtomicU32::new(0);

        struct Counter(u32);

        let mut services = ServiceCollection::new();
        services.add_transient(|_| Counter(COUNTER.fetch_add(1, Ordering::SeqCst)));
        let provider = services.build().unwrap();

        let c1 = provider.get::<Counter>().unwrap();
        let c2 = provider.get::<Counter>().unwrap();
        assert_ne!(c1.0, c2.0);
    }

    #[test]
    fn test_dependencies_resolve_through_resolver() {
        let mut services = ServiceCollection::new();
        services.add_instance(Database {
            url: "postgres://localhost".into(),
        });
        services
            .add::<UserService, _>(Lifetime::Transient, |r| {
                Ok(Arc::new(UserService {
                    db: r.get_required::<Database>()?,
                }))
            })
            .unwrap();
        let provider = services.build().unwrap();

        let users = provider.get::<UserService>().unwrap();
        assert_eq!(users.db.url, "postgres://localhost");
    }

    #[test]
    fn test_not_found_is_none() {
        let provider = ServiceCollection::new().build().unwrap();
        assert!(provider.get::<Database>().is_none());
        assert!(matches!(
            provider.get_required::<Database>(),
            Err(DiError::NotFound { .. })
        ));
    }
}
