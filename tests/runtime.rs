//! Runtime container behavior across lifetimes, wrappers and module init

use autodi::prelude::*;
use autodi::{Constant, WrapperShape, ServiceRequest, Resolved};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

trait Repository: Send + Sync {
    fn name(&self) -> &str;
}

struct SqlRepository;

impl Repository for SqlRepository {
    fn name(&self) -> &str {
        "sql"
    }
}

struct MemoryRepository;

impl Repository for MemoryRepository {
    fn name(&self) -> &str {
        "memory"
    }
}

struct Counted(usize);

fn counting(lifetime: Lifetime, counter: &'static AtomicUsize) -> ServiceProvider {
    let mut services = ServiceCollection::new();
    services
        .add::<Counted, _>(lifetime, move |_| {
            Ok(Arc::new(Counted(counter.fetch_add(1, Ordering::SeqCst) + 1)))
        })
        .unwrap();
    services.build().unwrap()
}

#[test]
fn test_transient_yields_distinct_instances() {
    static CREATED: AtomicUsize = AtomicUsize::new(0);
    let provider = counting(Lifetime::Transient, &CREATED);

    let resolved: Vec<Arc<Counted>> = (0..3).map(|_| provider.get::<Counted>().unwrap()).collect();
    assert_eq!(CREATED.load(Ordering::SeqCst), 3);
    assert!(!Arc::ptr_eq(&resolved[0], &resolved[1]));
    assert!(!Arc::ptr_eq(&resolved[1], &resolved[2]));
}

#[test]
fn test_singleton_created_at_build() {
    static CREATED: AtomicUsize = AtomicUsize::new(0);
    let provider = counting(Lifetime::Singleton, &CREATED);
    assert_eq!(CREATED.load(Ordering::SeqCst), 1);

    let a = provider.get::<Counted>().unwrap();
    let b = provider.get::<Counted>().unwrap();
    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(CREATED.load(Ordering::SeqCst), 1);
}

#[test]
fn test_lazy_singleton_created_once_under_contention() {
    static CREATED: AtomicUsize = AtomicUsize::new(0);
    let provider = counting(Lifetime::LazySingleton, &CREATED);
    assert_eq!(CREATED.load(Ordering::SeqCst), 0);

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let provider = provider.clone();
            thread::spawn(move || provider.get::<Counted>().unwrap())
        })
        .collect();
    let instances: Vec<Arc<Counted>> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert_eq!(CREATED.load(Ordering::SeqCst), 1);
    assert!(instances.iter().all(|i| Arc::ptr_eq(i, &instances[0])));
}

#[test]
fn test_weak_singleton_recreated_after_release() {
    static CREATED: AtomicUsize = AtomicUsize::new(0);
    let provider = counting(Lifetime::WeakSingleton, &CREATED);

    let first = provider.get::<Counted>().unwrap();
    let again = provider.get::<Counted>().unwrap();
    assert_eq!(first.0, 1);
    assert!(Arc::ptr_eq(&first, &again));

    drop(first);
    drop(again);

    let second = provider.get::<Counted>().unwrap();
    assert_eq!(second.0, 2);
}

#[test]
fn test_scoped_instance_per_scope() {
    static CREATED: AtomicUsize = AtomicUsize::new(0);
    let provider = counting(Lifetime::Scoped, &CREATED);

    let scope_a = provider.create_scope();
    let scope_b = provider.create_scope();
    let a1 = scope_a.get::<Counted>().unwrap();
    let a2 = scope_a.get::<Counted>().unwrap();
    let b = scope_b.get::<Counted>().unwrap();

    assert!(Arc::ptr_eq(&a1, &a2));
    assert!(!Arc::ptr_eq(&a1, &b));
    assert_eq!(scope_b.depth(), provider.depth() + 1);
}

#[test]
fn test_trait_keys_last_registration_wins() {
    let mut services = ServiceCollection::new();
    services
        .add_mapped::<dyn Repository, _>("App.SqlRepository", Lifetime::Transient, |_| {
            Ok(Arc::new(SqlRepository) as Arc<dyn Repository>)
        })
        .unwrap()
        .add_mapped::<dyn Repository, _>("App.MemoryRepository", Lifetime::Transient, |_| {
            Ok(Arc::new(MemoryRepository) as Arc<dyn Repository>)
        })
        .unwrap();
    let provider = services.build().unwrap();

    assert_eq!(provider.get::<dyn Repository>().unwrap().name(), "memory");
    let all: Vec<String> = provider
        .get_all::<dyn Repository>()
        .iter()
        .map(|r| r.name().to_string())
        .collect();
    assert_eq!(all, vec!["sql", "memory"]);
}

#[test]
fn test_wrappers_are_not_registrations() {
    static CREATED: AtomicUsize = AtomicUsize::new(0);
    let provider = counting(Lifetime::Transient, &CREATED);

    let deferred = provider.get_lazy::<Counted>().unwrap();
    assert!(!deferred.is_value_created());
    assert_eq!(CREATED.load(Ordering::SeqCst), 0);
    let value = deferred.value().unwrap();
    assert!(Arc::ptr_eq(&value, &deferred.value().unwrap()));

    let func = provider.get_func::<Counted>().unwrap();
    let x = func.call().unwrap();
    let y = func.call().unwrap();
    assert!(!Arc::ptr_eq(&x, &y));

    assert!(provider.get_lazy::<String>().is_none());
    let request = ServiceRequest::of::<String>(WrapperShape::All);
    assert!(matches!(
        provider.get_untyped(&request),
        Some(Resolved::All(items)) if items.is_empty()
    ));
}

#[test]
fn test_marker_arguments_reach_factory() {
    struct Greeting(String);

    let mut services = ServiceCollection::new();
    services
        .add::<Greeting, _>(Lifetime::Transient, |r| {
            let name = r.args().first().and_then(Constant::as_str).unwrap_or("world");
            Ok(Arc::new(Greeting(format!("hello {name}"))))
        })
        .unwrap();
    let provider = services.build().unwrap();

    assert_eq!(provider.get::<Greeting>().unwrap().0, "hello world");
    let args = [Constant::Str("autodi".into())];
    assert_eq!(
        provider.get_with_args::<Greeting>(&args).unwrap().0,
        "hello autodi"
    );
}

#[test]
fn test_module_lifecycle_against_private_registry() {
    struct Clock;

    let registry = Arc::new(ResolutionRegistry::new());
    assert!(matches!(
        registry.get_service::<Clock>(&[]),
        Err(DiError::NotInitialized)
    ));

    let module = DiModule::builder("App")
        .registry(Arc::clone(&registry))
        .add_services(|services| {
            services.add_lazy(|_| Clock);
            Ok(())
        })
        .build();

    module.init(None).unwrap();
    assert!(registry.get_service::<Clock>(&[]).unwrap().is_some());
    assert!(matches!(
        module.init(None),
        Err(DiError::AlreadyInitialized { .. })
    ));
    assert!(!module.try_init(None).unwrap());

    assert!(module.dispose());
    assert!(registry.is_empty());
    assert!(module.try_init(None).unwrap());
    assert!(module.is_initialized());
}

#[test]
fn test_configure_callback_runs_after_setup() {
    struct Marker(&'static str);

    let registry = Arc::new(ResolutionRegistry::new());
    let module = DiModule::builder("App")
        .registry(registry)
        .add_services(|services| {
            services.add_instance(Marker("services"));
            Ok(())
        })
        .setup(|builder| {
            builder.configure_services(|services| {
                services.add_instance(Marker("setup"));
                Ok(())
            });
        })
        .build();

    module
        .init(Some(&|builder: &mut ApplicationBuilder| {
            builder.configure_services(|services| {
                services.add_instance(Marker("configure"));
                Ok(())
            });
        }))
        .unwrap();

    assert_eq!(module.get::<Marker>().unwrap().unwrap().0, "configure");
}
