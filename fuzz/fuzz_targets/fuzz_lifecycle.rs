#![no_main]

//! Fuzz target for service lifetimes
//!
//! Builds providers from arbitrary registrations, then resolves through
//! scopes and wrappers, checking each lifetime keeps its sharing rules.

use arbitrary::Arbitrary;
use autodi::{Lifetime, ServiceCollection};
use libfuzzer_sys::fuzz_target;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

static CREATED: AtomicU64 = AtomicU64::new(0);

struct Tracked {
    #[allow(dead_code)]
    id: u64,
}

#[derive(Debug, Clone, Copy, Arbitrary)]
enum FuzzLifetime {
    Singleton,
    LazySingleton,
    WeakSingleton,
    Scoped,
    Transient,
}

impl From<FuzzLifetime> for Lifetime {
    fn from(lifetime: FuzzLifetime) -> Self {
        match lifetime {
            FuzzLifetime::Singleton => Lifetime::Singleton,
            FuzzLifetime::LazySingleton => Lifetime::LazySingleton,
            FuzzLifetime::WeakSingleton => Lifetime::WeakSingleton,
            FuzzLifetime::Scoped => Lifetime::Scoped,
            FuzzLifetime::Transient => Lifetime::Transient,
        }
    }
}

#[derive(Debug, Arbitrary)]
enum LifecycleOp {
    Get,
    GetTwice,
    GetInScope(u8),
    GetLazy,
    GetFunc(u8),
    GetAll,
    Contains,
}

#[derive(Debug, Arbitrary)]
struct LifecycleInput {
    lifetimes: Vec<FuzzLifetime>,
    ops: Vec<LifecycleOp>,
}

fuzz_target!(|input: LifecycleInput| {
    let mut services = ServiceCollection::new();
    let lifetimes: Vec<FuzzLifetime> = input.lifetimes.into_iter().take(8).collect();
    for lifetime in &lifetimes {
        let _ = services.add::<Tracked, _>((*lifetime).into(), |_| {
            Ok(Arc::new(Tracked {
                id: CREATED.fetch_add(1, Ordering::SeqCst),
            }))
        });
    }

    let Ok(provider) = services.build() else {
        return;
    };
    // The last registration answers single lookups
    let effective = lifetimes.last().map(|l| Lifetime::from(*l));

    for op in input.ops.into_iter().take(100) {
        match op {
            LifecycleOp::Get => {
                assert_eq!(provider.get::<Tracked>().is_some(), effective.is_some());
            }
            LifecycleOp::GetTwice => {
                let (Some(a), Some(b)) = (provider.get::<Tracked>(), provider.get::<Tracked>()) else {
                    continue;
                };
                match effective {
                    Some(Lifetime::Transient) => assert!(!Arc::ptr_eq(&a, &b)),
                    Some(Lifetime::Singleton | Lifetime::LazySingleton | Lifetime::WeakSingleton) => {
                        assert!(Arc::ptr_eq(&a, &b))
                    }
                    _ => {}
                }
            }
            LifecycleOp::GetInScope(count) => {
                let scope = provider.create_scope();
                assert_eq!(scope.depth(), provider.depth() + 1);
                let first = scope.get::<Tracked>();
                for _ in 0..(count % 8) {
                    let again = scope.get::<Tracked>();
                    if let (Some(a), Some(b), Some(Lifetime::Scoped)) = (&first, &again, effective) {
                        assert!(Arc::ptr_eq(a, b));
                    }
                }
                scope.dispose();
            }
            LifecycleOp::GetLazy => {
                if let Some(deferred) = provider.get_lazy::<Tracked>() {
                    assert!(!deferred.is_value_created());
                    let _ = deferred.value();
                }
            }
            LifecycleOp::GetFunc(count) => {
                if let Some(func) = provider.get_func::<Tracked>() {
                    for _ in 0..(count % 8) {
                        let _ = func.call();
                    }
                }
            }
            LifecycleOp::GetAll => {
                assert_eq!(provider.get_all::<Tracked>().len(), lifetimes.len());
            }
            LifecycleOp::Contains => {
                assert_eq!(provider.contains::<Tracked>(), !lifetimes.is_empty());
            }
        }
    }
});
