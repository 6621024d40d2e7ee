#![no_main]

//! Fuzz target for module init and dispose
//!
//! Drives a module through arbitrary init/dispose sequences against a
//! private registry and checks the registry tracks the module state.

use arbitrary::Arbitrary;
use autodi::{DiError, DiModule, ResolutionRegistry};
use libfuzzer_sys::fuzz_target;
use std::sync::Arc;

struct Clock;

#[derive(Debug, Arbitrary)]
enum RegistryOp {
    Init,
    TryInit,
    Dispose,
    Resolve,
    RegisterForeign,
}

fuzz_target!(|ops: Vec<RegistryOp>| {
    let registry = Arc::new(ResolutionRegistry::new());
    let module = DiModule::builder("Fuzz")
        .registry(Arc::clone(&registry))
        .add_services(|services| {
            services.add_lazy(|_| Clock);
            Ok(())
        })
        .build();

    let mut initialized = false;
    let mut foreign = Vec::new();

    for op in ops.into_iter().take(100) {
        match op {
            RegistryOp::Init => match module.init(None) {
                Ok(()) => {
                    assert!(!initialized);
                    initialized = true;
                }
                Err(DiError::AlreadyInitialized { .. }) => assert!(initialized),
                Err(e) => panic!("unexpected init error: {e}"),
            },
            RegistryOp::TryInit => {
                let started = module.try_init(None).unwrap_or(false);
                assert_eq!(started, !initialized);
                initialized = true;
            }
            RegistryOp::Dispose => {
                assert_eq!(module.dispose(), initialized);
                initialized = false;
            }
            RegistryOp::Resolve => {
                let found = matches!(registry.get_service::<Clock>(&[]), Ok(Some(_)));
                assert_eq!(found, initialized);
            }
            RegistryOp::RegisterForeign => {
                foreign.push(registry.register(autodi::ServiceProvider::empty()));
            }
        }
        assert_eq!(module.is_initialized(), initialized);
        assert_eq!(registry.len(), foreign.len() + usize::from(initialized));
    }
});
