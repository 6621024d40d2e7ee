//! Container synthesis
//!
//! Generates the `AutoDI.AutoDIContainer` type for the registrations a module
//! owns: one factory per target, plus `AddServices`, `Init` and `Dispose`.
//! The generated surface mirrors [`DiModule`](crate::DiModule):
//! `Init` adds services, runs the setup method, runs the caller's configure
//! callback, builds the provider, publishes it and registers it with
//! `GlobalDI`.

use super::il::{BranchCond, ExceptionHandler, HandlerKind, InstructionInjector, MethodBody, Op};
use super::inject::get_service;
use super::mapping::{Mapping, TypeMap};
use super::model::{
    Accessibility, Attribute, CONSTRUCTOR, FieldDef, HasAttributes, MethodDef, MethodKind,
    MethodRef, ModuleDef, ParamDef, STATIC_CONSTRUCTOR, TypeDef, runtime,
};
use super::settings::{InitMode, Settings};
use crate::logging::Diagnostics;
use crate::{Constant, WeaveError, WeaveResult};

use tracing::{debug, info};

pub const CONTAINER_TYPE: &str = "AutoDI.AutoDIContainer";
pub const PROVIDER_FIELD: &str = "_globalServiceProvider";
pub const ADD_SERVICES: &str = "AddServices";
pub const INIT: &str = "Init";
pub const DISPOSE: &str = "Dispose";

const EXCEPTION_LIST: &str = "System.Collections.Generic.List`1<System.Exception>";
const CONFIGURE_CALLBACK: &str = "System.Action`1<AutoDI.IApplicationBuilder>";

/// Summary of one synthesis
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Synthesized {
    pub registrations: usize,
    pub factories: usize,
    pub setup_method: Option<MethodRef>,
    /// Whether a call to `Init` was inserted
    pub init_injected: bool,
}

/// Pick the constructor the factory for `ty` calls.
///
/// A single constructor marked as the DI constructor wins. Otherwise the
/// module-visible constructor with the most parameters, ties going to the
/// one declared first.
pub fn select_constructor(ty: &TypeDef) -> WeaveResult<Option<&MethodDef>> {
    let designated: Vec<&MethodDef> = ty
        .constructors()
        .filter(|c| c.has_attribute(|a| matches!(a, Attribute::DiConstructor)))
        .collect();
    match designated.as_slice() {
        [] => {}
        [only] => return Ok(Some(only)),
        many => {
            return Err(WeaveError::MultipleDiConstructors {
                type_name: ty.name.clone(),
                count: many.len(),
            });
        }
    }

    Ok(ty
        .constructors()
        .filter(|c| c.accessibility.is_module_visible())
        .fold(None, |best: Option<&MethodDef>, candidate| match best {
            Some(b) if b.parameters.len() >= candidate.parameters.len() => Some(b),
            _ => Some(candidate),
        }))
}

fn container_method(name: &str) -> MethodRef {
    MethodRef::new(CONTAINER_TYPE, name)
}

/// Whether `body` already calls the container's `Init`
fn calls_init(body: &MethodBody) -> bool {
    body.ops().any(|op| {
        matches!(op, Op::Call(m) if m.declaring_type == CONTAINER_TYPE && m.name == INIT)
    })
}

fn factory_name(target: &str) -> String {
    format!("{}_generated_Factory", target.replace(['.', '+', '`', '/'], "_"))
}

/// Builds the container type for one module
pub struct ContainerSynthesizer<'a, 'd> {
    settings: &'a Settings,
    diagnostics: &'d mut Diagnostics,
}

impl<'a, 'd> ContainerSynthesizer<'a, 'd> {
    pub fn new(settings: &'a Settings, diagnostics: &'d mut Diagnostics) -> Self {
        Self {
            settings,
            diagnostics,
        }
    }

    /// Add the container type to `module` and insert the `Init` call the
    /// init mode asks for. A container left by an earlier weave is replaced.
    pub fn synthesize(&mut self, module: &mut ModuleDef, mapping: &Mapping) -> WeaveResult<Synthesized> {
        let mut container = TypeDef::new(CONTAINER_TYPE, Default::default());
        container.is_abstract = true;
        container.fields.push(FieldDef {
            name: PROVIDER_FIELD.to_string(),
            type_name: runtime::SERVICE_PROVIDER.to_string(),
            accessibility: Accessibility::Private,
            is_static: true,
        });

        let mut registered: Vec<(&TypeMap, MethodRef)> = Vec::new();
        for map in mapping.iter().filter(|m| m.module == module.name) {
            let Some(target) = module.type_def(&map.target) else {
                self.diagnostics.warning(format!(
                    "Target {} is not defined in module {}; not registered",
                    map.target, module.name
                ));
                continue;
            };
            let Some(ctor) = select_constructor(target)? else {
                self.diagnostics.warning(format!(
                    "{} has no accessible constructor; not registered",
                    map.target
                ));
                continue;
            };

            let factory = build_factory(&map.target, ctor);
            let reference = container_method(&factory.name)
                .with_parameters(vec![runtime::SERVICE_PROVIDER.to_string()]);
            container.methods.push(factory);
            registered.push((map, reference));
        }

        let setup_method = self.find_setup_method(module);

        let registrations: usize = registered.iter().map(|(m, _)| m.keys.len()).sum();
        container
            .methods
            .push(self.build_add_services(&registered));
        container.methods.push(build_init(setup_method.as_ref()));
        container.methods.push(build_dispose());

        let factories = registered.len();
        module.types.retain(|t| t.name != CONTAINER_TYPE);
        module.types.push(container);

        let init_injected = self.inject_init_call(module);

        info!(
            target: "autodi",
            module = %module.name,
            registrations,
            factories,
            setup = setup_method.is_some(),
            "Synthesized container"
        );
        Ok(Synthesized {
            registrations,
            factories,
            setup_method,
            init_injected,
        })
    }

    /// `AddServices(collection)`: one registration per (key, target)
    fn build_add_services(&mut self, registered: &[(&TypeMap, MethodRef)]) -> MethodDef {
        let mut method = MethodDef::new(ADD_SERVICES, MethodKind::Method);
        method.is_static = true;
        method.parameters.push(ParamDef {
            name: "collection".into(),
            type_name: runtime::SERVICE_COLLECTION.to_string(),
            default: None,
            attributes: Vec::new(),
        });

        let mut body = MethodBody::new();
        let isolate = self.settings.debug_exceptions;
        let mut injector = InstructionInjector::new(&mut body);

        let (errors, caught) = if isolate {
            let errors = injector.add_local(EXCEPTION_LIST);
            let caught = injector.add_local(runtime::EXCEPTION);
            injector.insert_all([
                Op::NewObj(MethodRef::new(EXCEPTION_LIST, CONSTRUCTOR)),
                Op::StoreLocal(errors),
            ]);
            (errors, caught)
        } else {
            (0, 0)
        };

        for (map, factory) in registered {
            for key in &map.keys {
                let register = [
                    Op::LoadArg(0),
                    Op::LoadConst(Constant::Type(key.key.clone())),
                    Op::LoadConst(Constant::Type(map.target.clone())),
                    Op::LoadFunction(factory.clone()),
                    Op::LoadConst(Constant::Str(key.lifetime.as_str().to_string())),
                    Op::Call(MethodRef::new(runtime::SERVICE_COLLECTION, "AddAutoDIService")),
                ];
                if !isolate {
                    injector.insert_all(register);
                    continue;
                }

                let try_start = injector.label();
                let handler_start = injector.label();
                let next = injector.label();
                let mut ops = register.into_iter();
                if let Some(first) = ops.next() {
                    injector.insert_labeled(try_start, first);
                }
                injector.insert_all(ops);
                injector.insert(Op::Leave(next));
                injector.insert_labeled(handler_start, Op::StoreLocal(caught));
                injector.insert_all([
                    Op::LoadLocal(errors),
                    Op::LoadLocal(caught),
                    Op::Call(MethodRef::new(EXCEPTION_LIST, "Add")),
                    Op::Leave(next),
                ]);
                injector.insert_labeled(next, Op::Nop);
                injector.add_handler(ExceptionHandler {
                    kind: HandlerKind::Catch(runtime::EXCEPTION.to_string()),
                    try_start,
                    try_end: handler_start,
                    handler_start,
                    handler_end: next,
                });
            }
        }

        if isolate {
            let done = injector.label();
            injector.insert_all([
                Op::LoadLocal(errors),
                Op::Call(MethodRef::new(EXCEPTION_LIST, "get_Count")),
                Op::Branch {
                    cond: BranchCond::IfNull,
                    target: done,
                },
                Op::LoadConst(Constant::Str("Error in AutoDI.AddServices".into())),
                Op::LoadLocal(errors),
                Op::NewObj(MethodRef::new(runtime::AGGREGATE_EXCEPTION, CONSTRUCTOR)),
                Op::Throw,
            ]);
            injector.insert_labeled(done, Op::Return);
        } else {
            injector.insert(Op::Return);
        }

        method.body = Some(body);
        method
    }

    /// The single valid setup method of the module, if any
    fn find_setup_method(&mut self, module: &ModuleDef) -> Option<MethodRef> {
        let candidates: Vec<(&TypeDef, &MethodDef)> = module
            .types
            .iter()
            .flat_map(|t| t.methods.iter().map(move |m| (t, m)))
            .filter(|(_, m)| m.has_attribute(|a| matches!(a, Attribute::SetupMethod)))
            .collect();

        let (ty, method) = match candidates.as_slice() {
            [] => return None,
            [only] => *only,
            many => {
                self.diagnostics.warning(format!(
                    "Found {} setup methods; only one is allowed, setup disabled",
                    many.len()
                ));
                return None;
            }
        };

        let valid_parameters = matches!(
            method.parameters.as_slice(),
            [p] if p.type_name == runtime::APPLICATION_BUILDER
        );
        if !method.is_static || !method.accessibility.is_module_visible() || !valid_parameters {
            self.diagnostics.warning(format!(
                "Setup method {}::{} must be static, accessible and take a single {} parameter; setup disabled",
                ty.name,
                method.name,
                runtime::APPLICATION_BUILDER
            ));
            return None;
        }

        debug!(target: "autodi", type_name = %ty.name, method = %method.name, "Using setup method");
        Some(
            MethodRef::new(&ty.name, &method.name)
                .with_parameters(vec![runtime::APPLICATION_BUILDER.to_string()]),
        )
    }

    fn inject_init_call(&mut self, module: &mut ModuleDef) -> bool {
        let call = [
            Op::LoadNull,
            Op::Call(container_method(INIT).with_parameters(vec![CONFIGURE_CALLBACK.to_string()])),
        ];

        match self.settings.init_mode {
            InitMode::Manual => false,
            InitMode::EntryPoint => {
                let Some(entry) = module.entry_point.clone() else {
                    self.diagnostics.warning(format!(
                        "Module {} has no entry point; call {CONTAINER_TYPE}.{INIT} manually",
                        module.name
                    ));
                    return false;
                };
                let body = module
                    .type_def_mut(&entry.declaring_type)
                    .and_then(|t| t.method_mut(&entry.name))
                    .and_then(|m| m.body.as_mut());
                match body {
                    Some(body) if calls_init(&*body) => {
                        debug!(target: "autodi", entry = %entry, "Entry point already calls Init");
                        true
                    }
                    Some(body) => {
                        let mut injector = InstructionInjector::new(body);
                        injector.seek_start();
                        injector.insert_all(call);
                        true
                    }
                    None => {
                        self.diagnostics
                            .warning(format!("Entry point {entry} has no body; Init not injected"));
                        false
                    }
                }
            }
            InitMode::ModuleLoad => {
                let initializer = module.module_initializer.get_or_insert_with(|| {
                    let mut cctor = MethodDef::new(STATIC_CONSTRUCTOR, MethodKind::StaticConstructor);
                    cctor.accessibility = Accessibility::Private;
                    cctor
                });
                let body = initializer
                    .body
                    .get_or_insert_with(|| MethodBody::from_ops([Op::Return]));
                if !calls_init(body) {
                    let mut injector = InstructionInjector::new(body);
                    injector.seek_start();
                    injector.insert_all(call);
                }
                true
            }
        }
    }
}

/// `static K Factory(IServiceProvider provider)`: resolves each constructor
/// parameter from the provider, then constructs the target
fn build_factory(target: &str, ctor: &MethodDef) -> MethodDef {
    let mut factory = MethodDef::new(factory_name(target), MethodKind::Method);
    factory.is_static = true;
    factory.accessibility = Accessibility::Private;
    factory.return_type = Some(target.to_string());
    factory.parameters.push(ParamDef {
        name: "serviceProvider".into(),
        type_name: runtime::SERVICE_PROVIDER.to_string(),
        default: None,
        attributes: Vec::new(),
    });

    let mut ops = Vec::with_capacity(ctor.parameters.len() * 3 + 2);
    for param in &ctor.parameters {
        let args = param.dependency().map(<[Constant]>::to_vec).unwrap_or_default();
        let mut resolve = get_service(&param.type_name);
        resolve.declaring_type = runtime::SERVICE_PROVIDER.to_string();
        ops.extend([Op::LoadArg(0), Op::LoadConstArray(args), Op::Call(resolve)]);
    }
    ops.push(Op::NewObj(
        MethodRef::new(target, CONSTRUCTOR).with_parameters(ctor.parameter_types()),
    ));
    ops.push(Op::Return);

    factory.body = Some(MethodBody::from_ops(ops));
    factory
}

/// `Init(configure)`
fn build_init(setup: Option<&MethodRef>) -> MethodDef {
    let mut method = MethodDef::new(INIT, MethodKind::Method);
    method.is_static = true;
    method.parameters.push(ParamDef {
        name: "configure".into(),
        type_name: CONFIGURE_CALLBACK.to_string(),
        default: Some(Constant::Null),
        attributes: Vec::new(),
    });

    let mut body = MethodBody::new();
    let mut injector = InstructionInjector::new(&mut body);
    let builder = injector.add_local(runtime::APPLICATION_BUILDER);
    let build = injector.label();
    let skip_configure = injector.label();

    injector.insert_all([
        Op::LoadStaticField(PROVIDER_FIELD.to_string()),
        Op::Branch {
            cond: BranchCond::IfNull,
            target: build,
        },
        Op::NewObj(MethodRef::new(runtime::ALREADY_INITIALIZED, CONSTRUCTOR)),
        Op::Throw,
    ]);
    injector.insert_labeled(
        build,
        Op::NewObj(MethodRef::new("AutoDI.ApplicationBuilder", CONSTRUCTOR)),
    );
    injector.insert_all([
        Op::StoreLocal(builder),
        Op::LoadLocal(builder),
        Op::LoadFunction(
            container_method(ADD_SERVICES)
                .with_parameters(vec![runtime::SERVICE_COLLECTION.to_string()]),
        ),
        Op::Call(MethodRef::new(runtime::APPLICATION_BUILDER, "ConfigureServices")),
        Op::Pop,
    ]);
    if let Some(setup) = setup {
        injector.insert_all([Op::LoadLocal(builder), Op::Call(setup.clone())]);
    }
    injector.insert_all([
        Op::LoadArg(0),
        Op::Branch {
            cond: BranchCond::IfNull,
            target: skip_configure,
        },
        Op::LoadArg(0),
        Op::LoadLocal(builder),
        Op::Call(MethodRef::new(CONFIGURE_CALLBACK, "Invoke")),
    ]);
    injector.insert_labeled(skip_configure, Op::Nop);
    injector.insert_all([
        Op::LoadLocal(builder),
        Op::Call(MethodRef::new(runtime::APPLICATION_BUILDER, "Build")),
        Op::StoreStaticField(PROVIDER_FIELD.to_string()),
        Op::LoadStaticField(PROVIDER_FIELD.to_string()),
        Op::Call(MethodRef::new(runtime::GLOBAL_DI, runtime::REGISTER)),
        Op::Return,
    ]);

    method.body = Some(body);
    method
}

/// `Dispose()`: no-op unless a provider is published
fn build_dispose() -> MethodDef {
    let mut method = MethodDef::new(DISPOSE, MethodKind::Method);
    method.is_static = true;

    let mut body = MethodBody::new();
    let mut injector = InstructionInjector::new(&mut body);
    let done = injector.label();
    injector.insert_all([
        Op::LoadStaticField(PROVIDER_FIELD.to_string()),
        Op::Branch {
            cond: BranchCond::IfNull,
            target: done,
        },
        Op::LoadStaticField(PROVIDER_FIELD.to_string()),
        Op::Call(MethodRef::new("System.IDisposable", DISPOSE)),
        Op::LoadStaticField(PROVIDER_FIELD.to_string()),
        Op::Call(MethodRef::new(runtime::GLOBAL_DI, runtime::UNREGISTER)),
        Op::LoadNull,
        Op::StoreStaticField(PROVIDER_FIELD.to_string()),
    ]);
    injector.insert_labeled(done, Op::Return);

    method.body = Some(body);
    method
}
