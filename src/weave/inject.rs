//! Member instrumentation
//!
//! Rewrites parameters and properties carrying the dependency marker so an
//! unset value is filled from the global resolution registry:
//!
//! ```text
//!     <load current value>
//!     brtrue  skip
//!     <load marker args as object[]>
//!     call    GlobalDI::GetService<T>
//!     <store value>
//! skip:
//! ```
//!
//! A value supplied by the caller is never replaced.

use super::il::{BranchCond, InstructionInjector, MethodBody, Op};
use super::model::{HasAttributes, MethodDef, MethodRef, PropertyDef, TypeDef, runtime};
use crate::Constant;
use crate::logging::Diagnostics;

use tracing::debug;

/// Call to the runtime's generic resolve entry point for `type_name`
pub fn get_service(type_name: &str) -> MethodRef {
    MethodRef::new(runtime::GLOBAL_DI, runtime::GET_SERVICE)
        .with_generic(type_name)
        .with_parameters(vec![runtime::OBJECT_ARRAY.to_string()])
}

/// How a property is read and written
enum PropertyAccess {
    Field(String),
    Setter {
        setter: MethodRef,
        getter: Option<MethodRef>,
    },
}

/// Instruments the members of one type at a time
pub struct MemberInjector<'d> {
    diagnostics: &'d mut Diagnostics,
}

impl<'d> MemberInjector<'d> {
    pub fn new(diagnostics: &'d mut Diagnostics) -> Self {
        Self { diagnostics }
    }

    /// Instrument every marked parameter and property of `ty`.
    ///
    /// Returns the number of resolve sequences inserted.
    pub fn inject_type(&mut self, ty: &mut TypeDef) -> usize {
        let type_name = ty.name.clone();
        let properties = self.injectable_properties(ty);

        let mut injected = 0;
        for method in ty.methods.iter_mut() {
            injected += self.inject_parameters(&type_name, method);
            if method.is_instance_constructor() && !properties.is_empty() {
                injected += inject_properties(&type_name, method, &properties);
            }
        }

        if injected > 0 {
            debug!(target: "autodi", type_name = %type_name, sites = injected, "Instrumented type");
        }
        injected
    }

    fn inject_parameters(&mut self, type_name: &str, method: &mut MethodDef) -> usize {
        let marked: Vec<(u16, String, Vec<Constant>)> = method
            .parameters
            .iter()
            .enumerate()
            .filter_map(|(i, p)| {
                let args = p.dependency()?;
                Some((method.arg_slot(i), p.type_name.clone(), args.to_vec()))
            })
            .collect();
        if marked.is_empty() {
            return 0;
        }

        for param in method.parameters.iter().filter(|p| p.dependency().is_some()) {
            match &param.default {
                None => self.diagnostics.warning(format!(
                    "Parameter '{}' of {type_name}::{} is marked as a dependency but is not optional",
                    param.name, method.name
                )),
                Some(value) if !value.is_null() => self.diagnostics.warning(format!(
                    "Parameter '{}' of {type_name}::{} has a non-null default; it will never be injected",
                    param.name, method.name
                )),
                Some(_) => {}
            }
        }

        let Some(body) = method.body.as_mut() else {
            self.diagnostics
                .verbose(format!("{type_name}::{} has no body to instrument", method.name));
            return 0;
        };

        let mut injector = InstructionInjector::new(body);
        injector.seek_start();
        for (slot, param_type, args) in &marked {
            let skip = injector.label();
            injector.insert_all([
                Op::LoadArg(*slot),
                Op::Branch {
                    cond: BranchCond::IfNotNull,
                    target: skip,
                },
                Op::LoadConstArray(args.clone()),
                Op::Call(get_service(param_type)),
                Op::StoreArg(*slot),
            ]);
            injector.insert_labeled(skip, Op::Nop);
        }
        marked.len()
    }

    /// Marked properties that can be written, with warnings for the rest
    fn injectable_properties(&mut self, ty: &TypeDef) -> Vec<(PropertyDef, PropertyAccess)> {
        ty.properties
            .iter()
            .filter(|p| p.dependency().is_some())
            .filter_map(|property| {
                let access = match (&property.backing_field, &property.setter) {
                    (Some(field), _) => PropertyAccess::Field(field.clone()),
                    (None, Some(setter)) => PropertyAccess::Setter {
                        setter: MethodRef::new(&ty.name, setter)
                            .with_parameters(vec![property.type_name.clone()]),
                        getter: property
                            .getter
                            .as_ref()
                            .map(|getter| MethodRef::new(&ty.name, getter)),
                    },
                    (None, None) => {
                        self.diagnostics.warning(format!(
                            "Property {}::{} has neither a setter nor a backing field; not injected",
                            ty.name, property.name
                        ));
                        return None;
                    }
                };
                Some((property.clone(), access))
            })
            .collect()
    }
}

/// Insert property resolve sequences after the base constructor call.
///
/// Constructors that delegate to another constructor of the same type are
/// left alone; the delegate does the work.
fn inject_properties(
    type_name: &str,
    ctor: &mut MethodDef,
    properties: &[(PropertyDef, PropertyAccess)],
) -> usize {
    let Some(body) = ctor.body.as_mut() else {
        return 0;
    };

    let chained = body.instructions.iter().find_map(|i| match &i.op {
        Op::Call(target) if target.is_constructor() => Some(target.clone()),
        _ => None,
    });
    if chained
        .as_ref()
        .is_some_and(|target| target.declaring_type == type_name)
    {
        return 0;
    }

    for (_, access) in properties {
        if let PropertyAccess::Field(field) = access {
            strip_null_initializer(body, field);
        }
    }

    let after = chained.and_then(|target| {
        body.instructions
            .iter()
            .find(|i| matches!(&i.op, Op::Call(t) if *t == target))
            .map(|i| i.label)
    });

    let mut injector = InstructionInjector::new(body);
    match after {
        Some(label) => {
            injector.seek_after(label);
        }
        None => injector.seek_start(),
    }

    for (property, access) in properties {
        let args = property.dependency().map(<[Constant]>::to_vec).unwrap_or_default();
        let skip = injector.label();

        match access {
            PropertyAccess::Field(field) => {
                injector.insert_all([Op::LoadArg(0), Op::LoadField(field.clone())]);
                injector.insert(Op::Branch {
                    cond: BranchCond::IfNotNull,
                    target: skip,
                });
            }
            PropertyAccess::Setter {
                getter: Some(getter),
                ..
            } => {
                injector.insert_all([Op::LoadArg(0), Op::Call(getter.clone())]);
                injector.insert(Op::Branch {
                    cond: BranchCond::IfNotNull,
                    target: skip,
                });
            }
            // Write-only: nothing to compare against
            PropertyAccess::Setter { getter: None, .. } => {}
        }

        injector.insert_all([
            Op::LoadArg(0),
            Op::LoadConstArray(args),
            Op::Call(get_service(&property.type_name)),
        ]);
        injector.insert(match access {
            PropertyAccess::Field(field) => Op::StoreField(field.clone()),
            PropertyAccess::Setter { setter, .. } => Op::Call(setter.clone()),
        });
        injector.insert_labeled(skip, Op::Nop);
    }
    properties.len()
}

/// Remove `this.field = null` so it cannot overwrite the injected value
fn strip_null_initializer(body: &mut MethodBody, field: &str) {
    let found = body.instructions.windows(3).position(|w| {
        matches!(
            (&w[0].op, &w[1].op, &w[2].op),
            (Op::LoadArg(0), Op::LoadNull, Op::StoreField(f)) if f == field
        )
    });
    if let Some(start) = found {
        InstructionInjector::new(body).remove_range(start..start + 3);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::{DebugLogLevel, Severity};
    use crate::weave::model::{Attribute, CONSTRUCTOR, MethodKind, ParamDef};

    fn dependency() -> Vec<Attribute> {
        vec![Attribute::Dependency { args: Vec::new() }]
    }

    fn param(name: &str, type_name: &str, default: Option<Constant>) -> ParamDef {
        ParamDef {
            name: name.into(),
            type_name: type_name.into(),
            default,
            attributes: dependency(),
        }
    }

    fn ctor_calling(base: &str, extra: Vec<Op>) -> MethodDef {
        let mut ctor = MethodDef::new(CONSTRUCTOR, MethodKind::Constructor);
        let mut ops = extra;
        ops.push(Op::LoadArg(0));
        ops.push(Op::Call(MethodRef::new(base, CONSTRUCTOR)));
        ops.push(Op::Return);
        ctor.body = Some(MethodBody::from_ops(ops));
        ctor
    }

    fn property(name: &str, backing: Option<&str>, setter: Option<&str>) -> PropertyDef {
        PropertyDef {
            name: name.into(),
            type_name: "App.IClock".into(),
            getter: Some(format!("get_{name}")),
            setter: setter.map(str::to_string),
            backing_field: backing.map(str::to_string),
            attributes: dependency(),
        }
    }

    #[test]
    fn test_parameter_guard_sequence() {
        let mut method = MethodDef::new("Run", MethodKind::Method);
        method.parameters.push(ParamDef {
            name: "name".into(),
            type_name: "System.String".into(),
            default: None,
            attributes: Vec::new(),
        });
        let mut clock = param("clock", "App.IClock", Some(Constant::Null));
        clock.attributes = vec![Attribute::Dependency {
            args: vec![Constant::Str("utc".into())],
        }];
        method.parameters.push(clock);
        method.body = Some(MethodBody::from_ops([Op::Return]));

        let mut ty = TypeDef::class("App.Service");
        ty.methods.push(method);

        let mut diagnostics = Diagnostics::default();
        assert_eq!(MemberInjector::new(&mut diagnostics).inject_type(&mut ty), 1);
        assert!(diagnostics.warnings().next().is_none());

        let body = ty.method("Run").unwrap().body.as_ref().unwrap();
        let ops: Vec<&Op> = body.ops().collect();
        assert_eq!(ops[0], &Op::LoadArg(2));
        assert!(matches!(ops[1], Op::Branch { cond: BranchCond::IfNotNull, .. }));
        assert_eq!(ops[2], &Op::LoadConstArray(vec![Constant::Str("utc".into())]));
        assert_eq!(ops[3], &Op::Call(get_service("App.IClock")));
        assert_eq!(ops[4], &Op::StoreArg(2));
        assert_eq!(ops[5], &Op::Nop);
        assert_eq!(ops[6], &Op::Return);
        assert_eq!(ops[1].branch_target(), Some(body.instructions[5].label));
        assert!(body.labels_resolve());
    }

    #[test]
    fn test_parameter_default_warnings() {
        let mut method = MethodDef::new("Run", MethodKind::Method);
        method.is_static = true;
        method.parameters.push(param("a", "App.IA", None));
        method.parameters.push(param("b", "App.IB", Some(Constant::I32(3))));
        method.body = Some(MethodBody::from_ops([Op::Return]));
        let mut ty = TypeDef::class("App.Service");
        ty.methods.push(method);

        let mut diagnostics = Diagnostics::new(DebugLogLevel::Default);
        let injected = MemberInjector::new(&mut diagnostics).inject_type(&mut ty);
        assert_eq!(injected, 2);
        assert_eq!(diagnostics.warnings().count(), 2);

        let body = ty.method("Run").unwrap().body.as_ref().unwrap();
        assert_eq!(body.instructions[0].op, Op::LoadArg(0));
    }

    #[test]
    fn test_backing_field_injected_after_base_call() {
        let mut ty = TypeDef::new("App.Service", crate::weave::model::TypeKind::Class);
        ty.base_type = Some("App.Base".into());
        ty.properties.push(property("Clock", Some("<Clock>k__BackingField"), None));
        ty.methods.push(ctor_calling(
            "App.Base",
            vec![
                Op::LoadArg(0),
                Op::LoadNull,
                Op::StoreField("<Clock>k__BackingField".into()),
            ],
        ));

        let mut diagnostics = Diagnostics::default();
        assert_eq!(MemberInjector::new(&mut diagnostics).inject_type(&mut ty), 1);

        let body = ty.constructors().next().unwrap().body.as_ref().unwrap();
        let ops: Vec<&Op> = body.ops().collect();
        assert_eq!(ops[0], &Op::LoadArg(0));
        assert!(matches!(ops[1], Op::Call(m) if m.is_constructor()));
        assert_eq!(ops[2], &Op::LoadArg(0));
        assert_eq!(ops[3], &Op::LoadField("<Clock>k__BackingField".into()));
        assert!(matches!(ops[4], Op::Branch { .. }));
        assert_eq!(ops[7], &Op::Call(get_service("App.IClock")));
        assert_eq!(ops[8], &Op::StoreField("<Clock>k__BackingField".into()));
        assert_eq!(ops[9], &Op::Nop);
        assert_eq!(ops[10], &Op::Return);
        assert!(!ops.contains(&&Op::LoadNull));
        assert!(body.labels_resolve());
    }

    #[test]
    fn test_setter_used_without_backing_field() {
        let mut ty = TypeDef::new("App.Service", crate::weave::model::TypeKind::Class);
        ty.properties.push(property("Clock", None, Some("set_Clock")));
        ty.methods.push(ctor_calling("System.Object", Vec::new()));

        let mut diagnostics = Diagnostics::default();
        MemberInjector::new(&mut diagnostics).inject_type(&mut ty);

        let body = ty.constructors().next().unwrap().body.as_ref().unwrap();
        let calls: Vec<&MethodRef> = body
            .ops()
            .filter_map(|op| match op {
                Op::Call(m) => Some(m),
                _ => None,
            })
            .collect();
        let names: Vec<&str> = calls.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec![CONSTRUCTOR, "get_Clock", "GetService", "set_Clock"]);
    }

    #[test]
    fn test_unwritable_property_skipped_with_warning() {
        let mut ty = TypeDef::class("App.Service");
        ty.properties.push(property("Clock", None, None));
        ty.methods[0].body = Some(MethodBody::from_ops([Op::Return]));

        let mut diagnostics = Diagnostics::default();
        assert_eq!(MemberInjector::new(&mut diagnostics).inject_type(&mut ty), 0);
        let warning = diagnostics.warnings().next().unwrap();
        assert_eq!(warning.severity, Severity::Warning);
        assert_eq!(ty.methods[0].body.as_ref().unwrap().len(), 1);
    }

    #[test]
    fn test_delegating_constructor_not_instrumented() {
        let mut ty = TypeDef::new("App.Service", crate::weave::model::TypeKind::Class);
        ty.properties.push(property("Clock", Some("_clock"), None));
        ty.methods.push(ctor_calling("App.Service", Vec::new()));

        let mut diagnostics = Diagnostics::default();
        assert_eq!(MemberInjector::new(&mut diagnostics).inject_type(&mut ty), 0);
    }

    #[test]
    fn test_properties_ignored_outside_constructors() {
        let mut ty = TypeDef::new("App.Service", crate::weave::model::TypeKind::Class);
        ty.properties.push(property("Clock", Some("_clock"), None));
        let mut method = MethodDef::new("Run", MethodKind::Method);
        method.body = Some(MethodBody::from_ops([Op::Return]));
        ty.methods.push(method);

        let mut diagnostics = Diagnostics::default();
        assert_eq!(MemberInjector::new(&mut diagnostics).inject_type(&mut ty), 0);
    }
}
