//! Weave orchestration
//!
//! Reads the type universe, resolves the mapping, instruments the primary
//! module's types and synthesizes its container.

use super::encode::Encoder;
use super::inject::MemberInjector;
use super::mapping::{Mapping, MappingResolver};
use super::model::ModuleDef;
use super::reader::{ModuleResolver, TypeGraphReader};
use super::settings::Settings;
use super::synth::{CONTAINER_TYPE, ContainerSynthesizer, Synthesized};
use crate::WeaveResult;
use crate::logging::{Diagnostic, Diagnostics};
use serde::Serialize;
use std::io::Write;
use std::time::Instant;

use tracing::{info, warn};

/// What a weave did
#[derive(Debug, Clone, Serialize)]
pub struct WeaveReport {
    pub module: String,
    pub mapping: Mapping,
    pub diagnostics: Vec<Diagnostic>,
    /// Resolve sequences inserted into parameters and properties
    pub injected_sites: usize,
    /// Registrations emitted into `AddServices`; zero when generation is off
    pub generated_registrations: usize,
    pub init_injected: bool,
}

impl WeaveReport {
    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == crate::logging::Severity::Warning)
    }
}

#[derive(Debug, Clone)]
pub struct WeaveOutput {
    /// The rewritten primary module
    pub module: ModuleDef,
    pub report: WeaveReport,
}

/// Rewrites one module at a time against a resolver
pub struct Weaver<'r> {
    resolver: &'r dyn ModuleResolver,
    settings: Settings,
}

impl<'r> Weaver<'r> {
    pub fn new(resolver: &'r dyn ModuleResolver, settings: Settings) -> Self {
        Self { resolver, settings }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Weave the module named `primary`.
    ///
    /// Settings attributes on the module override the weaver's settings.
    /// Fails on configuration errors and DI-constructor ambiguity; every
    /// other problem lands in the report's diagnostics.
    pub fn weave(&self, primary: &str) -> WeaveResult<WeaveOutput> {
        let start = Instant::now();
        let source = self.resolver.resolve(primary).map_err(|_| {
            crate::WeaveError::PrimaryModuleUnresolved(primary.to_string())
        })?;

        let settings = match source.settings_override() {
            Some(over) => self.settings.clone().merged(&over),
            None => self.settings.clone(),
        };
        let mut diagnostics = Diagnostics::new(settings.debug_log_level);
        if settings.debug_code_generation {
            diagnostics.info("Code generation debugging requested; no source is emitted");
        }

        let universe =
            TypeGraphReader::new(self.resolver).get_all_types(primary, &settings, &mut diagnostics)?;
        let mapping = MappingResolver::new(&mut diagnostics).resolve(&settings, &universe)?;

        let mut module = (*source).clone();
        let rewoven = module.type_def(CONTAINER_TYPE).is_some();

        let mut injected_sites = 0;
        if rewoven {
            // Members already carry their resolve sequences
            warn!(target: "autodi", module = %module.name, "Module was already woven; regenerating container only");
            diagnostics.verbose(format!("{} already woven; members left as they are", module.name));
        } else {
            let mut injector = MemberInjector::new(&mut diagnostics);
            for ty in module.types.iter_mut() {
                injected_sites += injector.inject_type(ty);
            }
        }

        let synthesized = if settings.generate_registrations {
            ContainerSynthesizer::new(&settings, &mut diagnostics).synthesize(&mut module, &mapping)?
        } else {
            diagnostics.verbose("Registration generation disabled");
            Synthesized::default()
        };

        info!(
            target: "autodi",
            module = %module.name,
            types = universe.len(),
            targets = mapping.len(),
            injected_sites,
            registrations = synthesized.registrations,
            warnings = diagnostics.warnings().count(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Weave complete"
        );

        let report = WeaveReport {
            module: module.name.clone(),
            mapping,
            diagnostics: diagnostics.into_entries(),
            injected_sites,
            generated_registrations: synthesized.registrations,
            init_injected: synthesized.init_injected,
        };
        Ok(WeaveOutput { module, report })
    }

    /// Weave `primary` and write the result with `encoder`
    pub fn weave_to(
        &self,
        primary: &str,
        encoder: &dyn Encoder,
        sink: &mut dyn Write,
    ) -> WeaveResult<WeaveReport> {
        let output = self.weave(primary)?;
        encoder.encode(&output.module, sink)?;
        Ok(output.report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::weave::model::{Attribute, MARKER_MODULE, ParamDef, PropertyDef, TypeDef};
    use crate::weave::reader::InMemoryResolver;
    use crate::weave::settings::{InitMode, SettingsOverride};
    use crate::{Constant, WeaveError};

    fn module() -> ModuleDef {
        let mut clock = TypeDef::class("App.Clock");
        clock.interfaces.push("App.IClock".into());
        let mut service = TypeDef::class("App.Service");
        service.properties.push(PropertyDef {
            name: "Clock".into(),
            type_name: "App.IClock".into(),
            getter: Some("get_Clock".into()),
            setter: None,
            backing_field: Some("<Clock>k__BackingField".into()),
            attributes: vec![Attribute::Dependency { args: Vec::new() }],
        });
        service.methods[0].body = Some(crate::weave::il::MethodBody::from_ops([
            crate::weave::il::Op::Return,
        ]));
        service.methods[0].parameters.push(ParamDef {
            name: "name".into(),
            type_name: "System.String".into(),
            default: Some(Constant::Null),
            attributes: Vec::new(),
        });

        ModuleDef::new("App")
            .with_reference(MARKER_MODULE)
            .with_type(TypeDef::interface("App.IClock"))
            .with_type(clock)
            .with_type(service)
    }

    #[test]
    fn test_weave_reports_everything() {
        let resolver = InMemoryResolver::new().with(module());
        let settings = Settings {
            init_mode: InitMode::Manual,
            ..Settings::default()
        };
        let output = Weaver::new(&resolver, settings).weave("App").unwrap();

        assert_eq!(output.report.injected_sites, 1);
        assert_eq!(output.report.generated_registrations, 3);
        assert!(output.module.type_def(CONTAINER_TYPE).is_some());
        assert!(!output.report.init_injected);
    }

    #[test]
    fn test_module_override_disables_generation() {
        let mut source = module();
        source.attributes.push(Attribute::Settings(SettingsOverride {
            generate_registrations: Some(false),
            ..Default::default()
        }));
        let resolver = InMemoryResolver::new().with(source);

        let output = Weaver::new(&resolver, Settings::default()).weave("App").unwrap();
        assert!(output.module.type_def(CONTAINER_TYPE).is_none());
        assert_eq!(output.report.generated_registrations, 0);
        assert_eq!(output.report.mapping.len(), 2);
    }

    #[test]
    fn test_unknown_primary() {
        let resolver = InMemoryResolver::new();
        let err = Weaver::new(&resolver, Settings::default())
            .weave("Nope")
            .unwrap_err();
        assert!(matches!(err, WeaveError::PrimaryModuleUnresolved(name) if name == "Nope"));
    }
}
