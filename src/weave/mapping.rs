//! Mapping resolution
//!
//! Decides which concrete target satisfies which key, and with what
//! lifetime. Passes run in a fixed order and later ones win:
//!
//! 1. base classes: each ancestor maps to its concrete descendants
//! 2. concrete classes: each concrete class maps to itself
//! 3. single interface implementation: an interface with exactly one
//!    concrete implementor maps to it
//! 4. explicit rules from settings and attributes
//!
//! Entries are grouped by target. Each (key, target) pair carries its own
//! lifetime, so a class registered as itself (Transient) and as its only
//! interface (LazySingleton) keeps both.

use super::model::HasAttributes;
use super::pattern::Matcher;
use super::reader::{CandidateType, TypeUniverse};
use super::settings::{Behaviors, Settings};
use crate::logging::Diagnostics;
use crate::{Lifetime, WeaveError, WeaveResult};
use serde::{Deserialize, Serialize};

use tracing::{debug, info, trace};

/// Which pass or rule produced a registration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MapSource {
    BaseClass,
    ConcreteClass,
    SingleInterface,
    Settings,
    ModuleAttribute,
    TypeAttribute,
}

impl MapSource {
    #[inline]
    pub fn is_explicit(self) -> bool {
        matches!(
            self,
            MapSource::Settings | MapSource::ModuleAttribute | MapSource::TypeAttribute
        )
    }
}

/// Why a candidate registration was dropped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Rejection {
    OpenGeneric,
    InaccessibleNesting,
    NotAssignable,
    TargetNotFound,
    NotConcrete,
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Rejection::OpenGeneric => "open generic type",
            Rejection::InaccessibleNesting => "enclosing type chain is not accessible",
            Rejection::NotAssignable => "target is not assignable to key",
            Rejection::TargetNotFound => "named target type does not exist",
            Rejection::NotConcrete => "target is not a concrete class",
        })
    }
}

/// One key of a target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyMap {
    pub key: String,
    pub lifetime: Lifetime,
    pub source: MapSource,
}

/// All keys mapped to one target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeMap {
    pub target: String,
    /// Module that owns the target
    pub module: String,
    pub keys: Vec<KeyMap>,
}

impl TypeMap {
    pub fn key(&self, key: &str) -> Option<&KeyMap> {
        self.keys.iter().find(|k| k.key == key)
    }
}

/// Resolved mapping, ordered by first registration of each target
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mapping {
    maps: Vec<TypeMap>,
}

impl Mapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map `key` to `target`; an existing pair takes the new lifetime and
    /// source.
    pub fn add(
        &mut self,
        key: &str,
        target: &CandidateType,
        lifetime: Lifetime,
        source: MapSource,
    ) {
        let map = match self.maps.iter().position(|m| m.target == target.name()) {
            Some(i) => &mut self.maps[i],
            None => {
                self.maps.push(TypeMap {
                    target: target.name().to_string(),
                    module: target.module.clone(),
                    keys: Vec::new(),
                });
                let last = self.maps.len() - 1;
                &mut self.maps[last]
            }
        };

        match map.keys.iter_mut().find(|k| k.key == key) {
            Some(existing) => {
                existing.lifetime = lifetime;
                existing.source = source;
            }
            None => map.keys.push(KeyMap {
                key: key.to_string(),
                lifetime,
                source,
            }),
        }
    }

    pub fn get(&self, target: &str) -> Option<&TypeMap> {
        self.maps.iter().find(|m| m.target == target)
    }

    pub fn iter(&self) -> impl Iterator<Item = &TypeMap> {
        self.maps.iter()
    }

    pub fn keys_for(&self, target: &str) -> Vec<&str> {
        self.get(target)
            .map(|m| m.keys.iter().map(|k| k.key.as_str()).collect())
            .unwrap_or_default()
    }

    pub fn targets_for_key(&self, key: &str) -> Vec<&str> {
        self.maps
            .iter()
            .filter(|m| m.key(key).is_some())
            .map(|m| m.target.as_str())
            .collect()
    }

    pub fn lifetime_of(&self, key: &str, target: &str) -> Option<Lifetime> {
        self.get(target)?.key(key).map(|k| k.lifetime)
    }

    /// Set the lifetime of every key of `target`
    pub fn set_lifetime(&mut self, target: &str, lifetime: Lifetime) -> bool {
        match self.maps.iter_mut().find(|m| m.target == target) {
            Some(map) => {
                map.keys.iter_mut().for_each(|k| k.lifetime = lifetime);
                true
            }
            None => false,
        }
    }

    pub fn remove(&mut self, target: &str) -> Option<TypeMap> {
        let pos = self.maps.iter().position(|m| m.target == target)?;
        Some(self.maps.remove(pos))
    }

    /// Drop one key of `target`, and the target once it has none left
    pub fn remove_key(&mut self, target: &str, key: &str) -> bool {
        let Some(pos) = self.maps.iter().position(|m| m.target == target) else {
            return false;
        };
        let map = &mut self.maps[pos];
        let before = map.keys.len();
        map.keys.retain(|k| k.key != key);
        let removed = map.keys.len() != before;
        if map.keys.is_empty() {
            self.maps.remove(pos);
        }
        removed
    }

    /// `(key, target, lifetime)` triples in registration order
    pub fn registrations(&self) -> impl Iterator<Item = (&str, &str, Lifetime)> {
        self.maps.iter().flat_map(|m| {
            m.keys
                .iter()
                .map(move |k| (k.key.as_str(), m.target.as_str(), k.lifetime))
        })
    }

    /// Number of targets
    #[inline]
    pub fn len(&self) -> usize {
        self.maps.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.maps.is_empty()
    }

    pub fn registration_count(&self) -> usize {
        self.maps.iter().map(|m| m.keys.len()).sum()
    }
}

enum RenameTarget {
    /// Computed from the matcher's replacement template
    Template,
    Fixed(String),
}

enum Rule {
    Rename {
        matcher: Matcher,
        target: RenameTarget,
        force: bool,
        lifetime: Option<Lifetime>,
        source: MapSource,
    },
    Lifetime {
        matcher: Matcher,
        lifetime: Lifetime,
        source: MapSource,
    },
}

/// Runs the mapping passes over a type universe
pub struct MappingResolver<'d> {
    diagnostics: &'d mut Diagnostics,
}

impl<'d> MappingResolver<'d> {
    pub fn new(diagnostics: &'d mut Diagnostics) -> Self {
        Self { diagnostics }
    }

    /// Build the mapping.
    ///
    /// Fails only on malformed rules; rejected candidates are reported as
    /// verbose diagnostics.
    pub fn resolve(&mut self, settings: &Settings, universe: &TypeUniverse) -> WeaveResult<Mapping> {
        let mut mapping = Mapping::new();

        let base_classes = settings.has(Behaviors::INCLUDE_BASE_CLASSES);
        let classes = settings.has(Behaviors::INCLUDE_CLASSES);
        if base_classes || classes {
            let eligible = self.eligible_targets(universe);
            if base_classes {
                self.base_class_pass(universe, &eligible, &mut mapping);
            }
            if classes {
                self.concrete_class_pass(&eligible, &mut mapping);
            }
        }
        if settings.has(Behaviors::SINGLE_INTERFACE_IMPLEMENTATION) {
            self.single_interface_pass(universe, &mut mapping);
        }

        let rules = collect_rules(settings, universe)?;
        for rule in &rules {
            self.apply(rule, universe, &mut mapping);
        }

        info!(
            target: "autodi",
            targets = mapping.len(),
            registrations = mapping.registration_count(),
            explicit_rules = rules.len(),
            "Mapping resolved"
        );
        Ok(mapping)
    }

    /// Concrete classes the implicit passes may register, with rejections
    /// reported.
    fn eligible_targets<'u>(&mut self, universe: &'u TypeUniverse) -> Vec<&'u CandidateType> {
        universe
            .iter()
            .filter(|t| t.is_concrete_class())
            .filter(|t| {
                let rejection = if t.is_open_generic() {
                    Some(Rejection::OpenGeneric)
                } else if !universe.is_nested_accessible(t.name()) {
                    Some(Rejection::InaccessibleNesting)
                } else {
                    None
                };
                match rejection {
                    Some(reason) => {
                        self.reject(t.name(), t.name(), reason);
                        false
                    }
                    None => true,
                }
            })
            .collect()
    }

    fn base_class_pass(
        &mut self,
        universe: &TypeUniverse,
        eligible: &[&CandidateType],
        mapping: &mut Mapping,
    ) {
        for &target in eligible {
            let Some(lifetime) = default_lifetime(target, Lifetime::Transient) else {
                continue;
            };
            for ancestor in universe.base_chain(target.name()) {
                if ancestor.is_open_generic() {
                    self.reject(ancestor.name(), target.name(), Rejection::OpenGeneric);
                    continue;
                }
                self.accept(mapping, ancestor.name(), target, lifetime, MapSource::BaseClass);
            }
        }
    }

    fn concrete_class_pass(&mut self, eligible: &[&CandidateType], mapping: &mut Mapping) {
        for &target in eligible {
            if let Some(lifetime) = default_lifetime(target, Lifetime::Transient) {
                self.accept(mapping, target.name(), target, lifetime, MapSource::ConcreteClass);
            }
        }
    }

    fn single_interface_pass(&mut self, universe: &TypeUniverse, mapping: &mut Mapping) {
        // Ineligible implementors still count towards ambiguity
        let mut implementors: Vec<(String, Vec<&CandidateType>)> = Vec::new();
        for ty in universe.iter().filter(|t| t.is_concrete_class()) {
            for interface in universe.interfaces_of(ty.name()) {
                match implementors.iter_mut().find(|(i, _)| *i == interface) {
                    Some((_, types)) => types.push(ty),
                    None => implementors.push((interface, vec![ty])),
                }
            }
        }

        for (interface, types) in implementors {
            let Some(key) = universe.get(&interface) else {
                continue;
            };
            let [target] = types.as_slice() else {
                self.diagnostics.verbose(format!(
                    "Interface {interface} has {} implementations, not mapped",
                    types.len()
                ));
                continue;
            };

            let rejection = if key.is_open_generic() || target.is_open_generic() {
                Some(Rejection::OpenGeneric)
            } else if !universe.is_nested_accessible(target.name()) {
                Some(Rejection::InaccessibleNesting)
            } else {
                None
            };
            if let Some(reason) = rejection {
                self.reject(&interface, target.name(), reason);
                continue;
            }

            if let Some(lifetime) = default_lifetime(target, Lifetime::LazySingleton) {
                self.accept(mapping, &interface, target, lifetime, MapSource::SingleInterface);
            }
        }
    }

    fn apply(&mut self, rule: &Rule, universe: &TypeUniverse, mapping: &mut Mapping) {
        match rule {
            Rule::Rename {
                matcher,
                target,
                force,
                lifetime,
                source,
            } => {
                for key in universe.iter() {
                    let result = matcher.try_match(key.name());
                    if !result.matched {
                        continue;
                    }
                    let target_name = match target {
                        RenameTarget::Fixed(name) => name.clone(),
                        RenameTarget::Template => match result.replacement {
                            Some(name) => name,
                            None => continue,
                        },
                    };
                    let Some(target) = universe.find(&target_name) else {
                        self.reject(key.name(), &target_name, Rejection::TargetNotFound);
                        continue;
                    };

                    let rejection = if key.is_open_generic() || target.is_open_generic() {
                        Some(Rejection::OpenGeneric)
                    } else if !target.is_concrete_class() {
                        Some(Rejection::NotConcrete)
                    } else if !force && !universe.is_assignable_to(target.name(), key.name()) {
                        Some(Rejection::NotAssignable)
                    } else {
                        None
                    };
                    if let Some(reason) = rejection {
                        self.reject(key.name(), target.name(), reason);
                        continue;
                    }

                    let lifetime = lifetime
                        .or_else(|| target.lifetime_attribute())
                        .or_else(|| mapping.lifetime_of(key.name(), target.name()))
                        .unwrap_or(Lifetime::Transient);

                    if lifetime == Lifetime::None {
                        if mapping.remove_key(target.name(), key.name()) {
                            self.diagnostics.verbose(format!(
                                "Removed {} -> {} ({source:?})",
                                key.name(),
                                target.name()
                            ));
                        }
                    } else {
                        self.accept(mapping, key.name(), target, lifetime, *source);
                    }
                }
            }
            Rule::Lifetime {
                matcher,
                lifetime,
                source,
            } => {
                let targets: Vec<String> = mapping
                    .iter()
                    .filter(|m| matcher.is_match(&m.target))
                    .map(|m| m.target.clone())
                    .collect();

                for target in targets {
                    if *lifetime == Lifetime::None {
                        mapping.remove(&target);
                        self.diagnostics
                            .verbose(format!("Removed every key of {target} ({source:?})"));
                    } else {
                        mapping.set_lifetime(&target, *lifetime);
                        debug!(
                            target: "autodi",
                            target_type = %target,
                            lifetime = lifetime.as_str(),
                            source = ?source,
                            "Lifetime overridden"
                        );
                    }
                }
            }
        }
    }

    fn accept(
        &mut self,
        mapping: &mut Mapping,
        key: &str,
        target: &CandidateType,
        lifetime: Lifetime,
        source: MapSource,
    ) {
        debug!(
            target: "autodi",
            key,
            target_type = target.name(),
            lifetime = lifetime.as_str(),
            source = ?source,
            "Mapped"
        );
        self.diagnostics.verbose(format!(
            "Mapped {key} -> {} as {lifetime} ({source:?})",
            target.name()
        ));
        mapping.add(key, target, lifetime, source);
    }

    fn reject(&mut self, key: &str, target: &str, reason: Rejection) {
        trace!(target: "autodi", key, target_type = target, %reason, "Rejected");
        self.diagnostics
            .verbose(format!("Rejected {key} -> {target}: {reason}"));
    }
}

/// Pass default unless the type declares its own; `None` when the type
/// opts out
fn default_lifetime(target: &CandidateType, fallback: Lifetime) -> Option<Lifetime> {
    match target.lifetime_attribute().unwrap_or(fallback) {
        Lifetime::None => None,
        lifetime => Some(lifetime),
    }
}

/// Explicit rules in application order: settings maps, settings types,
/// module attributes, then type attributes.
fn collect_rules(settings: &Settings, universe: &TypeUniverse) -> WeaveResult<Vec<Rule>> {
    let mut rules = Vec::new();

    for map in &settings.maps {
        rules.push(Rule::Rename {
            matcher: Matcher::new(&map.from, &map.to)?,
            target: RenameTarget::Template,
            force: map.force,
            lifetime: map.lifetime,
            source: MapSource::Settings,
        });
    }
    for rule in &settings.types {
        rules.push(Rule::Lifetime {
            matcher: Matcher::literal(&rule.matches)?,
            lifetime: rule.lifetime,
            source: MapSource::Settings,
        });
    }

    for module in universe.modules() {
        for map in module.map_attributes() {
            let rule = match &map.target {
                Some(target) => Rule::Rename {
                    matcher: Matcher::new(&map.source, target)?,
                    target: RenameTarget::Template,
                    force: map.force,
                    lifetime: map.lifetime,
                    source: MapSource::ModuleAttribute,
                },
                None => Rule::Lifetime {
                    matcher: Matcher::literal(&map.source)?,
                    lifetime: map.lifetime.ok_or_else(|| {
                        WeaveError::Config(format!(
                            "map attribute '{}' on module {} has neither target nor lifetime",
                            map.source, module.name
                        ))
                    })?,
                    source: MapSource::ModuleAttribute,
                },
            };
            rules.push(rule);
        }
    }

    for ty in universe.iter() {
        for map in ty.map_attributes() {
            let (matcher, target) = match &map.target {
                Some(target) => (Matcher::new(&map.source, target)?, RenameTarget::Template),
                None => (
                    Matcher::literal(&map.source)?,
                    RenameTarget::Fixed(ty.name().to_string()),
                ),
            };
            rules.push(Rule::Rename {
                matcher,
                target,
                force: map.force,
                lifetime: map.lifetime,
                source: MapSource::TypeAttribute,
            });
        }
    }

    Ok(rules)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::DebugLogLevel;
    use crate::weave::model::{Accessibility, Attribute, MapAttribute, TypeDef};
    use crate::weave::settings::{MapRule, TypeRule};

    fn universe(types: Vec<TypeDef>) -> TypeUniverse {
        let mut universe = TypeUniverse::new();
        for ty in types {
            universe.insert("App", ty);
        }
        universe
    }

    fn implementing(name: &str, interfaces: &[&str]) -> TypeDef {
        let mut ty = TypeDef::class(name);
        ty.interfaces = interfaces.iter().map(|i| i.to_string()).collect();
        ty
    }

    fn resolve(settings: &Settings, universe: &TypeUniverse) -> Mapping {
        let mut diagnostics = Diagnostics::new(DebugLogLevel::Verbose);
        MappingResolver::new(&mut diagnostics)
            .resolve(settings, universe)
            .unwrap()
    }

    #[test]
    fn test_base_class_maps_to_descendant() {
        let mut base = TypeDef::class("App.Animal");
        base.is_abstract = true;
        let mut dog = TypeDef::class("App.Dog");
        dog.base_type = Some("App.Animal".into());
        let universe = universe(vec![base, dog]);

        let mapping = resolve(&Settings::default(), &universe);
        assert_eq!(mapping.targets_for_key("App.Animal"), vec!["App.Dog"]);
        assert_eq!(
            mapping.lifetime_of("App.Animal", "App.Dog"),
            Some(Lifetime::Transient)
        );
        assert!(mapping.get("App.Animal").is_none());
    }

    #[test]
    fn test_single_implementation_gets_both_lifetimes() {
        let universe = universe(vec![
            TypeDef::interface("App.IClock"),
            implementing("App.Clock", &["App.IClock"]),
        ]);

        let mapping = resolve(&Settings::default(), &universe);
        assert_eq!(mapping.keys_for("App.Clock"), vec!["App.Clock", "App.IClock"]);
        assert_eq!(
            mapping.lifetime_of("App.IClock", "App.Clock"),
            Some(Lifetime::LazySingleton)
        );
        assert_eq!(
            mapping.lifetime_of("App.Clock", "App.Clock"),
            Some(Lifetime::Transient)
        );
        assert_eq!(mapping.get("App.Clock").unwrap().keys[1].source, MapSource::SingleInterface);
    }

    #[test]
    fn test_ambiguous_interface_not_mapped() {
        let universe = universe(vec![
            TypeDef::interface("App.IStore"),
            TypeDef::interface("App.IUnused"),
            implementing("App.Sql", &["App.IStore"]),
            implementing("App.Memory", &["App.IStore"]),
        ]);

        let mapping = resolve(&Settings::default(), &universe);
        assert!(mapping.targets_for_key("App.IStore").is_empty());
        assert!(mapping.targets_for_key("App.IUnused").is_empty());
    }

    #[test]
    fn test_open_generics_rejected_everywhere() {
        let mut repo = implementing("App.Repo`1", &["App.IRepo`1"]);
        repo.generic_params.push("T".into());
        let mut irepo = TypeDef::interface("App.IRepo`1");
        irepo.generic_params.push("T".into());

        let settings = Settings {
            maps: vec![MapRule {
                from: "App.IRepo`1".into(),
                to: "App.Repo`1".into(),
                force: true,
                lifetime: None,
            }],
            ..Settings::default()
        };
        let mapping = resolve(&settings, &universe(vec![irepo, repo]));
        assert!(mapping.is_empty());
    }

    #[test]
    fn test_behaviors_gate_passes() {
        let universe = universe(vec![
            TypeDef::interface("App.IClock"),
            implementing("App.Clock", &["App.IClock"]),
        ]);
        let settings = Settings {
            behaviors: Behaviors::SINGLE_INTERFACE_IMPLEMENTATION,
            ..Settings::default()
        };
        let mapping = resolve(&settings, &universe);
        assert_eq!(mapping.keys_for("App.Clock"), vec!["App.IClock"]);
    }

    #[test]
    fn test_rename_rule_requires_assignability_unless_forced() {
        let universe = universe(vec![
            TypeDef::interface("App.IMailer"),
            TypeDef::class("App.Mailer"),
            TypeDef::interface("App.ICache"),
        ]);
        let settings = Settings {
            behaviors: Behaviors::empty(),
            maps: vec![
                MapRule {
                    from: "App.I*".into(),
                    to: "App.*".into(),
                    force: false,
                    lifetime: Some(Lifetime::Singleton),
                },
            ],
            ..Settings::default()
        };

        // Mailer does not implement IMailer; Cache does not exist
        assert!(resolve(&settings, &universe).is_empty());

        let forced = Settings {
            maps: vec![MapRule {
                force: true,
                ..settings.maps[0].clone()
            }],
            ..settings
        };
        let mapping = resolve(&forced, &universe);
        assert_eq!(
            mapping.lifetime_of("App.IMailer", "App.Mailer"),
            Some(Lifetime::Singleton)
        );
        assert_eq!(mapping.len(), 1);
    }

    #[test]
    fn test_rename_rule_reaches_nested_target() {
        let mut outer = TypeDef::class("App.Outer");
        outer.is_abstract = true;
        let mut contract = TypeDef::interface("App.Outer+IStore");
        contract.declaring_type = Some("App.Outer".into());
        let mut store = implementing("App.Outer+Store", &["App.Outer+IStore"]);
        store.declaring_type = Some("App.Outer".into());

        let universe = universe(vec![outer, contract, store]);
        let settings = Settings {
            behaviors: Behaviors::empty(),
            maps: vec![MapRule {
                from: "App.Outer.I*".into(),
                to: "App.Outer.*".into(),
                force: false,
                lifetime: Some(Lifetime::Scoped),
            }],
            ..Settings::default()
        };

        let mapping = resolve(&settings, &universe);
        assert_eq!(
            mapping.lifetime_of("App.Outer+IStore", "App.Outer+Store"),
            Some(Lifetime::Scoped)
        );
        assert_eq!(mapping.len(), 1);
    }

    #[test]
    fn test_lifetime_rules_override_and_delete() {
        let universe = universe(vec![
            TypeDef::class("App.Cache"),
            TypeDef::class("App.Session"),
        ]);
        let settings = Settings {
            types: vec![
                TypeRule {
                    matches: "App.Cache".into(),
                    lifetime: Lifetime::WeakSingleton,
                },
                TypeRule {
                    matches: "App.Sess*".into(),
                    lifetime: Lifetime::None,
                },
            ],
            ..Settings::default()
        };

        let mapping = resolve(&settings, &universe);
        assert_eq!(
            mapping.lifetime_of("App.Cache", "App.Cache"),
            Some(Lifetime::WeakSingleton)
        );
        assert!(mapping.get("App.Session").is_none());
    }

    #[test]
    fn test_type_attributes() {
        let mut clock = implementing("App.Clock", &["App.IClock"]);
        clock.attributes.push(Attribute::Lifetime(Lifetime::Singleton));
        let mut legacy = TypeDef::class("App.LegacyClock");
        legacy.attributes.push(Attribute::Map(MapAttribute {
            source: "App.ITimeSource".into(),
            target: None,
            force: true,
            lifetime: Some(Lifetime::Scoped),
        }));

        let universe = universe(vec![
            TypeDef::interface("App.IClock"),
            TypeDef::interface("App.ITimeSource"),
            clock,
            legacy,
        ]);
        let mapping = resolve(&Settings::default(), &universe);

        assert_eq!(
            mapping.lifetime_of("App.IClock", "App.Clock"),
            Some(Lifetime::Singleton)
        );
        assert_eq!(
            mapping.lifetime_of("App.Clock", "App.Clock"),
            Some(Lifetime::Singleton)
        );
        assert_eq!(
            mapping.lifetime_of("App.ITimeSource", "App.LegacyClock"),
            Some(Lifetime::Scoped)
        );
    }

    #[test]
    fn test_module_lifetime_rule_without_lifetime_is_config_error() {
        let mut universe = universe(vec![TypeDef::class("App.A")]);
        let mut module = crate::weave::model::ModuleDef::new("App");
        module.attributes.push(Attribute::Map(MapAttribute {
            source: "App.*".into(),
            target: None,
            force: false,
            lifetime: None,
        }));
        universe.add_module(&module);

        let mut diagnostics = Diagnostics::default();
        let err = MappingResolver::new(&mut diagnostics)
            .resolve(&Settings::default(), &universe)
            .unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_nested_accessibility_filters_implicit_passes_only() {
        let mut hidden = TypeDef::class("App.Outer+Hidden");
        hidden.declaring_type = Some("App.Outer".into());
        hidden.accessibility = Accessibility::Private;
        hidden.interfaces.push("App.IHidden".into());

        let universe = universe(vec![TypeDef::class("App.Outer"), TypeDef::interface("App.IHidden"), hidden]);
        assert!(resolve(&Settings::default(), &universe)
            .get("App.Outer+Hidden")
            .is_none());

        let settings = Settings {
            maps: vec![MapRule {
                from: "App.IHidden".into(),
                to: "App.Outer+Hidden".into(),
                force: false,
                lifetime: None,
            }],
            ..Settings::default()
        };
        let mapping = resolve(&settings, &universe);
        assert_eq!(mapping.targets_for_key("App.IHidden"), vec!["App.Outer+Hidden"]);
    }

    #[test]
    fn test_rejections_reported_when_verbose() {
        let mut open = TypeDef::class("App.Box`1");
        open.generic_params.push("T".into());
        let universe = universe(vec![open]);

        let mut diagnostics = Diagnostics::new(DebugLogLevel::Verbose);
        MappingResolver::new(&mut diagnostics)
            .resolve(&Settings::default(), &universe)
            .unwrap();
        assert!(diagnostics
            .entries()
            .iter()
            .any(|d| d.message.contains("open generic")));
    }
}
