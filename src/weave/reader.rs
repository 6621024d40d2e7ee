//! Type graph reader
//!
//! Collects the candidate types of a program: the primary module plus the
//! referenced modules that opt in, walked breadth-first. Compiler-generated
//! types are dropped here; nested accessibility is left to the mapping
//! passes, since an explicit rule may still target an inaccessible type.

use super::model::{Attribute, HasAttributes, ModuleDef, ROOT_OBJECT_TYPES, TypeDef};
use super::pattern::Matcher;
use super::settings::{Behaviors, Settings};
use crate::logging::Diagnostics;
use crate::{WeaveError, WeaveResult};
use ahash::{AHashSet, RandomState};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use tracing::{debug, warn};

/// Source of module definitions
pub trait ModuleResolver {
    fn resolve(&self, name: &str) -> WeaveResult<Arc<ModuleDef>>;
}

/// Resolver over modules held in memory
#[derive(Debug, Default, Clone)]
pub struct InMemoryResolver {
    modules: HashMap<String, Arc<ModuleDef>, RandomState>,
}

impl InMemoryResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, module: ModuleDef) -> &mut Self {
        self.modules.insert(module.name.clone(), Arc::new(module));
        self
    }

    pub fn with(mut self, module: ModuleDef) -> Self {
        self.add(module);
        self
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

impl ModuleResolver for InMemoryResolver {
    fn resolve(&self, name: &str) -> WeaveResult<Arc<ModuleDef>> {
        self.modules
            .get(name)
            .cloned()
            .ok_or_else(|| WeaveError::ModuleUnresolved {
                name: name.to_string(),
                reason: "not loaded".into(),
            })
    }
}

/// A type in the universe together with its owning module
#[derive(Debug, Clone)]
pub struct CandidateType {
    pub module: String,
    pub def: TypeDef,
}

impl CandidateType {
    #[inline]
    pub fn name(&self) -> &str {
        &self.def.name
    }
}

impl std::ops::Deref for CandidateType {
    type Target = TypeDef;

    #[inline]
    fn deref(&self) -> &TypeDef {
        &self.def
    }
}

/// Module-level data the mapping passes need
#[derive(Debug, Clone)]
pub struct ModuleInfo {
    pub name: String,
    pub attributes: Vec<Attribute>,
}

fn dotted_name(name: &str) -> String {
    name.replace(['+', '/'], ".")
}

impl HasAttributes for ModuleInfo {
    fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }
}

/// Every candidate type of one weave, in discovery order
#[derive(Debug, Clone, Default)]
pub struct TypeUniverse {
    types: Vec<CandidateType>,
    index: HashMap<String, usize, RandomState>,
    /// Names with nested separators spelled `.`; first definition wins
    dotted: HashMap<String, usize, RandomState>,
    modules: Vec<ModuleInfo>,
}

impl TypeUniverse {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a type; a name already present keeps its first definition
    pub fn insert(&mut self, module: &str, def: TypeDef) -> bool {
        if self.index.contains_key(&def.name) {
            return false;
        }
        self.index.insert(def.name.clone(), self.types.len());
        self.dotted
            .entry(dotted_name(&def.name))
            .or_insert(self.types.len());
        self.types.push(CandidateType {
            module: module.to_string(),
            def,
        });
        true
    }

    pub fn add_module(&mut self, module: &ModuleDef) {
        self.modules.push(ModuleInfo {
            name: module.name.clone(),
            attributes: module.attributes.clone(),
        });
        for ty in module.types.iter().filter(|t| !t.compiler_generated) {
            self.insert(&module.name, ty.clone());
        }
    }

    pub fn get(&self, name: &str) -> Option<&CandidateType> {
        self.index.get(name).map(|&i| &self.types[i])
    }

    /// Like [`get`](Self::get), but `Outer.Inner` also finds `Outer+Inner`
    pub fn find(&self, name: &str) -> Option<&CandidateType> {
        self.get(name).or_else(|| {
            self.dotted
                .get(&dotted_name(name))
                .map(|&i| &self.types[i])
        })
    }

    #[inline]
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &CandidateType> {
        self.types.iter()
    }

    /// Included modules, primary first
    pub fn modules(&self) -> &[ModuleInfo] {
        &self.modules
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.types.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Ancestors of `name`, nearest first, stopping at the root object type
    /// or the first base outside the universe.
    pub fn base_chain(&self, name: &str) -> Vec<&CandidateType> {
        let mut chain = Vec::new();
        let mut seen = AHashSet::new();
        let mut current = self.get(name).and_then(|t| t.base_type.as_deref());

        while let Some(base) = current {
            if ROOT_OBJECT_TYPES.contains(&base) || !seen.insert(base) {
                break;
            }
            let Some(ty) = self.get(base) else { break };
            chain.push(ty);
            current = ty.base_type.as_deref();
        }
        chain
    }

    /// Every interface `name` implements, directly, through its base types or
    /// through interface inheritance. Names outside the universe included.
    pub fn interfaces_of(&self, name: &str) -> Vec<String> {
        let mut found: Vec<String> = Vec::new();
        let mut queue: VecDeque<String> = VecDeque::new();

        let mut owners = vec![name.to_string()];
        owners.extend(self.base_chain(name).iter().map(|t| t.name().to_string()));
        for owner in &owners {
            if let Some(ty) = self.get(owner) {
                queue.extend(ty.interfaces.iter().cloned());
            }
        }

        while let Some(interface) = queue.pop_front() {
            if found.contains(&interface) {
                continue;
            }
            if let Some(ty) = self.get(&interface) {
                queue.extend(ty.interfaces.iter().cloned());
            }
            found.push(interface);
        }
        found
    }

    /// Whether an instance of `target` can stand in for `key`
    pub fn is_assignable_to(&self, target: &str, key: &str) -> bool {
        target == key
            || self.base_chain(target).iter().any(|t| t.name() == key)
            || self.interfaces_of(target).iter().any(|i| i == key)
    }

    /// Whether `name` and every type enclosing it are reachable as a
    /// mapping target.
    pub fn is_nested_accessible(&self, name: &str) -> bool {
        let mut current = self.get(name);
        let mut seen = AHashSet::new();
        while let Some(ty) = current {
            if !seen.insert(ty.name()) {
                return false;
            }
            let Some(outer) = ty.declaring_type.as_deref() else {
                return true;
            };
            if !ty.accessibility.is_nested_eligible() {
                return false;
            }
            current = self.get(outer);
        }
        true
    }
}

/// Reads the type universe of a program
pub struct TypeGraphReader<'a> {
    resolver: &'a dyn ModuleResolver,
}

impl<'a> TypeGraphReader<'a> {
    pub fn new(resolver: &'a dyn ModuleResolver) -> Self {
        Self { resolver }
    }

    /// Collect the candidate types reachable from `primary`.
    ///
    /// Fails only when `primary` itself cannot be resolved; other modules
    /// that fail to resolve are skipped with a warning.
    pub fn get_all_types(
        &self,
        primary: &str,
        settings: &Settings,
        diagnostics: &mut Diagnostics,
    ) -> WeaveResult<TypeUniverse> {
        let root = self
            .resolver
            .resolve(primary)
            .map_err(|_| WeaveError::PrimaryModuleUnresolved(primary.to_string()))?;

        let includes = settings
            .assemblies
            .iter()
            .map(|rule| Matcher::literal(&rule.name))
            .collect::<WeaveResult<Vec<_>>>()?;
        let include_dependents = settings.has(Behaviors::INCLUDE_DEPENDENT_AUTODI_ASSEMBLIES);

        let mut universe = TypeUniverse::new();
        let mut visited = AHashSet::new();
        let mut queue = VecDeque::new();
        visited.insert(root.name.clone());
        queue.push_back(root);

        while let Some(module) = queue.pop_front() {
            let is_primary = module.name == primary;
            let included = is_primary
                || includes.iter().any(|m| m.is_match(&module.name))
                || (include_dependents && module.references_marker());

            if included {
                let before = universe.len();
                universe.add_module(&module);
                debug!(
                    target: "autodi",
                    module = %module.name,
                    types = universe.len() - before,
                    primary = is_primary,
                    "Including module types"
                );
            }

            for reference in &module.references {
                if !visited.insert(reference.clone()) {
                    continue;
                }
                match self.resolver.resolve(reference) {
                    Ok(next) => queue.push_back(next),
                    Err(err) => {
                        warn!(
                            target: "autodi",
                            module = %reference,
                            referenced_by = %module.name,
                            error = %err,
                            "Skipping unresolved module"
                        );
                        diagnostics.verbose(format!("Skipped module {reference}: {err}"));
                    }
                }
            }
        }

        Ok(universe)
    }
}
