//! In-memory module model
//!
//! The weaver reads and rewrites modules in this shape. Type names are fully
//! qualified; nested types join their enclosing type's name with `+`
//! (`App.Outer+Inner`). Method bodies are label-addressed instruction lists,
//! see [`il`](super::il).

use super::il::MethodBody;
use super::settings::SettingsOverride;
use crate::{Constant, Lifetime};
use serde::{Deserialize, Serialize};

/// Name of the module that defines the DI marker attributes
pub const MARKER_MODULE: &str = "AutoDI";

/// Runtime types generated code calls into
pub mod runtime {
    pub const GLOBAL_DI: &str = "AutoDI.GlobalDI";
    pub const GET_SERVICE: &str = "GetService";
    pub const REGISTER: &str = "Register";
    pub const UNREGISTER: &str = "Unregister";
    pub const APPLICATION_BUILDER: &str = "AutoDI.IApplicationBuilder";
    pub const SERVICE_COLLECTION: &str = "AutoDI.IServiceCollection";
    pub const SERVICE_PROVIDER: &str = "AutoDI.IServiceProvider";
    pub const OBJECT_ARRAY: &str = "System.Object[]";
    pub const EXCEPTION: &str = "System.Exception";
    pub const AGGREGATE_EXCEPTION: &str = "System.AggregateException";
    pub const ALREADY_INITIALIZED: &str = "AutoDI.AlreadyInitializedException";
}

/// Type names a base-class chain ends in
pub const ROOT_OBJECT_TYPES: &[&str] = &["object", "System.Object"];

/// Member accessibility, as declared
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Accessibility {
    #[default]
    Public,
    Internal,
    Protected,
    /// Protected or internal
    ProtectedInternal,
    /// Protected and internal
    PrivateProtected,
    Private,
}

impl Accessibility {
    /// Whether a nested type at this level may be a mapping target
    #[inline]
    pub fn is_nested_eligible(self) -> bool {
        matches!(
            self,
            Accessibility::Public | Accessibility::ProtectedInternal | Accessibility::Internal
        )
    }

    /// Callable from generated code in the same module
    #[inline]
    pub fn is_module_visible(self) -> bool {
        matches!(
            self,
            Accessibility::Public | Accessibility::Internal | Accessibility::ProtectedInternal
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TypeKind {
    #[default]
    Class,
    Interface,
    Struct,
}

/// Declarative mapping attribute.
///
/// On a module: with `target`, a rename rule; without it, a lifetime rule
/// for targets matching `source`. On a type: `source` is a key pattern and
/// the annotated type is the target unless `target` names another one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapAttribute {
    pub source: String,
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default)]
    pub force: bool,
    #[serde(default)]
    pub lifetime: Option<Lifetime>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Attribute {
    /// Inject this parameter or property; `args` are forwarded to resolution
    Dependency {
        #[serde(default)]
        args: Vec<Constant>,
    },
    Map(MapAttribute),
    /// Default lifetime for this type when a pass registers it
    Lifetime(Lifetime),
    /// Constructor to use for the generated factory
    DiConstructor,
    /// Static method run by `Init` with the application builder
    SetupMethod,
    Settings(SettingsOverride),
}

impl Attribute {
    #[inline]
    pub fn dependency_args(&self) -> Option<&[Constant]> {
        match self {
            Attribute::Dependency { args } => Some(args),
            _ => None,
        }
    }
}

/// Convenience lookups over an attribute list
pub trait HasAttributes {
    fn attributes(&self) -> &[Attribute];

    /// Arguments of the dependency marker, if present
    fn dependency(&self) -> Option<&[Constant]> {
        self.attributes().iter().find_map(Attribute::dependency_args)
    }

    fn has_attribute(&self, matches: fn(&Attribute) -> bool) -> bool {
        self.attributes().iter().any(matches)
    }

    fn map_attributes(&self) -> impl Iterator<Item = &MapAttribute> {
        self.attributes().iter().filter_map(|a| match a {
            Attribute::Map(map) => Some(map),
            _ => None,
        })
    }

    fn lifetime_attribute(&self) -> Option<Lifetime> {
        self.attributes().iter().rev().find_map(|a| match a {
            Attribute::Lifetime(lifetime) => Some(*lifetime),
            _ => None,
        })
    }
}

/// Reference to a method by declaring type, name and signature
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MethodRef {
    pub declaring_type: String,
    pub name: String,
    #[serde(default)]
    pub generic_args: Vec<String>,
    #[serde(default)]
    pub parameter_types: Vec<String>,
}

impl MethodRef {
    pub fn new(declaring_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            declaring_type: declaring_type.into(),
            name: name.into(),
            generic_args: Vec::new(),
            parameter_types: Vec::new(),
        }
    }

    pub fn with_generic(mut self, arg: impl Into<String>) -> Self {
        self.generic_args.push(arg.into());
        self
    }

    pub fn with_parameters(mut self, parameters: Vec<String>) -> Self {
        self.parameter_types = parameters;
        self
    }

    #[inline]
    pub fn is_constructor(&self) -> bool {
        self.name == CONSTRUCTOR
    }
}

impl std::fmt::Display for MethodRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}::{}", self.declaring_type, self.name)?;
        if !self.generic_args.is_empty() {
            write!(f, "<{}>", self.generic_args.join(", "))?;
        }
        Ok(())
    }
}

pub const CONSTRUCTOR: &str = ".ctor";
pub const STATIC_CONSTRUCTOR: &str = ".cctor";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MethodKind {
    #[default]
    Method,
    Constructor,
    StaticConstructor,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamDef {
    pub name: String,
    pub type_name: String,
    /// Declared default; `None` when the parameter is not optional
    #[serde(default)]
    pub default: Option<Constant>,
    #[serde(default)]
    pub attributes: Vec<Attribute>,
}

impl HasAttributes for ParamDef {
    fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodDef {
    pub name: String,
    #[serde(default)]
    pub kind: MethodKind,
    #[serde(default)]
    pub accessibility: Accessibility,
    #[serde(default)]
    pub is_static: bool,
    #[serde(default)]
    pub parameters: Vec<ParamDef>,
    #[serde(default)]
    pub return_type: Option<String>,
    #[serde(default)]
    pub attributes: Vec<Attribute>,
    #[serde(default)]
    pub body: Option<MethodBody>,
}

impl MethodDef {
    pub fn new(name: impl Into<String>, kind: MethodKind) -> Self {
        Self {
            name: name.into(),
            kind,
            accessibility: Accessibility::Public,
            is_static: kind == MethodKind::StaticConstructor,
            parameters: Vec::new(),
            return_type: None,
            attributes: Vec::new(),
            body: None,
        }
    }

    #[inline]
    pub fn is_instance_constructor(&self) -> bool {
        self.kind == MethodKind::Constructor && !self.is_static
    }

    /// Argument slot of parameter `index` (slot 0 is `this` on instance methods)
    #[inline]
    pub fn arg_slot(&self, index: usize) -> u16 {
        let offset = usize::from(!self.is_static);
        (index + offset) as u16
    }

    pub fn parameter_types(&self) -> Vec<String> {
        self.parameters.iter().map(|p| p.type_name.clone()).collect()
    }
}

impl HasAttributes for MethodDef {
    fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyDef {
    pub name: String,
    pub type_name: String,
    /// Getter method name
    #[serde(default)]
    pub getter: Option<String>,
    /// Setter method name
    #[serde(default)]
    pub setter: Option<String>,
    /// Backing field name (explicit or compiler-generated)
    #[serde(default)]
    pub backing_field: Option<String>,
    #[serde(default)]
    pub attributes: Vec<Attribute>,
}

impl HasAttributes for PropertyDef {
    fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    pub type_name: String,
    #[serde(default)]
    pub accessibility: Accessibility,
    #[serde(default)]
    pub is_static: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeDef {
    pub name: String,
    #[serde(default)]
    pub kind: TypeKind,
    #[serde(default)]
    pub accessibility: Accessibility,
    /// Enclosing type for nested types
    #[serde(default)]
    pub declaring_type: Option<String>,
    /// Unbound generic parameters; non-empty means open generic
    #[serde(default)]
    pub generic_params: Vec<String>,
    #[serde(default)]
    pub base_type: Option<String>,
    #[serde(default)]
    pub interfaces: Vec<String>,
    #[serde(default)]
    pub is_abstract: bool,
    /// Closures, state machines and other compiler output
    #[serde(default)]
    pub compiler_generated: bool,
    #[serde(default)]
    pub attributes: Vec<Attribute>,
    #[serde(default)]
    pub fields: Vec<FieldDef>,
    #[serde(default)]
    pub properties: Vec<PropertyDef>,
    #[serde(default)]
    pub methods: Vec<MethodDef>,
}

impl TypeDef {
    pub fn new(name: impl Into<String>, kind: TypeKind) -> Self {
        Self {
            name: name.into(),
            kind,
            accessibility: Accessibility::Public,
            declaring_type: None,
            generic_params: Vec::new(),
            base_type: None,
            interfaces: Vec::new(),
            is_abstract: kind == TypeKind::Interface,
            compiler_generated: false,
            attributes: Vec::new(),
            fields: Vec::new(),
            properties: Vec::new(),
            methods: Vec::new(),
        }
    }

    /// Class with a public parameterless constructor
    pub fn class(name: impl Into<String>) -> Self {
        let mut ty = Self::new(name, TypeKind::Class);
        ty.methods.push(MethodDef::new(CONSTRUCTOR, MethodKind::Constructor));
        ty
    }

    pub fn interface(name: impl Into<String>) -> Self {
        Self::new(name, TypeKind::Interface)
    }

    #[inline]
    pub fn is_open_generic(&self) -> bool {
        !self.generic_params.is_empty()
    }

    /// Instantiable class
    #[inline]
    pub fn is_concrete_class(&self) -> bool {
        self.kind == TypeKind::Class && !self.is_abstract
    }

    #[inline]
    pub fn is_interface(&self) -> bool {
        self.kind == TypeKind::Interface
    }

    pub fn constructors(&self) -> impl Iterator<Item = &MethodDef> {
        self.methods.iter().filter(|m| m.is_instance_constructor())
    }

    pub fn method(&self, name: &str) -> Option<&MethodDef> {
        self.methods.iter().find(|m| m.name == name)
    }

    pub fn method_mut(&mut self, name: &str) -> Option<&mut MethodDef> {
        self.methods.iter_mut().find(|m| m.name == name)
    }

    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }
}

impl HasAttributes for TypeDef {
    fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleDef {
    pub name: String,
    /// Names of referenced modules
    #[serde(default)]
    pub references: Vec<String>,
    #[serde(default)]
    pub attributes: Vec<Attribute>,
    #[serde(default)]
    pub types: Vec<TypeDef>,
    #[serde(default)]
    pub entry_point: Option<MethodRef>,
    /// Runs when the module is loaded
    #[serde(default)]
    pub module_initializer: Option<MethodDef>,
}

impl ModuleDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            references: Vec::new(),
            attributes: Vec::new(),
            types: Vec::new(),
            entry_point: None,
            module_initializer: None,
        }
    }

    pub fn with_reference(mut self, name: impl Into<String>) -> Self {
        self.references.push(name.into());
        self
    }

    pub fn with_type(mut self, ty: TypeDef) -> Self {
        self.types.push(ty);
        self
    }

    #[inline]
    pub fn references_marker(&self) -> bool {
        self.references.iter().any(|r| r == MARKER_MODULE)
    }

    pub fn type_def(&self, name: &str) -> Option<&TypeDef> {
        self.types.iter().find(|t| t.name == name)
    }

    pub fn type_def_mut(&mut self, name: &str) -> Option<&mut TypeDef> {
        self.types.iter_mut().find(|t| t.name == name)
    }

    /// Settings overrides carried by the module, merged in declaration order
    pub fn settings_override(&self) -> Option<SettingsOverride> {
        self.attributes
            .iter()
            .filter_map(|a| match a {
                Attribute::Settings(over) => Some(over.clone()),
                _ => None,
            })
            .reduce(|mut acc, next| {
                acc.behaviors = next.behaviors.or(acc.behaviors);
                acc.init_mode = next.init_mode.or(acc.init_mode);
                acc.generate_registrations =
                    next.generate_registrations.or(acc.generate_registrations);
                acc.debug_exceptions = next.debug_exceptions.or(acc.debug_exceptions);
                acc.debug_log_level = next.debug_log_level.or(acc.debug_log_level);
                acc.debug_code_generation =
                    next.debug_code_generation.or(acc.debug_code_generation);
                acc
            })
    }
}

impl HasAttributes for ModuleDef {
    fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }
}
