//! Weave settings
//!
//! Settings come from three layers, later layers winning:
//! built-in defaults, a TOML document, then the `Settings` attribute on the
//! module being woven.
//!
//! # Example Configuration
//!
//! ```toml
//! behaviors = "SINGLE_INTERFACE_IMPLEMENTATION | INCLUDE_CLASSES"
//! init_mode = "ModuleLoad"
//! debug_exceptions = true
//! debug_log_level = "Verbose"
//!
//! [[assemblies]]
//! name = "Contoso.*"
//!
//! [[maps]]
//! from = "Contoso.I*"
//! to = "Contoso.*"
//! lifetime = "Singleton"
//!
//! [[types]]
//! matches = "Contoso.Cache*"
//! lifetime = "WeakSingleton"
//! ```

use crate::logging::DebugLogLevel;
use crate::{Lifetime, WeaveError, WeaveResult};
use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::path::Path;

bitflags! {
    /// Which mapping passes run, plus module inclusion behavior
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct Behaviors: u32 {
        /// Interfaces with exactly one concrete implementation map to it
        const SINGLE_INTERFACE_IMPLEMENTATION = 0x0001;
        /// Every concrete class maps to itself
        const INCLUDE_CLASSES = 0x0002;
        /// Every ancestor maps to its most-derived concrete type
        const INCLUDE_BASE_CLASSES = 0x0004;
        /// Include types of every module that references the DI marker module
        const INCLUDE_DEPENDENT_AUTODI_ASSEMBLIES = 0x0008;

        const DEFAULT = Self::SINGLE_INTERFACE_IMPLEMENTATION.bits()
            | Self::INCLUDE_CLASSES.bits()
            | Self::INCLUDE_BASE_CLASSES.bits();
    }
}

impl Default for Behaviors {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Where the call to the generated `Init` is injected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum InitMode {
    /// No call; the host calls `Init` itself
    Manual,
    /// Start of the module's entry point
    #[default]
    EntryPoint,
    /// The module initializer, synthesized when missing
    ModuleLoad,
}

/// Extra module whose types join the type universe
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssemblyRule {
    /// Module name pattern
    pub name: String,
}

/// Rename rule: keys matching `from` map to the type named by `to`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapRule {
    pub from: String,
    pub to: String,
    #[serde(default)]
    pub force: bool,
    #[serde(default)]
    pub lifetime: Option<Lifetime>,
}

/// Lifetime rule: targets matching `matches` get `lifetime`
/// (`None` deletes them)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeRule {
    pub matches: String,
    pub lifetime: Lifetime,
}

/// Module-level override carried by the `Settings` attribute.
///
/// Unset fields leave the lower layers alone.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SettingsOverride {
    pub behaviors: Option<Behaviors>,
    pub init_mode: Option<InitMode>,
    pub generate_registrations: Option<bool>,
    pub debug_exceptions: Option<bool>,
    pub debug_log_level: Option<DebugLogLevel>,
    pub debug_code_generation: Option<bool>,
}

/// Effective weave settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub behaviors: Behaviors,
    pub init_mode: InitMode,
    /// Emit the container surface at all
    pub generate_registrations: bool,
    /// Isolate each registration in `AddServices` and aggregate failures
    pub debug_exceptions: bool,
    pub debug_log_level: DebugLogLevel,
    /// Developer toggle only; no source is emitted
    pub debug_code_generation: bool,
    pub assemblies: Vec<AssemblyRule>,
    pub maps: Vec<MapRule>,
    pub types: Vec<TypeRule>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            behaviors: Behaviors::DEFAULT,
            init_mode: InitMode::EntryPoint,
            generate_registrations: true,
            debug_exceptions: false,
            debug_log_level: DebugLogLevel::Default,
            debug_code_generation: false,
            assemblies: Vec::new(),
            maps: Vec::new(),
            types: Vec::new(),
        }
    }
}

impl Settings {
    /// Parse settings from a TOML document; absent keys keep their defaults
    pub fn from_toml_str(document: &str) -> WeaveResult<Self> {
        toml::from_str(document).map_err(|e| WeaveError::Config(e.to_string()))
    }

    /// Load settings from a TOML file
    pub fn load(path: impl AsRef<Path>) -> WeaveResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| WeaveError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&content)
    }

    /// Apply a module-level override on top of these settings
    pub fn merged(mut self, over: &SettingsOverride) -> Self {
        if let Some(behaviors) = over.behaviors {
            self.behaviors = behaviors;
        }
        if let Some(init_mode) = over.init_mode {
            self.init_mode = init_mode;
        }
        if let Some(generate) = over.generate_registrations {
            self.generate_registrations = generate;
        }
        if let Some(debug_exceptions) = over.debug_exceptions {
            self.debug_exceptions = debug_exceptions;
        }
        if let Some(level) = over.debug_log_level {
            self.debug_log_level = level;
        }
        if let Some(codegen) = over.debug_code_generation {
            self.debug_code_generation = codegen;
        }
        self
    }

    #[inline]
    pub fn has(&self, behavior: Behaviors) -> bool {
        self.behaviors.contains(behavior)
    }
}
