//! Error types for weaving and runtime resolution

use std::any::TypeId;
use thiserror::Error;

/// Errors that can occur while resolving services at run time
#[derive(Error, Debug)]
pub enum DiError {
    /// Service was not found in the container
    #[error("Service not found: {type_name}")]
    NotFound {
        type_name: &'static str,
        type_id: TypeId,
    },

    /// Circular dependency detected during resolution
    #[error("Circular dependency detected while resolving: {type_name}")]
    CircularDependency { type_name: &'static str },

    /// Factory failed to create service
    #[error("Failed to create service {type_name}: {reason}")]
    CreationFailed {
        type_name: &'static str,
        reason: String,
    },

    /// One or more registrations failed while adding services
    #[error("{} registration(s) failed while adding services", .0.len())]
    Registration(Vec<DiError>),

    /// A registration was rejected before it reached the container
    #[error("Invalid registration {key} -> {target}: {reason}")]
    InvalidRegistration {
        key: String,
        target: String,
        reason: String,
    },

    /// `init` was called on a module whose provider is already published
    #[error("AutoDI has already been initialized for module '{module}'")]
    AlreadyInitialized { module: String },

    /// A resolution was attempted before any provider was published
    #[error("AutoDI has not been initialized")]
    NotInitialized,

    /// A lifetime name that is not one of the known lifetimes
    #[error("Unknown lifetime '{0}'")]
    UnknownLifetime(String),

    /// The provider has been disposed
    #[error("Service provider has been disposed")]
    Disposed,

    /// Internal error
    #[error("Internal DI error: {0}")]
    Internal(String),
}

impl DiError {
    /// Create a NotFound error for a type
    #[inline]
    pub fn not_found<T: ?Sized + 'static>() -> Self {
        Self::NotFound {
            type_name: std::any::type_name::<T>(),
            type_id: TypeId::of::<T>(),
        }
    }

    /// Create a CreationFailed error
    #[inline]
    pub fn creation_failed<T: ?Sized + 'static>(reason: impl Into<String>) -> Self {
        Self::CreationFailed {
            type_name: std::any::type_name::<T>(),
            reason: reason.into(),
        }
    }

    /// Create an AlreadyInitialized error
    #[inline]
    pub fn already_initialized(module: impl Into<String>) -> Self {
        Self::AlreadyInitialized {
            module: module.into(),
        }
    }
}

impl Clone for DiError {
    fn clone(&self) -> Self {
        match self {
            Self::NotFound { type_name, type_id } => Self::NotFound {
                type_name,
                type_id: *type_id,
            },
            Self::CircularDependency { type_name } => Self::CircularDependency { type_name },
            Self::CreationFailed { type_name, reason } => Self::CreationFailed {
                type_name,
                reason: reason.clone(),
            },
            Self::Registration(errors) => Self::Registration(errors.clone()),
            Self::InvalidRegistration {
                key,
                target,
                reason,
            } => Self::InvalidRegistration {
                key: key.clone(),
                target: target.clone(),
                reason: reason.clone(),
            },
            Self::AlreadyInitialized { module } => Self::AlreadyInitialized {
                module: module.clone(),
            },
            Self::NotInitialized => Self::NotInitialized,
            Self::UnknownLifetime(name) => Self::UnknownLifetime(name.clone()),
            Self::Disposed => Self::Disposed,
            Self::Internal(s) => Self::Internal(s.clone()),
        }
    }
}

/// Result type alias for runtime DI operations
pub type Result<T> = std::result::Result<T, DiError>;

/// Errors raised while weaving a module.
///
/// Configuration errors and DI-constructor ambiguity abort the weave. Soft
/// mapping rejections never surface here; they are reported as diagnostics.
#[derive(Error, Debug)]
pub enum WeaveError {
    /// A wildcard or regex pattern could not be compiled
    #[error("Invalid pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: Box<regex::Error>,
    },

    /// Malformed settings or mapping attribute data
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// More than one constructor on a target carries the DI constructor marker
    #[error("Type '{type_name}' declares {count} DI constructors; only one is allowed")]
    MultipleDiConstructors { type_name: String, count: usize },

    /// The module being woven could not be resolved
    #[error("Primary module '{0}' could not be resolved")]
    PrimaryModuleUnresolved(String),

    /// A referenced module could not be resolved
    #[error("Module '{name}' could not be resolved: {reason}")]
    ModuleUnresolved { name: String, reason: String },

    /// A member required for rewriting is missing
    #[error("Member '{member}' not found on '{type_name}'")]
    MissingMember { type_name: String, member: String },

    /// The rewritten module could not be written out
    #[error("Failed to encode module '{module}': {reason}")]
    Encode { module: String, reason: String },
}

impl WeaveError {
    /// Create an InvalidPattern error
    #[inline]
    pub fn invalid_pattern(pattern: impl Into<String>, source: regex::Error) -> Self {
        Self::InvalidPattern {
            pattern: pattern.into(),
            source: Box::new(source),
        }
    }

    /// Whether the error is the kind that always aborts the weave
    #[inline]
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::InvalidPattern { .. } | Self::Config(_))
    }
}

/// Result type alias for weave operations
pub type WeaveResult<T> = std::result::Result<T, WeaveError>;
