//! Provider traits for dependency injection
//!
//! These types define what can be injected and how instances are reused.

use crate::DiError;
use serde::{Deserialize, Serialize};
use std::any::TypeId;
use std::str::FromStr;

/// Marker trait for types that can be injected via the DI container.
///
/// This is automatically implemented for all types that are `Send + Sync + 'static`,
/// including trait objects such as `dyn Repository + Send + Sync`.
pub trait Injectable: Send + Sync + 'static {
    /// Returns the TypeId of this type (for internal use)
    #[inline]
    fn type_id_of() -> TypeId {
        TypeId::of::<Self>()
    }

    /// Returns the type name for debugging
    #[inline]
    fn type_name_of() -> &'static str {
        std::any::type_name::<Self>()
    }
}

// Blanket implementation - everything that's Send + Sync + 'static is Injectable
impl<T: ?Sized + Send + Sync + 'static> Injectable for T {}

/// How long a resolved instance lives.
///
/// The declaration order matters: mapping rules compare lifetimes, and `None`
/// is the lowest value.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum Lifetime {
    /// Not a lifetime: a rule carrying `None` deletes matching registrations
    None,

    /// New instance created on every resolve
    #[default]
    Transient,

    /// Instance shared while someone holds it, recreated once released
    #[serde(alias = "WeakTransient")]
    WeakSingleton,

    /// One instance per scope
    Scoped,

    /// Created on first access, then shared
    LazySingleton,

    /// Created when the provider is built, then shared
    Singleton,
}

impl Lifetime {
    /// Short lowercase name used in log fields
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            Lifetime::None => "none",
            Lifetime::Transient => "transient",
            Lifetime::WeakSingleton => "weak_singleton",
            Lifetime::Scoped => "scoped",
            Lifetime::LazySingleton => "lazy_singleton",
            Lifetime::Singleton => "singleton",
        }
    }
}

impl std::fmt::Display for Lifetime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parses the names `as_str` produces as well as the variant names.
///
/// Case and underscores are ignored, and `WeakTransient` is read as
/// [`Lifetime::WeakSingleton`].
impl FromStr for Lifetime {
    type Err = DiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let folded: String = s
            .chars()
            .filter(|c| *c != '_')
            .map(|c| c.to_ascii_lowercase())
            .collect();
        match folded.as_str() {
            "none" => Ok(Lifetime::None),
            "transient" => Ok(Lifetime::Transient),
            "weaksingleton" | "weaktransient" => Ok(Lifetime::WeakSingleton),
            "scoped" => Ok(Lifetime::Scoped),
            "lazysingleton" => Ok(Lifetime::LazySingleton),
            "singleton" => Ok(Lifetime::Singleton),
            _ => Err(DiError::UnknownLifetime(s.to_string())),
        }
    }
}

/// Literal constant attached to a dependency marker and forwarded to the
/// resolution call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Constant {
    Null,
    Bool(bool),
    I32(i32),
    I64(i64),
    F64(f64),
    Str(String),
    /// A type reference, by full name
    Type(String),
}

impl Constant {
    /// Whether this is the "unset" sentinel
    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Constant::Null)
    }

    #[inline]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Constant::Str(s) | Constant::Type(s) => Some(s),
            _ => None,
        }
    }
}
