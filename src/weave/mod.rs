//! Weave-time dependency injection
//!
//! The weaver takes a compiled module, works out which concrete type answers
//! for which key, instruments the members marked as dependencies and emits a
//! container that registers everything with the runtime at startup.
//!
//! ```text
//! ModuleResolver -> TypeGraphReader -> MappingResolver
//!                                           |
//!                  MemberInjector <---------+---------> ContainerSynthesizer
//!                                           |
//!                                        Encoder
//! ```

pub mod encode;
pub mod il;
pub mod inject;
pub mod mapping;
pub mod model;
pub mod pattern;
pub mod reader;
pub mod settings;
pub mod synth;
pub mod weaver;

pub use encode::{Encoder, JsonEncoder};
pub use mapping::{MapSource, Mapping, MappingResolver, TypeMap};
pub use model::{Attribute, ModuleDef, TypeDef};
pub use pattern::{MatchResult, Matcher};
pub use reader::{InMemoryResolver, ModuleResolver, TypeGraphReader, TypeUniverse};
pub use settings::{Behaviors, InitMode, Settings, SettingsOverride};
pub use synth::ContainerSynthesizer;
pub use weaver::{WeaveOutput, WeaveReport, Weaver};
