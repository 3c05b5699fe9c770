//! Rigging - deferred values and component lifecycle for resource graphs

pub mod component;
pub mod diagnostics;
pub mod error;
pub mod eventual;
pub mod graph;
pub mod provider;

pub use component::{
    Component, ComponentSpec, Coordinator, Setup, SetupInput, SetupPhase, SetupResult,
};
pub use diagnostics::{Diagnostic, DiagnosticKind, DiagnosticLog, SetupMode};
pub use error::RiggingError;
pub use eventual::{Eventual, IntoEventual, Key, Resolution, Resolver, Settled};
pub use graph::{
    EntityHandle, GraphRuntime, InMemoryGraph, Outputs, RegisteredEntity, ResourceOptions,
};
pub use provider::{detect_region, Provider, ProviderRegistry};
