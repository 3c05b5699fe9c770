//! Resource-graph boundary (v0.1)
//!
//! The coordinator talks to the surrounding resource-graph runtime through
//! [`GraphRuntime`]: register the composite first, then, once setup has
//! produced its result, register its final output set. Exactly once each,
//! in that order, per entity. `InMemoryGraph` is a DashMap-backed runtime
//! for tests and local runs.

use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use serde_json::Value;

use crate::error::RiggingError;
use crate::provider::Provider;

/// Final output set of a composite entity
pub type Outputs = serde_json::Map<String, Value>;

/// Opaque handle to a registered entity, addressed by URN
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntityHandle {
    urn: Arc<str>,
}

impl EntityHandle {
    pub fn new(namespace: &str, name: &str) -> Self {
        Self {
            urn: Arc::from(format!("{namespace}::{name}")),
        }
    }

    pub fn urn(&self) -> &str {
        &self.urn
    }

    pub(crate) fn urn_arc(&self) -> Arc<str> {
        Arc::clone(&self.urn)
    }
}

impl fmt::Display for EntityHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.urn)
    }
}

/// Parent/provider attachment for a resource call
#[derive(Debug, Clone, Default)]
pub struct ResourceOptions {
    pub parent: Option<EntityHandle>,
    pub provider: Option<Arc<Provider>>,
}

impl ResourceOptions {
    pub fn with_parent(mut self, parent: EntityHandle) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn with_provider(mut self, provider: Arc<Provider>) -> Self {
        self.provider = Some(provider);
        self
    }
}

/// Registration contract of the surrounding resource-graph runtime.
///
/// Implementations live outside this crate; [`InMemoryGraph`] stands in for
/// them in tests and local runs.
pub trait GraphRuntime: Send + Sync {
    fn register_composite(
        &self,
        namespace: &str,
        name: &str,
        options: &ResourceOptions,
    ) -> Result<EntityHandle, RiggingError>;

    fn register_outputs(
        &self,
        entity: &EntityHandle,
        outputs: &Outputs,
    ) -> Result<(), RiggingError>;
}

/// What an in-memory runtime remembers about one registration
#[derive(Debug, Clone)]
pub struct RegisteredEntity {
    pub namespace: String,
    pub name: String,
    pub parent: Option<EntityHandle>,
    pub provider: Option<Arc<Provider>>,
    /// `None` until `register_outputs` is called
    pub outputs: Option<Outputs>,
}

/// Lock-free in-memory resource graph
#[derive(Default)]
pub struct InMemoryGraph {
    entities: DashMap<Arc<str>, RegisteredEntity>,
}

impl InMemoryGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entity(&self, urn: &str) -> Option<RegisteredEntity> {
        self.entities.get(urn).map(|e| e.clone())
    }

    pub fn outputs(&self, urn: &str) -> Option<Outputs> {
        self.entities.get(urn).and_then(|e| e.outputs.clone())
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

impl GraphRuntime for InMemoryGraph {
    fn register_composite(
        &self,
        namespace: &str,
        name: &str,
        options: &ResourceOptions,
    ) -> Result<EntityHandle, RiggingError> {
        use dashmap::mapref::entry::Entry;

        let handle = EntityHandle::new(namespace, name);
        match self.entities.entry(handle.urn_arc()) {
            Entry::Occupied(_) => Err(RiggingError::DuplicateEntity {
                urn: handle.urn().to_string(),
            }),
            Entry::Vacant(slot) => {
                slot.insert(RegisteredEntity {
                    namespace: namespace.to_string(),
                    name: name.to_string(),
                    parent: options.parent.clone(),
                    provider: options.provider.clone(),
                    outputs: None,
                });
                Ok(handle)
            }
        }
    }

    fn register_outputs(
        &self,
        entity: &EntityHandle,
        outputs: &Outputs,
    ) -> Result<(), RiggingError> {
        match self.entities.get_mut(entity.urn()) {
            Some(mut registered) => {
                registered.outputs = Some(outputs.clone());
                Ok(())
            }
            None => Err(RiggingError::Graph(format!(
                "unknown entity '{}'",
                entity.urn()
            ))),
        }
    }
}
