//! # Model Source Trait
//!
//! The contract between the runtime and whatever loads the building model.
//! The graph builder is the only consumer; it calls these methods once per
//! entity, synchronously, and treats every call as an opaque blocking boundary.
//!
//! ## Implementations
//!
//! | Source | Module | Description |
//! |--------|--------|-------------|
//! | `MemorySource` | `memory` | In-memory entities for testing/embedding, loadable from JSON |
//!
//! An IFC loader lives outside this crate and implements the same trait.

pub mod memory;

use serde::{Deserialize, Serialize};

use crate::model::{GeometryHandle, PropertyMap, PropertySets};
use crate::Result;

pub use memory::{MemoryEntity, MemorySource};

/// Handle to one entity of the external model, in declaration order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityRef {
    /// Stable external key (IFC `GlobalId`). May be empty for malformed input.
    pub key: String,
    /// Raw type name as reported by the loader (e.g. `IfcWall`, `IFC4.IfcWall`).
    pub type_name: String,
}

impl EntityRef {
    pub fn new(key: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self { key: key.into(), type_name: type_name.into() }
    }
}

/// Attribute data of one entity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityAttributes {
    #[serde(default)]
    pub attributes: PropertyMap,
    #[serde(default)]
    pub property_sets: PropertySets,
}

/// One relationship as reported by the loader, not yet validated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawRelationship {
    /// Relation name: a short edge name (`contained_in`) or an IFC relation
    /// entity name (`IfcRelContainedInSpatialStructure`).
    pub relation: String,
    /// Key of the related entity.
    pub target: String,
}

impl RawRelationship {
    pub fn new(relation: impl Into<String>, target: impl Into<String>) -> Self {
        Self { relation: relation.into(), target: target.into() }
    }
}

/// The consumed model-loader interface.
///
/// Every error returned here is a load failure and aborts the run.
/// Malformed *content* (dangling targets, unknown relation names) is not an
/// error at this layer; the builder turns it into diagnostics.
pub trait ModelSource {
    /// Content hash identifying this model input/version.
    fn fingerprint(&self) -> Result<String>;

    /// All entities, in declaration order.
    fn enumerate_entities(&self) -> Result<Vec<EntityRef>>;

    fn get_attributes(&self, entity: &EntityRef) -> Result<EntityAttributes>;

    /// Relationships of the entity, in declaration order.
    fn get_relationships(&self, entity: &EntityRef) -> Result<Vec<RawRelationship>>;

    fn get_geometry(&self, entity: &EntityRef) -> Result<Option<GeometryHandle>>;
}
