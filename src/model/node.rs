//! Node in the semantic graph.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use super::{GeometryHandle, PropertyMap, PropertySets, Value};

/// Dense node identifier, assigned in entity enumeration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A node in the semantic graph: one projected model entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    /// External entity key (IFC `GlobalId`).
    pub guid: Arc<str>,
    /// Normalized type tag (e.g. `IfcWall`).
    pub type_tag: String,
    pub attributes: PropertyMap,
    pub property_sets: PropertySets,
    pub geometry: Option<GeometryHandle>,
}

impl Node {
    pub fn new(id: NodeId, guid: impl Into<Arc<str>>, type_tag: impl Into<String>) -> Self {
        Self {
            id,
            guid: guid.into(),
            type_tag: type_tag.into(),
            attributes: PropertyMap::new(),
            property_sets: PropertySets::new(),
            geometry: None,
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn attribute(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    /// Look up a property inside a named property set.
    pub fn property(&self, set: &str, key: &str) -> Option<&Value> {
        self.property_sets.get(set).and_then(|props| props.get(key))
    }

    pub fn has_property_set(&self, set: &str) -> bool {
        self.property_sets.contains_key(set)
    }

    /// The `Name` attribute, if it is a string.
    pub fn name(&self) -> Option<&str> {
        self.attributes.get("Name").and_then(Value::as_str)
    }

    /// A value-level reference to this node.
    pub fn to_ref(&self) -> NodeRef {
        NodeRef { id: self.id, guid: Arc::clone(&self.guid) }
    }
}

/// Reference to a node carried inside a [`Value`]. Exporters render it by guid.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeRef {
    pub id: NodeId,
    pub guid: Arc<str>,
}
