//! In-memory model source.
//!
//! This is the reference implementation of `ModelSource`. Entities live in a
//! `Vec` in declaration order with a key index next to it.
//!
//! Use this source for:
//! - Testing the graph builder, type checker and evaluator
//! - Embedding the runtime where another front end already decoded the model
//! - Replaying a model exported as a JSON entity listing

use std::sync::atomic::{AtomicU64, Ordering};

use hashbrown::HashMap;
use serde::{Deserialize, Deserializer};

use crate::model::property_map::from_json_object;
use crate::model::{GeometryHandle, PropertyMap, PropertySets, Value};
use crate::{Error, Result};
use super::{EntityAttributes, EntityRef, ModelSource, RawRelationship};

// ============================================================================
// MemoryEntity
// ============================================================================

/// One entity of an in-memory model.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct MemoryEntity {
    pub key: String,
    #[serde(rename = "type")]
    pub type_name: String,
    /// Plain JSON values in listings: `{"Name": "Wall 1"}`.
    #[serde(default, deserialize_with = "plain_properties")]
    pub attributes: PropertyMap,
    #[serde(default, deserialize_with = "plain_property_sets")]
    pub property_sets: PropertySets,
    #[serde(default)]
    pub relationships: Vec<RawRelationship>,
    #[serde(default)]
    pub geometry: Option<GeometryHandle>,
}

impl MemoryEntity {
    pub fn new(key: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            type_name: type_name.into(),
            ..Default::default()
        }
    }

    pub fn attr(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn property(mut self, set: impl Into<String>, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.property_sets
            .entry(set.into())
            .or_default()
            .insert(key.into(), value.into());
        self
    }

    pub fn relate(mut self, relation: impl Into<String>, target: impl Into<String>) -> Self {
        self.relationships.push(RawRelationship::new(relation, target));
        self
    }

    pub fn geometry(mut self, geometry: GeometryHandle) -> Self {
        self.geometry = Some(geometry);
        self
    }
}

fn plain_properties<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<PropertyMap, D::Error> {
    let raw = serde_json::Value::deserialize(d)?;
    Ok(from_json_object(&raw))
}

fn plain_property_sets<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<PropertySets, D::Error> {
    let raw = serde_json::Map::<String, serde_json::Value>::deserialize(d)?;
    Ok(raw.iter().map(|(set, props)| (set.clone(), from_json_object(props))).collect())
}

// ============================================================================
// MemorySource
// ============================================================================

#[derive(Deserialize)]
struct MemoryModel {
    fingerprint: String,
    entities: Vec<MemoryEntity>,
}

/// In-memory building model.
pub struct MemorySource {
    fingerprint: String,
    entities: Vec<MemoryEntity>,
    /// key → position of the first entity with that key
    index: HashMap<String, usize>,
    accesses: AtomicU64,
}

impl MemorySource {
    pub fn new(fingerprint: impl Into<String>) -> Self {
        Self {
            fingerprint: fingerprint.into(),
            entities: Vec::new(),
            index: HashMap::new(),
            accesses: AtomicU64::new(0),
        }
    }

    pub fn with_entity(mut self, entity: MemoryEntity) -> Self {
        self.push(entity);
        self
    }

    pub fn push(&mut self, entity: MemoryEntity) {
        self.index.entry(entity.key.clone()).or_insert(self.entities.len());
        self.entities.push(entity);
    }

    /// Load `{"fingerprint": "...", "entities": [...]}`.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let model: MemoryModel = serde_json::from_str(json)
            .map_err(|e| Error::Load(format!("invalid model listing: {e}")))?;
        let mut source = MemorySource::new(model.fingerprint);
        for entity in model.entities {
            source.push(entity);
        }
        Ok(source)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Number of loader calls served so far.
    pub fn access_count(&self) -> u64 {
        self.accesses.load(Ordering::Relaxed)
    }

    fn lookup(&self, entity: &EntityRef) -> Result<&MemoryEntity> {
        self.accesses.fetch_add(1, Ordering::Relaxed);
        self.index
            .get(&entity.key)
            .map(|&i| &self.entities[i])
            .ok_or_else(|| Error::Load(format!("Entity '{}' not present in model", entity.key)))
    }
}

impl ModelSource for MemorySource {
    fn fingerprint(&self) -> Result<String> {
        Ok(self.fingerprint.clone())
    }

    fn enumerate_entities(&self) -> Result<Vec<EntityRef>> {
        self.accesses.fetch_add(1, Ordering::Relaxed);
        Ok(self
            .entities
            .iter()
            .map(|e| EntityRef::new(e.key.clone(), e.type_name.clone()))
            .collect())
    }

    fn get_attributes(&self, entity: &EntityRef) -> Result<EntityAttributes> {
        let e = self.lookup(entity)?;
        Ok(EntityAttributes {
            attributes: e.attributes.clone(),
            property_sets: e.property_sets.clone(),
        })
    }

    fn get_relationships(&self, entity: &EntityRef) -> Result<Vec<RawRelationship>> {
        Ok(self.lookup(entity)?.relationships.clone())
    }

    fn get_geometry(&self, entity: &EntityRef) -> Result<Option<GeometryHandle>> {
        Ok(self.lookup(entity)?.geometry.clone())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enumeration_keeps_declaration_order() {
        let src = MemorySource::new("fp")
            .with_entity(MemoryEntity::new("b", "IfcWall"))
            .with_entity(MemoryEntity::new("a", "IfcSlab"));
        let keys: Vec<String> = src.enumerate_entities().unwrap().into_iter().map(|e| e.key).collect();
        assert_eq!(keys, vec!["b", "a"]);
    }

    #[test]
    fn test_from_json_str() {
        let json = r#"{
            "fingerprint": "sha256:abc",
            "entities": [
                {"key": "w1", "type": "IfcWall",
                 "attributes": {"Name": "Wall 1", "Height": 3},
                 "property_sets": {"Pset_WallCommon": {"LoadBearing": true}},
                 "relationships": [{"relation": "contained_in", "target": "s1"}]},
                {"key": "s1", "type": "IfcBuildingStorey"}
            ]
        }"#;
        let src = MemorySource::from_json_str(json).unwrap();
        assert_eq!(src.len(), 2);
        assert_eq!(src.fingerprint().unwrap(), "sha256:abc");

        let wall = EntityRef::new("w1", "IfcWall");
        let attrs = src.get_attributes(&wall).unwrap();
        assert_eq!(attrs.attributes.get("Name"), Some(&Value::from("Wall 1")));
        assert_eq!(attrs.attributes.get("Height"), Some(&Value::Int(3)));
        assert_eq!(
            attrs.property_sets["Pset_WallCommon"].get("LoadBearing"),
            Some(&Value::Bool(true))
        );
        assert_eq!(src.get_relationships(&wall).unwrap().len(), 1);
    }

    #[test]
    fn test_unknown_entity_is_load_error() {
        let src = MemorySource::new("fp");
        let err = src.get_attributes(&EntityRef::new("missing", "IfcWall")).unwrap_err();
        assert!(matches!(err, Error::Load(_)));
    }

    #[test]
    fn test_access_count() {
        let src = MemorySource::new("fp").with_entity(MemoryEntity::new("a", "IfcWall"));
        assert_eq!(src.access_count(), 0);
        let entities = src.enumerate_entities().unwrap();
        src.get_geometry(&entities[0]).unwrap();
        assert_eq!(src.access_count(), 2);
    }
}
