//! PropertyMap: the key-value store on nodes and edges.
//!
//! Ordered maps so that iteration (and therefore every export) is reproducible.

use std::collections::BTreeMap;
use super::Value;

/// A map of attribute / property names to values.
pub type PropertyMap = BTreeMap<String, Value>;

/// Property sets of an entity: set name (e.g. `Pset_WallCommon`) → properties.
pub type PropertySets = BTreeMap<String, PropertyMap>;

/// Convert a JSON object into a PropertyMap. Non-object input yields an empty map.
pub fn from_json_object(value: &serde_json::Value) -> PropertyMap {
    match value {
        serde_json::Value::Object(obj) => obj
            .iter()
            .map(|(k, v)| (k.clone(), Value::from_json(v)))
            .collect(),
        _ => PropertyMap::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_json_object_is_sorted() {
        let json = serde_json::json!({"b": 1, "a": "x"});
        let map = from_json_object(&json);
        let keys: Vec<&str> = map.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["a", "b"]);
        assert_eq!(map.get("b"), Some(&Value::Int(1)));
    }
}
