//! Per-element storage of derived feature values.

use crate::check::{FeatureId, FeatureInfo};
use crate::eval::ContextKind;
use crate::model::Value;

static NULL: Value = Value::Null;

/// One column per feature, indexed by node or edge id. Elements a derive block
/// never visited keep `Null`.
#[derive(Debug, Clone, Default)]
pub struct FeatureStore {
    columns: Vec<Vec<Value>>,
}

impl FeatureStore {
    pub fn new(features: &[FeatureInfo], node_count: usize, edge_count: usize) -> Self {
        let columns = features
            .iter()
            .map(|f| {
                let len = match f.context {
                    ContextKind::Edge => edge_count,
                    ContextKind::Node | ContextKind::Batch => node_count,
                };
                vec![Value::Null; len]
            })
            .collect();
        Self { columns }
    }

    pub fn get(&self, id: FeatureId, element: usize) -> &Value {
        self.columns
            .get(id.index())
            .and_then(|col| col.get(element))
            .unwrap_or(&NULL)
    }

    pub fn set(&mut self, id: FeatureId, element: usize, value: Value) {
        if let Some(slot) = self.columns.get_mut(id.index()).and_then(|col| col.get_mut(element)) {
            *slot = value;
        }
    }
}
