//! Geometry handles. The core never tessellates; it only carries what the
//! model loader reports.

use serde::{Deserialize, Serialize};
use super::Value;

/// Axis-aligned bounding box in world coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min: [f64; 3],
    pub max: [f64; 3],
}

impl BoundingBox {
    pub fn new(min: [f64; 3], max: [f64; 3]) -> Self {
        Self { min, max }
    }

    /// Finite coordinates and `min <= max` on every axis.
    pub fn is_valid(&self) -> bool {
        self.min.iter().chain(self.max.iter()).all(|c| c.is_finite())
            && (0..3).all(|i| self.min[i] <= self.max[i])
    }

    /// Boxes overlap or touch within `tolerance` on every axis.
    pub fn touches(&self, other: &BoundingBox, tolerance: f64) -> bool {
        (0..3).all(|i| {
            self.min[i] <= other.max[i] + tolerance && other.min[i] <= self.max[i] + tolerance
        })
    }

    /// `[xmin, ymin, zmin, xmax, ymax, zmax]`
    pub fn to_value(&self) -> Value {
        Value::List(
            self.min
                .iter()
                .chain(self.max.iter())
                .map(|c| Value::Float(*c))
                .collect(),
        )
    }
}

/// Opaque geometry reference reported by the loader, with an optional box.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeometryHandle {
    pub handle: String,
    #[serde(default)]
    pub bbox: Option<BoundingBox>,
}

impl GeometryHandle {
    pub fn new(handle: impl Into<String>) -> Self {
        Self { handle: handle.into(), bbox: None }
    }

    pub fn with_bbox(mut self, bbox: BoundingBox) -> Self {
        self.bbox = Some(bbox);
        self
    }
}
