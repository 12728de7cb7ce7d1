//! # Semantic Graph Model
//!
//! Plain DTOs for the building-model graph and the values the evaluator
//! produces. These types cross every boundary: source ↔ builder ↔ evaluator ↔
//! dataset assembler ↔ exporters.
//!
//! Design rule: this module is pure data. No I/O, no model loader handles,
//! no evaluation state.

pub mod node;
pub mod edge;
pub mod geometry;
pub mod value;
pub mod property_map;

pub use node::{Node, NodeId, NodeRef};
pub use edge::{Direction, Edge, EdgeId, EdgeKind, Provenance};
pub use geometry::{BoundingBox, GeometryHandle};
pub use value::Value;
pub use property_map::{PropertyMap, PropertySets};
