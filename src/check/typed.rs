//! Typed AST: the checked recipe the evaluator runs.
//!
//! Every expression carries its `TypeRef`; built-in calls are resolved to a
//! registry id and operation, selector arguments are pre-parsed and feature
//! references point at a `FeatureId`.

use crate::builtins::{BuiltinId, BuiltinOp};
use crate::eval::ContextKind;
use crate::model::{Direction, EdgeKind, Value};
use crate::recipe::{BinaryOp, TypeRef, UnaryOp};

/// Recipe-wide feature index, in definition order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FeatureId(pub u32);

impl FeatureId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Pre-resolved `degree` selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EdgeSelector {
    /// `None` for `"*"`.
    pub kind: Option<EdgeKind>,
    pub direction: Direction,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypedExpr {
    pub kind: TypedExprKind,
    pub ty: TypeRef,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TypedExprKind {
    Literal(Value),
    Feature { id: FeatureId, name: String },
    Call {
        id: BuiltinId,
        op: BuiltinOp,
        /// Value arguments only; selectors live in `selector`.
        args: Vec<TypedExpr>,
        selector: Option<EdgeSelector>,
    },
    Binary { op: BinaryOp, left: Box<TypedExpr>, right: Box<TypedExpr> },
    Unary { op: UnaryOp, operand: Box<TypedExpr> },
    /// `context` is the element context the body runs in.
    Within { target: Box<TypedExpr>, body: Box<TypedExpr>, context: ContextKind },
}

/// Resolved `from` target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElementSet {
    /// Empty means all nodes. Tags are normalized.
    Nodes { types: Vec<String> },
    /// Empty means all edges.
    Edges { kinds: Vec<EdgeKind> },
}

impl ElementSet {
    pub fn all_nodes() -> Self {
        ElementSet::Nodes { types: Vec::new() }
    }

    pub fn context(&self) -> ContextKind {
        match self {
            ElementSet::Nodes { .. } => ContextKind::Node,
            ElementSet::Edges { .. } => ContextKind::Edge,
        }
    }

    /// Name of the element key column in derive tables.
    pub fn key_column(&self) -> &'static str {
        match self {
            ElementSet::Nodes { .. } => "guid",
            ElementSet::Edges { .. } => "edge",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypedField {
    pub name: String,
    pub expr: TypedExpr,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypedOrderKey {
    pub expr: TypedExpr,
    pub ascending: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypedView {
    pub name: String,
    pub elements: ElementSet,
    /// Conjunctive.
    pub filters: Vec<TypedExpr>,
    pub fields: Vec<TypedField>,
    pub order_by: Vec<TypedOrderKey>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypedFeature {
    pub id: FeatureId,
    pub name: String,
    pub expr: TypedExpr,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypedDerive {
    pub name: String,
    pub elements: ElementSet,
    pub filters: Vec<TypedExpr>,
    pub features: Vec<TypedFeature>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TypedBlock {
    View(TypedView),
    Derive(TypedDerive),
}

impl TypedBlock {
    pub fn name(&self) -> &str {
        match self {
            TypedBlock::View(v) => &v.name,
            TypedBlock::Derive(d) => &d.name,
        }
    }
}

/// Static facts about one feature.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureInfo {
    pub id: FeatureId,
    pub name: String,
    pub block: String,
    pub context: ContextKind,
    pub ty: TypeRef,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TypedExportSource {
    Table(String),
    EdgeList { name: String, kinds: Vec<EdgeKind>, min_confidence: f64 },
}

impl TypedExportSource {
    pub fn table_name(&self) -> &str {
        match self {
            TypedExportSource::Table(name) => name,
            TypedExportSource::EdgeList { name, .. } => name,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypedExport {
    pub source: TypedExportSource,
    pub format: String,
    pub path: String,
}

/// A recipe that passed the type checker.
#[derive(Debug, Clone, PartialEq)]
pub struct TypedRecipe {
    pub blocks: Vec<TypedBlock>,
    /// Indexed by `FeatureId`.
    pub features: Vec<FeatureInfo>,
    pub exports: Vec<TypedExport>,
}

impl TypedRecipe {
    pub fn feature(&self, id: FeatureId) -> Option<&FeatureInfo> {
        self.features.get(id.index())
    }

    pub fn block(&self, name: &str) -> Option<&TypedBlock> {
        self.blocks.iter().find(|b| b.name() == name)
    }
}
