//! # Expression Evaluator
//!
//! Walks the typed recipe over a built [`SemanticGraph`]. Blocks run in
//! declaration order; each one fixes its element batch, filters it, then
//! projects (`select`) or attaches features (`feature`) per element.
//!
//! `evaluate` is total over well-typed input: missing data, failed
//! arithmetic and wrong runtime types all become `Null` instead of errors.
//!
//! ## Element order
//!
//! | Batch | Default order |
//! |-------|---------------|
//! | nodes | type tag, then node id |
//! | edges | edge kind, then edge id |
//!
//! An explicit `order by` sorts stably on top of that, Null keys last in
//! both directions.

pub mod context;
mod dispatch;
pub mod features;
pub mod ops;

use std::cmp::Ordering;

use tracing::debug;

use crate::check::{ElementSet, TypedBlock, TypedDerive, TypedExpr, TypedExprKind, TypedRecipe, TypedView};
use crate::graph::SemanticGraph;
use crate::model::Value;

pub use context::{Binding, ContextKind, ContextStack};
pub use features::FeatureStore;

/// Rows produced by one block, in output order.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockOutput {
    pub name: String,
    /// Element context the block iterated in.
    pub context: ContextKind,
    /// For derive blocks the first value of each row is the element key.
    pub rows: Vec<Vec<Value>>,
}

pub struct Evaluator<'g> {
    graph: &'g SemanticGraph,
    features: FeatureStore,
}

impl<'g> Evaluator<'g> {
    pub fn new(graph: &'g SemanticGraph, recipe: &TypedRecipe) -> Self {
        Self {
            graph,
            features: FeatureStore::new(&recipe.features, graph.node_count(), graph.edge_count()),
        }
    }

    pub fn graph(&self) -> &'g SemanticGraph {
        self.graph
    }

    pub fn features(&self) -> &FeatureStore {
        &self.features
    }

    /// Evaluate every block in declaration order.
    #[tracing::instrument(skip_all, fields(blocks = recipe.blocks.len()))]
    pub fn run(&mut self, recipe: &TypedRecipe) -> Vec<BlockOutput> {
        recipe
            .blocks
            .iter()
            .map(|block| {
                let output = match block {
                    TypedBlock::View(view) => self.run_view(view),
                    TypedBlock::Derive(derive) => self.run_derive(derive),
                };
                debug!(block = %output.name, rows = output.rows.len(), "block evaluated");
                output
            })
            .collect()
    }

    /// Evaluate one expression in the given context.
    pub fn evaluate(&self, expr: &TypedExpr, stack: &mut ContextStack) -> Value {
        match &expr.kind {
            TypedExprKind::Literal(value) => value.clone(),
            TypedExprKind::Feature { id, .. } => match stack.current() {
                Binding::Node(node) => self.features.get(*id, node.index()).clone(),
                Binding::Edge(edge) => self.features.get(*id, edge.0 as usize).clone(),
                Binding::Batch { .. } => Value::Null,
            },
            TypedExprKind::Call { op, args, selector, .. } => dispatch::call(self, *op, args, *selector, stack),
            TypedExprKind::Binary { op, left, right } => {
                let l = self.evaluate(left, stack);
                let r = self.evaluate(right, stack);
                ops::binary(*op, &l, &r)
            }
            TypedExprKind::Unary { op, operand } => {
                let v = self.evaluate(operand, stack);
                ops::unary(*op, &v)
            }
            TypedExprKind::Within { target, body, .. } => match self.evaluate(target, stack) {
                Value::NodeRef(node) => stack.scoped(Binding::Node(node.id), |s| self.evaluate(body, s)),
                Value::EdgeRef(edge) => stack.scoped(Binding::Edge(edge), |s| self.evaluate(body, s)),
                _ => Value::Null,
            },
        }
    }

    // ========================================================================
    // Batches
    // ========================================================================

    /// Elements of a `from` target in default order.
    pub fn batch(&self, elements: &ElementSet) -> Vec<Binding> {
        match elements {
            ElementSet::Nodes { types } => self
                .graph
                .nodes_in_type_order()
                .filter(|n| types.is_empty() || types.contains(&n.type_tag))
                .map(|n| Binding::Node(n.id))
                .collect(),
            ElementSet::Edges { kinds } => self
                .graph
                .edges_in_kind_order()
                .filter(|e| kinds.is_empty() || kinds.contains(&e.kind))
                .map(|e| Binding::Edge(e.id))
                .collect(),
        }
    }

    /// Batch after all `where` predicates; only Bool-true passes.
    fn filtered(&self, elements: &ElementSet, filters: &[TypedExpr]) -> Vec<Binding> {
        let candidates = self.batch(elements);
        if filters.is_empty() {
            return candidates;
        }
        let mut stack = ContextStack::new(candidates.len());
        candidates
            .into_iter()
            .filter(|&element| {
                stack.scoped(element, |s| filters.iter().all(|f| self.evaluate(f, s).is_true()))
            })
            .collect()
    }

    fn run_view(&self, view: &TypedView) -> BlockOutput {
        let batch = self.filtered(&view.elements, &view.filters);
        let mut stack = ContextStack::new(batch.len());

        let mut rows: Vec<(Vec<Value>, Vec<Value>)> = batch
            .into_iter()
            .map(|element| {
                stack.scoped(element, |s| {
                    let row = view.fields.iter().map(|f| self.evaluate(&f.expr, s)).collect();
                    let keys = view.order_by.iter().map(|k| self.evaluate(&k.expr, s)).collect();
                    (row, keys)
                })
            })
            .collect();

        if !view.order_by.is_empty() {
            rows.sort_by(|(_, a), (_, b)| {
                view.order_by
                    .iter()
                    .zip(a.iter().zip(b.iter()))
                    .map(|(key, (x, y))| order_key_cmp(x, y, key.ascending))
                    .find(|o| *o != Ordering::Equal)
                    .unwrap_or(Ordering::Equal)
            });
        }

        BlockOutput {
            name: view.name.clone(),
            context: view.elements.context(),
            rows: rows.into_iter().map(|(row, _)| row).collect(),
        }
    }

    fn run_derive(&mut self, derive: &TypedDerive) -> BlockOutput {
        let batch = self.filtered(&derive.elements, &derive.filters);
        let mut stack = ContextStack::new(batch.len());
        let mut rows = Vec::with_capacity(batch.len());

        for element in batch {
            let (key, index) = match element {
                Binding::Node(id) => (
                    self.graph.node(id).map_or(Value::Null, |n| Value::NodeRef(n.to_ref())),
                    id.index(),
                ),
                Binding::Edge(id) => (Value::EdgeRef(id), id.0 as usize),
                Binding::Batch { .. } => continue,
            };
            let mut row = Vec::with_capacity(derive.features.len() + 1);
            row.push(key);
            stack.push(element);
            for feature in &derive.features {
                let value = self.evaluate(&feature.expr, &mut stack);
                self.features.set(feature.id, index, value.clone());
                row.push(value);
            }
            stack.pop();
            rows.push(row);
        }

        BlockOutput {
            name: derive.name.clone(),
            context: derive.elements.context(),
            rows,
        }
    }
}

/// Compare two `order by` key values; Null sorts last in either direction.
fn order_key_cmp(a: &Value, b: &Value, ascending: bool) -> Ordering {
    match (a.is_null(), b.is_null()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) if ascending => a.sort_cmp(b),
        (false, false) => a.sort_cmp(b).reverse(),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtins::BuiltinRegistry;
    use crate::check::TypeChecker;
    use crate::config::RunConfig;
    use crate::graph::GraphBuilder;
    use crate::recipe::{BinaryOp, Block, Expr, Recipe};
    use crate::source::{MemoryEntity, MemorySource};
    use pretty_assertions::assert_eq;

    fn graph() -> SemanticGraph {
        let src = MemorySource::new("fp")
            .with_entity(MemoryEntity::new("st", "IfcBuildingStorey").attr("Name", "Level 1"))
            .with_entity(
                MemoryEntity::new("w1", "IfcWall")
                    .relate("contained_in", "st")
                    .property("Pset_WallCommon", "Width", 0.3),
            )
            .with_entity(MemoryEntity::new("w2", "IfcWall").relate("contained_in", "st"))
            .with_entity(MemoryEntity::new("d1", "IfcDoor").relate("contained_in", "st"));
        GraphBuilder::new(RunConfig::default()).build(&src).unwrap().graph
    }

    fn run(recipe: Recipe) -> Vec<BlockOutput> {
        let registry = BuiltinRegistry::standard();
        let typed = TypeChecker::new(&registry).check(&recipe).unwrap();
        let g = graph();
        let mut ev = Evaluator::new(&g, &typed);
        ev.run(&typed)
    }

    fn guid() -> Expr {
        Expr::call("guid", vec![])
    }

    fn strings(rows: &[Vec<Value>]) -> Vec<String> {
        rows.iter().map(|r| r[0].as_str().unwrap_or("").to_string()).collect()
    }

    #[test]
    fn test_default_order_is_type_index_order() {
        let out = run(Recipe::new().block(Block::view("v").select([("g", guid())])));
        assert_eq!(strings(&out[0].rows), vec!["st", "d1", "w1", "w2"]);
    }

    #[test]
    fn test_explicit_order_puts_null_last() {
        let width = Expr::call("pset.numeric", vec![Expr::lit("Pset_WallCommon"), Expr::lit("Width")]);
        let out = run(Recipe::new().block(
            Block::view("v")
                .from_nodes(["IfcWall", "IfcDoor"])
                .select([("g", guid())])
                .order_by([(width, false), (guid(), false)]),
        ));
        assert_eq!(strings(&out[0].rows), vec!["w1", "w2", "d1"]);
    }

    #[test]
    fn test_where_excludes_null_and_false() {
        let width = Expr::call("pset.numeric", vec![Expr::lit("Pset_WallCommon"), Expr::lit("Width")]);
        let out = run(Recipe::new().block(
            Block::view("v")
                .filter(Expr::binary(BinaryOp::Gt, width, Expr::lit(0.1)))
                .select([("g", guid())]),
        ));
        assert_eq!(strings(&out[0].rows), vec!["w1"]);
    }

    #[test]
    fn test_feature_visible_to_later_block() {
        let out = run(
            Recipe::new()
                .block(
                    Block::derive("d")
                        .from_nodes(["IfcWall"])
                        .feature("storey", Expr::within(Expr::call("contained_in", vec![]), Expr::call("ifc.name", vec![]))),
                )
                .block(Block::view("v").select([("g", guid()), ("storey", Expr::feature("storey"))])),
        );
        assert_eq!(out[0].rows.len(), 2);
        assert_eq!(out[1].rows[0], vec![Value::from("st"), Value::Null]);
        assert_eq!(out[1].rows[2], vec![Value::from("w1"), Value::from("Level 1")]);
    }

    #[test]
    fn test_batch_count_sees_filtered_batch() {
        let out = run(Recipe::new().block(
            Block::view("v")
                .from_nodes(["IfcWall"])
                .select([("n", Expr::call("batch.count", vec![]))]),
        ));
        assert_eq!(out[0].rows, vec![vec![Value::Int(2)], vec![Value::Int(2)]]);
    }

    #[test]
    fn test_edge_view() {
        let out = run(Recipe::new().block(Block::view("e").from_edges(["contained_in"]).select([
            ("kind", Expr::call("edge.kind", vec![])),
            ("src", Expr::within(Expr::call("edge.source", vec![]), guid())),
        ])));
        assert_eq!(out[0].context, ContextKind::Edge);
        assert_eq!(
            out[0].rows,
            vec![
                vec![Value::from("contained_in"), Value::from("w1")],
                vec![Value::from("contained_in"), Value::from("w2")],
                vec![Value::from("contained_in"), Value::from("d1")],
            ]
        );
    }

    #[test]
    fn test_order_key_cmp() {
        assert_eq!(order_key_cmp(&Value::Null, &Value::Int(1), false), Ordering::Greater);
        assert_eq!(order_key_cmp(&Value::Int(2), &Value::Int(1), false), Ordering::Less);
        assert_eq!(order_key_cmp(&Value::Int(2), &Value::Int(1), true), Ordering::Greater);
    }
}
