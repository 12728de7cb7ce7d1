//! # Dataset Assembler
//!
//! Turns evaluator output into schema-tagged tables:
//!
//! | Table | Source | Columns |
//! |-------|--------|---------|
//! | view | `select` block | declared fields |
//! | derive | `feature` block | element key, then features |
//! | edge list | `edge_list` export | source, target, kind, provenance, confidence |
//!
//! Schemas come from the typed recipe, never from the values, so a table with
//! zero records still carries its full schema.

pub mod export;
pub mod sink;

use std::collections::BTreeSet;

use serde::Serialize;
use tracing::info;

use crate::check::{ElementSet, TypedBlock, TypedExportSource, TypedRecipe};
use crate::eval::BlockOutput;
use crate::graph::SemanticGraph;
use crate::model::{EdgeKind, NodeId, Value};
use crate::recipe::{TypeRef, ValueType};
use crate::{Error, Result};

pub use export::{Exporter, ExporterRegistry, JsonLinesExporter, TsvExporter};
pub use sink::{Artifact, ArtifactRecord, ArtifactSink, DirectorySink, MemorySink};

/// One row, aligned with its table's schema.
pub type Record = Vec<Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TableKind {
    View,
    Derive,
    EdgeList,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Column {
    pub name: String,
    pub ty: TypeRef,
}

impl Column {
    pub fn new(name: impl Into<String>, ty: TypeRef) -> Self {
        Self { name: name.into(), ty }
    }
}

/// Ordered column list.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Schema {
    pub columns: Vec<Column>,
}

impl Schema {
    pub fn new(columns: Vec<Column>) -> Self {
        Self { columns }
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.columns.iter().map(|c| c.name.as_str())
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Schema of an edge-list table.
    pub fn edge_list() -> Self {
        let node = TypeRef::new(ValueType::NodeRef);
        Self::new(vec![
            Column::new("source", node.clone()),
            Column::new("target", node),
            Column::new("kind", TypeRef::string()),
            Column::new("provenance", TypeRef::string()),
            Column::new("confidence", TypeRef::float()),
        ])
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DatasetTable {
    pub name: String,
    pub kind: TableKind,
    pub schema: Schema,
    pub records: Vec<Record>,
}

impl DatasetTable {
    /// Value of `column` in record `row`.
    pub fn value(&self, row: usize, column: &str) -> Option<&Value> {
        let col = self.schema.position(column)?;
        self.records.get(row)?.get(col)
    }

    /// All values of one column, in record order.
    pub fn column(&self, column: &str) -> Vec<&Value> {
        match self.schema.position(column) {
            Some(col) => self.records.iter().filter_map(|r| r.get(col)).collect(),
            None => Vec::new(),
        }
    }
}

/// Tables of one run: blocks in declaration order, then edge lists in the
/// order their exports were first declared.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    pub tables: Vec<DatasetTable>,
}

impl Dataset {
    pub fn table(&self, name: &str) -> Option<&DatasetTable> {
        self.tables.iter().find(|t| t.name == name)
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn record_count(&self) -> usize {
        self.tables.iter().map(|t| t.records.len()).sum()
    }
}

// ============================================================================
// Assembly
// ============================================================================

pub struct DatasetAssembler<'a> {
    recipe: &'a TypedRecipe,
}

impl<'a> DatasetAssembler<'a> {
    pub fn new(recipe: &'a TypedRecipe) -> Self {
        Self { recipe }
    }

    /// `outputs` must be the evaluator's result for the same recipe.
    #[tracing::instrument(skip_all)]
    pub fn assemble(&self, graph: &SemanticGraph, outputs: Vec<BlockOutput>) -> Result<Dataset> {
        if outputs.len() != self.recipe.blocks.len() {
            return Err(Error::Evaluation(format!(
                "expected output for {} blocks, got {}",
                self.recipe.blocks.len(),
                outputs.len()
            )));
        }

        let mut tables = Vec::with_capacity(outputs.len());
        for (block, output) in self.recipe.blocks.iter().zip(outputs) {
            if block.name() != output.name {
                return Err(Error::Evaluation(format!(
                    "block '{}' received output of '{}'",
                    block.name(),
                    output.name
                )));
            }
            let (kind, schema) = match block {
                TypedBlock::View(_) => (TableKind::View, block_schema(block)),
                TypedBlock::Derive(_) => (TableKind::Derive, block_schema(block)),
            };
            tables.push(DatasetTable { name: output.name, kind, schema, records: output.rows });
        }

        let mut seen = BTreeSet::new();
        for export in &self.recipe.exports {
            if let TypedExportSource::EdgeList { name, kinds, min_confidence } = &export.source {
                if seen.insert(name.as_str()) {
                    tables.push(edge_list_table(graph, name, kinds, *min_confidence));
                }
            }
        }

        let dataset = Dataset { tables };
        info!(tables = dataset.len(), records = dataset.record_count(), "dataset assembled");
        Ok(dataset)
    }
}

/// Schema of a block's table, from its typed statements.
pub fn block_schema(block: &TypedBlock) -> Schema {
    match block {
        TypedBlock::View(view) => Schema::new(
            view.fields
                .iter()
                .map(|f| Column::new(f.name.clone(), f.expr.ty.clone()))
                .collect(),
        ),
        TypedBlock::Derive(derive) => {
            let key_ty = match derive.elements {
                ElementSet::Nodes { .. } => TypeRef::new(ValueType::NodeRef),
                ElementSet::Edges { .. } => TypeRef::new(ValueType::EdgeRef),
            };
            let mut columns = vec![Column::new(derive.elements.key_column(), key_ty)];
            columns.extend(
                derive
                    .features
                    .iter()
                    .map(|f| Column::new(f.name.clone(), f.expr.ty.clone())),
            );
            Schema::new(columns)
        }
    }
}

fn edge_list_table(graph: &SemanticGraph, name: &str, kinds: &[EdgeKind], min_confidence: f64) -> DatasetTable {
    let node = |id: NodeId| graph.node(id).map_or(Value::Null, |n| Value::NodeRef(n.to_ref()));
    let records = graph
        .edge_list(kinds, min_confidence)
        .into_iter()
        .map(|e| {
            vec![
                node(e.source),
                node(e.target),
                Value::from(e.kind.as_str()),
                Value::String(e.provenance.label()),
                Value::Float(e.confidence),
            ]
        })
        .collect();
    DatasetTable { name: name.to_string(), kind: TableKind::EdgeList, schema: Schema::edge_list(), records }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtins::BuiltinRegistry;
    use crate::check::TypeChecker;
    use crate::config::RunConfig;
    use crate::eval::Evaluator;
    use crate::graph::GraphBuilder;
    use crate::recipe::{Block, ExportDecl, ExportSource, Expr, Recipe};
    use crate::source::{MemoryEntity, MemorySource};
    use pretty_assertions::assert_eq;

    fn assemble(recipe: Recipe) -> Dataset {
        let src = MemorySource::new("fp")
            .with_entity(MemoryEntity::new("s", "IfcBuildingStorey"))
            .with_entity(MemoryEntity::new("w", "IfcWall").relate("contained_in", "s"));
        let graph = GraphBuilder::new(RunConfig::default()).build(&src).unwrap().graph;
        let registry = BuiltinRegistry::standard();
        let typed = TypeChecker::new(&registry).check(&recipe).unwrap();
        let outputs = Evaluator::new(&graph, &typed).run(&typed);
        DatasetAssembler::new(&typed).assemble(&graph, outputs).unwrap()
    }

    #[test]
    fn test_derive_schema_has_key_column() {
        let ds = assemble(Recipe::new().block(
            Block::derive("d")
                .from_nodes(["IfcWall"])
                .feature("deg", Expr::call("degree", vec![Expr::lit("*"), Expr::lit("both")])),
        ));
        let table = ds.table("d").unwrap();
        assert_eq!(table.kind, TableKind::Derive);
        assert_eq!(table.schema.names().collect::<Vec<_>>(), vec!["guid", "deg"]);
        assert_eq!(table.schema.columns[0].ty.to_string(), "NodeRef");
        assert_eq!(table.value(0, "deg"), Some(&Value::Int(1)));
    }

    #[test]
    fn test_empty_view_keeps_schema() {
        let ds = assemble(Recipe::new().block(
            Block::view("v")
                .from_nodes(["IfcDoor"])
                .select([("name", Expr::call("ifc.name", vec![]))]),
        ));
        let table = ds.table("v").unwrap();
        assert!(table.records.is_empty());
        assert_eq!(table.schema.columns, vec![Column::new("name", TypeRef::nullable(ValueType::String))]);
    }

    #[test]
    fn test_edge_list_table_once_per_name() {
        let decl = |format: &str, path: &str| ExportDecl {
            source: ExportSource::EdgeList { name: "edges".into(), kinds: vec![], min_confidence: 0.0 },
            format: format.into(),
            path: path.into(),
        };
        let ds = assemble(
            Recipe::new()
                .block(Block::view("v").select([("g", Expr::call("guid", vec![]))]))
                .export(decl("tsv", "edges.tsv"))
                .export(decl("jsonl", "edges.jsonl")),
        );
        assert_eq!(ds.len(), 2);
        let edges = ds.table("edges").unwrap();
        assert_eq!(edges.kind, TableKind::EdgeList);
        assert_eq!(edges.records.len(), 1);
        assert_eq!(edges.value(0, "kind"), Some(&Value::from("contained_in")));
        assert_eq!(edges.value(0, "provenance"), Some(&Value::from("structural")));
    }
}
