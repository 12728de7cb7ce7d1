//! # openbimdl: Deterministic BIM Dataset Runtime
//!
//! Evaluates OpenBIM-DL recipes over a building-model semantic graph and
//! produces reproducible machine-learning datasets.
//!
//! ## Design Principles
//!
//! 1. **Trait-first**: `ModelSource` is the contract between the runtime and the model loader
//! 2. **Check before load**: a recipe is fully type-checked before the model is touched
//! 3. **Immutable graph**: `SemanticGraph` is read-only once built
//! 4. **Total evaluation**: well-typed expressions never fail; missing data is `Null`
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use openbimdl::{Block, Expr, MemorySink, MemorySource, Recipe, RunConfig, RunInputs, Runtime};
//!
//! # fn example(source: &MemorySource) -> openbimdl::Result<()> {
//! let recipe = Recipe::new()
//!     .block(Block::view("walls").from_nodes(["IfcWall"]).select([
//!         ("guid", Expr::call("guid", vec![])),
//!         ("storeys", Expr::call("len", vec![Expr::call("container_chain", vec![])])),
//!     ]))
//!     .export_table("walls", "jsonl", "walls.jsonl");
//!
//! let sink = MemorySink::new();
//! let runtime = Runtime::new(RunConfig::default())?;
//! let report = runtime.run(
//!     RunInputs { recipe: &recipe, recipe_hash: "sha256:abc".into(), source },
//!     &sink,
//!     &sink,
//! )?;
//! println!("{} records", report.dataset.record_count());
//! # Ok(())
//! # }
//! ```
//!
//! ## Pipeline
//!
//! | Stage | Module | Output |
//! |-------|--------|--------|
//! | Type check | `check` | `TypedRecipe` |
//! | Graph build | `graph` | `SemanticGraph` + diagnostics |
//! | Evaluation | `eval` | block rows |
//! | Assembly | `dataset` | `Dataset` |
//! | Export | `dataset::export` | encoded artifacts |
//! | Commit | `dataset::sink`, `manifest` | artifact records + manifest input |

// ============================================================================
// Modules
// ============================================================================

pub mod model;
pub mod source;
pub mod config;
pub mod graph;
pub mod recipe;
pub mod builtins;
pub mod check;
pub mod eval;
pub mod dataset;
pub mod manifest;
pub mod runner;

// ============================================================================
// Re-exports: Model (the DTOs)
// ============================================================================

pub use model::{
    BoundingBox, Direction, Edge, EdgeId, EdgeKind, GeometryHandle, Node, NodeId, NodeRef,
    Provenance, Value,
};

// ============================================================================
// Re-exports: Source, Config, Graph
// ============================================================================

pub use source::{EntityAttributes, EntityRef, MemoryEntity, MemorySource, ModelSource, RawRelationship};
pub use config::{AdjacencyConfig, ConnectsToPolicy, RunConfig};
pub use graph::{Diagnostic, DiagnosticCode, GraphBuild, GraphBuilder, GraphStats, SemanticGraph, Severity, Stage};

// ============================================================================
// Re-exports: Recipe, Check, Eval
// ============================================================================

pub use recipe::{Block, BlockKind, Expr, Recipe, Statement, TypeRef, ValueType};
pub use builtins::{BuiltinRegistry, BuiltinSpec};
pub use check::{CheckError, CheckErrors, DuplicateFeatureError, TypeChecker, TypeError, TypeErrorCode, TypedRecipe};
pub use eval::{ContextKind, Evaluator};

// ============================================================================
// Re-exports: Dataset, Runner
// ============================================================================

pub use dataset::{
    Artifact, ArtifactRecord, ArtifactSink, Dataset, DatasetAssembler, DatasetTable, DirectorySink,
    Exporter, ExporterRegistry, MemorySink, Schema, TableKind,
};
pub use manifest::{ManifestInput, ManifestSink};
pub use runner::{RunInputs, RunReport, Runtime};

/// Version recorded in every manifest.
pub const RUNTIME_VERSION: &str = env!("CARGO_PKG_VERSION");

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Recipe check failed: {0}")]
    Check(CheckErrors),

    #[error("Graph build failed: {diagnostic}")]
    GraphBuild {
        diagnostic: Box<Diagnostic>,
        /// Every diagnostic collected up to and including the fatal one.
        diagnostics: Vec<Diagnostic>,
    },

    #[error("Model load error: {0}")]
    Load(String),

    #[error("Export error for table '{table}' ({format}): {message}")]
    Export { table: String, format: String, message: String },

    #[error("Evaluation error: {0}")]
    Evaluation(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
