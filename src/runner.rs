//! # Run controller
//!
//! ```text
//! Recipe ─check─▶ TypedRecipe ─┐
//! ModelSource ─build─▶ Graph ──┴─eval─▶ Dataset ─encode─▶ Artifacts
//!                                        commit ─▶ manifest  (rollback on failure)
//! ```
//!
//! A run either commits every artifact and records its manifest, or leaves the
//! sinks untouched. The recipe is checked before the model source is touched.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use crate::builtins::BuiltinRegistry;
use crate::check::{TypeChecker, TypedRecipe};
use crate::config::RunConfig;
use crate::dataset::{Artifact, ArtifactRecord, ArtifactSink, Dataset, DatasetAssembler, Exporter, ExporterRegistry};
use crate::eval::Evaluator;
use crate::graph::{Diagnostic, GraphBuilder, SemanticGraph};
use crate::manifest::{ManifestInput, ManifestSink};
use crate::recipe::Recipe;
use crate::source::ModelSource;
use crate::{Error, Result, RUNTIME_VERSION};

/// Inputs of one run.
pub struct RunInputs<'a> {
    pub recipe: &'a Recipe,
    /// Hash of the recipe text, computed by the front end.
    pub recipe_hash: String,
    pub source: &'a dyn ModelSource,
}

/// Graph, diagnostics and tables of an evaluated recipe.
#[derive(Debug)]
pub struct Evaluated {
    pub graph: SemanticGraph,
    pub diagnostics: Vec<Diagnostic>,
    pub dataset: Dataset,
}

#[derive(Debug)]
pub struct RunReport {
    pub graph: SemanticGraph,
    pub dataset: Dataset,
    /// Non-fatal build diagnostics.
    pub diagnostics: Vec<Diagnostic>,
    pub outputs: Vec<ArtifactRecord>,
    pub manifest: ManifestInput,
}

pub struct Runtime {
    config: RunConfig,
    registry: BuiltinRegistry,
    exporters: ExporterRegistry,
}

impl Runtime {
    pub fn new(config: RunConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            registry: BuiltinRegistry::standard(),
            exporters: ExporterRegistry::standard(),
        })
    }

    /// Register an additional export format.
    pub fn with_exporter(mut self, name: impl Into<String>, exporter: Arc<dyn Exporter>) -> Self {
        self.exporters.register(name, exporter);
        self
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn registry(&self) -> &BuiltinRegistry {
        &self.registry
    }

    pub fn exporters(&self) -> &ExporterRegistry {
        &self.exporters
    }

    /// Type-check against the built-in registry and the known formats.
    pub fn check(&self, recipe: &Recipe) -> Result<TypedRecipe> {
        TypeChecker::new(&self.registry)
            .with_export_formats(self.exporters.formats())
            .check(recipe)
    }

    /// Build the graph and evaluate every block.
    pub fn evaluate(&self, recipe: &TypedRecipe, source: &dyn ModelSource) -> Result<Evaluated> {
        let build = GraphBuilder::new(self.config.clone()).build(source)?;
        let outputs = Evaluator::new(&build.graph, recipe).run(recipe);
        let dataset = DatasetAssembler::new(recipe).assemble(&build.graph, outputs)?;
        Ok(Evaluated { graph: build.graph, diagnostics: build.diagnostics, dataset })
    }

    /// Encode every export declaration into memory, in declaration order.
    pub fn encode(&self, recipe: &TypedRecipe, dataset: &Dataset) -> Result<Vec<Artifact>> {
        recipe
            .exports
            .iter()
            .map(|export| {
                let name = export.source.table_name();
                let table = dataset.table(name).ok_or_else(|| Error::Export {
                    table: name.to_string(),
                    format: export.format.clone(),
                    message: "table not found in dataset".to_string(),
                })?;
                let bytes = self.exporters.encode(name, &export.format, &table.schema, &table.records)?;
                Ok(Artifact {
                    path: export.path.clone(),
                    table: name.to_string(),
                    format: export.format.clone(),
                    records: table.records.len(),
                    bytes,
                })
            })
            .collect()
    }

    #[tracing::instrument(skip_all, fields(recipe_hash = %inputs.recipe_hash))]
    pub fn run(
        &self,
        inputs: RunInputs<'_>,
        artifacts: &dyn ArtifactSink,
        manifests: &dyn ManifestSink,
    ) -> Result<RunReport> {
        let typed = self.check(inputs.recipe)?;
        let model_fingerprint = inputs.source.fingerprint()?;
        let Evaluated { graph, diagnostics, dataset } = self.evaluate(&typed, inputs.source)?;
        let encoded = self.encode(&typed, &dataset)?;

        let outputs = artifacts.commit(&encoded)?;
        let manifest = ManifestInput {
            runtime_version: RUNTIME_VERSION.to_string(),
            recipe_hash: inputs.recipe_hash,
            model_fingerprint,
            config: self.config.resolved(),
            outputs: outputs.clone(),
            stats: graph.stats(),
            diagnostics: diagnostics.len(),
            generated_at: Utc::now(),
        };
        if let Err(err) = manifests.record(&manifest) {
            if let Err(rollback) = artifacts.rollback(&outputs) {
                warn!(error = %rollback, "rollback after manifest failure failed");
            }
            return Err(err);
        }

        info!(
            tables = dataset.len(),
            artifacts = outputs.len(),
            diagnostics = diagnostics.len(),
            "run complete"
        );
        Ok(RunReport { graph, dataset, diagnostics, outputs, manifest })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AdjacencyConfig;
    use crate::dataset::MemorySink;
    use crate::recipe::{Block, Expr};
    use crate::source::{MemoryEntity, MemorySource};

    fn source() -> MemorySource {
        MemorySource::new("model-v1")
            .with_entity(MemoryEntity::new("s", "IfcBuildingStorey"))
            .with_entity(MemoryEntity::new("w", "IfcWall").relate("contained_in", "s"))
    }

    fn recipe() -> Recipe {
        Recipe::new()
            .block(Block::view("walls").from_nodes(["IfcWall"]).select([("g", Expr::call("guid", vec![]))]))
            .export_table("walls", "jsonl", "walls.jsonl")
    }

    #[test]
    fn test_run_commits_and_records_manifest() {
        let sink = MemorySink::new();
        let src = source();
        let report = Runtime::new(RunConfig::default())
            .unwrap()
            .run(RunInputs { recipe: &recipe(), recipe_hash: "h1".into(), source: &src }, &sink, &sink)
            .unwrap();
        assert_eq!(sink.get_string("walls.jsonl").as_deref(), Some("{\"g\":\"w\"}\n"));
        assert_eq!(report.manifest.model_fingerprint, "model-v1");
        assert_eq!(report.manifest.runtime_version, RUNTIME_VERSION);
        assert_eq!(report.manifest.outputs[0].records, 1);
        assert_eq!(sink.manifests().len(), 1);
    }

    #[test]
    fn test_manifest_failure_rolls_back() {
        let sink = MemorySink::failing_manifest();
        let src = source();
        let err = Runtime::new(RunConfig::default())
            .unwrap()
            .run(RunInputs { recipe: &recipe(), recipe_hash: "h1".into(), source: &src }, &sink, &sink)
            .unwrap_err();
        assert!(matches!(err, Error::Export { .. }));
        assert!(sink.paths().is_empty());
    }

    #[test]
    fn test_unknown_format_rejected_before_model_access() {
        let sink = MemorySink::new();
        let src = source();
        let recipe = recipe().export_table("walls", "parquet", "walls.parquet");
        let err = Runtime::new(RunConfig::default())
            .unwrap()
            .run(RunInputs { recipe: &recipe, recipe_hash: "h".into(), source: &src }, &sink, &sink)
            .unwrap_err();
        assert!(matches!(err, Error::Check(_)));
        assert_eq!(src.access_count(), 0);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = RunConfig {
            adjacency: AdjacencyConfig { enabled: true, tolerance: -1.0, confidence: 0.5 },
            ..RunConfig::default()
        };
        assert!(matches!(Runtime::new(config), Err(Error::Config(_))));
    }
}
