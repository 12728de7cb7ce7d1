//! Manifest input: what the external manifest generator receives after all
//! artifacts are committed.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::dataset::ArtifactRecord;
use crate::graph::GraphStats;
use crate::Result;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ManifestInput {
    pub runtime_version: String,
    pub recipe_hash: String,
    pub model_fingerprint: String,
    /// Resolved `RunConfig`.
    pub config: serde_json::Value,
    pub outputs: Vec<ArtifactRecord>,
    pub stats: GraphStats,
    /// Non-fatal build diagnostics.
    pub diagnostics: usize,
    /// Only field that differs between identical runs.
    pub generated_at: DateTime<Utc>,
}

impl ManifestInput {
    /// JSON form with `generated_at` removed, for reproducibility checks.
    pub fn deterministic_json(&self) -> Result<String> {
        let mut value = serde_json::to_value(self)?;
        if let Some(map) = value.as_object_mut() {
            map.remove("generated_at");
        }
        Ok(serde_json::to_string(&value)?)
    }
}

pub trait ManifestSink {
    fn record(&self, manifest: &ManifestInput) -> Result<()>;
}
