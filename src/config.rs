//! Run configuration.
//!
//! Plain serde structs; every field has a default so an empty JSON object is a
//! valid configuration. The resolved configuration is recorded in the manifest.

use serde::{Deserialize, Serialize};

use crate::model::EdgeKind;
use crate::{Error, Result};

/// What to do when `connects_to` inference reports a problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectsToPolicy {
    /// Record a diagnostic and keep building.
    #[default]
    Warn,
    /// Abort the build with `GraphBuildError`.
    Fail,
}

/// Bounding-box adjacency rule for `connects_to` inference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdjacencyConfig {
    pub enabled: bool,
    /// Gap (model units) under which two boxes count as touching.
    pub tolerance: f64,
    /// Confidence attached to inferred edges.
    pub confidence: f64,
}

impl Default for AdjacencyConfig {
    fn default() -> Self {
        Self { enabled: false, tolerance: 0.01, confidence: 0.5 }
    }
}

/// Configuration of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Structural build diagnostics of severity error abort the build.
    pub strict: bool,
    /// Independent of `strict`.
    pub connects_to: ConnectsToPolicy,
    /// Edge kinds to materialize.
    pub edge_kinds: Vec<EdgeKind>,
    pub adjacency: AdjacencyConfig,
    /// Recorded for synthesize blocks; the core never draws random numbers.
    pub seed: Option<u64>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            strict: false,
            connects_to: ConnectsToPolicy::Warn,
            edge_kinds: EdgeKind::ALL.to_vec(),
            adjacency: AdjacencyConfig::default(),
            seed: None,
        }
    }
}

impl RunConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: RunConfig = serde_json::from_str(json)
            .map_err(|e| Error::Config(format!("invalid configuration: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn strict(mut self) -> Self {
        self.strict = true;
        self
    }

    pub fn with_connects_to(mut self, policy: ConnectsToPolicy) -> Self {
        self.connects_to = policy;
        self
    }

    pub fn with_adjacency(mut self, tolerance: f64, confidence: f64) -> Self {
        self.adjacency = AdjacencyConfig { enabled: true, tolerance, confidence };
        self
    }

    pub fn with_edge_kinds(mut self, kinds: impl IntoIterator<Item = EdgeKind>) -> Self {
        self.edge_kinds = kinds.into_iter().collect();
        self
    }

    pub fn allows(&self, kind: EdgeKind) -> bool {
        self.edge_kinds.contains(&kind)
    }

    pub fn validate(&self) -> Result<()> {
        let adj = &self.adjacency;
        if !(adj.confidence > 0.0 && adj.confidence <= 1.0) {
            return Err(Error::Config(format!(
                "adjacency.confidence must be in (0, 1], got {}",
                adj.confidence
            )));
        }
        if !(adj.tolerance >= 0.0 && adj.tolerance.is_finite()) {
            return Err(Error::Config(format!(
                "adjacency.tolerance must be a non-negative number, got {}",
                adj.tolerance
            )));
        }
        Ok(())
    }

    /// Resolved configuration as recorded in the manifest.
    pub fn resolved(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}
