//! Artifact sinks.
//!
//! A run never streams into a sink: every artifact is encoded first and the
//! whole set is handed over in one `commit`. `rollback` undoes a commit when a
//! later step fails.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Component, Path, PathBuf};

use parking_lot::RwLock;
use serde::Serialize;
use tracing::{debug, warn};

use crate::manifest::{ManifestInput, ManifestSink};
use crate::{Error, Result};

/// Encoded export, ready to commit.
#[derive(Debug, Clone, PartialEq)]
pub struct Artifact {
    pub path: String,
    pub table: String,
    pub format: String,
    pub records: usize,
    pub bytes: Vec<u8>,
}

impl Artifact {
    pub fn record(&self) -> ArtifactRecord {
        ArtifactRecord {
            path: self.path.clone(),
            table: self.table.clone(),
            format: self.format.clone(),
            records: self.records,
            bytes: self.bytes.len() as u64,
            digest: self.digest(),
        }
    }

    /// `blake3:<hex>` over the encoded bytes.
    pub fn digest(&self) -> String {
        format!("blake3:{}", blake3::hash(&self.bytes).to_hex())
    }
}

/// What a sink reports for one committed artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactRecord {
    pub path: String,
    pub table: String,
    pub format: String,
    pub records: usize,
    pub bytes: u64,
    pub digest: String,
}

pub trait ArtifactSink {
    /// Store all artifacts or none.
    fn commit(&self, artifacts: &[Artifact]) -> Result<Vec<ArtifactRecord>>;

    /// Remove previously committed artifacts.
    fn rollback(&self, records: &[ArtifactRecord]) -> Result<()>;
}

fn sink_error(artifact: &str, message: impl Into<String>) -> Error {
    Error::Export { table: artifact.to_string(), format: "sink".to_string(), message: message.into() }
}

// ============================================================================
// Memory
// ============================================================================

/// In-memory artifact and manifest store.
#[derive(Debug, Default)]
pub struct MemorySink {
    artifacts: RwLock<BTreeMap<String, Vec<u8>>>,
    manifests: RwLock<Vec<ManifestInput>>,
    fail_manifest: bool,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink whose `record` always fails.
    pub fn failing_manifest() -> Self {
        Self { fail_manifest: true, ..Self::default() }
    }

    pub fn get(&self, path: &str) -> Option<Vec<u8>> {
        self.artifacts.read().get(path).cloned()
    }

    pub fn get_string(&self, path: &str) -> Option<String> {
        self.get(path).and_then(|b| String::from_utf8(b).ok())
    }

    pub fn paths(&self) -> Vec<String> {
        self.artifacts.read().keys().cloned().collect()
    }

    pub fn manifests(&self) -> Vec<ManifestInput> {
        self.manifests.read().clone()
    }
}

impl ArtifactSink for MemorySink {
    fn commit(&self, artifacts: &[Artifact]) -> Result<Vec<ArtifactRecord>> {
        let mut store = self.artifacts.write();
        if let Some(dup) = artifacts.iter().find(|a| store.contains_key(&a.path)) {
            return Err(sink_error(&dup.path, "artifact already exists"));
        }
        for artifact in artifacts {
            store.insert(artifact.path.clone(), artifact.bytes.clone());
        }
        Ok(artifacts.iter().map(Artifact::record).collect())
    }

    fn rollback(&self, records: &[ArtifactRecord]) -> Result<()> {
        let mut store = self.artifacts.write();
        for record in records {
            store.remove(&record.path);
        }
        Ok(())
    }
}

impl ManifestSink for MemorySink {
    fn record(&self, manifest: &ManifestInput) -> Result<()> {
        if self.fail_manifest {
            return Err(Error::Export {
                table: "manifest".to_string(),
                format: "manifest".to_string(),
                message: "manifest sink unavailable".to_string(),
            });
        }
        self.manifests.write().push(manifest.clone());
        Ok(())
    }
}

// ============================================================================
// Directory
// ============================================================================

/// Writes artifacts below a root directory. Each file is first written as
/// `<path>.partial`; the renames only start once every write succeeded.
#[derive(Debug, Clone)]
pub struct DirectorySink {
    root: PathBuf,
}

impl DirectorySink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Relative paths only; no `..` components.
    fn resolve(&self, path: &str) -> Result<PathBuf> {
        let rel = Path::new(path);
        let plain = rel.components().all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
        if path.is_empty() || !plain {
            return Err(sink_error(path, "artifact path must be relative and stay below the sink root"));
        }
        Ok(self.root.join(rel))
    }

    fn remove_all(paths: &[PathBuf]) {
        for path in paths {
            if let Err(e) = fs::remove_file(path) {
                warn!(path = %path.display(), error = %e, "cleanup failed");
            }
        }
    }
}

fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".partial");
    PathBuf::from(name)
}

impl ArtifactSink for DirectorySink {
    fn commit(&self, artifacts: &[Artifact]) -> Result<Vec<ArtifactRecord>> {
        let targets = artifacts
            .iter()
            .map(|a| self.resolve(&a.path))
            .collect::<Result<Vec<_>>>()?;

        let mut written = Vec::with_capacity(targets.len());
        for (artifact, target) in artifacts.iter().zip(&targets) {
            let partial = partial_path(target);
            let result = target
                .parent()
                .map_or(Ok(()), fs::create_dir_all)
                .and_then(|_| fs::write(&partial, &artifact.bytes));
            if let Err(e) = result {
                Self::remove_all(&written);
                return Err(sink_error(&artifact.path, e.to_string()));
            }
            written.push(partial);
        }

        let mut renamed = Vec::with_capacity(targets.len());
        for (partial, target) in written.iter().zip(&targets) {
            if let Err(e) = fs::rename(partial, target) {
                Self::remove_all(&renamed);
                Self::remove_all(&written[renamed.len()..]);
                return Err(sink_error(&target.display().to_string(), e.to_string()));
            }
            renamed.push(target.clone());
        }

        debug!(root = %self.root.display(), artifacts = artifacts.len(), "artifacts committed");
        Ok(artifacts.iter().map(Artifact::record).collect())
    }

    fn rollback(&self, records: &[ArtifactRecord]) -> Result<()> {
        for record in records {
            let path = self.resolve(&record.path)?;
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}
