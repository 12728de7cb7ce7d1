//! Non-fatal findings of the graph build.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Warning,
    Error,
}

/// Build step that produced a diagnostic. Strict mode only looks at
/// `Structural`; `ConnectsTo` findings follow the `connects_to` policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Structural,
    ConnectsTo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticCode {
    EmptyKey,
    DuplicateKey,
    UnknownRelation,
    MissingTarget,
    SelfLoop,
    InvalidBoundingBox,
}

impl DiagnosticCode {
    pub fn as_str(self) -> &'static str {
        match self {
            DiagnosticCode::EmptyKey => "empty_key",
            DiagnosticCode::DuplicateKey => "duplicate_key",
            DiagnosticCode::UnknownRelation => "unknown_relation",
            DiagnosticCode::MissingTarget => "missing_target",
            DiagnosticCode::SelfLoop => "self_loop",
            DiagnosticCode::InvalidBoundingBox => "invalid_bounding_box",
        }
    }
}

/// One build finding: what went wrong, where, and which step reported it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub stage: Stage,
    pub code: DiagnosticCode,
    /// External key of the offending entity (may be empty).
    pub entity: String,
    pub message: String,
}

impl Diagnostic {
    pub fn error(code: DiagnosticCode, entity: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            stage: Stage::Structural,
            code,
            entity: entity.into(),
            message: message.into(),
        }
    }

    pub fn warning(code: DiagnosticCode, entity: impl Into<String>, message: impl Into<String>) -> Self {
        Self { severity: Severity::Warning, ..Self::error(code, entity, message) }
    }

    pub fn at(mut self, stage: Stage) -> Self {
        self.stage = stage;
        self
    }

    /// Fatal under `strict = true`.
    pub fn is_strict_fatal(&self) -> bool {
        self.severity == Severity::Error && self.stage == Stage::Structural
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let severity = match self.severity {
            Severity::Warning => "warning",
            Severity::Error => "error",
        };
        write!(f, "{severity}[{}]", self.code.as_str())?;
        if !self.entity.is_empty() {
            write!(f, " entity '{}'", self.entity)?;
        }
        write!(f, ": {}", self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strict_only_considers_structural_errors() {
        let err = Diagnostic::error(DiagnosticCode::MissingTarget, "w1", "no such entity");
        assert!(err.is_strict_fatal());
        assert!(!err.clone().at(Stage::ConnectsTo).is_strict_fatal());
        let warn = Diagnostic::warning(DiagnosticCode::InvalidBoundingBox, "w1", "min > max");
        assert!(!warn.is_strict_fatal());
    }

    #[test]
    fn test_display() {
        let d = Diagnostic::error(DiagnosticCode::SelfLoop, "w1", "relation targets itself");
        assert_eq!(d.to_string(), "error[self_loop] entity 'w1': relation targets itself");
    }
}
