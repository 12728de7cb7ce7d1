//! Check-time errors.

use std::fmt;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeErrorCode {
    UnknownBuiltin,
    Arity,
    ArgumentType,
    InvalidSelector,
    ContextMismatch,
    OperatorType,
    PredicateNotBool,
    NotOrderable,
    DuplicateField,
    UnknownFeature,
    FeatureContext,
    WithinTarget,
    BlockStructure,
    DuplicateBlock,
    UnsupportedBlock,
    UnknownEdgeKind,
    UnknownExportTable,
    UnknownExportFormat,
    DuplicateExportPath,
    InvalidExport,
}

impl TypeErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            TypeErrorCode::UnknownBuiltin => "unknown_builtin",
            TypeErrorCode::Arity => "arity",
            TypeErrorCode::ArgumentType => "argument_type",
            TypeErrorCode::InvalidSelector => "invalid_selector",
            TypeErrorCode::ContextMismatch => "context_mismatch",
            TypeErrorCode::OperatorType => "operator_type",
            TypeErrorCode::PredicateNotBool => "predicate_not_bool",
            TypeErrorCode::NotOrderable => "not_orderable",
            TypeErrorCode::DuplicateField => "duplicate_field",
            TypeErrorCode::UnknownFeature => "unknown_feature",
            TypeErrorCode::FeatureContext => "feature_context",
            TypeErrorCode::WithinTarget => "within_target",
            TypeErrorCode::BlockStructure => "block_structure",
            TypeErrorCode::DuplicateBlock => "duplicate_block",
            TypeErrorCode::UnsupportedBlock => "unsupported_block",
            TypeErrorCode::UnknownEdgeKind => "unknown_edge_kind",
            TypeErrorCode::UnknownExportTable => "unknown_export_table",
            TypeErrorCode::UnknownExportFormat => "unknown_export_format",
            TypeErrorCode::DuplicateExportPath => "duplicate_export_path",
            TypeErrorCode::InvalidExport => "invalid_export",
        }
    }
}

/// Where in the recipe an error was found.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Location {
    /// Block name, `None` for export declarations.
    pub block: Option<String>,
    /// Statement index inside the block, or export index.
    pub index: Option<usize>,
    /// Statement keyword (`where`, `select`, ...) or `export`.
    pub keyword: Option<&'static str>,
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.block, self.index, self.keyword) {
            (Some(block), Some(i), Some(kw)) => write!(f, "block '{block}', {kw} #{i}"),
            (Some(block), _, _) => write!(f, "block '{block}'"),
            (None, Some(i), Some(kw)) => write!(f, "{kw} #{i}"),
            _ => f.write_str("recipe"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[error("{location}: {message} [{}]", .code.as_str())]
pub struct TypeError {
    pub code: TypeErrorCode,
    pub message: String,
    pub location: Location,
}

/// A feature name defined twice inside one derive block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[error("block '{block}': feature '{feature}' already defined in this block (statement #{statement})")]
pub struct DuplicateFeatureError {
    pub block: String,
    pub feature: String,
    pub statement: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(tag = "error", rename_all = "snake_case")]
pub enum CheckError {
    #[error(transparent)]
    Type(TypeError),
    #[error(transparent)]
    DuplicateFeature(DuplicateFeatureError),
}

/// Every error of one check pass, in discovery order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CheckErrors(pub Vec<CheckError>);

impl CheckErrors {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CheckError> + '_ {
        self.0.iter()
    }

    pub fn type_errors(&self) -> impl Iterator<Item = &TypeError> + '_ {
        self.0.iter().filter_map(|e| match e {
            CheckError::Type(t) => Some(t),
            CheckError::DuplicateFeature(_) => None,
        })
    }

    pub fn duplicate_features(&self) -> impl Iterator<Item = &DuplicateFeatureError> + '_ {
        self.0.iter().filter_map(|e| match e {
            CheckError::DuplicateFeature(d) => Some(d),
            CheckError::Type(_) => None,
        })
    }

    pub fn has_code(&self, code: TypeErrorCode) -> bool {
        self.type_errors().any(|e| e.code == code)
    }
}

impl fmt::Display for CheckErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} error(s)", self.0.len())?;
        for e in &self.0 {
            write!(f, "\n  {e}")?;
        }
        Ok(())
    }
}
