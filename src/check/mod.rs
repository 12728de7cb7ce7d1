//! # Type Checker
//!
//! Validates a [`Recipe`] before any model access and lowers it into the
//! [`TypedRecipe`] the evaluator runs. One pass over the whole recipe; errors
//! are accumulated and returned together as [`Error::Check`].
//!
//! ## Checks
//!
//! | Area | Rule |
//! |------|------|
//! | blocks | view: `[from] where* select`; derive: `[from] where* feature+`; unique names |
//! | built-ins | known name, arity, parameter types, literal selectors, allowed context |
//! | operators | Number, String or Bool operands as the operator requires; no `Any` |
//! | statements | `where` is Bool, `order by` keys are orderable, unique field names |
//! | features | defined earlier, same element context, unique per block |
//! | `within` | target is NodeRef or EdgeRef |
//! | exports | known table, known format, unique non-empty path |
//!
//! After the first error in an expression its parents are dropped silently,
//! so one mistake yields one error.

pub mod error;
pub mod typed;

use std::collections::BTreeMap;

use hashbrown::{HashMap, HashSet};
use tracing::{debug, info};

use crate::builtins::{BuiltinRegistry, Param};
use crate::eval::ContextKind;
use crate::graph::builder::normalize_type_tag;
use crate::model::{Direction, EdgeKind, Value};
use crate::recipe::{
    BinaryOp, Block, BlockKind, ExportSource, Expr, Literal, Recipe, Statement, Target, TypeRef,
    UnaryOp, ValueType,
};
use crate::{Error, Result};

pub use error::{CheckError, CheckErrors, DuplicateFeatureError, Location, TypeError, TypeErrorCode};
pub use typed::{
    EdgeSelector, ElementSet, FeatureId, FeatureInfo, TypedBlock, TypedDerive, TypedExport,
    TypedExportSource, TypedExpr, TypedExprKind, TypedFeature, TypedField, TypedOrderKey,
    TypedRecipe, TypedView,
};

/// Recipe validator.
pub struct TypeChecker<'r> {
    registry: &'r BuiltinRegistry,
    /// Known export format names; `None` skips the format check.
    formats: Option<HashSet<String>>,
}

impl<'r> TypeChecker<'r> {
    pub fn new(registry: &'r BuiltinRegistry) -> Self {
        Self { registry, formats: None }
    }

    pub fn with_export_formats<S: Into<String>>(mut self, formats: impl IntoIterator<Item = S>) -> Self {
        self.formats = Some(formats.into_iter().map(Into::into).collect());
        self
    }

    #[tracing::instrument(skip_all, fields(blocks = recipe.blocks.len(), exports = recipe.exports.len()))]
    pub fn check(&self, recipe: &Recipe) -> Result<TypedRecipe> {
        let mut pass = Pass {
            registry: self.registry,
            errors: Vec::new(),
            features: Vec::new(),
            scope: HashMap::new(),
        };

        let mut blocks = Vec::new();
        let mut names = HashSet::new();
        for block in &recipe.blocks {
            if !block.name.is_empty() && !names.insert(block.name.as_str()) {
                pass.type_error(
                    TypeErrorCode::DuplicateBlock,
                    format!("block name '{}' is already used", block.name),
                    Location { block: Some(block.name.clone()), ..Location::default() },
                );
            }
            if let Some(typed) = pass.block(block) {
                debug!(block = %block.name, kind = block.kind.as_str(), "block checked");
                blocks.push(typed);
            }
        }

        let tables: HashSet<&str> = recipe
            .blocks
            .iter()
            .filter(|b| matches!(b.kind, BlockKind::View | BlockKind::Derive))
            .map(|b| b.name.as_str())
            .collect();
        let exports = pass.exports(recipe, &tables, self.formats.as_ref());

        if !pass.errors.is_empty() {
            info!(errors = pass.errors.len(), "recipe rejected");
            return Err(Error::Check(CheckErrors(pass.errors)));
        }
        info!(blocks = blocks.len(), features = pass.features.len(), "recipe checked");
        Ok(TypedRecipe { blocks, features: pass.features, exports })
    }
}

/// Feature name binding. A feature whose expression failed to check is
/// poisoned: references to it are dropped without a second error.
#[derive(Debug, Clone, Copy)]
enum Slot {
    Ready(FeatureId),
    Poisoned,
}

/// Position of the statement being checked.
struct Site<'b> {
    block: &'b str,
    index: usize,
    keyword: &'static str,
}

impl Site<'_> {
    fn location(&self) -> Location {
        Location {
            block: Some(self.block.to_string()),
            index: Some(self.index),
            keyword: Some(self.keyword),
        }
    }
}

struct Pass<'r> {
    registry: &'r BuiltinRegistry,
    errors: Vec<CheckError>,
    features: Vec<FeatureInfo>,
    scope: HashMap<(ContextKind, String), Slot>,
}

impl Pass<'_> {
    fn type_error(&mut self, code: TypeErrorCode, message: impl Into<String>, location: Location) {
        self.errors.push(CheckError::Type(TypeError { code, message: message.into(), location }));
    }

    fn error_at(&mut self, code: TypeErrorCode, message: impl Into<String>, site: &Site<'_>) {
        self.type_error(code, message, site.location());
    }

    // ========================================================================
    // Blocks
    // ========================================================================

    fn block(&mut self, block: &Block) -> Option<TypedBlock> {
        let block_loc = Location { block: Some(block.name.clone()), ..Location::default() };
        let is_view = match block.kind {
            BlockKind::View => true,
            BlockKind::Derive => false,
            BlockKind::Synthesize | BlockKind::Split => {
                self.type_error(
                    TypeErrorCode::UnsupportedBlock,
                    format!("{} blocks are not executed by this runtime", block.kind.as_str()),
                    block_loc,
                );
                return None;
            }
        };
        let errors_before = self.errors.len();
        if block.name.trim().is_empty() {
            self.type_error(TypeErrorCode::BlockStructure, "block name must not be empty", block_loc.clone());
        }

        let mut elements = ElementSet::all_nodes();
        let mut filters = Vec::new();
        let mut select = None;
        let mut features = Vec::new();
        let mut defined: HashSet<&str> = HashSet::new();

        for (index, statement) in block.statements.iter().enumerate() {
            let site = Site { block: &block.name, index, keyword: statement.keyword() };
            match statement {
                Statement::From { target } => {
                    if index != 0 {
                        self.error_at(TypeErrorCode::BlockStructure, "`from` must be the first statement", &site);
                    }
                    elements = self.element_set(target, &site);
                }
                Statement::Where { predicate } => {
                    if select.is_some() || !defined.is_empty() {
                        let after = if is_view { "`select`" } else { "the first `feature`" };
                        self.error_at(
                            TypeErrorCode::BlockStructure,
                            format!("`where` must come before {after}"),
                            &site,
                        );
                    }
                    if let Some(typed) = self.expr(predicate, elements.context(), &site) {
                        if typed.ty.ty == ValueType::Bool {
                            filters.push(typed);
                        } else {
                            self.error_at(
                                TypeErrorCode::PredicateNotBool,
                                format!("`where` predicate must be Bool, found {}", typed.ty),
                                &site,
                            );
                        }
                    }
                }
                Statement::Select { fields, order_by } => {
                    if !is_view {
                        self.error_at(TypeErrorCode::BlockStructure, "`select` is not allowed in a derive block", &site);
                        continue;
                    }
                    if select.is_some() {
                        self.error_at(TypeErrorCode::BlockStructure, "a view has exactly one `select`", &site);
                        continue;
                    }
                    select = Some(self.select(fields, order_by, elements.context(), &site));
                }
                Statement::Feature { name, expr } => {
                    if is_view {
                        self.error_at(TypeErrorCode::BlockStructure, "`feature` is not allowed in a view block", &site);
                        continue;
                    }
                    if !defined.insert(name.as_str()) {
                        self.errors.push(CheckError::DuplicateFeature(DuplicateFeatureError {
                            block: block.name.clone(),
                            feature: name.clone(),
                            statement: index,
                        }));
                        continue;
                    }
                    if name == elements.key_column() {
                        self.error_at(
                            TypeErrorCode::DuplicateField,
                            format!("feature '{name}' collides with the key column of the derive table"),
                            &site,
                        );
                    }
                    let context = elements.context();
                    match self.expr(expr, context, &site) {
                        Some(typed) => {
                            let id = FeatureId(self.features.len() as u32);
                            self.features.push(FeatureInfo {
                                id,
                                name: name.clone(),
                                block: block.name.clone(),
                                context,
                                ty: typed.ty.clone(),
                            });
                            self.scope.insert((context, name.clone()), Slot::Ready(id));
                            features.push(TypedFeature { id, name: name.clone(), expr: typed });
                        }
                        None => {
                            self.scope.insert((context, name.clone()), Slot::Poisoned);
                        }
                    }
                }
            }
        }

        if is_view && select.is_none() {
            self.type_error(TypeErrorCode::BlockStructure, "view has no `select`", block_loc.clone());
        }
        if !is_view && defined.is_empty() {
            self.type_error(TypeErrorCode::BlockStructure, "derive block defines no `feature`", block_loc);
        }
        if self.errors.len() != errors_before {
            return None;
        }

        let name = block.name.clone();
        if is_view {
            let (fields, order_by) = select.flatten()?;
            Some(TypedBlock::View(TypedView { name, elements, filters, fields, order_by }))
        } else {
            Some(TypedBlock::Derive(TypedDerive { name, elements, filters, features }))
        }
    }

    fn element_set(&mut self, target: &Target, site: &Site<'_>) -> ElementSet {
        match target {
            Target::Nodes { types } => ElementSet::Nodes {
                types: types.iter().map(|t| normalize_type_tag(t)).collect(),
            },
            Target::Edges { kinds } => {
                let mut resolved = Vec::new();
                for kind in kinds {
                    match kind.parse::<EdgeKind>() {
                        Ok(k) => resolved.push(k),
                        Err(msg) => self.error_at(TypeErrorCode::UnknownEdgeKind, msg, site),
                    }
                }
                ElementSet::Edges { kinds: resolved }
            }
        }
    }

    #[allow(clippy::type_complexity)]
    fn select(
        &mut self,
        fields: &[crate::recipe::Field],
        order_by: &[crate::recipe::OrderKey],
        context: ContextKind,
        site: &Site<'_>,
    ) -> Option<(Vec<TypedField>, Vec<TypedOrderKey>)> {
        let mut ok = true;
        let mut seen = HashSet::new();
        let mut typed_fields = Vec::with_capacity(fields.len());
        for field in fields {
            if !seen.insert(field.name.as_str()) {
                self.error_at(
                    TypeErrorCode::DuplicateField,
                    format!("field '{}' appears twice in this select", field.name),
                    site,
                );
                ok = false;
            }
            match self.expr(&field.expr, context, site) {
                Some(expr) => typed_fields.push(TypedField { name: field.name.clone(), expr }),
                None => ok = false,
            }
        }
        if fields.is_empty() {
            self.error_at(TypeErrorCode::BlockStructure, "`select` needs at least one field", site);
            ok = false;
        }

        let mut keys = Vec::with_capacity(order_by.len());
        for key in order_by {
            match self.expr(&key.expr, context, site) {
                Some(expr) if expr.ty.ty.is_orderable() => {
                    keys.push(TypedOrderKey { expr, ascending: key.ascending });
                }
                Some(expr) => {
                    self.error_at(
                        TypeErrorCode::NotOrderable,
                        format!("`order by` key of type {} is not orderable", expr.ty),
                        site,
                    );
                    ok = false;
                }
                None => ok = false,
            }
        }
        ok.then_some((typed_fields, keys))
    }

    // ========================================================================
    // Expressions
    // ========================================================================

    fn expr(&mut self, expr: &Expr, context: ContextKind, site: &Site<'_>) -> Option<TypedExpr> {
        match expr {
            Expr::Literal { value } => Some(literal(value)),
            Expr::Feature { name } => self.feature_ref(name, context, site),
            Expr::Call { name, args } => self.call(name, args, context, site),
            Expr::Binary { op, left, right } => {
                let left = self.expr(left, context, site);
                let right = self.expr(right, context, site);
                let (left, right) = (left?, right?);
                match binary_type(*op, &left.ty, &right.ty) {
                    Ok(ty) => Some(TypedExpr {
                        kind: TypedExprKind::Binary { op: *op, left: Box::new(left), right: Box::new(right) },
                        ty,
                    }),
                    Err(msg) => {
                        self.error_at(TypeErrorCode::OperatorType, msg, site);
                        None
                    }
                }
            }
            Expr::Unary { op, operand } => {
                let operand = self.expr(operand, context, site)?;
                match unary_type(*op, &operand.ty) {
                    Ok(ty) => Some(TypedExpr {
                        kind: TypedExprKind::Unary { op: *op, operand: Box::new(operand) },
                        ty,
                    }),
                    Err(msg) => {
                        self.error_at(TypeErrorCode::OperatorType, msg, site);
                        None
                    }
                }
            }
            Expr::Within { target, body } => {
                let target = self.expr(target, context, site)?;
                let inner = match target.ty.ty {
                    ValueType::NodeRef => ContextKind::Node,
                    ValueType::EdgeRef => ContextKind::Edge,
                    _ => {
                        self.error_at(
                            TypeErrorCode::WithinTarget,
                            format!("`within` target must be NodeRef or EdgeRef, found {}", target.ty),
                            site,
                        );
                        return None;
                    }
                };
                let body = self.expr(body, inner, site)?;
                let ty = body.ty.clone().with_nullable(target.ty.nullable);
                Some(TypedExpr {
                    kind: TypedExprKind::Within { target: Box::new(target), body: Box::new(body), context: inner },
                    ty,
                })
            }
        }
    }

    fn feature_ref(&mut self, name: &str, context: ContextKind, site: &Site<'_>) -> Option<TypedExpr> {
        match self.scope.get(&(context, name.to_string())).copied() {
            Some(Slot::Ready(id)) => {
                let info = &self.features[id.index()];
                // Elements outside the defining block's batch read Null.
                let ty = info.ty.clone().with_nullable(info.block != site.block);
                Some(TypedExpr { kind: TypedExprKind::Feature { id, name: name.to_string() }, ty })
            }
            Some(Slot::Poisoned) => None,
            None => {
                let elsewhere = [ContextKind::Node, ContextKind::Edge]
                    .into_iter()
                    .find(|c| *c != context && self.scope.contains_key(&(*c, name.to_string())));
                match elsewhere {
                    Some(other) => self.error_at(
                        TypeErrorCode::FeatureContext,
                        format!("feature '{name}' is defined for {other} elements, not {context}"),
                        site,
                    ),
                    None => self.error_at(
                        TypeErrorCode::UnknownFeature,
                        format!("feature '{name}' is not defined before this point"),
                        site,
                    ),
                }
                None
            }
        }
    }

    fn call(&mut self, name: &str, args: &[Expr], context: ContextKind, site: &Site<'_>) -> Option<TypedExpr> {
        let registry = self.registry;
        let Some((id, spec)) = registry.lookup(name) else {
            self.error_at(TypeErrorCode::UnknownBuiltin, format!("unknown built-in '{name}'"), site);
            for arg in args {
                self.expr(arg, context, site);
            }
            return None;
        };

        let mut ok = true;
        if !spec.scope.allows(context) {
            self.error_at(
                TypeErrorCode::ContextMismatch,
                format!("'{name}' is only available in {} context, not in {context} context", spec.scope),
                site,
            );
            ok = false;
        }
        if args.len() != spec.params.len() {
            self.error_at(
                TypeErrorCode::Arity,
                format!("{} expects {} argument(s), got {}", spec.signature(), spec.params.len(), args.len()),
                site,
            );
            for arg in args {
                self.expr(arg, context, site);
            }
            return None;
        }

        let mut typed_args = Vec::new();
        let mut kind_selector = None;
        let mut direction_selector = Direction::Both;
        for (position, (param, arg)) in spec.params.iter().zip(args).enumerate() {
            match param {
                Param::EdgeKindSelector => match string_literal(arg) {
                    Some("*") => kind_selector = None,
                    Some(s) => match s.parse::<EdgeKind>() {
                        Ok(k) => kind_selector = Some(k),
                        Err(msg) => {
                            self.error_at(TypeErrorCode::InvalidSelector, format!("{name}: {msg}"), site);
                            ok = false;
                        }
                    },
                    None => {
                        self.error_at(
                            TypeErrorCode::InvalidSelector,
                            format!("{name}: argument {} must be an edge kind string literal or \"*\"", position + 1),
                            site,
                        );
                        ok = false;
                    }
                },
                Param::DirectionSelector => match string_literal(arg).map(str::parse::<Direction>) {
                    Some(Ok(d)) => direction_selector = d,
                    Some(Err(msg)) => {
                        self.error_at(TypeErrorCode::InvalidSelector, format!("{name}: {msg}"), site);
                        ok = false;
                    }
                    None => {
                        self.error_at(
                            TypeErrorCode::InvalidSelector,
                            format!("{name}: argument {} must be \"in\", \"out\" or \"both\"", position + 1),
                            site,
                        );
                        ok = false;
                    }
                },
                Param::Value(expected) => match self.expr(arg, context, site) {
                    Some(typed) if expected.accepts(&typed.ty.ty) => typed_args.push(typed),
                    Some(typed) => {
                        self.error_at(
                            TypeErrorCode::ArgumentType,
                            format!("{name}: argument {} must be {expected}, found {}", position + 1, typed.ty),
                            site,
                        );
                        ok = false;
                    }
                    None => ok = false,
                },
            }
        }
        if !ok {
            return None;
        }

        let has_selector = spec.params.iter().any(Param::is_selector);
        let ty = spec.result_type(&typed_args.iter().map(|a| a.ty.clone()).collect::<Vec<_>>());
        Some(TypedExpr {
            kind: TypedExprKind::Call {
                id,
                op: spec.op,
                args: typed_args,
                selector: has_selector.then_some(EdgeSelector { kind: kind_selector, direction: direction_selector }),
            },
            ty,
        })
    }

    // ========================================================================
    // Exports
    // ========================================================================

    fn exports(
        &mut self,
        recipe: &Recipe,
        tables: &HashSet<&str>,
        formats: Option<&HashSet<String>>,
    ) -> Vec<TypedExport> {
        let mut out = Vec::new();
        let mut paths = HashSet::new();
        let mut edge_lists: BTreeMap<String, (Vec<EdgeKind>, f64)> = BTreeMap::new();

        for (index, decl) in recipe.exports.iter().enumerate() {
            let loc = Location { block: None, index: Some(index), keyword: Some("export") };
            let errors_before = self.errors.len();

            if decl.path.trim().is_empty() {
                self.type_error(TypeErrorCode::InvalidExport, "export path must not be empty", loc.clone());
            } else if !paths.insert(decl.path.as_str()) {
                self.type_error(
                    TypeErrorCode::DuplicateExportPath,
                    format!("path '{}' is already the target of another export", decl.path),
                    loc.clone(),
                );
            }
            if let Some(known) = formats {
                if !known.contains(&decl.format) {
                    let mut names: Vec<&str> = known.iter().map(String::as_str).collect();
                    names.sort_unstable();
                    self.type_error(
                        TypeErrorCode::UnknownExportFormat,
                        format!("unknown export format '{}' (known: {})", decl.format, names.join(", ")),
                        loc.clone(),
                    );
                }
            }

            let source = match &decl.source {
                ExportSource::Table { name } => {
                    if !tables.contains(name.as_str()) {
                        self.type_error(
                            TypeErrorCode::UnknownExportTable,
                            format!("no view or derive block named '{name}'"),
                            loc.clone(),
                        );
                    }
                    TypedExportSource::Table(name.clone())
                }
                ExportSource::EdgeList { name, kinds, min_confidence } => {
                    let mut resolved = Vec::new();
                    for kind in kinds {
                        match kind.parse::<EdgeKind>() {
                            Ok(k) => resolved.push(k),
                            Err(msg) => self.type_error(TypeErrorCode::UnknownEdgeKind, msg, loc.clone()),
                        }
                    }
                    if !(0.0..=1.0).contains(min_confidence) {
                        self.type_error(
                            TypeErrorCode::InvalidExport,
                            format!("min_confidence must be within [0, 1], got {min_confidence}"),
                            loc.clone(),
                        );
                    }
                    if tables.contains(name.as_str()) {
                        self.type_error(
                            TypeErrorCode::InvalidExport,
                            format!("edge list name '{name}' collides with a block name"),
                            loc.clone(),
                        );
                    }
                    let params = (resolved.clone(), *min_confidence);
                    match edge_lists.get(name) {
                        Some(existing) if *existing != params => self.type_error(
                            TypeErrorCode::InvalidExport,
                            format!("edge list '{name}' is declared twice with different parameters"),
                            loc.clone(),
                        ),
                        Some(_) => {}
                        None => {
                            edge_lists.insert(name.clone(), params);
                        }
                    }
                    TypedExportSource::EdgeList { name: name.clone(), kinds: resolved, min_confidence: *min_confidence }
                }
            };

            if self.errors.len() == errors_before {
                out.push(TypedExport { source, format: decl.format.clone(), path: decl.path.clone() });
            }
        }
        out
    }
}

// ============================================================================
// Typing rules
// ============================================================================

fn literal(value: &Literal) -> TypedExpr {
    let (value, ty) = match value {
        Literal::Null => (Value::Null, TypeRef::null()),
        Literal::Bool(b) => (Value::Bool(*b), TypeRef::bool()),
        Literal::Int(i) => (Value::Int(*i), TypeRef::int()),
        Literal::Float(f) => (Value::Float(*f), TypeRef::float()),
        Literal::String(s) => (Value::String(s.clone()), TypeRef::string()),
    };
    TypedExpr { kind: TypedExprKind::Literal(value), ty }
}

fn string_literal(expr: &Expr) -> Option<&str> {
    match expr {
        Expr::Literal { value: Literal::String(s) } => Some(s),
        _ => None,
    }
}

fn numeric_or_null(ty: &ValueType) -> bool {
    ty.is_numeric() || *ty == ValueType::Null
}

/// Result type of a binary operator, or why the operands do not fit.
pub fn binary_type(op: BinaryOp, left: &TypeRef, right: &TypeRef) -> std::result::Result<TypeRef, String> {
    use ValueType as T;
    let (l, r) = (&left.ty, &right.ty);
    let nullable = left.nullable || right.nullable;
    if *l == T::Any || *r == T::Any {
        return Err(format!(
            "operands of `{}` must have a static type; found {} and {} (use pset.text, pset.numeric or exists)",
            op.symbol(),
            left,
            right
        ));
    }
    let mismatch = |want: &str| {
        format!("`{}` needs {want} operands, found {} and {}", op.symbol(), left, right)
    };

    match op {
        BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => {
            if !numeric_or_null(l) || !numeric_or_null(r) {
                return Err(mismatch("Number"));
            }
            let ty = match (l, r) {
                _ if op == BinaryOp::Div => T::Float,
                (T::Null, T::Null) => T::Null,
                (T::Float, _) | (_, T::Float) => T::Float,
                _ => T::Int,
            };
            // Division by zero, integer overflow and non-finite floats evaluate to Null.
            Ok(TypeRef { ty, nullable: true })
        }
        BinaryOp::Lt | BinaryOp::Lte | BinaryOp::Gt | BinaryOp::Gte => {
            let numeric = numeric_or_null(l) && numeric_or_null(r);
            let strings = matches!(l, T::String | T::Null) && matches!(r, T::String | T::Null);
            if !numeric && !strings {
                return Err(mismatch("two Number or two String"));
            }
            Ok(TypeRef::bool().with_nullable(nullable))
        }
        BinaryOp::Eq | BinaryOp::Neq => {
            let comparable = *l == T::Null
                || *r == T::Null
                || (l.is_numeric() && r.is_numeric())
                || l == r;
            if !comparable {
                return Err(mismatch("comparable"));
            }
            Ok(TypeRef::bool().with_nullable(nullable))
        }
        BinaryOp::And | BinaryOp::Or => {
            let boolish = |t: &T| matches!(t, T::Bool | T::Null);
            if !boolish(l) || !boolish(r) {
                return Err(mismatch("Bool"));
            }
            Ok(TypeRef::bool().with_nullable(nullable))
        }
    }
}

pub fn unary_type(op: UnaryOp, operand: &TypeRef) -> std::result::Result<TypeRef, String> {
    match op {
        UnaryOp::Not => match operand.ty {
            ValueType::Bool | ValueType::Null => Ok(TypeRef::bool().with_nullable(operand.nullable)),
            _ => Err(format!("`not` needs a Bool operand, found {operand}")),
        },
        UnaryOp::Neg => match operand.ty {
            ValueType::Float => Ok(operand.clone()),
            // -i64::MIN overflows.
            ValueType::Int => Ok(TypeRef::nullable(ValueType::Int)),
            ValueType::Null => Ok(TypeRef::null()),
            _ => Err(format!("unary `-` needs a Number operand, found {operand}")),
        },
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recipe::Block;

    fn check(recipe: &Recipe) -> Result<TypedRecipe> {
        let registry = BuiltinRegistry::standard();
        TypeChecker::new(&registry).with_export_formats(["jsonl", "tsv"]).check(recipe)
    }

    fn errors(recipe: &Recipe) -> CheckErrors {
        match check(recipe) {
            Err(Error::Check(errors)) => errors,
            other => panic!("expected check errors, got {other:?}"),
        }
    }

    fn guid() -> Expr {
        Expr::call("guid", vec![])
    }

    #[test]
    fn test_view_types() {
        let recipe = Recipe::new().block(Block::view("v").select([
            ("guid", guid()),
            ("deg", Expr::call("degree", vec![Expr::lit("contained_in"), Expr::lit("in")])),
            ("w", Expr::call("pset.numeric", vec![Expr::lit("P"), Expr::lit("Width")])),
        ]));
        let typed = check(&recipe).unwrap();
        let TypedBlock::View(view) = &typed.blocks[0] else { panic!("expected view") };
        let types: Vec<String> = view.fields.iter().map(|f| f.expr.ty.to_string()).collect();
        assert_eq!(types, vec!["String", "Int", "Float?"]);
        let TypedExprKind::Call { selector, args, .. } = &view.fields[1].expr.kind else { panic!() };
        assert!(args.is_empty());
        assert_eq!(
            *selector,
            Some(EdgeSelector { kind: Some(EdgeKind::ContainedIn), direction: Direction::Incoming })
        );
    }

    #[test]
    fn test_errors_accumulate() {
        let recipe = Recipe::new()
            .block(Block::view("a").select([("x", Expr::call("nope", vec![]))]))
            .block(Block::view("b").filter(Expr::lit(1)).select([("g", guid())]))
            .block(Block::view("c").select([("x", Expr::binary(BinaryOp::Add, Expr::lit("a"), Expr::lit(1)))]));
        let errs = errors(&recipe);
        assert_eq!(errs.len(), 3);
        assert!(errs.has_code(TypeErrorCode::UnknownBuiltin));
        assert!(errs.has_code(TypeErrorCode::PredicateNotBool));
        assert!(errs.has_code(TypeErrorCode::OperatorType));
    }

    #[test]
    fn test_node_builtin_rejected_in_edge_context() {
        let recipe = Recipe::new().block(
            Block::view("edges").from_edges(["contained_in"]).select([("g", guid())]),
        );
        let errs = errors(&recipe);
        assert!(errs.has_code(TypeErrorCode::ContextMismatch));
    }

    #[test]
    fn test_within_switches_context() {
        let recipe = Recipe::new().block(Block::view("edges").from_edges(Vec::<String>::new()).select([(
            "src",
            Expr::within(Expr::call("edge.source", vec![]), guid()),
        )]));
        let typed = check(&recipe).unwrap();
        let TypedBlock::View(view) = &typed.blocks[0] else { panic!() };
        assert_eq!(view.fields[0].expr.ty, TypeRef::string());
    }

    #[test]
    fn test_within_nullable_target() {
        let recipe = Recipe::new().block(Block::view("v").select([(
            "storey",
            Expr::within(Expr::call("contained_in", vec![]), Expr::call("ifc.type", vec![])),
        )]));
        let typed = check(&recipe).unwrap();
        let TypedBlock::View(view) = &typed.blocks[0] else { panic!() };
        assert_eq!(view.fields[0].expr.ty, TypeRef::nullable(ValueType::String));
    }

    #[test]
    fn test_duplicate_feature() {
        let recipe = Recipe::new().block(
            Block::derive("d")
                .feature("f", Expr::lit(1))
                .feature("f", Expr::lit(2)),
        );
        let errs = errors(&recipe);
        let dups: Vec<_> = errs.duplicate_features().collect();
        assert_eq!(dups.len(), 1);
        assert_eq!(dups[0].feature, "f");
        assert_eq!(dups[0].statement, 1);
    }

    #[test]
    fn test_feature_resolution() {
        let recipe = Recipe::new()
            .block(
                Block::derive("d")
                    .feature("area", Expr::call("pset.numeric", vec![Expr::lit("Q"), Expr::lit("Area")]))
                    .feature("double", Expr::binary(BinaryOp::Mul, Expr::feature("area"), Expr::lit(2))),
            )
            .block(Block::view("v").select([("a", Expr::feature("double"))]));
        let typed = check(&recipe).unwrap();
        assert_eq!(typed.features.len(), 2);
        assert_eq!(typed.features[1].ty, TypeRef::nullable(ValueType::Float));

        let forward = Recipe::new()
            .block(Block::view("v").select([("a", Expr::feature("later"))]))
            .block(Block::derive("d").feature("later", Expr::lit(1)));
        assert!(errors(&forward).has_code(TypeErrorCode::UnknownFeature));
    }

    #[test]
    fn test_feature_context_mismatch() {
        let recipe = Recipe::new()
            .block(Block::derive("d").from_edges(Vec::<String>::new()).feature("conf", Expr::call("edge.confidence", vec![])))
            .block(Block::view("v").select([("c", Expr::feature("conf"))]));
        assert!(errors(&recipe).has_code(TypeErrorCode::FeatureContext));
    }

    #[test]
    fn test_poisoned_feature_reports_once() {
        let recipe = Recipe::new()
            .block(Block::derive("d").feature("bad", Expr::call("nope", vec![])))
            .block(Block::view("v").select([("b", Expr::feature("bad"))]));
        assert_eq!(errors(&recipe).len(), 1);
    }

    #[test]
    fn test_block_structure() {
        let recipe = Recipe::new()
            .block(Block::view("no_select").filter(Expr::lit(true)))
            .block(Block::derive("no_features"))
            .block(Block::view("late_from").select([("g", guid())]).from_nodes(["IfcWall"]))
            .block(Block::view("no_select"));
        let errs = errors(&recipe);
        assert!(errs.has_code(TypeErrorCode::DuplicateBlock));
        assert_eq!(errs.type_errors().filter(|e| e.code == TypeErrorCode::BlockStructure).count(), 4);
    }

    #[test]
    fn test_selector_must_be_literal() {
        let recipe = Recipe::new().block(Block::view("v").select([
            ("a", Expr::call("degree", vec![Expr::call("ifc.type", vec![]), Expr::lit("in")])),
            ("b", Expr::call("degree", vec![Expr::lit("*"), Expr::lit("sideways")])),
        ]));
        let errs = errors(&recipe);
        assert_eq!(errs.type_errors().filter(|e| e.code == TypeErrorCode::InvalidSelector).count(), 2);
    }

    #[test]
    fn test_any_needs_conversion() {
        let get = Expr::call("pset.get", vec![Expr::lit("P"), Expr::lit("X")]);
        let recipe = Recipe::new().block(
            Block::view("v")
                .filter(Expr::binary(BinaryOp::Gt, get.clone(), Expr::lit(1)))
                .select([("x", get)]),
        );
        assert!(errors(&recipe).has_code(TypeErrorCode::OperatorType));
    }

    #[test]
    fn test_exports() {
        let recipe = Recipe::new()
            .block(Block::view("v").select([("g", guid())]))
            .export_table("v", "jsonl", "v.jsonl")
            .export_table("missing", "jsonl", "m.jsonl")
            .export_table("v", "parquet", "v.parquet")
            .export_table("v", "tsv", "v.jsonl");
        let errs = errors(&recipe);
        assert!(errs.has_code(TypeErrorCode::UnknownExportTable));
        assert!(errs.has_code(TypeErrorCode::UnknownExportFormat));
        assert!(errs.has_code(TypeErrorCode::DuplicateExportPath));
        assert_eq!(errs.len(), 3);
    }

    #[test]
    fn test_unsupported_blocks() {
        let recipe = Recipe::new().block(Block::new(BlockKind::Split, "s"));
        assert!(errors(&recipe).has_code(TypeErrorCode::UnsupportedBlock));
    }

    #[test]
    fn test_arithmetic_types() {
        let int = TypeRef::int();
        let float = TypeRef::float();
        assert_eq!(binary_type(BinaryOp::Add, &int, &int).unwrap(), TypeRef::nullable(ValueType::Int));
        assert_eq!(binary_type(BinaryOp::Add, &float, &int).unwrap(), TypeRef::nullable(ValueType::Float));
        assert_eq!(binary_type(BinaryOp::Mul, &float, &float).unwrap(), TypeRef::nullable(ValueType::Float));
        assert_eq!(binary_type(BinaryOp::Div, &int, &int).unwrap(), TypeRef::nullable(ValueType::Float));
        assert_eq!(binary_type(BinaryOp::Eq, &TypeRef::string(), &TypeRef::null()).unwrap(), TypeRef::nullable(ValueType::Bool));
        assert!(binary_type(BinaryOp::Lt, &TypeRef::string(), &int).is_err());
        assert!(binary_type(BinaryOp::And, &TypeRef::bool(), &int).is_err());
    }
}
