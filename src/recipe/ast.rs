//! Recipe AST.
//!
//! Pure data handed over by the recipe front end, usually as JSON. No
//! behavior beyond construction helpers; validation lives in `check`.

use serde::{Deserialize, Serialize};

/// A complete recipe: ordered blocks plus export declarations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Recipe {
    pub blocks: Vec<Block>,
    #[serde(default)]
    pub exports: Vec<ExportDecl>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockKind {
    View,
    Derive,
    /// Parsed but not executed by this runtime.
    Synthesize,
    /// Parsed but not executed by this runtime.
    Split,
}

impl BlockKind {
    pub fn as_str(self) -> &'static str {
        match self {
            BlockKind::View => "view",
            BlockKind::Derive => "derive",
            BlockKind::Synthesize => "synthesize",
            BlockKind::Split => "split",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub kind: BlockKind,
    pub name: String,
    #[serde(default)]
    pub statements: Vec<Statement>,
}

/// One statement of a block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "stmt", rename_all = "snake_case")]
pub enum Statement {
    /// `from nodes [types]` / `from edges [kinds]`
    From { target: Target },
    /// `where(predicate)`
    Where { predicate: Expr },
    /// `select(fields) [order by keys]`
    Select {
        fields: Vec<Field>,
        #[serde(default)]
        order_by: Vec<OrderKey>,
    },
    /// `feature(name, expr)`
    Feature { name: String, expr: Expr },
}

impl Statement {
    pub fn keyword(&self) -> &'static str {
        match self {
            Statement::From { .. } => "from",
            Statement::Where { .. } => "where",
            Statement::Select { .. } => "select",
            Statement::Feature { .. } => "feature",
        }
    }
}

/// Element set a block iterates over.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "over", rename_all = "snake_case")]
pub enum Target {
    /// Nodes of the given type tags; empty means all nodes.
    Nodes {
        #[serde(default)]
        types: Vec<String>,
    },
    /// Edges of the given kind names; empty means all edges.
    Edges {
        #[serde(default)]
        kinds: Vec<String>,
    },
}

/// Named output column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub expr: Expr,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderKey {
    pub expr: Expr,
    #[serde(default = "ascending_default")]
    pub ascending: bool,
}

fn ascending_default() -> bool {
    true
}

// ============================================================================
// Expressions
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "expr", rename_all = "snake_case")]
pub enum Expr {
    Literal { value: Literal },
    /// Reference to a feature defined earlier.
    Feature { name: String },
    /// Built-in call: `pset.get("Pset_WallCommon", "FireRating")`
    Call {
        name: String,
        #[serde(default)]
        args: Vec<Expr>,
    },
    Binary { op: BinaryOp, left: Box<Expr>, right: Box<Expr> },
    Unary { op: UnaryOp, operand: Box<Expr> },
    /// Evaluate `body` with the element context switched to `target`.
    Within { target: Box<Expr>, body: Box<Expr> },
}

/// Literal values. Plain JSON scalars in serialized recipes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Literal {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    #[serde(rename = "+")] Add,
    #[serde(rename = "-")] Sub,
    #[serde(rename = "*")] Mul,
    #[serde(rename = "/")] Div,
    #[serde(rename = "%")] Mod,
    #[serde(rename = "==")] Eq,
    #[serde(rename = "!=")] Neq,
    #[serde(rename = "<")] Lt,
    #[serde(rename = "<=")] Lte,
    #[serde(rename = ">")] Gt,
    #[serde(rename = ">=")] Gte,
    #[serde(rename = "and")] And,
    #[serde(rename = "or")] Or,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Eq => "==",
            BinaryOp::Neq => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Lte => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Gte => ">=",
            BinaryOp::And => "and",
            BinaryOp::Or => "or",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    #[serde(rename = "not")] Not,
    #[serde(rename = "-")] Neg,
}

// ============================================================================
// Export declarations
// ============================================================================

/// `export <source> as <format> to <path>`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportDecl {
    pub source: ExportSource,
    pub format: String,
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExportSource {
    /// A view or derive table, by block name.
    Table { name: String },
    /// The graph as an edge list.
    EdgeList {
        #[serde(default = "edge_list_name")]
        name: String,
        /// Edge kind names; empty means every kind.
        #[serde(default)]
        kinds: Vec<String>,
        #[serde(default)]
        min_confidence: f64,
    },
}

fn edge_list_name() -> String {
    "edges".to_string()
}

// ============================================================================
// Construction helpers
// ============================================================================

impl Expr {
    pub fn lit(value: impl Into<Literal>) -> Self {
        Expr::Literal { value: value.into() }
    }

    pub fn null() -> Self {
        Expr::Literal { value: Literal::Null }
    }

    pub fn feature(name: impl Into<String>) -> Self {
        Expr::Feature { name: name.into() }
    }

    pub fn call(name: impl Into<String>, args: Vec<Expr>) -> Self {
        Expr::Call { name: name.into(), args }
    }

    pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> Self {
        Expr::Binary { op, left: Box::new(left), right: Box::new(right) }
    }

    pub fn unary(op: UnaryOp, operand: Expr) -> Self {
        Expr::Unary { op, operand: Box::new(operand) }
    }

    pub fn within(target: Expr, body: Expr) -> Self {
        Expr::Within { target: Box::new(target), body: Box::new(body) }
    }
}

impl From<bool> for Literal { fn from(v: bool) -> Self { Literal::Bool(v) } }
impl From<i64> for Literal { fn from(v: i64) -> Self { Literal::Int(v) } }
impl From<i32> for Literal { fn from(v: i32) -> Self { Literal::Int(v as i64) } }
impl From<f64> for Literal { fn from(v: f64) -> Self { Literal::Float(v) } }
impl From<&str> for Literal { fn from(v: &str) -> Self { Literal::String(v.to_owned()) } }
impl From<String> for Literal { fn from(v: String) -> Self { Literal::String(v) } }

impl Block {
    pub fn new(kind: BlockKind, name: impl Into<String>) -> Self {
        Self { kind, name: name.into(), statements: Vec::new() }
    }

    pub fn view(name: impl Into<String>) -> Self {
        Self::new(BlockKind::View, name)
    }

    pub fn derive(name: impl Into<String>) -> Self {
        Self::new(BlockKind::Derive, name)
    }

    pub fn statement(mut self, statement: Statement) -> Self {
        self.statements.push(statement);
        self
    }

    pub fn from_nodes<S: Into<String>>(self, types: impl IntoIterator<Item = S>) -> Self {
        let types = types.into_iter().map(Into::into).collect();
        self.statement(Statement::From { target: Target::Nodes { types } })
    }

    pub fn from_edges<S: Into<String>>(self, kinds: impl IntoIterator<Item = S>) -> Self {
        let kinds = kinds.into_iter().map(Into::into).collect();
        self.statement(Statement::From { target: Target::Edges { kinds } })
    }

    pub fn filter(self, predicate: Expr) -> Self {
        self.statement(Statement::Where { predicate })
    }

    pub fn select<S: Into<String>>(self, fields: impl IntoIterator<Item = (S, Expr)>) -> Self {
        let fields = fields
            .into_iter()
            .map(|(name, expr)| Field { name: name.into(), expr })
            .collect();
        self.statement(Statement::Select { fields, order_by: Vec::new() })
    }

    /// Attach order keys to the last `select`.
    pub fn order_by(mut self, keys: impl IntoIterator<Item = (Expr, bool)>) -> Self {
        if let Some(Statement::Select { order_by, .. }) = self.statements.last_mut() {
            order_by.extend(keys.into_iter().map(|(expr, ascending)| OrderKey { expr, ascending }));
        }
        self
    }

    pub fn feature(self, name: impl Into<String>, expr: Expr) -> Self {
        self.statement(Statement::Feature { name: name.into(), expr })
    }
}

impl Recipe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn block(mut self, block: Block) -> Self {
        self.blocks.push(block);
        self
    }

    pub fn export_table(mut self, name: impl Into<String>, format: impl Into<String>, path: impl Into<String>) -> Self {
        self.exports.push(ExportDecl {
            source: ExportSource::Table { name: name.into() },
            format: format.into(),
            path: path.into(),
        });
        self
    }

    pub fn export(mut self, decl: ExportDecl) -> Self {
        self.exports.push(decl);
        self
    }

    pub fn from_json_str(json: &str) -> crate::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Stable serialization for recipe hashing by the caller.
    pub fn to_canonical_json(&self) -> crate::Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recipe_from_json() {
        let json = r#"{
            "blocks": [{
                "kind": "view", "name": "walls",
                "statements": [
                    {"stmt": "from", "target": {"over": "nodes", "types": ["IfcWall"]}},
                    {"stmt": "where", "predicate": {"expr": "binary", "op": ">",
                        "left": {"expr": "call", "name": "pset.numeric", "args": [
                            {"expr": "literal", "value": "Pset_WallCommon"},
                            {"expr": "literal", "value": "Width"}]},
                        "right": {"expr": "literal", "value": 0.2}}},
                    {"stmt": "select", "fields": [
                        {"name": "guid", "expr": {"expr": "call", "name": "guid"}}],
                     "order_by": [{"expr": {"expr": "call", "name": "guid"}, "ascending": false}]}
                ]
            }],
            "exports": [{"source": {"kind": "table", "name": "walls"}, "format": "jsonl", "path": "walls.jsonl"},
                        {"source": {"kind": "edge_list"}, "format": "edge_list", "path": "edges.tsv"}]
        }"#;
        let recipe = Recipe::from_json_str(json).unwrap();
        let expected = Recipe::new()
            .block(
                Block::view("walls")
                    .from_nodes(["IfcWall"])
                    .filter(Expr::binary(
                        BinaryOp::Gt,
                        Expr::call("pset.numeric", vec![Expr::lit("Pset_WallCommon"), Expr::lit("Width")]),
                        Expr::lit(0.2),
                    ))
                    .select([("guid", Expr::call("guid", vec![]))])
                    .order_by([(Expr::call("guid", vec![]), false)]),
            )
            .export_table("walls", "jsonl", "walls.jsonl")
            .export(ExportDecl {
                source: ExportSource::EdgeList { name: "edges".into(), kinds: vec![], min_confidence: 0.0 },
                format: "edge_list".into(),
                path: "edges.tsv".into(),
            });
        pretty_assertions::assert_eq!(recipe, expected);
    }

    #[test]
    fn test_literal_json_forms() {
        let lits: Vec<Literal> = serde_json::from_str(r#"[null, true, 3, 3.5, "x"]"#).unwrap();
        assert_eq!(
            lits,
            vec![Literal::Null, Literal::Bool(true), Literal::Int(3), Literal::Float(3.5), Literal::String("x".into())]
        );
    }
}
