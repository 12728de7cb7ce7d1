//! Recipe input tree and static types.
//!
//! The recipe grammar and parser live in the front end; this crate consumes
//! the resulting tree (`Recipe`), either built in code or deserialized from
//! JSON.

pub mod ast;
pub mod types;

pub use ast::{
    BinaryOp, Block, BlockKind, ExportDecl, ExportSource, Expr, Field, Literal, OrderKey, Recipe,
    Statement, Target, UnaryOp,
};
pub use types::{TypeRef, ValueType};
