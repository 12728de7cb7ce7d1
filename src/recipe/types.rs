//! Static types of recipe expressions.

use std::fmt;

use serde::{Serialize, Serializer};

/// Value type of an expression. `Int` and `Float` form the Number family.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ValueType {
    /// Type of the `null` literal.
    Null,
    Bool,
    Int,
    Float,
    String,
    NodeRef,
    EdgeRef,
    Geometry,
    List(Box<ValueType>),
    /// Statically unknown: result of dynamic attribute/property lookups.
    Any,
}

impl ValueType {
    pub fn list_of(item: ValueType) -> Self {
        ValueType::List(Box::new(item))
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, ValueType::Int | ValueType::Float)
    }

    /// Scalars that `order by` can sort.
    pub fn is_orderable(&self) -> bool {
        matches!(
            self,
            ValueType::Null
                | ValueType::Bool
                | ValueType::Int
                | ValueType::Float
                | ValueType::String
                | ValueType::NodeRef
                | ValueType::EdgeRef
        )
    }

    /// Whether an argument of type `arg` may be passed where `self` is
    /// expected. `Any` parameters accept everything, the null literal fits
    /// everywhere, `Int` widens to `Float` and lists compare element-wise.
    /// An `Any` argument only fits an `Any` parameter.
    pub fn accepts(&self, arg: &ValueType) -> bool {
        match (self, arg) {
            (ValueType::Any, _) | (_, ValueType::Null) => true,
            (ValueType::Float, ValueType::Int) => true,
            (ValueType::List(p), ValueType::List(a)) => p.accepts(a),
            (p, a) => p == a,
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueType::Null => f.write_str("Null"),
            ValueType::Bool => f.write_str("Bool"),
            ValueType::Int => f.write_str("Int"),
            ValueType::Float => f.write_str("Float"),
            ValueType::String => f.write_str("String"),
            ValueType::NodeRef => f.write_str("NodeRef"),
            ValueType::EdgeRef => f.write_str("EdgeRef"),
            ValueType::Geometry => f.write_str("Geometry"),
            ValueType::List(item) => write!(f, "List<{item}>"),
            ValueType::Any => f.write_str("Any"),
        }
    }
}

/// Annotated type of an expression: value type plus nullability.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeRef {
    pub ty: ValueType,
    pub nullable: bool,
}

impl TypeRef {
    pub fn new(ty: ValueType) -> Self {
        let nullable = matches!(ty, ValueType::Null);
        Self { ty, nullable }
    }

    pub fn nullable(ty: ValueType) -> Self {
        Self { ty, nullable: true }
    }

    pub fn null() -> Self {
        Self::nullable(ValueType::Null)
    }

    pub fn bool() -> Self { Self::new(ValueType::Bool) }
    pub fn int() -> Self { Self::new(ValueType::Int) }
    pub fn float() -> Self { Self::new(ValueType::Float) }
    pub fn string() -> Self { Self::new(ValueType::String) }

    /// Same value type, nullable when either input is.
    pub fn with_nullable(mut self, nullable: bool) -> Self {
        self.nullable |= nullable;
        self
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.nullable && self.ty != ValueType::Null {
            write!(f, "{}?", self.ty)
        } else {
            write!(f, "{}", self.ty)
        }
    }
}

impl Serialize for TypeRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
