//! Closed value type produced by expression evaluation.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::{EdgeId, GeometryHandle, NodeRef};

/// Evaluation value.
///
/// `Int` and `Float` together form the Number family. They are kept apart so
/// that counts stay integers all the way to the exporters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    NodeRef(NodeRef),
    EdgeRef(EdgeId),
    List(Vec<Value>),
    Geometry(GeometryHandle),
}

// ============================================================================
// Type inspection
// ============================================================================

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "NULL",
            Value::Bool(_) => "BOOL",
            Value::Int(_) => "INT",
            Value::Float(_) => "FLOAT",
            Value::String(_) => "STRING",
            Value::NodeRef(_) => "NODE_REF",
            Value::EdgeRef(_) => "EDGE_REF",
            Value::List(_) => "LIST",
            Value::Geometry(_) => "GEOMETRY",
        }
    }

    pub fn is_null(&self) -> bool { matches!(self, Value::Null) }
    pub fn is_numeric(&self) -> bool { matches!(self, Value::Int(_) | Value::Float(_)) }

    /// Only `Bool(true)` passes a filter. Null and false are both excluded.
    pub fn is_true(&self) -> bool {
        matches!(self, Value::Bool(true))
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Numeric value widened to f64.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    /// Convert loader-provided JSON. Objects have no counterpart and become Null.
    pub fn from_json(value: &serde_json::Value) -> Value {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => n.as_f64().map_or(Value::Null, Value::Float),
            },
            serde_json::Value::String(s) => Value::String(s.clone()),
            serde_json::Value::Array(items) => Value::List(items.iter().map(Value::from_json).collect()),
            serde_json::Value::Object(_) => Value::Null,
        }
    }
}

// ============================================================================
// Conversions (From impls)
// ============================================================================

impl From<bool> for Value { fn from(v: bool) -> Self { Value::Bool(v) } }
impl From<i32> for Value { fn from(v: i32) -> Self { Value::Int(v as i64) } }
impl From<i64> for Value { fn from(v: i64) -> Self { Value::Int(v) } }
impl From<f64> for Value { fn from(v: f64) -> Self { Value::Float(v) } }
impl From<String> for Value { fn from(v: String) -> Self { Value::String(v) } }
impl From<&str> for Value { fn from(v: &str) -> Self { Value::String(v.to_owned()) } }
impl From<NodeRef> for Value { fn from(v: NodeRef) -> Self { Value::NodeRef(v) } }
impl From<EdgeId> for Value { fn from(v: EdgeId) -> Self { Value::EdgeRef(v) } }
impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self { Value::List(v.into_iter().map(Into::into).collect()) }
}
impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self { v.map(Into::into).unwrap_or(Value::Null) }
}

// ============================================================================
// Display
// ============================================================================

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(v) => write!(f, "{v:?}"),
            Value::String(s) => write!(f, "\"{}\"", s.replace('"', "\\\"")),
            Value::NodeRef(n) => write!(f, "node({})", n.guid),
            Value::EdgeRef(e) => write!(f, "edge({e})"),
            Value::List(l) => {
                write!(f, "[")?;
                for (i, v) in l.iter().enumerate() {
                    if i > 0 { write!(f, ", ")?; }
                    write!(f, "{v}")?;
                }
                write!(f, "]")
            }
            Value::Geometry(g) => write!(f, "geometry({})", g.handle),
        }
    }
}

// ============================================================================
// Comparison
// ============================================================================

impl Value {
    /// Operator comparison. `None` when either side is Null or the types are
    /// not comparable.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Null, _) | (_, Value::Null) => None,
            (Value::Bool(a), Value::Bool(b)) => a.partial_cmp(b),
            (Value::Int(a), Value::Int(b)) => a.partial_cmp(b),
            (Value::Float(a), Value::Float(b)) => a.partial_cmp(b),
            (Value::Int(a), Value::Float(b)) => (*a as f64).partial_cmp(b),
            (Value::Float(a), Value::Int(b)) => a.partial_cmp(&(*b as f64)),
            (Value::String(a), Value::String(b)) => a.partial_cmp(b),
            _ => None,
        }
    }

    /// Operator equality. `None` when either side is Null.
    pub fn equals(&self, other: &Value) -> Option<bool> {
        match (self, other) {
            (Value::Null, _) | (_, Value::Null) => None,
            (a, b) if a.is_numeric() && b.is_numeric() => {
                a.compare(b).map(|o| o == Ordering::Equal).or(Some(false))
            }
            (Value::NodeRef(a), Value::NodeRef(b)) => Some(a.id == b.id),
            (a, b) => Some(a == b),
        }
    }

    fn sort_rank(&self) -> u8 {
        match self {
            Value::Bool(_) => 0,
            Value::Int(_) | Value::Float(_) => 1,
            Value::String(_) => 2,
            Value::NodeRef(_) => 3,
            Value::EdgeRef(_) => 4,
            Value::List(_) => 5,
            Value::Geometry(_) => 6,
            Value::Null => 7,
        }
    }

    /// Total order used for `order by`: Null sorts last, floats by `total_cmp`.
    pub fn sort_cmp(&self, other: &Value) -> Ordering {
        match (self, other) {
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::Int(a), Value::Int(b)) => a.cmp(b),
            (a, b) if a.is_numeric() && b.is_numeric() => {
                let (x, y) = (a.as_float().unwrap_or(0.0), b.as_float().unwrap_or(0.0));
                x.total_cmp(&y)
            }
            (Value::String(a), Value::String(b)) => a.cmp(b),
            (Value::NodeRef(a), Value::NodeRef(b)) => a.id.cmp(&b.id),
            (Value::EdgeRef(a), Value::EdgeRef(b)) => a.cmp(b),
            (Value::List(a), Value::List(b)) => {
                for (x, y) in a.iter().zip(b.iter()) {
                    let ord = x.sort_cmp(y);
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                a.len().cmp(&b.len())
            }
            (Value::Geometry(a), Value::Geometry(b)) => a.handle.cmp(&b.handle),
            (a, b) => a.sort_rank().cmp(&b.sort_rank()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_from() {
        assert_eq!(Value::from("hello"), Value::String("hello".into()));
        assert_eq!(Value::from(42), Value::Int(42));
        assert_eq!(Value::from(3.25), Value::Float(3.25));
        assert_eq!(Value::from(true), Value::Bool(true));
        assert_eq!(Value::from(None::<i64>), Value::Null);
    }

    #[test]
    fn test_null_comparison() {
        assert_eq!(Value::Null.compare(&Value::Null), None);
        assert_eq!(Value::Null.compare(&Value::Int(1)), None);
        assert_eq!(Value::Int(1).equals(&Value::Null), None);
    }

    #[test]
    fn test_numeric_comparison() {
        assert_eq!(Value::Int(1).compare(&Value::Float(1.5)), Some(Ordering::Less));
        assert_eq!(Value::Int(2).equals(&Value::Float(2.0)), Some(true));
    }

    #[test]
    fn test_sort_cmp_puts_null_last() {
        let mut values = vec![Value::Null, Value::Int(3), Value::Float(1.5), Value::Null, Value::Int(-1)];
        values.sort_by(Value::sort_cmp);
        assert_eq!(
            values,
            vec![Value::Int(-1), Value::Float(1.5), Value::Int(3), Value::Null, Value::Null]
        );
    }

    #[test]
    fn test_from_json_keeps_integers() {
        let v = Value::from_json(&serde_json::json!([1, 1.5, "a", null, {"x": 1}]));
        assert_eq!(
            v,
            Value::List(vec![
                Value::Int(1),
                Value::Float(1.5),
                Value::String("a".into()),
                Value::Null,
                Value::Null,
            ])
        );
    }

    #[test]
    fn test_only_true_passes_filter() {
        assert!(Value::Bool(true).is_true());
        assert!(!Value::Bool(false).is_true());
        assert!(!Value::Null.is_true());
        assert!(!Value::Int(1).is_true());
    }
}
